use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use common::db::connect_in_memory;
use common::{
    Candle, Confidence, Direction, Error, MarketDataSource, Result, SignalRecord, Ticker, Timeframe,
    Variant,
};
use scanner::{MarketScanner, ScanConfig, SnapshotStore};
use strategy::Analyzer;

struct Universe {
    symbols: Vec<String>,
    fail: bool,
}

impl Universe {
    fn of(n: usize) -> Self {
        Self {
            symbols: (0..n).map(|i| format!("C{i:02}USDT")).collect(),
            fail: false,
        }
    }
}

#[async_trait]
impl MarketDataSource for Universe {
    async fn candles(&self, _symbol: &str, _tf: Timeframe, _limit: usize) -> Result<Vec<Candle>> {
        Ok(Vec::new())
    }

    async fn tickers(&self, _min_quote_volume: f64) -> Result<Vec<Ticker>> {
        if self.fail {
            return Err(Error::Http("503 Service Unavailable".into()));
        }
        Ok(self
            .symbols
            .iter()
            .enumerate()
            .map(|(i, s)| Ticker {
                symbol: s.clone(),
                last_price: 1.0,
                quote_volume: 1e8 - i as f64,
                price_change_pct: 2.5,
            })
            .collect())
    }

    async fn funding_rate(&self, _symbol: &str) -> Option<f64> {
        None
    }

    async fn open_interest_change(&self, _symbol: &str, _period: Timeframe, _points: usize) -> Option<f64> {
        None
    }
}

/// LONG for every symbol; score and R:R derive from the symbol index.
/// `C07USDT` always fails, `C08USDT` is a WAIT and `C09USDT` is rate-limited once.
#[derive(Default)]
struct ScriptedAnalyzer {
    calls: AtomicUsize,
    limited: AtomicUsize,
    delay: Duration,
}

#[async_trait]
impl Analyzer for ScriptedAnalyzer {
    async fn evaluate(&self, symbol: &str, variant: Variant) -> Result<SignalRecord> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        match symbol {
            "C07USDT" => return Err(Error::Exchange("invalid symbol".into())),
            "C09USDT" if self.limited.fetch_add(1, Ordering::SeqCst) == 0 => {
                return Err(Error::RateLimited("429".into()));
            }
            _ => {}
        }
        let index: u32 = symbol[1..3].parse().unwrap_or(0);
        let mut record = SignalRecord {
            symbol: symbol.into(),
            variant,
            direction: if symbol == "C08USDT" { Direction::Wait } else { Direction::Long },
            confidence: if index % 2 == 0 { Confidence::High } else { Confidence::Medium },
            score: index % 5,
            ..SignalRecord::default()
        };
        record.levels.risk_reward = 1.0 + index as f64 / 10.0;
        Ok(record)
    }
}

fn quick() -> ScanConfig {
    ScanConfig {
        workers: 3,
        request_delay: Duration::ZERO,
        rate_limit_backoff: Duration::from_millis(10),
        min_rr: 1.0,
    }
}

#[tokio::test]
async fn failures_are_isolated_and_results_ranked() {
    let analyzer = Arc::new(ScriptedAnalyzer::default());
    let scanner = MarketScanner::new(Arc::new(Universe::of(50)), analyzer.clone(), quick());

    let state = scanner.run_to_completion(5e6, Variant::Swing).await.unwrap();

    assert!(!state.running);
    assert_eq!(state.total, 50);
    assert_eq!(state.progress, 50);
    // one failure, one WAIT
    assert_eq!(state.results.len(), 48);
    assert!(state.error.is_none());
    assert!(state.finished_at.is_some());
    assert_eq!(state.variant, Variant::Swing);

    let first = &state.results[0].signal;
    assert_eq!(first.confidence, Confidence::High);
    for pair in state.results.windows(2) {
        let (a, b) = (&pair[0].signal, &pair[1].signal);
        assert!(a.confidence >= b.confidence);
        if a.confidence == b.confidence {
            assert!(a.score >= b.score);
        }
    }
    assert!(state.results.iter().all(|h| h.price_change_pct == 2.5));
}

#[tokio::test]
async fn rate_limited_unit_is_retried_once() {
    let analyzer = Arc::new(ScriptedAnalyzer::default());
    let scanner = MarketScanner::new(Arc::new(Universe::of(10)), analyzer.clone(), quick());

    let state = scanner.run_to_completion(0.0, Variant::Scalp).await.unwrap();

    assert!(state.results.iter().any(|h| h.signal.symbol == "C09USDT"));
    assert_eq!(analyzer.calls.load(Ordering::SeqCst), 11);
}

#[tokio::test]
async fn second_start_is_rejected_while_running() {
    let analyzer = Arc::new(ScriptedAnalyzer {
        delay: Duration::from_millis(50),
        ..ScriptedAnalyzer::default()
    });
    let scanner = Arc::new(MarketScanner::new(Arc::new(Universe::of(30)), analyzer, quick()));

    let first = scanner.start(0.0, Variant::Position).await;
    assert!(first.is_ok());
    let second = scanner.start(0.0, Variant::Position).await;
    assert!(matches!(second, Err(Error::ScanConflict)));

    assert!(scanner.cancel().await);
    for _ in 0..100 {
        if !scanner.status().await.running {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let status = scanner.status().await;
    assert!(!status.running);
    assert_eq!(status.error.as_deref(), Some("cancelled"));
    assert_eq!(status.result_count, 0);

    // a new scan may start once the previous one stopped
    assert!(scanner.start(0.0, Variant::Position).await.is_ok());
}

#[tokio::test]
async fn ticker_failure_is_reported() {
    let universe = Universe {
        fail: true,
        ..Universe::of(5)
    };
    let scanner = MarketScanner::new(Arc::new(universe), Arc::new(ScriptedAnalyzer::default()), quick());

    let state = scanner.run_to_completion(0.0, Variant::Swing).await.unwrap();
    assert!(!state.running);
    assert!(state.error.unwrap().contains("503"));
    assert!(state.results.is_empty());
}

#[tokio::test]
async fn completed_scan_survives_restart() {
    let pool = connect_in_memory().await.unwrap();
    let scanner = MarketScanner::new(Arc::new(Universe::of(12)), Arc::new(ScriptedAnalyzer::default()), quick())
        .with_snapshots(SnapshotStore::new(pool.clone()));
    let finished = scanner.run_to_completion(0.0, Variant::Swing).await.unwrap();

    let restarted = MarketScanner::new(Arc::new(Universe::of(0)), Arc::new(ScriptedAnalyzer::default()), quick())
        .with_snapshots(SnapshotStore::new(pool));
    restarted.restore().await.unwrap();

    let restored = restarted.state().await;
    assert_eq!(restored.scan_id, finished.scan_id);
    assert_eq!(restored.results, finished.results);
    assert_eq!(restored.variant, Variant::Swing);
    assert!(!restored.running);
    assert_eq!(restarted.top(3).await.len(), 3);
}
