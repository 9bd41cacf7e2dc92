use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use common::db::connect_in_memory;
use common::{
    Candle, Confidence, Direction, Error, MarketDataSource, Result, SettingsStore, SignalRecord,
    Ticker, Timeframe, Variant,
};
use engine::{
    Scheduler, SchedulerCommand, SchedulerHandle, SignalDispatcher, WatchList, WatchResult,
};
use history::HistoryStore;
use scanner::{MarketScanner, ScanConfig};
use strategy::Analyzer;

struct ThreeCoins;

#[async_trait]
impl MarketDataSource for ThreeCoins {
    async fn candles(&self, _symbol: &str, _tf: Timeframe, _limit: usize) -> Result<Vec<Candle>> {
        Ok(Vec::new())
    }

    async fn tickers(&self, _min_quote_volume: f64) -> Result<Vec<Ticker>> {
        Ok(["AAAUSDT", "BBBUSDT", "CCCUSDT"]
            .iter()
            .map(|s| Ticker {
                symbol: s.to_string(),
                last_price: 10.0,
                quote_volume: 1e7,
                price_change_pct: 1.0,
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

/// `n` liquid coins named C00USDT, C01USDT, ...
struct ManyCoins(usize);

#[async_trait]
impl MarketDataSource for ManyCoins {
    async fn candles(&self, _symbol: &str, _tf: Timeframe, _limit: usize) -> Result<Vec<Candle>> {
        Ok(Vec::new())
    }

    async fn tickers(&self, _min_quote_volume: f64) -> Result<Vec<Ticker>> {
        Ok((0..self.0)
            .map(|i| Ticker {
                symbol: format!("C{i:02}USDT"),
                last_price: 1.0,
                quote_volume: 1e7,
                price_change_pct: 0.0,
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

/// Every symbol is a HIGH long with R:R 2, after a pause.
struct Sluggish;

#[async_trait]
impl Analyzer for Sluggish {
    async fn evaluate(&self, symbol: &str, variant: Variant) -> Result<SignalRecord> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut signal = SignalRecord {
            symbol: symbol.into(),
            variant,
            direction: Direction::Long,
            confidence: Confidence::High,
            ..SignalRecord::default()
        };
        signal.levels.risk_reward = 2.0;
        Ok(signal)
    }
}

/// AAA: HIGH with R:R 3, BBB: MEDIUM, CCC: HIGH with R:R 1.2.
/// Watch-list symbols: BTC is HIGH 2.0, SOL is MEDIUM 2.5, ETH fails.
struct Fixed;

#[async_trait]
impl Analyzer for Fixed {
    async fn evaluate(&self, symbol: &str, variant: Variant) -> Result<SignalRecord> {
        let (confidence, rr) = match symbol {
            "AAAUSDT" => (Confidence::High, 3.0),
            "BBBUSDT" => (Confidence::Medium, 2.5),
            "CCCUSDT" => (Confidence::High, 1.2),
            "BTCUSDT" => (Confidence::High, 2.0),
            "SOLUSDT" => (Confidence::Medium, 2.5),
            _ => return Err(Error::Exchange(format!("unknown symbol {symbol}"))),
        };
        let mut signal = SignalRecord {
            symbol: symbol.into(),
            variant,
            direction: Direction::Long,
            confidence,
            ..SignalRecord::default()
        };
        signal.levels.risk_reward = rr;
        Ok(signal)
    }
}

async fn settings() -> Arc<SettingsStore> {
    let dir = tempfile::tempdir().unwrap();
    let store = SettingsStore::load(dir.path().join("settings.json")).await;
    store
        .update(serde_json::json!({
            "symbols": ["BTCUSDT", "ETHUSDT", "SOLUSDT"],
            "rr_ratio": 1.5,
            "alert_rr": 1.5,
        }))
        .await
        .unwrap();
    Arc::new(store)
}

async fn scheduler() -> (Scheduler, SchedulerHandle, mpsc::Receiver<SignalRecord>) {
    let analyzer: Arc<dyn Analyzer> = Arc::new(Fixed);
    let scanner = Arc::new(MarketScanner::new(
        Arc::new(ThreeCoins),
        analyzer.clone(),
        ScanConfig {
            request_delay: Duration::ZERO,
            ..ScanConfig::default()
        },
    ));
    let (signal_tx, signal_rx) = mpsc::channel(16);
    let (scheduler, handle) = Scheduler::new(
        Arc::new(WatchList::new(analyzer)),
        scanner,
        settings().await,
        signal_tx,
    );
    (scheduler, handle, signal_rx)
}

fn drain(rx: &mut mpsc::Receiver<SignalRecord>) -> Vec<String> {
    let mut symbols = Vec::new();
    while let Ok(s) = rx.try_recv() {
        symbols.push(s.symbol);
    }
    symbols.sort();
    symbols
}

#[tokio::test]
async fn cycle_forwards_only_high_scan_hits() {
    let (scheduler, handle, mut rx) = scheduler().await;

    scheduler.run_cycle().await;

    assert_eq!(drain(&mut rx), vec!["AAAUSDT"]);

    let status = handle.status().await;
    assert_eq!(status.scan_count, 1);
    assert!(!status.is_scanning);
    assert!(status.last_scan.is_some());

    let watch = handle.watch().results().await;
    assert_eq!(watch.len(), 3);
    assert!(matches!(&watch[0], WatchResult::Signal(s) if s.symbol == "BTCUSDT"));
    assert!(matches!(&watch[1], WatchResult::Failed { symbol, .. } if symbol == "ETHUSDT"));
    assert!(matches!(&watch[2], WatchResult::Signal(s) if s.confidence == Confidence::Medium));

    assert_eq!(handle.scanner().results().await.len(), 3);
}

#[tokio::test]
async fn watch_list_signals_never_reach_history() {
    let (scheduler, handle, rx) = scheduler().await;
    let history = Arc::new(HistoryStore::new(connect_in_memory().await.unwrap()));
    let dispatcher = SignalDispatcher::new(rx, history.clone(), settings().await, None);
    let dispatching = tokio::spawn(dispatcher.run());

    scheduler.run_cycle().await;
    drop(scheduler);
    dispatching.await.unwrap();

    let recorded: Vec<String> = history
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.symbol)
        .collect();
    assert_eq!(recorded, vec!["AAAUSDT"]);
    assert_eq!(handle.watch().results().await.len(), 3);
}

#[tokio::test]
async fn start_runs_a_cycle_and_stop_clears_schedule() {
    let (scheduler, handle, mut rx) = scheduler().await;
    tokio::spawn(scheduler.run());

    handle.send(SchedulerCommand::Start).await.unwrap();
    let first = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
    assert!(first.is_some());

    for _ in 0..100 {
        if handle.status().await.scan_count == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let status = handle.status().await;
    assert!(status.running);
    assert_eq!(status.scan_count, 1);
    assert!(status.next_scan.is_some());

    handle.send(SchedulerCommand::Stop).await.unwrap();
    for _ in 0..100 {
        if !handle.status().await.running {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let status = handle.status().await;
    assert!(!status.running);
    assert!(status.next_scan.is_none());
}

#[tokio::test]
async fn run_now_cycles_without_starting_the_timer() {
    let (scheduler, handle, mut rx) = scheduler().await;
    tokio::spawn(scheduler.run());

    handle.send(SchedulerCommand::RunNow).await.unwrap();
    for _ in 0..100 {
        if handle.status().await.scan_count == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let status = handle.status().await;
    assert_eq!(status.scan_count, 1);
    assert!(!status.running);
    assert!(status.next_scan.is_none());
    assert_eq!(drain(&mut rx), vec!["AAAUSDT"]);
}

#[tokio::test]
async fn stop_cancels_the_cycle_scan() {
    let analyzer: Arc<dyn Analyzer> = Arc::new(Sluggish);
    let scanner = Arc::new(MarketScanner::new(
        Arc::new(ManyCoins(40)),
        analyzer.clone(),
        ScanConfig {
            workers: 1,
            request_delay: Duration::ZERO,
            ..ScanConfig::default()
        },
    ));
    let (signal_tx, mut rx) = mpsc::channel(64);
    let (scheduler, handle) = Scheduler::new(
        Arc::new(WatchList::new(analyzer)),
        scanner,
        settings().await,
        signal_tx,
    );
    tokio::spawn(scheduler.run());

    handle.send(SchedulerCommand::Start).await.unwrap();
    for _ in 0..100 {
        if handle.scanner().status().await.running {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(handle.scanner().status().await.running);

    handle.send(SchedulerCommand::Stop).await.unwrap();
    let stopped_at = std::time::Instant::now();
    for _ in 0..100 {
        if !handle.status().await.is_scanning {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    // 40 coins at one worker would take two seconds uncancelled.
    assert!(stopped_at.elapsed() < Duration::from_secs(1));

    let status = handle.status().await;
    assert!(!status.running);
    assert!(!status.is_scanning);
    assert_eq!(status.scan_count, 1);

    let scan = handle.scanner().status().await;
    assert!(!scan.running);
    assert_eq!(scan.error.as_deref(), Some("cancelled"));
    assert!(drain(&mut rx).is_empty());
}
