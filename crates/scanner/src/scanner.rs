use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, RwLock, Semaphore};
use tracing::{error, info, warn};
use uuid::Uuid;

use common::{Error, MarketDataSource, Result, Ticker, Variant};
use strategy::Analyzer;

use crate::snapshot::SnapshotStore;
use crate::state::{rank, ScanHit, ScanState, ScanStatus, UnitOutcome};

#[derive(Debug, Clone, Copy)]
pub struct ScanConfig {
    pub workers: usize,
    /// Pause before every evaluation.
    pub request_delay: Duration,
    /// Wait before the single retry of a rate-limited evaluation.
    pub rate_limit_backoff: Duration,
    /// Directional hits below this R:R are dropped.
    pub min_rr: f64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            request_delay: Duration::from_millis(300),
            rate_limit_backoff: Duration::from_secs(2),
            min_rr: 1.0,
        }
    }
}

/// Evaluates the whole liquid universe with bounded concurrency.
///
/// One scan at a time: `start` while running fails with `ScanConflict`.
/// Results of a scan replace the previous ones only once it completes.
pub struct MarketScanner {
    source: Arc<dyn MarketDataSource>,
    analyzer: Arc<dyn Analyzer>,
    snapshots: Option<SnapshotStore>,
    config: ScanConfig,
    state: RwLock<ScanState>,
    cancel: Arc<AtomicBool>,
}

impl MarketScanner {
    pub fn new(source: Arc<dyn MarketDataSource>, analyzer: Arc<dyn Analyzer>, config: ScanConfig) -> Self {
        Self {
            source,
            analyzer,
            snapshots: None,
            config,
            state: RwLock::new(ScanState::default()),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_snapshots(mut self, snapshots: SnapshotStore) -> Self {
        self.snapshots = Some(snapshots);
        self
    }

    /// Load the last persisted scan, if any. Unreadable snapshots are ignored.
    pub async fn restore(&self) -> Result<()> {
        let Some(store) = &self.snapshots else {
            return Ok(());
        };
        if let Some(saved) = store.load().await? {
            info!(
                scan_id = ?saved.scan_id,
                results = saved.results.len(),
                "Restored last market scan"
            );
            *self.state.write().await = saved;
        }
        Ok(())
    }

    /// Begin a scan in the background.
    pub async fn start(self: &Arc<Self>, min_volume: f64, variant: Variant) -> Result<Uuid> {
        let scan_id = self.claim(variant).await?;
        let scanner = Arc::clone(self);
        tokio::spawn(async move { scanner.execute(scan_id, min_volume, variant).await });
        Ok(scan_id)
    }

    /// Run a scan on the current task and return its final state.
    pub async fn run_to_completion(&self, min_volume: f64, variant: Variant) -> Result<ScanState> {
        let scan_id = self.claim(variant).await?;
        self.execute(scan_id, min_volume, variant).await;
        Ok(self.state().await)
    }

    /// Ask a running scan to stop. Units already evaluating finish.
    pub async fn cancel(&self) -> bool {
        let running = self.state.read().await.running;
        if running {
            info!("Market scan cancellation requested");
            self.cancel.store(true, Ordering::SeqCst);
        }
        running
    }

    pub async fn state(&self) -> ScanState {
        self.state.read().await.clone()
    }

    pub async fn status(&self) -> ScanStatus {
        ScanStatus::from(&*self.state.read().await)
    }

    pub async fn results(&self) -> Vec<ScanHit> {
        self.state.read().await.results.clone()
    }

    pub async fn top(&self, n: usize) -> Vec<ScanHit> {
        self.state.read().await.results.iter().take(n).cloned().collect()
    }

    async fn claim(&self, variant: Variant) -> Result<Uuid> {
        let mut state = self.state.write().await;
        if state.running {
            return Err(Error::ScanConflict);
        }
        let scan_id = Uuid::new_v4();
        state.scan_id = Some(scan_id);
        state.variant = variant;
        state.running = true;
        state.progress = 0;
        state.total = 0;
        state.started_at = Some(Utc::now());
        state.finished_at = None;
        state.error = None;
        self.cancel.store(false, Ordering::SeqCst);
        Ok(scan_id)
    }

    async fn execute(&self, scan_id: Uuid, min_volume: f64, variant: Variant) {
        let tickers = match self.source.tickers(min_volume).await {
            Ok(t) => t,
            Err(e) => {
                error!(scan_id = %scan_id, error = %e, "Market scan aborted: ticker fetch failed");
                let mut state = self.state.write().await;
                state.running = false;
                state.error = Some(e.to_string());
                state.finished_at = Some(Utc::now());
                return;
            }
        };

        let total = tickers.len();
        self.state.write().await.total = total;
        info!(scan_id = %scan_id, variant = %variant, total, min_volume, "Market scan started");

        let (tx, mut rx) = mpsc::channel::<UnitOutcome>(total.max(1));
        let permits = Arc::new(Semaphore::new(self.config.workers.max(1)));
        for ticker in tickers {
            let tx = tx.clone();
            let permits = Arc::clone(&permits);
            let analyzer = Arc::clone(&self.analyzer);
            let cancel = Arc::clone(&self.cancel);
            let config = self.config;
            tokio::spawn(async move {
                let outcome = match permits.acquire_owned().await {
                    Ok(_permit) => evaluate_unit(analyzer.as_ref(), ticker, variant, config, &cancel).await,
                    Err(_) => UnitOutcome::Skipped { symbol: ticker.symbol },
                };
                let _ = tx.send(outcome).await;
            });
        }
        drop(tx);

        let mut hits = Vec::new();
        let (mut failed, mut skipped) = (0usize, 0usize);
        while let Some(outcome) = rx.recv().await {
            match outcome {
                UnitOutcome::Hit(hit) => hits.push(*hit),
                UnitOutcome::Filtered { .. } => {}
                UnitOutcome::Failed { symbol, error } => {
                    failed += 1;
                    warn!(scan_id = %scan_id, symbol = %symbol, error = %error, "Scan unit failed");
                }
                UnitOutcome::Skipped { .. } => skipped += 1,
            }
            self.state.write().await.progress += 1;
        }

        if self.cancel.load(Ordering::SeqCst) {
            let mut state = self.state.write().await;
            state.running = false;
            state.error = Some("cancelled".into());
            state.finished_at = Some(Utc::now());
            info!(scan_id = %scan_id, skipped, "Market scan cancelled, previous results kept");
            return;
        }

        rank(&mut hits);
        let snapshot = {
            let mut state = self.state.write().await;
            state.results = hits;
            state.running = false;
            state.progress = total;
            state.finished_at = Some(Utc::now());
            state.clone()
        };
        info!(
            scan_id = %scan_id,
            total,
            hits = snapshot.results.len(),
            failed,
            "Market scan finished"
        );

        if let Some(store) = &self.snapshots {
            if let Err(e) = store.save(&snapshot).await {
                warn!(scan_id = %scan_id, error = %e, "Failed to persist scan snapshot");
            }
        }
    }
}

async fn evaluate_unit(
    analyzer: &dyn Analyzer,
    ticker: Ticker,
    variant: Variant,
    config: ScanConfig,
    cancel: &AtomicBool,
) -> UnitOutcome {
    if cancel.load(Ordering::SeqCst) {
        return UnitOutcome::Skipped { symbol: ticker.symbol };
    }
    tokio::time::sleep(config.request_delay).await;

    let mut result = analyzer.evaluate(&ticker.symbol, variant).await;
    if matches!(&result, Err(e) if e.is_rate_limited()) {
        warn!(symbol = %ticker.symbol, backoff_ms = config.rate_limit_backoff.as_millis() as u64, "Rate limited, retrying once");
        tokio::time::sleep(config.rate_limit_backoff).await;
        result = analyzer.evaluate(&ticker.symbol, variant).await;
    }

    match result {
        Ok(signal) if signal.is_actionable(config.min_rr) => UnitOutcome::Hit(Box::new(ScanHit::new(signal, &ticker))),
        Ok(_) => UnitOutcome::Filtered { symbol: ticker.symbol },
        Err(e) => UnitOutcome::Failed {
            symbol: ticker.symbol,
            error: e.to_string(),
        },
    }
}
