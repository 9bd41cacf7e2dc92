use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

use common::{Confidence, Error, Result, SettingsStore, SignalRecord, Variant};
use scanner::MarketScanner;
use strategy::Analyzer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerCommand {
    Start,
    Stop,
    /// Run one cycle immediately, whether or not the timer is running.
    RunNow,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub is_scanning: bool,
    pub last_scan: Option<DateTime<Utc>>,
    pub next_scan: Option<DateTime<Utc>>,
    pub scan_count: u64,
}

/// Latest evaluation of one watch-list symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WatchResult {
    Signal(Box<SignalRecord>),
    Failed { symbol: String, error: String },
}

impl WatchResult {
    pub fn symbol(&self) -> &str {
        match self {
            WatchResult::Signal(s) => &s.symbol,
            WatchResult::Failed { symbol, .. } => symbol,
        }
    }
}

/// The operator's watch list and its most recent results.
pub struct WatchList {
    analyzer: Arc<dyn Analyzer>,
    results: RwLock<BTreeMap<String, WatchResult>>,
}

impl WatchList {
    pub fn new(analyzer: Arc<dyn Analyzer>) -> Self {
        Self {
            analyzer,
            results: RwLock::new(BTreeMap::new()),
        }
    }

    /// Evaluate any symbol without touching the stored results.
    pub async fn evaluate_symbol(&self, symbol: &str, variant: Variant) -> Result<SignalRecord> {
        self.analyzer.evaluate(symbol, variant).await
    }

    /// Evaluate `symbols` in order and replace the stored results.
    /// A failing symbol becomes a `Failed` entry; the others still run.
    pub async fn evaluate(&self, symbols: &[String], variant: Variant) -> Vec<WatchResult> {
        let mut out = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let result = match self.analyzer.evaluate(symbol, variant).await {
                Ok(signal) => WatchResult::Signal(Box::new(signal)),
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "Watch-list evaluation failed");
                    WatchResult::Failed {
                        symbol: symbol.clone(),
                        error: e.to_string(),
                    }
                }
            };
            out.push(result);
        }

        let mut stored = self.results.write().await;
        *stored = out
            .iter()
            .map(|r| (r.symbol().to_string(), r.clone()))
            .collect();
        out
    }

    pub async fn results(&self) -> Vec<WatchResult> {
        self.results.read().await.values().cloned().collect()
    }
}

/// Cloneable handle passed to other crates (Telegram, API).
#[derive(Clone)]
pub struct SchedulerHandle {
    command_tx: mpsc::Sender<SchedulerCommand>,
    status: Arc<RwLock<SchedulerStatus>>,
    watch: Arc<WatchList>,
    scanner: Arc<MarketScanner>,
}

impl SchedulerHandle {
    pub async fn send(&self, cmd: SchedulerCommand) -> Result<()> {
        self.command_tx
            .send(cmd)
            .await
            .map_err(|_| Error::Other("scheduler is not running".into()))
    }

    pub async fn status(&self) -> SchedulerStatus {
        self.status.read().await.clone()
    }

    pub fn watch(&self) -> &Arc<WatchList> {
        &self.watch
    }

    pub fn scanner(&self) -> &Arc<MarketScanner> {
        &self.scanner
    }
}

/// Timer loop: every `interval_minutes` evaluate the watch list, then scan
/// the market and forward HIGH actionable hits to the dispatcher.
///
/// Cycles run as their own task so that commands stay responsive; at most
/// one cycle is in flight.
pub struct Scheduler {
    command_rx: mpsc::Receiver<SchedulerCommand>,
    cycle: Arc<Cycle>,
}

impl Scheduler {
    pub fn new(
        watch: Arc<WatchList>,
        scanner: Arc<MarketScanner>,
        settings: Arc<SettingsStore>,
        signal_tx: mpsc::Sender<SignalRecord>,
    ) -> (Self, SchedulerHandle) {
        let (command_tx, command_rx) = mpsc::channel(32);
        let status = Arc::new(RwLock::new(SchedulerStatus::default()));

        let handle = SchedulerHandle {
            command_tx,
            status: status.clone(),
            watch: watch.clone(),
            scanner: scanner.clone(),
        };

        let cycle = Arc::new(Cycle {
            status,
            watch,
            scanner,
            settings,
            signal_tx,
            halted: AtomicBool::new(false),
            scanning: AtomicBool::new(false),
        });

        (Scheduler { command_rx, cycle }, handle)
    }

    /// Run the scheduler. Call from `tokio::spawn`.
    /// Exits only when every handle has been dropped.
    pub async fn run(mut self) {
        info!("Scheduler initialized in stopped state. Waiting for Start command.");
        let mut next: Option<Instant> = None;
        let mut in_flight: Option<JoinHandle<()>> = None;

        loop {
            let deadline = next;
            let tick = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                cmd = self.command_rx.recv() => match cmd {
                    Some(SchedulerCommand::Start) => {
                        if next.is_some() {
                            info!("Scheduler already running");
                            continue;
                        }
                        info!("Scheduler started");
                        self.cycle.status.write().await.running = true;
                        next = Some(Instant::now());
                    }
                    Some(SchedulerCommand::Stop) => {
                        info!("Scheduler stopped");
                        next = None;
                        {
                            let mut status = self.cycle.status.write().await;
                            status.running = false;
                            status.next_scan = None;
                        }
                        if in_flight.as_ref().is_some_and(|h| !h.is_finished()) {
                            self.cycle.halt().await;
                        }
                    }
                    Some(SchedulerCommand::RunNow) => {
                        info!("Manual cycle requested");
                        spawn_cycle(&self.cycle, &mut in_flight);
                    }
                    None => {
                        warn!("Scheduler command channel closed, shutting down");
                        break;
                    }
                },

                _ = tick => {
                    let interval = self.cycle.interval().await;
                    next = Some(Instant::now() + interval);
                    self.cycle.status.write().await.next_scan =
                        chrono::Duration::from_std(interval).ok().map(|d| Utc::now() + d);
                    spawn_cycle(&self.cycle, &mut in_flight);
                }
            }
        }
    }

    /// One full cycle, awaited in place.
    pub async fn run_cycle(&self) {
        self.cycle.halted.store(false, Ordering::SeqCst);
        self.cycle.run().await;
    }
}

fn spawn_cycle(cycle: &Arc<Cycle>, in_flight: &mut Option<JoinHandle<()>>) {
    if in_flight.as_ref().is_some_and(|h| !h.is_finished()) {
        info!("Previous cycle still running, skipped");
        return;
    }
    cycle.halted.store(false, Ordering::SeqCst);
    let cycle = Arc::clone(cycle);
    *in_flight = Some(tokio::spawn(async move { cycle.run().await }));
}

// ─── Cycle ────────────────────────────────────────────────────────────────────

struct Cycle {
    status: Arc<RwLock<SchedulerStatus>>,
    watch: Arc<WatchList>,
    scanner: Arc<MarketScanner>,
    settings: Arc<SettingsStore>,
    signal_tx: mpsc::Sender<SignalRecord>,
    /// Set by Stop; checked between phases.
    halted: AtomicBool,
    /// True while this cycle owns the running market scan.
    scanning: AtomicBool,
}

impl Cycle {
    /// Never fails: every error is logged and the cycle moves on.
    async fn run(&self) {
        let settings = self.settings.get().await;
        {
            let mut status = self.status.write().await;
            status.is_scanning = true;
            status.last_scan = Some(Utc::now());
        }
        info!(
            symbols = settings.symbols.len(),
            variant = %settings.strategy,
            "Scheduler cycle started"
        );

        // Watch-list results are only stored; history and alerts come from the scan.
        let watch = self.watch.evaluate(&settings.symbols, settings.strategy).await;
        info!(evaluated = watch.len(), "Watch list refreshed");

        if self.halted.load(Ordering::SeqCst) {
            info!("Cycle halted before the market scan");
        } else {
            self.scan(settings.scan_min_volume, settings.strategy, settings.rr_ratio)
                .await;
        }

        let mut status = self.status.write().await;
        status.is_scanning = false;
        status.scan_count += 1;
        info!(cycle = status.scan_count, "Scheduler cycle finished");
    }

    async fn scan(&self, min_volume: f64, variant: Variant, min_rr: f64) {
        self.scanning.store(true, Ordering::SeqCst);
        let outcome = self.scanner.run_to_completion(min_volume, variant).await;
        self.scanning.store(false, Ordering::SeqCst);

        match outcome {
            Ok(state) => match state.error {
                Some(error) => warn!(error = %error, "Market scan ended without fresh results"),
                None => {
                    let high: Vec<&SignalRecord> = state
                        .results
                        .iter()
                        .map(|hit| &hit.signal)
                        .filter(|s| s.confidence == Confidence::High && s.is_actionable(min_rr))
                        .collect();
                    info!(
                        hits = state.results.len(),
                        high = high.len(),
                        min_rr,
                        "Market scan complete"
                    );
                    for signal in high {
                        self.forward(signal).await;
                    }
                }
            },
            Err(Error::ScanConflict) => info!("Market scan already running, skipped this cycle"),
            Err(e) => warn!(error = %e, "Market scan failed"),
        }
    }

    /// Stop the cycle at the next phase boundary, cancelling its market scan.
    async fn halt(&self) {
        self.halted.store(true, Ordering::SeqCst);
        if self.scanning.load(Ordering::SeqCst) && self.scanner.cancel().await {
            info!("Cycle market scan cancelled by Stop");
        }
    }

    async fn interval(&self) -> Duration {
        let minutes = self.settings.get().await.interval_minutes.max(1);
        Duration::from_secs(minutes * 60)
    }

    async fn forward(&self, signal: &SignalRecord) {
        if self.signal_tx.send(signal.clone()).await.is_err() {
            warn!(symbol = %signal.symbol, "Dispatcher channel closed, signal dropped");
        }
    }
}
