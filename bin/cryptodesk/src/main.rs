use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use common::{db, Config, MarketDataSource, Notifier, SettingsStore, SignalRecord};
use engine::{BinanceFuturesClient, Scheduler, SchedulerCommand, SignalDispatcher, WatchList};
use history::{Backtester, HistoryStore};
use scanner::{MarketScanner, ScanConfig, SnapshotStore};
use strategy::{Analyzer, Evaluator, StrategyFileConfig, StrategyRegistry};
use telegram_ctrl::{start_bot, BotDeps, TelegramNotifier};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env().context("loading configuration")?;
    info!(port = cfg.dashboard_port, telegram = cfg.telegram_enabled(), "CryptoDesk starting");

    let settings = Arc::new(SettingsStore::load(&cfg.settings_path).await);
    let startup = settings.get().await;

    // ── Database ──────────────────────────────────────────────────────────────
    let pool = db::connect(&cfg.database_url)
        .await
        .context("opening database")?;

    // ── Market data & strategies ─────────────────────────────────────────────
    let source: Arc<dyn MarketDataSource> =
        Arc::new(BinanceFuturesClient::new().context("building HTTP client")?);
    let strategy_file = StrategyFileConfig::load(&cfg.strategy_config_path);
    let registry = Arc::new(StrategyRegistry::from_config(&strategy_file));
    let analyzer: Arc<dyn Analyzer> = Arc::new(Evaluator::new(source.clone(), registry));

    // ── Market scanner ────────────────────────────────────────────────────────
    let scanner = Arc::new(
        MarketScanner::new(
            source.clone(),
            analyzer.clone(),
            ScanConfig {
                workers: startup.scan_workers.max(1),
                ..ScanConfig::default()
            },
        )
        .with_snapshots(SnapshotStore::new(pool.clone())),
    );
    if let Err(e) = scanner.restore().await {
        warn!(error = %e, "Could not restore last market scan");
    }

    // ── History ───────────────────────────────────────────────────────────────
    let history = Arc::new(HistoryStore::new(pool.clone()));
    let backtester = Arc::new(Backtester::new(source.clone(), history.clone()));

    // ── Telegram notifier ─────────────────────────────────────────────────────
    let bot = match (&cfg.telegram_token, cfg.telegram_enabled()) {
        (Some(token), true) => Some(teloxide::Bot::new(token)),
        _ => {
            info!("Telegram disabled: TELEGRAM_TOKEN or TELEGRAM_CHAT_IDS not set");
            None
        }
    };
    let notifier: Option<Arc<dyn Notifier>> = bot
        .clone()
        .map(|b| Arc::new(TelegramNotifier::new(b, &cfg.telegram_chat_ids)) as Arc<dyn Notifier>);

    // ── Scheduler & dispatcher ────────────────────────────────────────────────
    let (signal_tx, signal_rx) = mpsc::channel::<SignalRecord>(128);
    let dispatcher = SignalDispatcher::new(signal_rx, history.clone(), settings.clone(), notifier.clone());
    let (scheduler, scheduler_handle) = Scheduler::new(
        Arc::new(WatchList::new(analyzer)),
        scanner,
        settings.clone(),
        signal_tx,
    );

    // ── Dashboard API ─────────────────────────────────────────────────────────
    let api_state = api::AppState {
        settings: settings.clone(),
        scheduler: scheduler_handle.clone(),
        history,
        backtester,
        notifier,
        dashboard_token: cfg.dashboard_token.clone(),
    };
    if api_state.dashboard_token.is_none() {
        warn!("DASHBOARD_TOKEN not set, /api is unauthenticated");
    }

    // ── Spawn all tasks ───────────────────────────────────────────────────────
    let port = cfg.dashboard_port;
    tokio::spawn(scheduler.run());
    tokio::spawn(dispatcher.run());
    if let Some(bot) = bot {
        let deps = BotDeps {
            scheduler: scheduler_handle.clone(),
            settings: settings.clone(),
            allowed_chat_ids: Arc::new(cfg.telegram_chat_ids.clone()),
        };
        tokio::spawn(start_bot(bot, deps));
    }
    tokio::spawn(async move {
        if let Err(e) = api::serve(api_state, port).await {
            error!(error = %e, "Dashboard API stopped");
        }
    });

    scheduler_handle
        .send(SchedulerCommand::Start)
        .await
        .context("starting scheduler")?;

    // Keep main alive
    info!("All subsystems started. Waiting for shutdown signal.");
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("Shutdown signal received. Exiting.");
    Ok(())
}
