use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use common::{Error, Settings, SignalRecord, Variant};
use engine::{SchedulerCommand, SchedulerStatus, WatchResult};
use history::{BacktestFilter, BacktestReport, HistoryEntry};
use scanner::{ScanHit, ScanStatus};

use crate::{
    auth::require_auth,
    error::{ApiError, ApiResult},
    AppState,
};

pub fn api_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/config", get(get_config).post(post_config))
        .route("/api/scan", get(scan_watchlist))
        .route("/api/symbol/:symbol", get(symbol_detail))
        .route("/api/results", get(watch_results))
        .route("/api/history", get(get_history))
        .route("/api/history/clear", post(clear_history))
        .route("/api/backtest", post(run_backtest))
        .route("/api/scanner/start", post(scheduler_start))
        .route("/api/scanner/stop", post(scheduler_stop))
        .route("/api/scanner/status", get(scheduler_status))
        .route("/api/market-scan/start", post(market_scan_start))
        .route("/api/market-scan/cancel", post(market_scan_cancel))
        .route("/api/market-scan/status", get(market_scan_status))
        .route("/api/market-scan/results", get(market_scan_results))
        .route("/api/telegram/test", post(telegram_test))
        .route_layer(middleware::from_fn_with_state(state, require_auth))
}

// ─── Config ───────────────────────────────────────────────────────────────────

async fn get_config(State(state): State<AppState>) -> Json<Settings> {
    Json(state.settings.get().await)
}

/// Merge a partial settings object; unknown keys are ignored.
async fn post_config(State(state): State<AppState>, Json(patch): Json<Value>) -> ApiResult<Json<Settings>> {
    let updated = state.settings.update(patch).await?;
    Ok(Json(updated))
}

// ─── Watch list ───────────────────────────────────────────────────────────────

async fn scan_watchlist(State(state): State<AppState>) -> Json<Vec<WatchResult>> {
    let settings = state.settings.get().await;
    let watch = state.scheduler.watch();
    Json(watch.evaluate(&settings.symbols, settings.strategy).await)
}

#[derive(Deserialize)]
struct SymbolQuery {
    variant: Option<Variant>,
}

async fn symbol_detail(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(q): Query<SymbolQuery>,
) -> ApiResult<Json<SignalRecord>> {
    let variant = match q.variant {
        Some(v) => v,
        None => state.settings.get().await.strategy,
    };
    let symbol = symbol.to_uppercase();
    let signal = state.scheduler.watch().evaluate_symbol(&symbol, variant).await?;
    Ok(Json(signal))
}

async fn watch_results(State(state): State<AppState>) -> Json<Vec<WatchResult>> {
    Json(state.scheduler.watch().results().await)
}

// ─── History & backtest ───────────────────────────────────────────────────────

async fn get_history(State(state): State<AppState>) -> ApiResult<Json<Vec<HistoryEntry>>> {
    Ok(Json(state.history.list().await?))
}

async fn clear_history(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    state.history.clear().await?;
    info!("Signal history cleared via API");
    Ok(Json(json!({ "ok": true })))
}

async fn run_backtest(
    State(state): State<AppState>,
    body: Option<Json<BacktestFilter>>,
) -> ApiResult<Json<BacktestReport>> {
    let filter = body.map(|Json(f)| f).unwrap_or_default();
    Ok(Json(state.backtester.run(filter).await?))
}

// ─── Watch-list scheduler ─────────────────────────────────────────────────────

async fn scheduler_start(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    state.scheduler.send(SchedulerCommand::Start).await?;
    Ok(Json(json!({ "running": true })))
}

async fn scheduler_stop(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    state.scheduler.send(SchedulerCommand::Stop).await?;
    Ok(Json(json!({ "running": false })))
}

async fn scheduler_status(State(state): State<AppState>) -> Json<SchedulerStatus> {
    Json(state.scheduler.status().await)
}

// ─── Market scan ──────────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
struct MarketScanRequest {
    min_vol: Option<f64>,
    variant: Option<Variant>,
}

async fn market_scan_start(
    State(state): State<AppState>,
    body: Option<Json<MarketScanRequest>>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let settings = state.settings.get().await;
    let min_vol = req.min_vol.unwrap_or(settings.scan_min_volume);
    let variant = req.variant.unwrap_or(settings.strategy);

    let scan_id = state.scheduler.scanner().start(min_vol, variant).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "ok": true, "scan_id": scan_id, "variant": variant, "min_vol": min_vol })),
    ))
}

async fn market_scan_cancel(State(state): State<AppState>) -> Json<Value> {
    let cancelled = state.scheduler.scanner().cancel().await;
    Json(json!({ "cancelled": cancelled }))
}

async fn market_scan_status(State(state): State<AppState>) -> Json<ScanStatus> {
    Json(state.scheduler.scanner().status().await)
}

async fn market_scan_results(State(state): State<AppState>) -> Json<Vec<ScanHit>> {
    Json(state.scheduler.scanner().results().await)
}

// ─── Telegram ─────────────────────────────────────────────────────────────────

async fn telegram_test(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let Some(notifier) = &state.notifier else {
        return Err(ApiError(Error::Config("Telegram is not configured".into())));
    };
    notifier
        .notify("✅ CryptoDesk: Telegram connection OK. Alerts will arrive here.")
        .await
        .map_err(|e| ApiError(Error::Config(format!("Telegram test failed: {e}"))))?;
    Ok(Json(json!({ "ok": true })))
}
