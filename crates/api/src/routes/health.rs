use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::AppState;

pub fn health_router() -> Router<AppState> {
    Router::new().route("/healthz", get(healthz))
}

/// Health check endpoint, no auth required.
async fn healthz(State(state): State<AppState>) -> Json<Value> {
    let scheduler = match state.scheduler.status().await.running {
        true => "running",
        false => "stopped",
    };
    let market_scan = match state.scheduler.scanner().status().await.running {
        true => "running",
        false => "idle",
    };
    Json(json!({
        "status": "ok",
        "scheduler": scheduler,
        "market_scan": market_scan,
    }))
}
