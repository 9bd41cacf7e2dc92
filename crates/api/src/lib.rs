mod auth;
pub mod error;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use common::{Notifier, Result, SettingsStore};
use engine::SchedulerHandle;
use history::{Backtester, HistoryStore};

/// Shared application state injected into every route handler.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<SettingsStore>,
    pub scheduler: SchedulerHandle,
    pub history: Arc<HistoryStore>,
    pub backtester: Arc<Backtester>,
    pub notifier: Option<Arc<dyn Notifier>>,
    /// Bearer token for `/api/*`. `None` leaves the API open.
    pub dashboard_token: Option<String>,
}

/// The full router with state applied.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods(Any);

    Router::new()
        .merge(routes::api_router(state.clone()))
        .merge(routes::health_router())
        .with_state(state)
        .layer(CompressionLayer::new())
        .layer(cors)
}

/// Build and run the Axum API server.
pub async fn serve(state: AppState, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let auth = state.dashboard_token.is_some();
    let app = router(state);

    info!(%addr, auth, "Dashboard API listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
