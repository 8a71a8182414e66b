use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Body of `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub connections: usize,
    pub sessions: usize,
}

/// GET /health — liveness plus a snapshot of relay occupancy.
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        connections: state.relay.connections().len(),
        sessions: state.relay.sessions().len(),
    })
}

/// Build the full axum Router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/streaming", get(ws_handler::ws_upgrade))
        .route("/health", get(health))
        .with_state(state)
}
