use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, State},
    response::Response,
};
use std::net::SocketAddr;

use crate::state::AppState;
use crate::ws::actor;

/// GET /streaming
/// WebSocket upgrade endpoint for the signaling relay. Identity is
/// established upstream; the client announces it with a `register` event.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    tracing::debug!(remote_addr = %addr, "Streaming socket upgrade");
    ws.on_upgrade(move |socket| actor::run_connection(socket, state, addr))
}
