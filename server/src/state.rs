use std::sync::Arc;

use crate::config::KeepaliveConfig;
use crate::relay::Relay;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// The one relay instance for this process
    pub relay: Arc<Relay>,
    /// Ping/pong settings applied to every socket
    pub keepalive: KeepaliveConfig,
}

impl AppState {
    pub fn new(keepalive: KeepaliveConfig) -> Self {
        Self {
            relay: Arc::new(Relay::new()),
            keepalive,
        }
    }
}
