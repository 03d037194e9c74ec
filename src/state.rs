use std::sync::Arc;

use crate::bridge::BridgeConnections;
use crate::session::SessionHandle;

/// Shared state for the bridge socket endpoint
#[derive(Clone)]
pub struct AppState {
    pub session: SessionHandle,
    pub connections: Arc<BridgeConnections>,
}

impl AppState {
    pub fn new(session: SessionHandle, connections: Arc<BridgeConnections>) -> Self {
        Self {
            session,
            connections,
        }
    }
}
