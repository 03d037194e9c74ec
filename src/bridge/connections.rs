use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::bridge::HostMessage;

/// Outbound handle for one bridge socket.
#[derive(Clone)]
pub struct ConnectionHandle {
    pub conn_id: Uuid,
    /// Surface key the socket authenticated with.
    pub key: Uuid,
    pub sender: mpsc::UnboundedSender<HostMessage>,
}

impl ConnectionHandle {
    pub fn new(conn_id: Uuid, key: Uuid, sender: mpsc::UnboundedSender<HostMessage>) -> Self {
        Self {
            conn_id,
            key,
            sender,
        }
    }

    pub fn send(&self, msg: HostMessage) -> Result<(), mpsc::error::SendError<HostMessage>> {
        self.sender.send(msg)
    }
}

/// Live bridge sockets. Dropping a handle ends that socket's writer, which
/// closes the socket.
pub struct BridgeConnections {
    connections: DashMap<Uuid, ConnectionHandle>, // conn_id -> handle
}

impl BridgeConnections {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    pub fn add(&self, handle: ConnectionHandle) {
        self.connections.insert(handle.conn_id, handle);
    }

    pub fn remove(&self, conn_id: &Uuid) -> Option<ConnectionHandle> {
        self.connections.remove(conn_id).map(|(_, v)| v)
    }

    pub fn get(&self, conn_id: &Uuid) -> Option<ConnectionHandle> {
        self.connections.get(conn_id).map(|r| r.clone())
    }

    /// Drop every socket not opened with `active_key`. Returns how many were
    /// closed.
    pub fn close_except(&self, active_key: Option<Uuid>) -> usize {
        let before = self.connections.len();
        self.connections
            .retain(|_, handle| Some(handle.key) == active_key);
        let closed = before.saturating_sub(self.connections.len());
        if closed > 0 {
            tracing::debug!(closed, "Closed stale bridge connections");
        }
        closed
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl Default for BridgeConnections {
    fn default() -> Self {
        Self::new()
    }
}
