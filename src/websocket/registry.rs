//! Shared registry of open websocket connections.
//!
//! Handlers that broadcast (chat rooms, live feeds) share one registry,
//! injected at construction instead of living in a global.

use std::sync::Arc;

use dashmap::DashMap;

use crate::websocket::{Connection, ConnectionId, Payload};

/// Thread-safe map of open connections.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<DashMap<ConnectionId, Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, conn: &Connection) {
        self.connections.insert(conn.id(), conn.clone());
        tracing::debug!(connection_id = %conn.id(), total = self.len(), "Connection registered");
    }

    pub fn remove(&self, id: ConnectionId) -> Option<Connection> {
        let removed = self.connections.remove(&id).map(|(_, conn)| conn);
        if removed.is_some() {
            tracing::debug!(connection_id = %id, total = self.len(), "Connection unregistered");
        }
        removed
    }

    pub fn get(&self, id: ConnectionId) -> Option<Connection> {
        self.connections.get(&id).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Send to every open connection. Returns how many accepted the message.
    pub fn broadcast(&self, data: impl Into<Payload>) -> usize {
        self.send_where(data.into(), |_| true)
    }

    /// Send to every open connection except `skip`.
    pub fn broadcast_except(&self, skip: ConnectionId, data: impl Into<Payload>) -> usize {
        self.send_where(data.into(), |id| id != skip)
    }

    fn send_where(&self, payload: Payload, include: impl Fn(ConnectionId) -> bool) -> usize {
        // Snapshot first so callbacks triggered by a send never hold a shard lock.
        let targets: Vec<Connection> = self
            .connections
            .iter()
            .filter(|r| include(*r.key()))
            .map(|r| r.value().clone())
            .collect();

        targets
            .iter()
            .filter(|conn| match conn.send(payload.clone()) {
                Ok(_) => true,
                Err(e) => {
                    tracing::trace!(connection_id = %conn.id(), error = %e, "Broadcast skipped");
                    false
                }
            })
            .count()
    }
}
