//! ConnectionRegistry — live connections and the display name bound to each.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use huddle_transport::{ConnectionId, ConnectionSender};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown connection: {0}")]
    UnknownConnection(ConnectionId),
}

/// One tracked connection.
#[derive(Debug)]
pub struct ConnectionEntry {
    sender: ConnectionSender,
    name: Option<String>,
    connected_at: DateTime<Utc>,
}

impl ConnectionEntry {
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    pub fn is_open(&self) -> bool {
        self.sender.is_open()
    }
}

/// Authoritative map of open connections.
///
/// Anonymous connections are tracked with no name so broadcasts reach them.
/// Names are not unique. The registry does no locking of its own; the
/// dispatcher holds it behind one mutex so fan-out and mutation never
/// interleave.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, ConnectionEntry>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new anonymous connection. Re-registering an id replaces it.
    pub fn register(&mut self, id: ConnectionId, sender: ConnectionSender) {
        self.connections.insert(
            id,
            ConnectionEntry {
                sender,
                name: None,
                connected_at: Utc::now(),
            },
        );
    }

    /// Bind `name` to a tracked connection, returning the previous name.
    /// The name is stored as given.
    pub fn bind(
        &mut self,
        id: ConnectionId,
        name: impl Into<String>,
    ) -> Result<Option<String>, RegistryError> {
        let entry = self
            .connections
            .get_mut(&id)
            .ok_or(RegistryError::UnknownConnection(id))?;
        Ok(entry.name.replace(name.into()))
    }

    /// Stop tracking a connection and return its last bound name.
    pub fn unbind(&mut self, id: ConnectionId) -> Option<String> {
        self.connections.remove(&id).and_then(|entry| entry.name)
    }

    pub fn name_of(&self, id: ConnectionId) -> Option<&str> {
        self.connections.get(&id).and_then(ConnectionEntry::name)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&ConnectionEntry> {
        self.connections.get(&id)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Number of tracked connections, named or not.
    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// Number of tracked connections holding a name.
    pub fn named_count(&self) -> usize {
        self.connections.values().filter(|e| e.name.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.connections.keys().copied()
    }

    /// Queue `payload` on every open connection. Connections whose writer is
    /// gone are skipped. Returns how many accepted the frame.
    pub fn broadcast(&self, payload: &str) -> usize {
        self.connections
            .values()
            .filter(|entry| entry.sender.send(payload).is_ok())
            .count()
    }

    /// Queue `payload` on a single connection.
    pub fn unicast(&self, id: ConnectionId, payload: &str) -> bool {
        self.connections
            .get(&id)
            .is_some_and(|entry| entry.sender.send(payload).is_ok())
    }
}
