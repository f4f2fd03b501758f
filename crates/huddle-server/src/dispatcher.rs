//! Broadcast dispatcher — turns connection events into registry updates and
//! outbound chat events.
//!
//! Per connection the protocol is a two-state machine: a connection starts
//! anonymous and becomes named after its first accepted `setName`. Only
//! named connections may send chat messages. Every event is produced and
//! fanned out while the registry lock is held, so all clients observe
//! broadcasts in the same order and a naming client always sees `nameSet`
//! before its own `userJoined`.

use chrono::Utc;
use huddle_protocol::{ChatEvent, ClientMessage, ProtocolError};
use huddle_transport::{ConnectionHandler, ConnectionId, ConnectionSender, HandlerStatus};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::registry::ConnectionRegistry;

/// Why an inbound event produced no output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ignored {
    /// Not JSON, not an object, no `type`, or bad fields.
    Malformed,
    /// A `type` the server does not handle.
    UnknownType,
    /// `message` from a connection that has not named itself.
    NotNamed,
    /// `setName` with an empty name.
    EmptyName,
    /// Event for a connection the registry does not track.
    UnknownConnection,
}

/// Result of handling one connection event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Name accepted; `nameSet` unicast and `userJoined` broadcast.
    Joined { name: String, delivered: usize },
    /// Chat message broadcast.
    Message { name: String, delivered: usize },
    /// Named connection closed; `userLeft` broadcast.
    Left { name: String, delivered: usize },
    /// Anonymous connection closed; nothing announced.
    Closed,
    Ignored(Ignored),
}

/// Owns the connection registry and implements the chat protocol on top of it.
#[derive(Debug, Default)]
pub struct Dispatcher {
    registry: Mutex<ConnectionRegistry>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly upgraded connection as anonymous.
    pub fn connect(&self, id: ConnectionId, sender: ConnectionSender) {
        let mut registry = self.registry.lock();
        registry.register(id, sender);
        info!("Connection {id} registered (total: {})", registry.count());
    }

    /// Decode and handle one inbound text frame.
    pub fn receive(&self, id: ConnectionId, text: &str) -> Dispatch {
        match ClientMessage::parse(text) {
            Ok(message) => {
                debug!("Received from {id}: {message:?}");
                self.handle(id, message)
            }
            Err(ProtocolError::UnknownType(kind)) => {
                info!("Unknown message type from {id}: {kind}");
                Dispatch::Ignored(Ignored::UnknownType)
            }
            Err(e) => {
                warn!("Dropping malformed payload from {id}: {e}");
                Dispatch::Ignored(Ignored::Malformed)
            }
        }
    }

    /// Handle one decoded client message.
    pub fn handle(&self, id: ConnectionId, message: ClientMessage) -> Dispatch {
        let mut registry = self.registry.lock();
        if !registry.contains(id) {
            warn!("Message for untracked connection {id}");
            return Dispatch::Ignored(Ignored::UnknownConnection);
        }

        match message {
            ClientMessage::SetName { name } => Self::set_name(&mut registry, id, name),
            ClientMessage::Message { text } => Self::chat(&registry, id, text),
        }
    }

    /// Forget a closed connection and announce it if it had a name.
    pub fn disconnect(&self, id: ConnectionId) -> Dispatch {
        let mut registry = self.registry.lock();
        if !registry.contains(id) {
            return Dispatch::Ignored(Ignored::UnknownConnection);
        }

        match registry.unbind(id) {
            Some(name) => {
                let delivered = Self::fan_out(&registry, &ChatEvent::user_left(name.as_str()));
                info!("User {name} disconnected");
                Dispatch::Left { name, delivered }
            }
            None => {
                debug!("Anonymous connection {id} closed");
                Dispatch::Closed
            }
        }
    }

    /// Number of tracked connections, named or not.
    pub fn connected_count(&self) -> usize {
        self.registry.lock().count()
    }

    pub fn named_count(&self) -> usize {
        self.registry.lock().named_count()
    }

    pub fn is_connected(&self, id: ConnectionId) -> bool {
        self.registry.lock().contains(id)
    }

    pub fn name_of(&self, id: ConnectionId) -> Option<String> {
        self.registry.lock().name_of(id).map(str::to_owned)
    }

    // ── Internal ──────────────────────────────────────────────────────────

    fn set_name(registry: &mut ConnectionRegistry, id: ConnectionId, name: String) -> Dispatch {
        if name.is_empty() {
            info!("Ignoring empty name from {id}");
            return Dispatch::Ignored(Ignored::EmptyName);
        }

        // Renaming re-announces a join; the old name gets no userLeft.
        match registry.bind(id, name.as_str()) {
            Ok(Some(previous)) => debug!("Connection {id} renamed from {previous} to {name}"),
            Ok(None) => {}
            Err(e) => {
                warn!("Cannot bind name: {e}");
                return Dispatch::Ignored(Ignored::UnknownConnection);
            }
        }

        if let Some(payload) = Self::serialize(&ChatEvent::name_accepted(name.as_str())) {
            registry.unicast(id, &payload);
        }
        let delivered = Self::fan_out(registry, &ChatEvent::user_joined(name.as_str()));
        info!("User {name} joined the chat");

        Dispatch::Joined { name, delivered }
    }

    fn chat(registry: &ConnectionRegistry, id: ConnectionId, text: String) -> Dispatch {
        let Some(name) = registry.name_of(id).map(str::to_owned) else {
            debug!("Message from {id} dropped: no name set");
            return Dispatch::Ignored(Ignored::NotNamed);
        };

        let event = ChatEvent::message(name.as_str(), text, Utc::now());
        let delivered = Self::fan_out(registry, &event);
        Dispatch::Message { name, delivered }
    }

    fn fan_out(registry: &ConnectionRegistry, event: &ChatEvent) -> usize {
        let Some(payload) = Self::serialize(event) else {
            return 0;
        };
        let delivered = registry.broadcast(&payload);
        debug!("Broadcast {} from {}: sent to {delivered} clients", event.kind(), event.name());
        delivered
    }

    fn serialize(event: &ChatEvent) -> Option<String> {
        match event.to_json() {
            Ok(payload) => Some(payload),
            Err(e) => {
                error!("Failed to serialize {} event: {e}", event.kind());
                None
            }
        }
    }
}

impl ConnectionHandler for Dispatcher {
    fn on_open(&self, id: ConnectionId, sender: ConnectionSender) {
        self.connect(id, sender);
    }

    fn on_text(&self, id: ConnectionId, text: &str) {
        self.receive(id, text);
    }

    fn on_close(&self, id: ConnectionId) {
        self.disconnect(id);
    }

    fn status(&self) -> HandlerStatus {
        let registry = self.registry.lock();
        HandlerStatus {
            connected: registry.count(),
            named: registry.named_count(),
        }
    }
}
