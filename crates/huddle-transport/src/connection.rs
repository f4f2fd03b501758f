//! Per-connection identity and outbound channel.

use std::fmt;

use bytes::Bytes;
use tokio::sync::mpsc;

/// Opaque handle for one live WebSocket connection. Never sent on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(uuid::Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A frame queued for the connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Pong(Bytes),
}

/// Returned when the connection's writer task has already gone away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionClosed;

impl fmt::Display for ConnectionClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("connection closed")
    }
}

impl std::error::Error for ConnectionClosed {}

/// Cloneable handle for queuing frames to one connection.
///
/// Sends never block: frames go into an unbounded queue drained by the
/// connection's own writer task.
#[derive(Debug, Clone)]
pub struct ConnectionSender {
    tx: mpsc::UnboundedSender<Frame>,
}

impl ConnectionSender {
    /// Create a sender together with the receiving end a writer drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Frame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a text frame.
    pub fn send(&self, text: impl Into<String>) -> Result<(), ConnectionClosed> {
        self.tx.send(Frame::Text(text.into())).map_err(|_| ConnectionClosed)
    }

    pub(crate) fn pong(&self, data: Bytes) -> Result<(), ConnectionClosed> {
        self.tx.send(Frame::Pong(data)).map_err(|_| ConnectionClosed)
    }

    /// False once the writer task has stopped.
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}
