//! Huddle Transport Layer
//!
//! Serves the chat WebSocket and the HTTP status endpoint. The transport
//! layer handles:
//! - Connection lifecycle (open, text frame, close)
//! - A writer task per connection so slow peers never stall a broadcast
//! - The `/health` status query
//! - CORS and an optional connection cap
//!
//! The transport is decoupled from chat semantics via the `ConnectionHandler` trait.

pub mod connection;
pub mod error;
pub mod server;

pub use connection::{ConnectionClosed, ConnectionId, ConnectionSender, Frame};
pub use error::TransportError;
pub use server::{ConnectionHandler, HandlerStatus, TransportConfig, TransportServer, build_router};
