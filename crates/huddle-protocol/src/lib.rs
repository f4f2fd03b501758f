//! Huddle - Protocol Types
//!
//! JSON envelopes exchanged over the chat WebSocket. Every frame is a UTF-8
//! JSON object carrying a `type` tag. This crate is the single source of
//! truth for the envelope shapes, the tag strings, and the errors raised
//! while decoding inbound frames.

pub mod envelope;
pub mod error;
pub mod types;

pub use envelope::{ChatEvent, ClientMessage, iso_timestamp};
pub use error::ProtocolError;
pub use types::{MessageTypes, MessageType, is_known_client_type};
