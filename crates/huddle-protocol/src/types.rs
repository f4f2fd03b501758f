//! Envelope `type` tag constants.
//!
//! Each constant is the exact string sent over the wire in the `type` field.

/// All Huddle envelope tags, grouped by direction.
pub struct MessageTypes;

impl MessageTypes {
    // ── Client → Server ─────────────────────────────────────────────────
    pub const SET_NAME: &str = "setName";
    pub const MESSAGE: &str = "message";

    // ── Server → Client ─────────────────────────────────────────────────
    pub const NAME_SET: &str = "nameSet";
    pub const USER_JOINED: &str = "userJoined";
    pub const USER_LEFT: &str = "userLeft";
    // Chat messages reuse the "message" tag in both directions.
    pub const CHAT_MESSAGE: &str = "message";
}

/// Type alias for envelope tags.
pub type MessageType = &'static str;

/// Tags a client is allowed to send.
const CLIENT_TYPES: &[&str] = &[MessageTypes::SET_NAME, MessageTypes::MESSAGE];

/// Check whether a tag is one the server understands from clients.
pub fn is_known_client_type(tag: &str) -> bool {
    CLIENT_TYPES.contains(&tag)
}
