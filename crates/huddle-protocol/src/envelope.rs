//! Wire envelopes in both directions.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::types::is_known_client_type;

// ─────────────────────────────────────────────────────────────────────────────
// Client → Server
// ─────────────────────────────────────────────────────────────────────────────

/// A frame sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// `{"type":"setName","name":"..."}`
    #[serde(rename = "setName")]
    SetName { name: String },
    /// `{"type":"message","message":"..."}`
    #[serde(rename = "message")]
    Message {
        #[serde(rename = "message")]
        text: String,
    },
}

impl ClientMessage {
    /// Decode an inbound text frame.
    ///
    /// Unknown tags are reported separately from shape errors so the caller
    /// can log them differently; both are dropped.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)?;
        let object = value.as_object().ok_or(ProtocolError::NotAnObject)?;

        let kind = match object.get("type") {
            None | Some(Value::Null) => return Err(ProtocolError::MissingType),
            Some(Value::String(kind)) => kind.clone(),
            Some(other) => return Err(ProtocolError::UnknownType(other.to_string())),
        };

        if !is_known_client_type(&kind) {
            return Err(ProtocolError::UnknownType(kind));
        }

        serde_json::from_value(value)
            .map_err(|source| ProtocolError::InvalidFields { kind, source })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Server → Client
// ─────────────────────────────────────────────────────────────────────────────

/// An event produced by the server. Serialized once and handed to every
/// recipient as the same text frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChatEvent {
    /// Unicast confirmation of a `setName`.
    #[serde(rename = "nameSet")]
    NameAccepted { name: String },

    #[serde(rename = "userJoined")]
    UserJoined {
        name: String,
        #[serde(rename = "message")]
        text: String,
    },

    #[serde(rename = "userLeft")]
    UserLeft {
        name: String,
        #[serde(rename = "message")]
        text: String,
    },

    #[serde(rename = "message")]
    Message {
        name: String,
        #[serde(rename = "message")]
        text: String,
        timestamp: String,
    },
}

impl ChatEvent {
    pub fn name_accepted(name: impl Into<String>) -> Self {
        Self::NameAccepted { name: name.into() }
    }

    pub fn user_joined(name: impl Into<String>) -> Self {
        let name = name.into();
        let text = format!("{name} joined the chat");
        Self::UserJoined { name, text }
    }

    pub fn user_left(name: impl Into<String>) -> Self {
        let name = name.into();
        let text = format!("{name} left the chat");
        Self::UserLeft { name, text }
    }

    pub fn message(name: impl Into<String>, text: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self::Message {
            name: name.into(),
            text: text.into(),
            timestamp: iso_timestamp(at),
        }
    }

    /// The display name the event is attributed to.
    pub fn name(&self) -> &str {
        match self {
            Self::NameAccepted { name }
            | Self::UserJoined { name, .. }
            | Self::UserLeft { name, .. }
            | Self::Message { name, .. } => name,
        }
    }

    /// The wire tag of this event.
    pub fn kind(&self) -> &'static str {
        use crate::types::MessageTypes;
        match self {
            Self::NameAccepted { .. } => MessageTypes::NAME_SET,
            Self::UserJoined { .. } => MessageTypes::USER_JOINED,
            Self::UserLeft { .. } => MessageTypes::USER_LEFT,
            Self::Message { .. } => MessageTypes::CHAT_MESSAGE,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Format a UTC instant as ISO-8601 with millisecond precision and a `Z`
/// suffix, e.g. `2026-10-17T09:30:00.123Z`.
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
