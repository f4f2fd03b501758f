//! Errors raised while decoding inbound frames.
//!
//! None of these are reported back to the client. The connection loop logs
//! them and drops the frame.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame is not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Valid JSON, but not an object.
    #[error("envelope is not a JSON object")]
    NotAnObject,

    /// Object without a `type` tag.
    #[error("envelope has no \"type\" field")]
    MissingType,

    /// A `type` tag the server does not handle.
    #[error("unknown message type: {0}")]
    UnknownType(String),

    /// Known tag, but the remaining fields do not match its shape.
    #[error("invalid fields for \"{kind}\": {source}")]
    InvalidFields {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ProtocolError {
    /// True when the frame could not be read as an envelope at all.
    pub fn is_malformed(&self) -> bool {
        !matches!(self, Self::UnknownType(_))
    }
}
