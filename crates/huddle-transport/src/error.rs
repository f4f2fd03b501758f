//! Transport startup errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid listen address {addr}: {source}")]
    InvalidAddress {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}
