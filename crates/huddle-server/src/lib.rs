//! Huddle Server — connection registry and broadcast dispatcher.
//!
//! The dispatcher owns the registry behind a single lock and provides the
//! `ConnectionHandler` implementation for the transport layer.

pub mod dispatcher;
pub mod registry;

pub use dispatcher::{Dispatch, Dispatcher, Ignored};
pub use registry::{ConnectionEntry, ConnectionRegistry, RegistryError};
