//! Streaming connection with bounded reconnection.

pub mod connection;
pub mod reconnect;
pub mod types;

pub use connection::StreamingConnection;
pub use reconnect::{ReconnectDecision, ReconnectPolicy};
pub use types::{ConnectionEvent, ConnectionState, StreamConfig};
