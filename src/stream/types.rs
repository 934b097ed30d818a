//! Streaming connection states, events and settings.

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use strum::Display;

use crate::error::ConnectionError;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[repr(u8)]
pub enum ConnectionState {
    /// Not connected. Initial and terminal.
    Disconnected = 0,
    /// Handshake in progress.
    Connecting = 1,
    /// Open and reading.
    Connected = 2,
    /// Waiting out the delay before the next attempt.
    Reconnecting = 3,
    /// Close frame sent, shutting down.
    Closing = 4,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Reconnecting,
            4 => Self::Closing,
            _ => Self::Disconnected,
        }
    }
}

/// Lock-free cell holding the current state.
///
/// Written only from the I/O task, read from anywhere.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(ConnectionState::Disconnected as u8))
    }

    pub(crate) fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub(crate) fn set(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }
}

/// Something that happened on the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Handshake completed.
    Connected,
    /// Inbound payload.
    Message(String),
    /// A handshake, read or write failed.
    Error(ConnectionError),
    /// A reconnection attempt is scheduled.
    Reconnecting {
        /// 1-based attempt number.
        attempt: u32,
        /// Configured limit.
        max_attempts: u32,
    },
    /// Terminal: attempts used up.
    ReconnectExhausted {
        /// Attempts made.
        attempts: u32,
    },
    /// The connection is down and will not be retried.
    Disconnected,
}

/// Reconnection and handshake settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Attempts before giving up.
    pub max_reconnect_attempts: u32,
    /// Fixed delay between attempts.
    pub reconnect_interval: Duration,
    /// Handshake timeout.
    pub connection_timeout: Duration,
    /// Reconnect automatically after a failure.
    pub auto_reconnect: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 5,
            reconnect_interval: Duration::from_millis(5000),
            connection_timeout: Duration::from_millis(10_000),
            auto_reconnect: true,
        }
    }
}
