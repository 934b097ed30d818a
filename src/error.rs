//! Unified error types for the depth aggregator.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::orderbook::{Side, TradeSide};

/// Unified error type for the depth aggregator.
#[derive(Error, Debug)]
pub enum DepthError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// A refresh cycle failed.
    #[error("refresh error: {0}")]
    Refresh(#[from] RefreshError),

    /// Cost computation failed.
    #[error("cost error: {0}")]
    Cost(#[from] CostError),

    /// Live session control error.
    #[error("live session error: {0}")]
    Live(#[from] LiveError),

    /// Streaming connection error.
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Transport error outside of a source fetch.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// HTTP transport failures.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The request could not be sent or the body could not be read.
    #[error("request to {url} failed: {source}")]
    Request {
        /// Requested URL.
        url: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("request to {url} returned HTTP {status}")]
    Status {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// The HTTP client could not be built.
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Failure to turn one payload entry into a price level.
///
/// Entry-scoped: the offending entry is skipped and the fetch continues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A numeric field did not hold a decimal.
    #[error("invalid {field}: {value:?}")]
    InvalidNumber {
        /// Field name.
        field: &'static str,
        /// Raw value.
        value: String,
    },

    /// A required field was absent.
    #[error("missing field {0}")]
    MissingField(&'static str),

    /// Quantity must be strictly positive.
    #[error("non-positive quantity {0}")]
    NonPositiveQuantity(Decimal),

    /// Price must not be negative.
    #[error("negative price {0}")]
    NegativePrice(Decimal),
}

/// Failure to fetch one venue's snapshot.
#[derive(Error, Debug)]
pub enum SourceError {
    /// The HTTP request failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The document as a whole could not be understood.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The venue reported an error in its response body.
    #[error("venue api error: {0}")]
    Api(String),

    /// Scripted failure from a mock source.
    #[error("simulated failure: {0}")]
    Simulated(String),
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedPayload(err.to_string())
    }
}

/// Failure of a whole refresh cycle.
#[derive(Error, Debug)]
pub enum RefreshError {
    /// A source fetch failed and the policy is fail-fast.
    #[error("source {name} failed: {source}")]
    Source {
        /// Name of the failing source.
        name: String,
        /// Underlying failure.
        #[source]
        source: SourceError,
    },

    /// Every registered source failed under the skip policy.
    #[error("all {failed} sources failed")]
    AllSourcesFailed {
        /// Number of failed sources.
        failed: usize,
    },
}

/// Cost computation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CostError {
    /// Requested quantity exceeds the depth on one side.
    #[error("insufficient liquidity for {side} order: requested {requested}, available {available}")]
    InsufficientLiquidity {
        /// Requested quantity.
        requested: Decimal,
        /// Total quantity available on the side.
        available: Decimal,
        /// Which trade direction ran out.
        side: TradeSide,
    },

    /// Quantity must be strictly positive.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(Decimal),

    /// A level total or running sum left the decimal range.
    #[error("arithmetic overflow on {side} side")]
    Overflow {
        /// Side being summed or walked.
        side: Side,
    },
}

/// Live refresh session control errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LiveError {
    /// `start` was called while a worker is running.
    #[error("live session already running")]
    AlreadyRunning,

    /// `stop` was called without a running worker.
    #[error("live session not running")]
    NotRunning,

    /// The refresh worker panicked; the aggregator was lost with it.
    #[error("refresh worker panicked")]
    WorkerPanicked,

    /// `start` was called after a worker panic took the aggregator down.
    #[error("aggregator lost to an earlier worker panic")]
    AggregatorLost,
}

/// Streaming connection errors.
///
/// Carried inside connection events, so everything is stored as owned text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// The URI is not a ws:// or wss:// URL.
    #[error("invalid uri {uri}: {reason}")]
    InvalidUri {
        /// Rejected URI.
        uri: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Resolve, TLS or upgrade failed.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The handshake did not complete in time.
    #[error("handshake timed out after {0}ms")]
    Timeout(u64),

    /// Reading a frame failed.
    #[error("read failed: {0}")]
    Read(String),

    /// Writing a frame failed.
    #[error("write failed: {0}")]
    Write(String),

    /// The peer closed the connection.
    #[error("connection closed by peer: code={code:?}, reason={reason}")]
    ClosedByPeer {
        /// Close code, if a close frame was received.
        code: Option<u16>,
        /// Close reason.
        reason: String,
    },

    /// Terminal: every reconnection attempt failed.
    #[error("gave up after {attempts} reconnection attempts")]
    ReconnectExhausted {
        /// Attempts made.
        attempts: u32,
    },
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, DepthError>;
