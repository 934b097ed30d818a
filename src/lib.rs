//! Multi-venue order book depth aggregator.
//!
//! This library merges order book depth from several exchanges into one
//! price-ordered view and answers "what would it cost to buy or sell Q units
//! right now" using exact decimal arithmetic.
//!
//! # Cost model
//!
//! Buying walks the merged asks from the lowest price up; selling walks the
//! merged bids from the highest price down. Each level fills
//! `min(remaining, quantity)`:
//!
//! ```text
//! Asks:  100.00 x 0.5   (Coinbase Pro)
//!        101.00 x 1.0   (Kraken)
//! ─────────────────────
//! Buy 1.0 = 0.5 * 100.00 + 0.5 * 101.00 = 100.50
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types
//! - [`exchange`]: Venue sources and the HTTP transport
//! - [`orderbook`]: Merged book and cost calculations
//! - [`live`]: Periodic refresh controller
//! - [`stream`]: Reconnecting WebSocket connection
//! - [`api`]: HTTP API for health/metrics
//! - [`utils`]: Cancellation and signal helpers

pub mod api;
pub mod config;
pub mod error;
pub mod exchange;
pub mod live;
pub mod metrics;
pub mod orderbook;
pub mod stream;
pub mod utils;

pub use config::Config;
pub use error::{DepthError, Result};
