//! Order book module for merged multi-venue depth.
//!
//! This module handles:
//! - Price levels and price-ordered book sides
//! - Merging every source into one aggregated book
//! - Liquidity totals and greedy execution cost walks

pub mod aggregator;
pub mod types;

pub use aggregator::{AggregatedBook, FetchPolicy, OrderBookAggregator, SnapshotHandle};
pub use types::{BookSide, CostEstimate, PriceLevel, Side, TradeSide};
