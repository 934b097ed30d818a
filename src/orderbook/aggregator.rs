//! Multi-venue book aggregation and execution cost calculations.

use std::sync::{Arc, PoisonError, RwLock};

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use super::types::{BookSide, CostEstimate, PriceLevel, Side, TradeSide};
use crate::error::{CostError, RefreshError};
use crate::exchange::ExchangeSource;
use crate::metrics;

/// What a refresh does when one source fails to fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FetchPolicy {
    /// Abort the cycle and keep the previous snapshot.
    #[default]
    FailFast,
    /// Merge whatever fetched successfully.
    SkipFailed,
}

/// Merged bids and asks from every registered source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatedBook {
    bids: BookSide,
    asks: BookSide,
}

impl AggregatedBook {
    /// Build a book from already merged sides.
    pub fn from_sides(bids: BookSide, asks: BookSide) -> Self {
        Self { bids, asks }
    }

    /// Merged bid side.
    pub fn bids(&self) -> &BookSide {
        &self.bids
    }

    /// Merged ask side.
    pub fn asks(&self) -> &BookSide {
        &self.asks
    }

    /// Highest bid across all venues.
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.highest_price()
    }

    /// Lowest ask across all venues.
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.lowest_price()
    }

    /// Best ask minus best bid.
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    /// Total quantity on one side.
    pub fn liquidity(&self, side: Side) -> Result<Decimal, CostError> {
        let total = match side {
            Side::Bid => self.bids.total_quantity(),
            Side::Ask => self.asks.total_quantity(),
        };
        total.ok_or(CostError::Overflow { side })
    }

    /// Cost of buying and proceeds of selling `quantity`, best prices first.
    ///
    /// Both sides are checked for depth before anything is accumulated.
    pub fn cost(&self, quantity: Decimal) -> Result<CostEstimate, CostError> {
        if quantity <= Decimal::ZERO {
            return Err(CostError::InvalidQuantity(quantity));
        }

        let buy_liquidity = self.liquidity(Side::Ask)?;
        let sell_liquidity = self.liquidity(Side::Bid)?;

        if quantity > buy_liquidity {
            return Err(CostError::InsufficientLiquidity {
                requested: quantity,
                available: buy_liquidity,
                side: TradeSide::Buy,
            });
        }

        if quantity > sell_liquidity {
            return Err(CostError::InsufficientLiquidity {
                requested: quantity,
                available: sell_liquidity,
                side: TradeSide::Sell,
            });
        }

        let buy_cost = walk_levels(self.asks.ascending(), quantity)
            .ok_or(CostError::Overflow { side: Side::Ask })?;
        let sell_proceeds = walk_levels(self.bids.descending(), quantity)
            .ok_or(CostError::Overflow { side: Side::Bid })?;

        Ok(CostEstimate {
            quantity,
            buy_cost,
            sell_proceeds,
        })
    }
}

/// Greedily fill `quantity` from levels in the order given.
///
/// Returns `None` if a level notional or the running total overflows.
fn walk_levels<'a>(
    levels: impl Iterator<Item = &'a PriceLevel>,
    quantity: Decimal,
) -> Option<Decimal> {
    let mut remaining = quantity;
    let mut total = Decimal::ZERO;

    for level in levels {
        if remaining.is_zero() {
            break;
        }

        // fill <= remaining, so the subtraction cannot underflow
        let fill = remaining.min(level.quantity());
        total = total.checked_add(fill.checked_mul(level.price())?)?;
        remaining -= fill;
    }

    Some(total)
}

/// Cloneable read access to the latest merged book.
///
/// Writers swap a whole `Arc` under the lock, so a reader holding a
/// snapshot never sees a partially merged book.
#[derive(Debug, Clone, Default)]
pub struct SnapshotHandle {
    inner: Arc<RwLock<Arc<AggregatedBook>>>,
}

impl SnapshotHandle {
    /// Current snapshot.
    pub fn load(&self) -> Arc<AggregatedBook> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn store(&self, book: AggregatedBook) {
        let book = Arc::new(book);
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = book;
    }
}

/// Merges snapshots from every registered source into one book.
pub struct OrderBookAggregator {
    sources: Vec<Box<dyn ExchangeSource>>,
    policy: FetchPolicy,
    snapshot: SnapshotHandle,
}

impl Default for OrderBookAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderBookAggregator {
    /// Create an aggregator with the fail-fast policy.
    pub fn new() -> Self {
        Self::with_policy(FetchPolicy::default())
    }

    /// Create an aggregator with an explicit fetch policy.
    pub fn with_policy(policy: FetchPolicy) -> Self {
        Self {
            sources: Vec::new(),
            policy,
            snapshot: SnapshotHandle::default(),
        }
    }

    /// Register a source. Names are not required to be unique.
    pub fn add_source(&mut self, source: Box<dyn ExchangeSource>) {
        info!(source = source.name(), "Registered exchange source");
        self.sources.push(source);
    }

    /// Number of registered sources.
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Active fetch policy.
    pub fn policy(&self) -> FetchPolicy {
        self.policy
    }

    /// Handle for reading snapshots from other tasks.
    pub fn snapshot_handle(&self) -> SnapshotHandle {
        self.snapshot.clone()
    }

    /// Latest merged book.
    pub fn snapshot(&self) -> Arc<AggregatedBook> {
        self.snapshot.load()
    }

    /// Fetch every source in registration order, then rebuild the merged book.
    ///
    /// On error the previously published snapshot stays in place.
    #[instrument(skip(self), fields(sources = self.sources.len(), policy = %self.policy))]
    pub async fn refresh(&mut self) -> Result<(), RefreshError> {
        let mut healthy = vec![true; self.sources.len()];
        let mut failed = 0usize;

        for (idx, source) in self.sources.iter_mut().enumerate() {
            let timer = metrics::timer_source_fetch(source.name());
            let result = source.fetch().await;
            drop(timer);

            if let Err(err) = result {
                metrics::inc_source_fetch_failures(source.name());
                match self.policy {
                    FetchPolicy::FailFast => {
                        return Err(RefreshError::Source {
                            name: source.name().to_string(),
                            source: err,
                        });
                    }
                    FetchPolicy::SkipFailed => {
                        warn!(source = source.name(), error = %err, "Skipping failed source");
                        healthy[idx] = false;
                        failed += 1;
                    }
                }
            }
        }

        if failed > 0 && failed == self.sources.len() {
            return Err(RefreshError::AllSourcesFailed { failed });
        }

        let merged = self.merge(&healthy);
        metrics::record_merged_entries(merged.bids().len(), merged.asks().len());
        self.snapshot.store(merged);

        Ok(())
    }

    /// Total quantity on one side of the latest snapshot.
    pub fn compute_liquidity(&self, side: Side) -> Result<Decimal, CostError> {
        self.snapshot().liquidity(side)
    }

    /// Buy cost and sell proceeds for `quantity` against the latest snapshot.
    #[instrument(skip(self), fields(quantity = %quantity))]
    pub fn compute_cost(&self, quantity: Decimal) -> Result<CostEstimate, CostError> {
        self.snapshot().cost(quantity)
    }

    fn merge(&self, include: &[bool]) -> AggregatedBook {
        info!("Starting order book merge");

        let mut bids = BookSide::new();
        let mut asks = BookSide::new();

        for (source, _) in self
            .sources
            .iter()
            .zip(include)
            .filter(|(_, included)| **included)
        {
            log_side(source.name(), source.bids(), Side::Bid);
            bids.extend(source.bids().ascending().cloned());

            log_side(source.name(), source.asks(), Side::Ask);
            asks.extend(source.asks().ascending().cloned());
        }

        info!(
            bids = bids.len(),
            asks = asks.len(),
            "Order book merge completed"
        );

        AggregatedBook::from_sides(bids, asks)
    }
}

fn log_side(name: &str, side: &BookSide, kind: Side) {
    match (side.lowest_price(), side.highest_price()) {
        (Some(low), Some(high)) => debug!(
            source = name,
            side = %kind,
            entries = side.len(),
            low = %low,
            high = %high,
            "Merging levels"
        ),
        _ => debug!(source = name, side = %kind, entries = 0, "Merging levels"),
    }
}
