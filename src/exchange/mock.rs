//! Mock exchange source for unit testing.
//!
//! This module provides a scripted source that can be used in tests
//! without making real network requests.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::warn;

use super::{ExchangeSource, VenueBook};
use crate::error::SourceError;
use crate::orderbook::{BookSide, PriceLevel};

#[derive(Debug, Clone)]
enum Failure {
    Once(String),
    Always(String),
    Panic(String),
}

#[derive(Debug, Default)]
struct MockState {
    bids: Vec<(Decimal, Decimal)>,
    asks: Vec<(Decimal, Decimal)>,
    failure: Option<Failure>,
    latency: Duration,
    fetches: u64,
}

/// Shared handle that scripts a `MockExchange` after it has been boxed.
#[derive(Debug, Clone, Default)]
pub struct MockControl {
    state: Arc<Mutex<MockState>>,
}

impl MockControl {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the bid levels served by the next fetch.
    pub fn set_bids(&self, levels: &[(Decimal, Decimal)]) {
        self.lock().bids = levels.to_vec();
    }

    /// Replace the ask levels served by the next fetch.
    pub fn set_asks(&self, levels: &[(Decimal, Decimal)]) {
        self.lock().asks = levels.to_vec();
    }

    /// Fail exactly the next fetch.
    pub fn fail_next(&self, reason: &str) {
        self.lock().failure = Some(Failure::Once(reason.to_string()));
    }

    /// Fail every fetch until `recover` is called.
    pub fn fail_always(&self, reason: &str) {
        self.lock().failure = Some(Failure::Always(reason.to_string()));
    }

    /// Panic inside the next fetch.
    pub fn panic_next(&self, reason: &str) {
        self.lock().failure = Some(Failure::Panic(reason.to_string()));
    }

    /// Stop failing.
    pub fn recover(&self) {
        self.lock().failure = None;
    }

    /// Delay every fetch by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// Number of fetches attempted so far.
    pub fn fetch_count(&self) -> u64 {
        self.lock().fetches
    }

    /// Scripted `(bids, asks)` entry counts.
    pub fn level_counts(&self) -> (usize, usize) {
        let state = self.lock();
        (state.bids.len(), state.asks.len())
    }
}

/// Scripted in-memory exchange.
#[derive(Debug, Clone)]
pub struct MockExchange {
    name: String,
    control: MockControl,
    book: VenueBook,
}

impl MockExchange {
    /// Create an empty mock source.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            control: MockControl::default(),
            book: VenueBook::default(),
        }
    }

    /// Create a mock source serving fixed `(price, quantity)` levels.
    pub fn with_levels(
        name: impl Into<String>,
        bids: &[(Decimal, Decimal)],
        asks: &[(Decimal, Decimal)],
    ) -> Self {
        let source = Self::new(name);
        source.control.set_bids(bids);
        source.control.set_asks(asks);
        source
    }

    /// Handle for scripting this source.
    pub fn control(&self) -> MockControl {
        self.control.clone()
    }

    fn build_side(&self, levels: &[(Decimal, Decimal)]) -> BookSide {
        levels
            .iter()
            .filter_map(|&(price, quantity)| {
                PriceLevel::new(price, quantity, self.name.as_str())
                    .map_err(|err| warn!(source = %self.name, error = %err, "Skipping mock level"))
                    .ok()
            })
            .collect()
    }
}

#[async_trait]
impl ExchangeSource for MockExchange {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&mut self) -> Result<(), SourceError> {
        let latency = {
            let mut state = self.control.lock();
            state.fetches += 1;
            state.latency
        };

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let (bids, asks) = {
            let mut state = self.control.lock();
            match state.failure.clone() {
                Some(Failure::Once(reason)) => {
                    state.failure = None;
                    return Err(SourceError::Simulated(reason));
                }
                Some(Failure::Always(reason)) => return Err(SourceError::Simulated(reason)),
                Some(Failure::Panic(reason)) => {
                    state.failure = None;
                    drop(state);
                    panic!("{reason}");
                }
                None => (state.bids.clone(), state.asks.clone()),
            }
        };

        self.book = VenueBook {
            bids: self.build_side(&bids),
            asks: self.build_side(&asks),
        };

        Ok(())
    }

    fn bids(&self) -> &BookSide {
        &self.book.bids
    }

    fn asks(&self) -> &BookSide {
        &self.book.asks
    }
}
