//! Periodic refresh loop with cooperative shutdown.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::{DepthError, LiveError};
use crate::metrics;
use crate::orderbook::{AggregatedBook, CostEstimate, OrderBookAggregator, SnapshotHandle};
use crate::utils::ShutdownToken;

/// Outcome of one successful refresh cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CostReport {
    /// Quantity priced.
    pub quantity: Decimal,
    /// Cost of buying `quantity`.
    pub buy_cost: Decimal,
    /// Proceeds of selling `quantity`.
    pub sell_proceeds: Decimal,
    /// Highest merged bid.
    pub best_bid: Option<Decimal>,
    /// Lowest merged ask.
    pub best_ask: Option<Decimal>,
    /// Merged bid entries.
    pub bid_entries: usize,
    /// Merged ask entries.
    pub ask_entries: usize,
    /// When the cycle finished.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl CostReport {
    fn new(book: &AggregatedBook, estimate: CostEstimate) -> Self {
        Self {
            quantity: estimate.quantity,
            buy_cost: estimate.buy_cost,
            sell_proceeds: estimate.sell_proceeds,
            best_bid: book.best_bid(),
            best_ask: book.best_ask(),
            bid_entries: book.bids().len(),
            ask_entries: book.asks().len(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }
}

/// Runs refresh cycles on one background task.
///
/// The aggregator moves into the worker while it runs and comes back on
/// [`stop`](Self::stop), so cycles can never overlap.
pub struct LiveRefreshController {
    aggregator: Option<OrderBookAggregator>,
    quantity: Decimal,
    shutdown: ShutdownToken,
    snapshot: SnapshotHandle,
    reports: Arc<watch::Sender<Option<CostReport>>>,
    stop: ShutdownToken,
    worker: Option<JoinHandle<OrderBookAggregator>>,
}

impl LiveRefreshController {
    /// Create a controller pricing `quantity` each cycle.
    ///
    /// Cancelling `shutdown` ends the loop just like `stop`.
    pub fn new(aggregator: OrderBookAggregator, quantity: Decimal, shutdown: ShutdownToken) -> Self {
        let snapshot = aggregator.snapshot_handle();
        let (reports, _rx) = watch::channel(None);

        Self {
            aggregator: Some(aggregator),
            quantity,
            shutdown,
            snapshot,
            reports: Arc::new(reports),
            stop: ShutdownToken::new(),
            worker: None,
        }
    }

    /// Launch the worker, refreshing every `interval`.
    pub fn start(&mut self, interval: Duration) -> Result<(), LiveError> {
        if self.worker.is_some() {
            return Err(LiveError::AlreadyRunning);
        }
        let aggregator = self.aggregator.take().ok_or(LiveError::AggregatorLost)?;

        self.stop = ShutdownToken::new();
        let worker = Worker {
            aggregator,
            quantity: self.quantity,
            interval,
            reports: Arc::clone(&self.reports),
            stop: self.stop.clone(),
            shutdown: self.shutdown.clone(),
        };

        info!(
            interval_ms = interval.as_millis() as u64,
            quantity = %self.quantity,
            "Starting live refresh"
        );
        self.worker = Some(tokio::spawn(worker.run()));
        Ok(())
    }

    /// Wake the worker and wait for it to exit.
    ///
    /// Returns once no refresh work is left running.
    pub async fn stop(&mut self) -> Result<(), LiveError> {
        let worker = self.worker.take().ok_or(LiveError::NotRunning)?;
        self.stop.cancel();

        match worker.await {
            Ok(aggregator) => {
                self.aggregator = Some(aggregator);
                info!("Live refresh stopped");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Live refresh worker failed");
                Err(LiveError::WorkerPanicked)
            }
        }
    }

    /// Wait until the worker exits on its own, e.g. after the shutdown token fires.
    pub async fn wait(&mut self) -> Result<(), LiveError> {
        if self.worker.is_none() {
            return Err(LiveError::NotRunning);
        }
        self.shutdown.cancelled().await;
        self.stop().await
    }

    /// Whether a worker is running.
    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Receiver for cycle reports. Holds `None` until the first success.
    pub fn subscribe(&self) -> watch::Receiver<Option<CostReport>> {
        self.reports.subscribe()
    }

    /// Most recent report.
    pub fn latest(&self) -> Option<CostReport> {
        self.reports.borrow().clone()
    }

    /// Read access to the merged book, usable while the worker runs.
    pub fn snapshot_handle(&self) -> SnapshotHandle {
        self.snapshot.clone()
    }
}

impl Drop for LiveRefreshController {
    fn drop(&mut self) {
        self.stop.cancel();
        if let Some(worker) = self.worker.take() {
            if !worker.is_finished() {
                worker.abort();
            }
        }
    }
}

struct Worker {
    aggregator: OrderBookAggregator,
    quantity: Decimal,
    interval: Duration,
    reports: Arc<watch::Sender<Option<CostReport>>>,
    stop: ShutdownToken,
    shutdown: ShutdownToken,
}

impl Worker {
    async fn run(mut self) -> OrderBookAggregator {
        loop {
            if self.stop.is_cancelled() || self.shutdown.is_cancelled() {
                break;
            }

            match self.cycle().await {
                Ok(report) => {
                    metrics::inc_refresh_cycles();
                    info!(
                        quantity = %report.quantity,
                        buy_cost = %report.buy_cost,
                        sell_proceeds = %report.sell_proceeds,
                        "Refresh cycle completed"
                    );
                    self.reports.send_replace(Some(report));
                }
                Err(e) => {
                    metrics::inc_refresh_failures();
                    warn!(error = %e, "Refresh cycle failed, retrying next interval");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.stop.cancelled() => break,
                _ = self.shutdown.cancelled() => break,
            }
        }

        self.aggregator
    }

    async fn cycle(&mut self) -> Result<CostReport, DepthError> {
        self.aggregator.refresh().await?;
        let book = self.aggregator.snapshot();
        let estimate = book.cost(self.quantity)?;
        Ok(CostReport::new(&book, estimate))
    }
}
