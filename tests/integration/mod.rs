//! Integration tests for the depth aggregator.
//!
//! The venue tests hit the real exchange APIs and are ignored by default.
//! Run with: cargo test --test integration -- --ignored

mod aggregator;
mod live;
mod stream;

use depth_aggregator::config::Config;
use depth_aggregator::exchange::{venue_sources, ExchangeSource};
use depth_aggregator::orderbook::OrderBookAggregator;
use rust_decimal::Decimal;

async fn fetch_one(name: &str) {
    let config = Config::default();
    let mut source: Box<dyn ExchangeSource> = venue_sources(&config)
        .unwrap()
        .into_iter()
        .find(|s| s.name() == name)
        .unwrap();

    let result = source.fetch().await;
    assert!(result.is_ok(), "{} fetch failed: {:?}", name, result.err());

    assert!(!source.bids().is_empty(), "{} returned no bids", name);
    assert!(!source.asks().is_empty(), "{} returned no asks", name);
    println!(
        "{}: {} bids, {} asks, best bid {:?}, best ask {:?}",
        name,
        source.bids().len(),
        source.asks().len(),
        source.bids().highest_price(),
        source.asks().lowest_price()
    );
}

#[tokio::test]
#[ignore = "requires network access"]
async fn test_coinbase_book() {
    fetch_one("Coinbase Pro").await;
}

#[tokio::test]
#[ignore = "requires network access"]
async fn test_gemini_book() {
    fetch_one("Gemini").await;
}

#[tokio::test]
#[ignore = "requires network access"]
async fn test_kraken_book() {
    fetch_one("Kraken").await;
}

/// End-to-end estimate against every live venue.
#[tokio::test]
#[ignore = "requires network access"]
async fn test_live_cost_estimate() {
    let config = Config::default();
    let mut aggregator = OrderBookAggregator::with_policy(config.fetch_policy);
    for source in venue_sources(&config).unwrap() {
        aggregator.add_source(source);
    }

    aggregator.refresh().await.expect("refresh");
    let estimate = aggregator
        .compute_cost(Decimal::ONE)
        .expect("one BTC of depth");

    assert!(estimate.buy_cost > Decimal::ZERO);
    assert!(estimate.buy_cost >= estimate.sell_proceeds);
    println!(
        "Buy cost (1 BTC): ${:.2}, Sell proceeds (1 BTC): ${:.2}",
        estimate.buy_cost, estimate.sell_proceeds
    );
}
