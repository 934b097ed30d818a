//! Merge and cost walk across several scripted venues.

use std::sync::Arc;
use std::time::Duration;

use depth_aggregator::error::{CostError, RefreshError};
use depth_aggregator::exchange::MockExchange;
use depth_aggregator::orderbook::{FetchPolicy, OrderBookAggregator, Side, TradeSide};
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;

fn three_venues(policy: FetchPolicy) -> (OrderBookAggregator, Vec<MockExchange>) {
    let venues = vec![
        MockExchange::with_levels(
            "Coinbase Pro",
            &[(dec!(50050), dec!(0.4)), (dec!(50000), dec!(1.0))],
            &[(dec!(50100), dec!(0.5)), (dec!(50200), dec!(1.0))],
        ),
        MockExchange::with_levels(
            "Gemini",
            &[(dec!(50060), dec!(0.3)), (dec!(49990), dec!(2.0))],
            &[(dec!(50110), dec!(0.25)), (dec!(50300), dec!(2.0))],
        ),
        MockExchange::with_levels(
            "Kraken",
            &[(dec!(50050), dec!(0.6))],
            &[(dec!(50100), dec!(0.75))],
        ),
    ];

    let mut aggregator = OrderBookAggregator::with_policy(policy);
    for venue in &venues {
        aggregator.add_source(Box::new(venue.clone()));
    }
    (aggregator, venues)
}

#[tokio::test]
async fn merge_keeps_every_entry_in_price_order() {
    let (mut aggregator, _) = three_venues(FetchPolicy::FailFast);

    aggregator.refresh().await.unwrap();
    let book = aggregator.snapshot();

    assert_eq!(book.bids().len(), 5);
    assert_eq!(book.asks().len(), 5);

    // Equal prices from different venues are both kept.
    let at_50100: Vec<&str> = book
        .asks()
        .ascending()
        .filter(|level| level.price() == dec!(50100))
        .map(|level| level.source())
        .collect();
    assert_eq!(at_50100.len(), 2);
    assert!(at_50100.contains(&"Coinbase Pro"));
    assert!(at_50100.contains(&"Kraken"));

    let asks: Vec<_> = book.asks().ascending().map(|l| l.price()).collect();
    assert!(asks.windows(2).all(|w| w[0] <= w[1]));

    let bids: Vec<_> = book.bids().descending().map(|l| l.price()).collect();
    assert!(bids.windows(2).all(|w| w[0] >= w[1]));

    assert_eq!(book.best_bid(), Some(dec!(50060)));
    assert_eq!(book.best_ask(), Some(dec!(50100)));
    assert_eq!(book.spread(), Some(dec!(40)));
}

#[tokio::test]
async fn cost_walks_best_prices_across_venues() {
    let (mut aggregator, _) = three_venues(FetchPolicy::FailFast);
    aggregator.refresh().await.unwrap();

    // Asks: 50100 x (0.5 + 0.75), then 50110 x 0.25
    // Bids: 50060 x 0.3, 50050 x (0.4 + 0.6), then 50000 x 1.0
    let estimate = aggregator.compute_cost(dec!(1.5)).unwrap();

    assert_eq!(estimate.buy_cost, dec!(1.25) * dec!(50100) + dec!(0.25) * dec!(50110));
    assert_eq!(
        estimate.sell_proceeds,
        dec!(0.3) * dec!(50060) + dec!(1.0) * dec!(50050) + dec!(0.2) * dec!(50000)
    );
}

#[tokio::test]
async fn cost_exactly_equal_to_liquidity_succeeds() {
    let (mut aggregator, _) = three_venues(FetchPolicy::FailFast);
    aggregator.refresh().await.unwrap();

    let asks_total = aggregator.compute_liquidity(Side::Ask).unwrap();
    let bids_total = aggregator.compute_liquidity(Side::Bid).unwrap();
    assert_eq!(asks_total, dec!(4.5));
    assert_eq!(bids_total, dec!(4.3));

    assert!(aggregator.compute_cost(bids_total).is_ok());
}

#[tokio::test]
async fn cost_beyond_liquidity_reports_amounts() {
    let (mut aggregator, _) = three_venues(FetchPolicy::FailFast);
    aggregator.refresh().await.unwrap();

    // Enough asks, not enough bids.
    let err = aggregator.compute_cost(dec!(4.4)).unwrap_err();

    assert_eq!(
        err,
        CostError::InsufficientLiquidity {
            requested: dec!(4.4),
            available: dec!(4.3),
            side: TradeSide::Sell,
        }
    );
}

#[tokio::test]
async fn refresh_on_unchanged_venues_is_idempotent() {
    let (mut aggregator, venues) = three_venues(FetchPolicy::FailFast);

    aggregator.refresh().await.unwrap();
    let first = aggregator.snapshot();
    aggregator.refresh().await.unwrap();
    let second = aggregator.snapshot();

    assert_eq!(*first, *second);

    let before = aggregator.compute_cost(dec!(1.5)).unwrap();
    aggregator.refresh().await.unwrap();
    assert_eq!(aggregator.compute_cost(dec!(1.5)).unwrap(), before);

    // No leftover or doubled entries from earlier cycles.
    let (bids, asks) = venues.iter().fold((0, 0), |(bids, asks), venue| {
        let (b, a) = venue.control().level_counts();
        (bids + b, asks + a)
    });
    let book = aggregator.snapshot();
    assert_eq!(book.bids().len(), bids);
    assert_eq!(book.asks().len(), asks);
}

#[tokio::test]
async fn fail_fast_keeps_previous_snapshot() {
    let (mut aggregator, venues) = three_venues(FetchPolicy::FailFast);
    aggregator.refresh().await.unwrap();
    let before = aggregator.snapshot();

    venues[0].control().set_asks(&[(dec!(1), dec!(100))]);
    venues[1].control().fail_next("timeout");

    let err = aggregator.refresh().await.unwrap_err();
    assert!(matches!(err, RefreshError::Source { ref name, .. } if name == "Gemini"));

    let after = aggregator.snapshot();
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(after.best_ask(), Some(dec!(50100)));
}

#[tokio::test]
async fn skip_failed_merges_the_rest() {
    let (mut aggregator, venues) = three_venues(FetchPolicy::SkipFailed);
    venues[2].control().fail_always("maintenance");

    aggregator.refresh().await.unwrap();
    let book = aggregator.snapshot();

    assert!(book.asks().ascending().all(|level| level.source() != "Kraken"));
    assert_eq!(book.asks().len(), 4);
}

#[tokio::test]
async fn readers_see_whole_snapshots_during_refresh() {
    let (mut aggregator, venues) = three_venues(FetchPolicy::FailFast);
    aggregator.refresh().await.unwrap();

    for venue in &venues {
        venue.control().set_latency(Duration::from_millis(20));
    }
    venues[0].control().set_asks(&[(dec!(49000), dec!(1))]);

    let handle = aggregator.snapshot_handle();
    let reader = tokio::spawn(async move {
        let mut seen = Vec::new();
        for _ in 0..20 {
            let book = handle.load();
            seen.push((book.asks().len(), book.best_ask()));
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        seen
    });

    aggregator.refresh().await.unwrap();
    let seen = reader.await.unwrap();

    for (len, best_ask) in seen {
        match best_ask {
            Some(price) if price == dec!(50100) => assert_eq!(len, 5),
            Some(price) if price == dec!(49000) => assert_eq!(len, 4),
            other => panic!("torn snapshot: {:?}", other),
        }
    }
}
