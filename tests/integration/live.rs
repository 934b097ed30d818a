//! Live refresh sessions against scripted venues.

use std::time::Duration;

use depth_aggregator::exchange::MockExchange;
use depth_aggregator::live::{CostReport, LiveRefreshController};
use depth_aggregator::orderbook::OrderBookAggregator;
use depth_aggregator::utils::{spawn_cancel_on, ShutdownToken};
use rust_decimal_macros::dec;
use tokio::sync::watch;

fn controller(venue: &MockExchange, shutdown: ShutdownToken) -> LiveRefreshController {
    let mut aggregator = OrderBookAggregator::new();
    aggregator.add_source(Box::new(venue.clone()));
    LiveRefreshController::new(aggregator, dec!(2), shutdown)
}

async fn next_report(rx: &mut watch::Receiver<Option<CostReport>>) -> CostReport {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            rx.changed().await.expect("controller alive");
            if let Some(report) = rx.borrow_and_update().clone() {
                return report;
            }
        }
    })
    .await
    .expect("report within deadline")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reports_follow_venue_updates() {
    let venue = MockExchange::with_levels(
        "E1",
        &[(dec!(99), dec!(5))],
        &[(dec!(101), dec!(5))],
    );
    let mut live = controller(&venue, ShutdownToken::new());
    let mut rx = live.subscribe();

    live.start(Duration::from_millis(10)).unwrap();
    let first = next_report(&mut rx).await;
    assert_eq!(first.buy_cost, dec!(202));
    assert_eq!(first.sell_proceeds, dec!(198));

    venue.control().set_asks(&[(dec!(100), dec!(1)), (dec!(110), dec!(1))]);

    let updated = loop {
        let report = next_report(&mut rx).await;
        if report.buy_cost != first.buy_cost {
            break report;
        }
    };
    assert_eq!(updated.buy_cost, dec!(210));
    assert_eq!(updated.ask_entries, 2);

    live.stop().await.unwrap();
}

#[tokio::test]
async fn insufficient_liquidity_does_not_end_the_session() {
    let venue = MockExchange::with_levels("E1", &[(dec!(99), dec!(1))], &[(dec!(101), dec!(1))]);
    let mut live = controller(&venue, ShutdownToken::new());
    let mut rx = live.subscribe();

    live.start(Duration::from_millis(10)).unwrap();

    // Quantity 2 exceeds the book until more depth arrives.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(live.latest().is_none());
    assert!(live.is_running());

    venue.control().set_bids(&[(dec!(99), dec!(3))]);
    venue.control().set_asks(&[(dec!(101), dec!(3))]);

    let report = next_report(&mut rx).await;
    assert_eq!(report.buy_cost, dec!(202));

    live.stop().await.unwrap();
}

#[tokio::test]
async fn external_shutdown_ends_session() {
    let venue = MockExchange::with_levels("E1", &[(dec!(99), dec!(5))], &[(dec!(101), dec!(5))]);
    let shutdown = ShutdownToken::new();
    let mut live = controller(&venue, shutdown.clone());

    let (trigger, fired) = tokio::sync::oneshot::channel::<()>();
    let _listener = spawn_cancel_on(shutdown.clone(), async move {
        let _ = fired.await;
    });

    live.start(Duration::from_secs(3600)).unwrap();
    trigger.send(()).unwrap();

    tokio::time::timeout(Duration::from_secs(1), live.wait())
        .await
        .expect("session ended")
        .unwrap();
    assert!(shutdown.is_cancelled());
    assert!(!live.is_running());
}

#[tokio::test]
async fn snapshot_handle_reads_while_running() {
    let venue = MockExchange::with_levels("E1", &[(dec!(99), dec!(5))], &[(dec!(101), dec!(5))]);
    let mut live = controller(&venue, ShutdownToken::new());
    let handle = live.snapshot_handle();
    let mut rx = live.subscribe();

    live.start(Duration::from_millis(10)).unwrap();
    next_report(&mut rx).await;

    assert_eq!(handle.load().best_ask(), Some(dec!(101)));
    live.stop().await.unwrap();
}
