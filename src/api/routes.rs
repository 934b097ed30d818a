//! HTTP API route definitions.

use std::net::SocketAddr;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::handlers::{costs, health, metrics, ready, AppState};
use crate::utils::ShutdownToken;

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(health))
        .route("/ready", get(ready))
        // Cost report
        .route("/api/v1/costs", get(costs))
        .route("/metrics", get(metrics))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Serve the API on `port` until `shutdown` is cancelled.
pub async fn serve(state: AppState, port: u16, shutdown: ShutdownToken) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::CostReport;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use rust_decimal_macros::dec;
    use time::OffsetDateTime;
    use tokio::sync::watch;
    use tower::ServiceExt;

    fn state() -> (watch::Sender<Option<CostReport>>, AppState) {
        let (tx, rx) = watch::channel(None);
        (tx, AppState::new(rx, None))
    }

    fn report() -> CostReport {
        CostReport {
            quantity: dec!(10),
            buy_cost: dec!(500100.50),
            sell_proceeds: dec!(499900.25),
            best_bid: Some(dec!(49995)),
            best_ask: Some(dec!(50005)),
            bid_entries: 120,
            ask_entries: 140,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    async fn get(app: Router, uri: &str) -> axum::response::Response {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let (_tx, state) = state();

        let response = get(create_router(state), "/health").await;

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn ready_endpoint_returns_503_when_not_ready() {
        let (_tx, state) = state();

        let response = get(create_router(state), "/ready").await;

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn ready_endpoint_returns_200_after_first_report() {
        let (tx, state) = state();
        tx.send_replace(Some(report()));

        let response = get(create_router(state), "/ready").await;

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn costs_endpoint_renders_decimals_as_strings() {
        let (tx, state) = state();
        tx.send_replace(Some(report()));

        let response = get(create_router(state), "/api/v1/costs").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(json["buy_cost"], "500100.50");
        assert_eq!(json["sell_proceeds"], "499900.25");
        assert_eq!(json["ask_entries"], 140);
        assert_eq!(json["updated_at"], "1970-01-01T00:00:00Z");
    }

    #[tokio::test]
    async fn costs_endpoint_returns_503_without_report() {
        let (_tx, state) = state();

        let response = get(create_router(state), "/api/v1/costs").await;

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn metrics_endpoint_without_recorder_is_not_found() {
        let (_tx, state) = state();

        let response = get(create_router(state), "/metrics").await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
