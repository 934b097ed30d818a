//! HTTP API handlers.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use tokio::sync::watch;

use crate::live::CostReport;

/// Application state shared with handlers.
#[derive(Clone)]
pub struct AppState {
    /// Latest live cost report.
    pub reports: watch::Receiver<Option<CostReport>>,
    /// Prometheus render handle, if a recorder is installed.
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    /// Create new app state.
    pub fn new(
        reports: watch::Receiver<Option<CostReport>>,
        prometheus: Option<PrometheusHandle>,
    ) -> Self {
        Self {
            reports,
            prometheus,
        }
    }

    /// Latest report, if any cycle has succeeded.
    pub fn latest(&self) -> Option<CostReport> {
        self.reports.borrow().clone()
    }

    /// Ready once the first report is published.
    pub fn is_ready(&self) -> bool {
        self.reports.borrow().is_some()
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status: "ok".
    pub status: &'static str,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    /// Whether a cost report is available.
    pub ready: bool,
    /// Time of the latest report.
    pub last_update: Option<String>,
}

/// Error body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// What went wrong.
    pub error: &'static str,
}

/// Health check handler - always returns 200.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Readiness check handler - returns 200 if a report exists, 503 otherwise.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let last_update = state
        .latest()
        .and_then(|report| report.updated_at.format(&Rfc3339).ok());

    let response = ReadyResponse {
        ready: last_update.is_some(),
        last_update,
    };

    if response.ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Latest cost report. Decimals are rendered as strings.
pub async fn costs(State(state): State<AppState>) -> axum::response::Response {
    match state.latest() {
        Some(report) => (StatusCode::OK, Json(report)).into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: "no cost report yet",
            }),
        )
            .into_response(),
    }
}

/// Prometheus text exposition.
pub async fn metrics(State(state): State<AppState>) -> axum::response::Response {
    match &state.prometheus {
        Some(handle) => (StatusCode::OK, handle.render()).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
