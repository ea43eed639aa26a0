//! Prometheus Metrics
//!
//! Request counters and latency histograms by method, route and status,
//! rendered at `/metrics` in the Prometheus text format.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::{header, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::{AppError, AppResult};

use super::state::AppState;

pub const METRICS_PATH: &str = "/metrics";

const LABELS: &[&str] = &["method", "route", "status"];

/// HTTP metrics, registered in a dedicated registry
#[derive(Clone)]
pub struct HttpMetrics {
    registry: Registry,
    requests_total: IntCounterVec,
    request_duration_seconds: HistogramVec,
}

impl HttpMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("wallet_ledger".into()), None)?;

        let requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests handled"),
            LABELS,
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request latency in seconds",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
            ]),
            LABELS,
        )?;
        registry.register(Box::new(request_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            request_duration_seconds,
        })
    }

    pub fn observe(&self, method: &str, route: &str, status: u16, elapsed: Duration) {
        let status = status.to_string();
        let labels = [method, route, status.as_str()];
        self.requests_total.with_label_values(&labels).inc();
        self.request_duration_seconds
            .with_label_values(&labels)
            .observe(elapsed.as_secs_f64());
    }

    /// Encode every registered metric in the text exposition format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Count and time every request except scrapes of `/metrics` itself.
/// Requests that matched no route share the `unmatched` label.
pub async fn metrics_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    if route == METRICS_PATH {
        return next.run(request).await;
    }

    let method = request.method().clone();
    let start = Instant::now();
    let response = next.run(request).await;

    state.metrics.observe(
        method.as_str(),
        &route,
        response.status().as_u16(),
        start.elapsed(),
    );
    response
}

/// GET /metrics
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> AppResult<Response> {
    let body = state
        .metrics
        .encode()
        .map_err(|e| AppError::Internal(format!("metrics encoding failed: {e}")))?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_is_rendered_with_labels() {
        let metrics = HttpMetrics::new().unwrap();
        metrics.observe("POST", "/api/v1/transactions", 201, Duration::from_millis(3));
        metrics.observe("POST", "/api/v1/transactions", 201, Duration::from_millis(4));
        metrics.observe("POST", "/api/v1/transactions", 409, Duration::from_millis(1));

        let text = metrics.encode().unwrap();
        assert!(text.contains(
            r#"wallet_ledger_http_requests_total{method="POST",route="/api/v1/transactions",status="201"} 2"#
        ));
        assert!(text.contains(
            r#"wallet_ledger_http_requests_total{method="POST",route="/api/v1/transactions",status="409"} 1"#
        ));
        assert!(text.contains("wallet_ledger_http_request_duration_seconds_bucket"));
    }

    #[test]
    fn test_registries_are_independent() {
        let first = HttpMetrics::new().unwrap();
        let second = HttpMetrics::new().unwrap();
        first.observe("GET", "/health", 200, Duration::ZERO);

        assert!(!second.encode().unwrap().contains("route=\"/health\""));
    }
}
