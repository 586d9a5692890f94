//! Prometheus request metrics.

use std::time::{Duration, Instant};

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use lazy_static::lazy_static;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use crate::state::AppState;

pub const REQUESTS_TOTAL: &str = "http_requests_total";
pub const REQUEST_DURATION: &str = "http_request_duration_seconds";

const DURATION_BUCKETS: [f64; 11] = [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

lazy_static! {
    // The recorder is process-global; every caller shares the one installed handle.
    static ref RECORDER: Result<PrometheusHandle, String> = PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(REQUEST_DURATION.to_string()), &DURATION_BUCKETS)
        .and_then(|builder| builder.install_recorder())
        .map_err(|e| e.to_string());
}

/// Installs the Prometheus recorder on first use and returns its handle.
pub fn recorder() -> anyhow::Result<PrometheusHandle> {
    RECORDER
        .clone()
        .map_err(|e| anyhow::anyhow!("install prometheus recorder: {e}"))
}

/// Drains histogram buffers periodically so rendering stays cheap.
pub fn spawn_upkeep(handle: PrometheusHandle) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(5));
        loop {
            tick.tick().await;
            handle.run_upkeep();
        }
    });
}

/// Counts every routed request and records its latency.
pub async fn track_requests(req: Request, next: Next) -> Response {
    let start = Instant::now();
    // Route templates keep label cardinality bounded (`/users/:id`, not the id).
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());
    let method = req.method().to_string();

    let response = next.run(req).await;

    let status = response.status().as_u16().to_string();
    let labels = [("path", path.clone()), ("method", method.clone()), ("status", status)];
    counter!(REQUESTS_TOTAL, &labels).increment(1);

    let labels = [("path", path), ("method", method)];
    histogram!(REQUEST_DURATION, &labels).record(start.elapsed().as_secs_f64());

    response
}

pub async fn render(State(state): State<AppState>) -> String {
    state.metrics.render()
}
