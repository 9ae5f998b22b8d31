// Start of file: /src/api/middleware/metrics.rs

use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};

use crate::config::state::AppState;

/// Label used for requests that matched no route, so unknown paths cannot
/// blow up label cardinality.
pub const UNMATCHED_PATH: &str = "unmatched";

/// Records count, latency and in-progress gauges per method and route.
pub async fn record_metrics(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let settings = state.config.settings();
    if !settings.middleware.enable_metrics || req.uri().path() == settings.middleware.metrics_path {
        return next.run(req).await;
    }

    let method: String = req.method().to_string();
    let path: String = req
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_PATH.to_string());

    let http = state.metrics.http();
    let in_progress = http.requests_in_progress.with_label_values(&[method.as_str(), path.as_str()]);
    in_progress.inc();
    let start: Instant = Instant::now();

    let response: Response = next.run(req).await;

    in_progress.dec();
    http.request_duration
        .with_label_values(&[method.as_str(), path.as_str()])
        .observe(start.elapsed().as_secs_f64());
    http.requests_total
        .with_label_values(&[method.as_str(), path.as_str(), response.status().as_str()])
        .inc();

    response
}

// End of file: /src/api/middleware/metrics.rs
