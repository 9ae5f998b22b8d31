// Start of file: /src/api/middleware/request_logging.rs

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use tracing::{error, info, warn};

use crate::config::state::AppState;
use crate::utils::context::{RequestContext, RequestTimer};

fn is_excluded(path: &str, excluded: &[String]) -> bool {
    excluded.iter().any(|prefix| path == prefix || path.starts_with(&format!("{}/", prefix.trim_end_matches('/'))))
}

/// Logs a start and a finish line per request, skipping excluded paths.
pub async fn request_logging(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let settings = state.config.settings();
    let path: String = req.uri().path().to_string();

    if !settings.middleware.enable_request_logging || is_excluded(&path, &settings.middleware.exclude_log_paths) {
        return next.run(req).await;
    }

    let method: String = req.method().to_string();
    let request_id: String = req
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id().to_string())
        .unwrap_or_default();
    let timer: RequestTimer = RequestTimer::start();

    info!(%request_id, %method, %path, "Request started");
    let response: Response = next.run(req).await;

    let status: StatusCode = response.status();
    let duration_ms: f64 = timer.elapsed_ms();
    if status.is_server_error() {
        error!(%request_id, %method, %path, status = status.as_u16(), duration_ms, "Request failed");
    } else if status.is_client_error() {
        warn!(%request_id, %method, %path, status = status.as_u16(), duration_ms, "Request finished");
    } else {
        info!(%request_id, %method, %path, status = status.as_u16(), duration_ms, "Request finished");
    }

    response
}


// End of file: /src/api/middleware/request_logging.rs
