use axum::{routing::get, Router};

use crate::config::state::AppState;

use super::handler;

/// Mounts the exposition endpoint at `path` (usually `/metrics`).
pub fn metrics_routes(path: &str) -> Router<AppState> {
    Router::new().route(path, get(handler::metrics_handler))
}
