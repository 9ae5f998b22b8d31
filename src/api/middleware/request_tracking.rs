// Start of file: /src/api/middleware/request_tracking.rs

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::config::state::AppState;
use crate::core::server::RequestGuard;

/// Counts the request as in flight so a graceful stop can wait for it.
pub async fn request_tracking(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let _guard: RequestGuard = state.http.track_request();
    next.run(req).await
}

// End of file: /src/api/middleware/request_tracking.rs
