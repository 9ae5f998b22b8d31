// Start of file: /src/api/middleware/request_context.rs

// * Opens a RequestContext for every request and echoes its id back.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::config::state::AppState;
use crate::utils::context::{client_ip, RequestContext};

/// Used when the configured header name is not a valid header.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

fn request_id_header(state: &AppState) -> HeaderName {
    let configured: String = state.config.settings().middleware.request_id_header.clone();
    HeaderName::try_from(configured.as_str()).unwrap_or_else(|_| {
        warn!(header = %configured, "Invalid request id header, using {}", REQUEST_ID_HEADER);
        HeaderName::from_static(REQUEST_ID_HEADER)
    })
}

/// Reuses the incoming request id or generates one, stores the context in
/// the request extensions and runs the rest of the stack inside its scope.
pub async fn request_context(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let header: HeaderName = request_id_header(&state);

    let request_id: String = req
        .headers()
        .get(&header)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(RequestContext::generate_request_id);

    let peer: Option<SocketAddr> = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let context: RequestContext = RequestContext::new(
        request_id.clone(),
        req.method().as_str(),
        req.uri().path(),
        client_ip(req.headers(), peer),
    );
    req.extensions_mut().insert(context.clone());

    let mut response: Response = context.scope(next.run(req)).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(header, value);
    }
    response
}

// End of file: /src/api/middleware/request_context.rs
