// Prometheus exposition handler

use axum::{
    extract::State,
    http::header::CONTENT_TYPE,
    response::{IntoResponse, Response},
};

use crate::config::state::AppState;
use crate::core::metrics::METRICS_CONTENT_TYPE;
use crate::utils::error_handler::ApiError;

pub async fn metrics_handler(State(state): State<AppState>) -> Result<Response, ApiError> {
    let body: String = state.metrics.render()?;
    Ok(([(CONTENT_TYPE, METRICS_CONTENT_TYPE)], body).into_response())
}
