// Unified response system for consistent API responses
// Provides the success envelope, pagination, a JSON extractor with enveloped
// rejections and middleware normalizing framework error responses.

use axum::{
    extract::{FromRequest, Request},
    http::{
        header::{CONTENT_LENGTH, CONTENT_TYPE},
        response::Parts,
        StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use http_body_util::BodyExt;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, error};

use crate::utils::error_handler::{ApiError, ErrorBody};
use crate::utils::utils::to_two_space_indented_json;

/// Success envelope: `{ success: true, data, error: null }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ErrorBody>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self { success: true, data: Some(data), error: None }
    }
}

impl ApiResponse<()> {
    /// Success without payload.
    pub fn empty() -> Self {
        Self { success: true, data: None, error: None }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// One page of results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedData<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub size: u64,
    pub pages: u64,
}

impl<T> PaginatedData<T> {
    pub fn new(items: Vec<T>, total: u64, page: u64, size: u64) -> Self {
        let pages: u64 = if size == 0 { 0 } else { total.div_ceil(size) };
        Self { items, total, page, size, pages }
    }
}

/// `Json<T>` whose rejections render as the error envelope.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(ApiError::from(rejection)),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiJson<T> {
    fn into_response(self) -> Response {
        Json(self.0).into_response()
    }
}

fn is_json(parts: &Parts) -> bool {
    parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"))
}

/// Canonical reason as an error code, e.g. `METHOD_NOT_ALLOWED`.
pub fn status_code_name(status: StatusCode) -> String {
    status
        .canonical_reason()
        .unwrap_or("UNKNOWN STATUS")
        .to_uppercase()
        .replace([' ', '-'], "_")
}

/// Middleware rewriting plain-text error responses (405, 415, ...) into the
/// error envelope. JSON responses and successes pass through untouched.
pub async fn normalize_error_response(req: Request, next: Next) -> Response {
    let response: Response = next.run(req).await;
    if !(response.status().is_client_error() || response.status().is_server_error()) {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    if is_json(&parts) {
        return Response::from_parts(parts, body);
    }

    let bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            error!("Error reading response body: {:?}", err);
            return ApiError::internal("Failed to read response body").into_response();
        }
    };

    let text: String = String::from_utf8_lossy(&bytes).trim().to_string();
    let message: String = if text.is_empty() {
        parts.status.canonical_reason().unwrap_or("Unknown error").to_string()
    } else {
        text
    };

    let err: ApiError = ApiError::custom(parts.status, status_code_name(parts.status), message);
    let body_json = err.to_response_body();
    if let Ok(pretty) = to_two_space_indented_json(&body_json) {
        debug!("\nNormalized error response:\n{}", pretty);
    }

    parts.headers.remove(CONTENT_LENGTH);
    parts.headers.remove(CONTENT_TYPE);
    let rendered: Response = Json(body_json).into_response();
    let (rendered_parts, rendered_body) = rendered.into_parts();
    parts.headers.extend(rendered_parts.headers);

    Response::from_parts(parts, rendered_body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, routing::get, Router};
    use tower::ServiceExt;

    #[test]
    fn pagination_rounds_pages_up() {
        let page: PaginatedData<u8> = PaginatedData::new(vec![1, 2], 11, 1, 5);
        assert_eq!(page.pages, 3);
        assert_eq!(PaginatedData::<u8>::new(Vec::new(), 10, 1, 0).pages, 0);
        assert_eq!(PaginatedData::<u8>::new(Vec::new(), 10, 1, 5).pages, 2);
    }

    #[test]
    fn success_envelope_shape() {
        let json: serde_json::Value = serde_json::to_value(ApiResponse::success(42)).unwrap();
        assert_eq!(json, serde_json::json!({ "success": true, "data": 42, "error": null }));
    }

    #[test]
    fn status_names() {
        assert_eq!(status_code_name(StatusCode::METHOD_NOT_ALLOWED), "METHOD_NOT_ALLOWED");
        assert_eq!(status_code_name(StatusCode::PAYLOAD_TOO_LARGE), "PAYLOAD_TOO_LARGE");
    }

    #[tokio::test]
    async fn plain_errors_become_envelopes() {
        let app: Router = Router::new()
            .route("/only-get", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn(normalize_error_response));

        let response: Response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/only-get")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert!(response.headers().contains_key("allow"));
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"]["code"], "METHOD_NOT_ALLOWED");
        assert_eq!(json["success"], false);
    }
}
