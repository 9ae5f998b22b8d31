// Error types and global error handling for HTTP middleware layers

use std::{borrow::Cow, error::Error};

use axum::{
    extract::rejection::JsonRejection,
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    BoxError, Json,
};
// Axum uses http_body_util for length-limiting
use http_body_util::LengthLimitError;
use serde::{Deserialize, Serialize};
// tower's error type for timeouts
use tower::timeout::error::Elapsed;
use tracing::{error, warn};

use crate::core::injector::InjectorError;
use crate::utils::context::RequestContext;

/// Well-known error categories with their status, code and default message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    BadRequest,
    Validation,
    Unauthorized,
    Forbidden,
    NotFound,
    RequestTimeout,
    Conflict,
    PayloadTooLarge,
    Internal,
    ServiceUnavailable,
}

impl ApiErrorKind {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest | Self::Validation => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::RequestTimeout => StatusCode::REQUEST_TIMEOUT,
            Self::Conflict => StatusCode::CONFLICT,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::Validation => "VALIDATION_ERROR",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::RequestTimeout => "REQUEST_TIMEOUT",
            Self::Conflict => "CONFLICT",
            Self::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            Self::Internal => "INTERNAL_SERVER_ERROR",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
        }
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            Self::BadRequest => "Bad request",
            Self::Validation => "Request validation failed",
            Self::Unauthorized => "Unauthorized",
            Self::Forbidden => "Forbidden",
            Self::NotFound => "Resource not found",
            Self::RequestTimeout => "Request timed out",
            Self::Conflict => "Resource conflict",
            Self::PayloadTooLarge => "Request body too large",
            Self::Internal => "Internal server error",
            Self::ServiceUnavailable => "Service unavailable",
        }
    }
}

/// One entry of `error.details`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub field: Option<String>,
    pub message: String,
    pub code: Option<String>,
}

impl ErrorDetail {
    pub fn new(message: impl Into<String>) -> Self {
        Self { field: None, message: message.into(), code: None }
    }

    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// `error` object of the error envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    pub details: Vec<ErrorDetail>,
    pub request_id: Option<String>,
}

/// Error envelope: `{ success: false, data: null, error: {..} }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: ErrorBody,
}

/// An error that renders as the standard error envelope.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub code: Cow<'static, str>,
    pub message: String,
    pub details: Vec<ErrorDetail>,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind) -> Self {
        Self {
            status: kind.status(),
            code: Cow::Borrowed(kind.code()),
            message: kind.default_message().to_string(),
            details: Vec::new(),
        }
    }

    pub fn with_message(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind).message(message)
    }

    /// Any status/code pair, for errors outside the well-known kinds.
    pub fn custom(status: StatusCode, code: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        Self { status, code: code.into(), message: message.into(), details: Vec::new() }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::with_message(ApiErrorKind::BadRequest, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::with_message(ApiErrorKind::Validation, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::with_message(ApiErrorKind::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::with_message(ApiErrorKind::Forbidden, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_message(ApiErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::with_message(ApiErrorKind::Conflict, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_message(ApiErrorKind::Internal, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::with_message(ApiErrorKind::ServiceUnavailable, message)
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn detail(mut self, detail: ErrorDetail) -> Self {
        self.details.push(detail);
        self
    }

    pub fn details(mut self, details: impl IntoIterator<Item = ErrorDetail>) -> Self {
        self.details.extend(details);
        self
    }

    pub fn to_response_body(&self) -> ErrorResponse {
        ErrorResponse {
            success: false,
            data: None,
            error: ErrorBody {
                code: self.code.to_string(),
                message: self.message.clone(),
                details: self.details.clone(),
                request_id: RequestContext::current_request_id(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = self.status.as_u16(), code = %self.code, message = %self.message, "Request failed");
        } else {
            warn!(status = self.status.as_u16(), code = %self.code, message = %self.message, "Request rejected");
        }

        (self.status, Json(self.to_response_body())).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::internal(ApiErrorKind::Internal.default_message())
            .detail(ErrorDetail::new(format!("{err:#}")).code("internal_error"))
    }
}

impl From<InjectorError> for ApiError {
    fn from(err: InjectorError) -> Self {
        ApiError::internal("Dependency resolution failed").detail(ErrorDetail::new(err.to_string()).code("injector"))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let status: StatusCode = rejection.status();
        let detail: ErrorDetail = ErrorDetail::new(rejection.body_text()).code("json");

        match status {
            StatusCode::PAYLOAD_TOO_LARGE => ApiError::new(ApiErrorKind::PayloadTooLarge).detail(detail),
            StatusCode::UNSUPPORTED_MEDIA_TYPE => {
                ApiError::custom(status, "UNSUPPORTED_MEDIA_TYPE", "Expected an application/json body").detail(detail)
            }
            _ => ApiError::new(ApiErrorKind::Validation).detail(detail),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::not_found("Record not found"),
            other => ApiError::custom(StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR", "Database error")
                .detail(ErrorDetail::new(other.to_string())),
        }
    }
}

/// Maps errors raised by tower layers to the error envelope
pub async fn handle_global_error(err: BoxError) -> ApiError {
    // 413 if the body was too large
    if err.is::<LengthLimitError>() || find_cause::<LengthLimitError>(&*err).is_some() {
        return ApiError::new(ApiErrorKind::PayloadTooLarge);
    }

    // 408 if the request took too long
    if err.is::<Elapsed>() {
        return ApiError::new(ApiErrorKind::RequestTimeout);
    }

    // Otherwise, 500
    ApiError::internal(format!("Unhandled internal error: {err}"))
}

/// Catch-all for routes nobody registered.
pub async fn fallback_handler(uri: Uri) -> ApiError {
    ApiError::not_found(format!("No route for {}", uri.path()))
}

/// Turns a handler panic into a 500 envelope.
pub fn handle_panic(payload: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let message: String = payload
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| payload.downcast_ref::<&str>().map(|s| s.to_string()))
        .unwrap_or_else(|| "unknown panic".to_string());

    error!(panic = %message, "Handler panicked");
    ApiError::internal(ApiErrorKind::Internal.default_message()).into_response()
}

/// Helper function to find specific error type in error chain
pub fn find_cause<T: Error + 'static>(err: &dyn Error) -> Option<&T> {
    let mut source: Option<&dyn Error> = err.source();

    while let Some(s) = source {
        if let Some(typed) = s.downcast_ref::<T>() {
            return Some(typed);
        }
        source = s.source();
    }

    None
}
