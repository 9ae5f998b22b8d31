// Start of file: /src/api/middleware/cors.rs

use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::warn;

use crate::config::settings::AppConfig;

fn is_wildcard(values: &[String]) -> bool {
    values.iter().any(|value| value == "*")
}

fn parse_all<T, E: std::fmt::Display>(values: &[String], what: &str, parse: impl Fn(&str) -> Result<T, E>) -> Vec<T> {
    values
        .iter()
        .filter_map(|value| match parse(value) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                warn!(value = %value, error = %err, "Ignoring invalid CORS {}", what);
                None
            }
        })
        .collect()
}

/// Builds the CORS layer from the app settings. Credentials are only
/// allowed when origins, methods and headers are all explicit lists.
pub fn cors_layer(app: &AppConfig) -> CorsLayer {
    let origins: AllowOrigin = if is_wildcard(&app.cors_origins) {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(parse_all(&app.cors_origins, "origin", HeaderValue::from_str))
    };

    let methods: AllowMethods = if is_wildcard(&app.cors_allow_methods) {
        AllowMethods::any()
    } else {
        AllowMethods::list(parse_all(&app.cors_allow_methods, "method", |value| {
            Method::from_bytes(value.to_uppercase().as_bytes())
        }))
    };

    let headers: AllowHeaders = if is_wildcard(&app.cors_allow_headers) {
        AllowHeaders::any()
    } else {
        AllowHeaders::list(parse_all(&app.cors_allow_headers, "header", |value| {
            HeaderName::from_bytes(value.as_bytes())
        }))
    };

    let any_wildcard: bool =
        is_wildcard(&app.cors_origins) || is_wildcard(&app.cors_allow_methods) || is_wildcard(&app.cors_allow_headers);
    let credentials: bool = app.cors_allow_credentials && !any_wildcard;
    if app.cors_allow_credentials && any_wildcard {
        warn!("CORS credentials disabled because a wildcard is configured");
    }

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(methods)
        .allow_headers(headers)
        .allow_credentials(credentials)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, routing::get, Router};
    use tower::ServiceExt;

    #[tokio::test]
    async fn explicit_origin_is_echoed_with_credentials() {
        let app_config: AppConfig = AppConfig {
            cors_origins: vec!["https://app.example.com".to_string()],
            cors_allow_methods: vec!["get".to_string()],
            cors_allow_headers: vec!["content-type".to_string()],
            cors_allow_credentials: true,
            ..AppConfig::default()
        };
        let app: Router = Router::new().route("/", get(|| async { "ok" })).layer(cors_layer(&app_config));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("origin", "https://app.example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let headers = response.headers();
        assert_eq!(headers["access-control-allow-origin"], "https://app.example.com");
        assert_eq!(headers["access-control-allow-credentials"], "true");
    }

    #[tokio::test]
    async fn wildcard_defaults_allow_any_origin() {
        let app: Router = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(cors_layer(&AppConfig { cors_allow_credentials: true, ..AppConfig::default() }));

        let response = app
            .oneshot(Request::builder().uri("/").header("origin", "https://x.test").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        assert!(!response.headers().contains_key("access-control-allow-credentials"));
    }
}

// End of file: /src/api/middleware/cors.rs
