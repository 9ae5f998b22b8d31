// Per-request context: request id, timing and a key/value store that code
// deeper in the call stack can reach without threading it through arguments.

use std::{
    collections::HashMap,
    future::Future,
    net::SocketAddr,
    sync::Arc,
    time::Instant,
};

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::utils::error_handler::ApiError;

/// Fallback when neither a forwarded header nor a peer address is known.
pub const DEFAULT_CLIENT_IP: &str = "127.0.0.1";

tokio::task_local! {
    static CURRENT: RequestContext;
}

/// Measures elapsed wall time from creation.
#[derive(Debug, Clone, Copy)]
pub struct RequestTimer {
    start: Instant,
}

impl RequestTimer {
    pub fn start() -> Self {
        Self { start: Instant::now() }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for RequestTimer {
    fn default() -> Self {
        Self::start()
    }
}

#[derive(Debug)]
struct ContextInner {
    request_id: String,
    method: String,
    path: String,
    client_ip: String,
    timer: RequestTimer,
    values: RwLock<HashMap<String, Value>>,
}

/// Cheap to clone; clones share the same store.
#[derive(Debug, Clone)]
pub struct RequestContext {
    inner: Arc<ContextInner>,
}

impl RequestContext {
    pub fn new(
        request_id: impl Into<String>,
        method: impl Into<String>,
        path: impl Into<String>,
        client_ip: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                request_id: request_id.into(),
                method: method.into(),
                path: path.into(),
                client_ip: client_ip.into(),
                timer: RequestTimer::start(),
                values: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn generate_request_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// The context of the request being served by this task, if any.
    pub fn current() -> Option<Self> {
        CURRENT.try_with(Clone::clone).ok()
    }

    pub fn current_request_id() -> Option<String> {
        CURRENT.try_with(|ctx| ctx.inner.request_id.clone()).ok()
    }

    /// Runs `fut` with `self` as the ambient context.
    pub async fn scope<F: Future>(self, fut: F) -> F::Output {
        CURRENT.scope(self, fut).await
    }

    pub fn request_id(&self) -> &str {
        &self.inner.request_id
    }

    pub fn method(&self) -> &str {
        &self.inner.method
    }

    pub fn path(&self) -> &str {
        &self.inner.path
    }

    pub fn client_ip(&self) -> &str {
        &self.inner.client_ip
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.inner.timer.elapsed_ms()
    }

    pub fn set<T: Serialize>(&self, key: impl Into<String>, value: T) -> serde_json::Result<()> {
        let value: Value = serde_json::to_value(value)?;
        self.inner.values.write().insert(key.into(), value);
        Ok(())
    }

    /// Typed read; `None` when missing or of another shape.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value: Value = self.inner.values.read().get(key)?.clone();
        serde_json::from_value(value).ok()
    }

    pub fn get_value(&self, key: &str) -> Option<Value> {
        self.inner.values.read().get(key).cloned()
    }

    pub fn get_all(&self) -> HashMap<String, Value> {
        self.inner.values.read().clone()
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.inner.values.write().remove(key)
    }

    pub fn clear(&self) {
        self.inner.values.write().clear();
    }

    /// Stores into the ambient context. Returns false outside a request.
    pub fn set_current<T: Serialize>(key: impl Into<String>, value: T) -> bool {
        match Self::current() {
            Some(ctx) => ctx.set(key, value).is_ok(),
            None => false,
        }
    }

    pub fn get_current<T: DeserializeOwned>(key: &str) -> Option<T> {
        Self::current()?.get(key)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .ok_or_else(|| ApiError::internal("Request context middleware is not installed"))
    }
}

/// First `X-Forwarded-For` entry, else the peer address, else 127.0.0.1.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded: Option<String> = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string);

    forwarded
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| DEFAULT_CLIENT_IP.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[tokio::test]
    async fn ambient_lookup_inside_scope_only() {
        assert!(RequestContext::current().is_none());
        assert!(!RequestContext::set_current("user", "alice"));

        let ctx: RequestContext = RequestContext::new("abc", "GET", "/items", "10.0.0.1");
        let seen: Option<String> = ctx
            .clone()
            .scope(async {
                assert!(RequestContext::set_current("user", "alice"));
                RequestContext::get_current::<String>("user")
            })
            .await;

        assert_eq!(seen.as_deref(), Some("alice"));
        assert_eq!(ctx.get::<String>("user").as_deref(), Some("alice"));
        assert!(RequestContext::current_request_id().is_none());
    }

    #[test]
    fn stores_typed_values() {
        let ctx: RequestContext = RequestContext::new(RequestContext::generate_request_id(), "POST", "/", "::1");
        ctx.set("count", 3).unwrap();
        ctx.set("tags", vec!["a", "b"]).unwrap();

        assert_eq!(ctx.get::<u32>("count"), Some(3));
        assert_eq!(ctx.get::<Vec<String>>("tags").unwrap().len(), 2);
        assert_eq!(ctx.get::<u32>("tags"), None);
        assert_eq!(ctx.get_all().len(), 2);
        ctx.clear();
        assert!(ctx.get_all().is_empty());
        assert_eq!(ctx.request_id().len(), 36);
    }

    #[test]
    fn resolves_client_ip() {
        let peer: SocketAddr = "192.168.1.5:4000".parse().unwrap();
        let mut headers: HeaderMap = HeaderMap::new();
        assert_eq!(client_ip(&headers, None), DEFAULT_CLIENT_IP);
        assert_eq!(client_ip(&headers, Some(peer)), "192.168.1.5");

        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        assert_eq!(client_ip(&headers, Some(peer)), "203.0.113.7");
    }
}
