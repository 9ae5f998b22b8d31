//! tests/common/mod.rs
//! Shared helper: starts a full ApiService on an ephemeral port.
#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use axum::{
    extract::Path,
    routing::{get, post},
    Router,
};
use fautil::{
    ApiError, ApiJson, ApiService, ApiView, AppState, Inject, Injectable, Injector, Module, Scope, Settings,
    StartOptions,
};
use serde_json::{json, Value};

/// Counts calls; bound as a singleton so every request sees the same value.
#[derive(Default)]
pub struct CounterService {
    hits: AtomicU64,
}

impl CounterService {
    pub fn hit(&self) -> u64 {
        self.hits.fetch_add(1, Ordering::SeqCst) + 1
    }
}

pub struct CounterModule;

impl Module for CounterModule {
    fn configure(&self, injector: &Injector) -> anyhow::Result<()> {
        injector.bind_provider::<CounterService, _>(Scope::Singleton, |_| Ok(CounterService::default()));
        Ok(())
    }
}

/// Routes that misbehave on purpose.
pub struct TestView {
    counter: Arc<CounterService>,
}

impl Injectable for TestView {
    fn inject(injector: &Injector) -> anyhow::Result<Self> {
        Ok(Self { counter: injector.get::<CounterService>()? })
    }
}

impl ApiView for TestView {
    const PATH: &'static str = "/test";

    fn routes() -> Router<AppState> {
        Router::new()
            .route("/slow", get(slow))
            .route("/panic", get(panic))
            .route("/echo", post(echo))
            .route("/conflict/{name}", get(conflict))
            .route("/counter", get(counter))
    }
}

async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_secs(3)).await;
    "too late"
}

async fn panic() -> &'static str {
    panic!("handler exploded")
}

async fn echo(ApiJson(body): ApiJson<Value>) -> ApiJson<Value> {
    ApiJson(body)
}

async fn conflict(Path(name): Path<String>) -> Result<&'static str, ApiError> {
    Err(ApiError::conflict(format!("{name} already exists")))
}

async fn counter(Inject(view): Inject<TestView>) -> ApiJson<Value> {
    ApiJson(json!({ "hits": view.counter.hit() }))
}

pub struct TestApp {
    pub base_url: String,
    pub service: ApiService,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Settings used by every test: 1s request timeout, 1KiB body limit.
pub fn test_settings() -> Settings {
    let mut settings: Settings = Settings::default();
    settings.app.host = "127.0.0.1".to_string();
    settings.app.port = 0;
    settings.app.use_listenfd = false;
    settings.app.request_timeout_secs = 1;
    settings.app.max_request_body_size = 1024;
    settings.app.shutdown_timeout_secs = 5;
    settings
}

pub async fn build_service(settings: Settings) -> ApiService {
    ApiService::builder("test-app")
        .settings(settings)
        .configure_logging(false)
        .module(CounterModule)
        .register_view::<TestView>()
        .build()
        .await
        .expect("Failed to build service")
}

/// Starts the service without blocking and without signal handlers.
pub async fn spawn_service(service: ApiService) -> TestApp {
    service
        .start(StartOptions { host: None, port: None, block: false, handle_signals: false })
        .await
        .expect("Failed to start service");

    let addr: std::net::SocketAddr = service.local_addr().expect("Server has no address");
    TestApp { base_url: format!("http://{addr}"), service }
}

pub async fn spawn_app() -> TestApp {
    spawn_service(build_service(test_settings()).await).await
}
