// Start of file: /src/app.rs

// * Demo application served by `fautil serve`: one view and one injected
// * service, wired through ApiService like a generated project would be.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use anyhow::Result;
use axum::{extract::Path, routing::get, Router};
use serde::Serialize;
use tracing::instrument;

use crate::api::view::ApiView;
use crate::config::{settings::ConfigSource, state::AppState};
use crate::core::{
    api_service::{ApiService, ApiServiceBuilder},
    injector::{Inject, Injectable, Injector},
};
use crate::utils::response_handler::ApiResponse;

/// Counts greetings across requests.
#[derive(Debug, Default)]
pub struct GreetingService {
    served: AtomicU64,
}

impl Injectable for GreetingService {
    fn inject(_: &Injector) -> Result<Self> {
        Ok(Self::default())
    }
}

impl GreetingService {
    pub fn greet(&self, name: &str) -> Greeting {
        let count: u64 = self.served.fetch_add(1, Ordering::Relaxed) + 1;
        Greeting { message: format!("Hello, {name}!"), count }
    }

    pub fn served(&self) -> u64 {
        self.served.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Greeting {
    pub message: String,
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub struct HelloMessage {
    pub message: &'static str,
}

pub struct HelloView {
    greetings: Arc<GreetingService>,
}

impl Injectable for HelloView {
    fn inject(injector: &Injector) -> Result<Self> {
        Ok(Self { greetings: injector.get::<GreetingService>()? })
    }
}

impl ApiView for HelloView {
    const PATH: &'static str = "/hello";

    fn routes() -> Router<AppState> {
        Router::new()
            .route("/", get(hello_handler))
            .route("/{name}", get(greet_handler))
    }
}

#[instrument(name = "hello", skip_all)]
pub async fn hello_handler() -> axum::Json<HelloMessage> {
    axum::Json(HelloMessage { message: "Hello, World!" })
}

#[instrument(name = "greet", skip_all)]
pub async fn greet_handler(Inject(view): Inject<HelloView>, Path(name): Path<String>) -> ApiResponse<Greeting> {
    ApiResponse::success(view.greetings.greet(&name))
}

/// Name the demo service runs under.
pub const DEMO_APP_NAME: &str = "fautil-demo";

/// Adds the demo package (greeting service and hello view) to `builder`.
pub fn with_demo(builder: ApiServiceBuilder) -> ApiServiceBuilder {
    builder.discovery_package("demo", |scan| {
        scan.service::<GreetingService>().view::<HelloView>();
    })
}

/// Builder for the demo service loading settings from `source`.
pub fn demo_service(source: ConfigSource) -> ApiServiceBuilder {
    with_demo(ApiService::builder(DEMO_APP_NAME).config(source))
}

// End of file: /src/app.rs
