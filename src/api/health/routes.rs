// Health route definitions

use std::sync::Arc;

use axum::{routing::get, Router};

use crate::api::view::ApiView;
use crate::config::state::AppState;
use crate::core::injector::{Injectable, Injector};
use crate::core::service_manager::ServiceManager;

use super::handler;

/// System endpoints registered by every service.
pub struct HealthCheckView {
    services: Arc<ServiceManager>,
}

impl HealthCheckView {
    pub fn services(&self) -> &Arc<ServiceManager> {
        &self.services
    }
}

impl Injectable for HealthCheckView {
    fn inject(injector: &Injector) -> anyhow::Result<Self> {
        Ok(Self { services: injector.get::<ServiceManager>()? })
    }
}

impl ApiView for HealthCheckView {
    const PATH: &'static str = "/api/system";

    fn routes() -> Router<AppState> {
        Router::new()
            .route("/health", get(handler::health_handler))
            .route("/status", get(handler::status_handler))
    }
}

/// Root probe, outside any view.
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(handler::root_health_handler))
}
