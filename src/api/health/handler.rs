// Health and status handlers

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::config::state::AppState;
use crate::core::injector::Inject;
use crate::core::service_manager::{HealthStatus, ServiceManager, ServiceStatus};
use crate::utils::error_handler::ApiError;

use super::routes::HealthCheckView;

/// Short status answer of `/api/system/status`.
#[derive(Debug, Serialize)]
pub struct StatusSummary {
    pub status: ServiceStatus,
    pub version: String,
    pub components: usize,
}

/// Full health payload. Always 200; `status` carries "ok" or "error".
#[instrument(name = "health", skip_all)]
pub async fn root_health_handler(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(state.services.health_status())
}

#[instrument(name = "system_health", skip_all)]
pub async fn health_handler(Inject(view): Inject<HealthCheckView>) -> Json<HealthStatus> {
    Json(view.services().health_status())
}

/// 503 unless the service is running.
#[instrument(name = "system_status", skip_all)]
pub async fn status_handler(Inject(view): Inject<HealthCheckView>) -> Result<Json<StatusSummary>, ApiError> {
    let services: &Arc<ServiceManager> = view.services();
    let health: HealthStatus = services.health_status();
    debug!(status = health.status, "Status check");

    if !health.is_ok() {
        let status: String = format!("{:?}", health.service_status).to_lowercase();
        return Err(ApiError::service_unavailable(format!("Service is {status}")));
    }

    Ok(Json(StatusSummary {
        status: services.status(),
        version: health.version,
        components: health.components.len(),
    }))
}
