// Service status and health reporting.

use std::{collections::BTreeMap, future::Future, sync::Arc, time::Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::core::lifecycle::{ComponentType, LifecycleContext, LifecycleManager, ListenerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Created,
    Starting,
    Running,
    Stopping,
    Stopped,
    Error,
}

/// Payload of the health endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub app_name: String,
    pub version: String,
    pub hostname: String,
    pub service_status: ServiceStatus,
    pub uptime_seconds: u64,
    pub timestamp: DateTime<Utc>,
    pub components: BTreeMap<String, Value>,
}

impl HealthStatus {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

pub struct ServiceManager {
    app_name: String,
    version: String,
    hostname: String,
    started_at: Instant,
    lifecycle: Arc<LifecycleManager>,
    status: RwLock<ServiceStatus>,
    components: RwLock<BTreeMap<String, Value>>,
}

impl ServiceManager {
    pub fn new(app_name: impl Into<String>, version: impl Into<String>, lifecycle: Arc<LifecycleManager>) -> Self {
        // * hostname identifies the instance in monitoring
        let hostname: String = hostname::get()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string());

        Self {
            app_name: app_name.into(),
            version: version.into(),
            hostname,
            started_at: Instant::now(),
            lifecycle,
            status: RwLock::new(ServiceStatus::Created),
            components: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn status(&self) -> ServiceStatus {
        *self.status.read()
    }

    pub fn set_status(&self, status: ServiceStatus) {
        let previous: ServiceStatus = std::mem::replace(&mut *self.status.write(), status);
        if previous != status {
            info!(from = ?previous, to = ?status, "Service status changed");
        }
    }

    pub fn update_component_health(&self, name: impl Into<String>, health: Value) {
        self.components.write().insert(name.into(), health);
    }

    pub fn remove_component_health(&self, name: &str) -> bool {
        self.components.write().remove(name).is_some()
    }

    pub fn component_count(&self) -> usize {
        self.components.read().len()
    }

    pub fn health_status(&self) -> HealthStatus {
        let status: ServiceStatus = self.status();
        HealthStatus {
            status: if status == ServiceStatus::Running { "ok" } else { "error" },
            app_name: self.app_name.clone(),
            version: self.version.clone(),
            hostname: self.hostname.clone(),
            service_status: status,
            uptime_seconds: self.started_at.elapsed().as_secs(),
            timestamp: Utc::now(),
            components: self.components.read().clone(),
        }
    }

    /// Runs once the service is fully started.
    pub fn add_startup_hook<F, Fut>(&self, name: impl Into<String>, hook: F) -> ListenerId
    where
        F: Fn(LifecycleContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.lifecycle.on_startup(name, hook)
    }

    /// Runs with the background services during shutdown.
    pub fn add_shutdown_hook<F, Fut>(&self, name: impl Into<String>, hook: F) -> ListenerId
    where
        F: Fn(LifecycleContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.lifecycle.on_shutdown(name, ComponentType::Other, hook)
    }
}
