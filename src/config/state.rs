// Application state shared with every handler and middleware

use std::sync::Arc;

use anyhow::Result;

use crate::config::manager::ConfigManager;
use crate::core::{
    injector::{Injector, InjectorError},
    metrics::MetricsManager,
    server::HttpServerManager,
    service_manager::ServiceManager,
};

/// Router state. Every field is resolved once from the injector when the
/// router is built; anything else is reachable through `injector`.
#[derive(Clone)]
pub struct AppState {
    pub injector: Arc<Injector>,
    pub config: Arc<ConfigManager>,
    pub services: Arc<ServiceManager>,
    pub http: Arc<HttpServerManager>,
    pub metrics: Arc<MetricsManager>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("app_name", &self.services.app_name())
            .field("injector", &self.injector)
            .finish()
    }
}

impl AppState {
    /// Resolves the managers the request pipeline needs.
    pub fn from_injector(injector: Arc<Injector>) -> Result<Self> {
        Ok(Self {
            config: injector.get::<ConfigManager>()?,
            services: injector.get::<ServiceManager>()?,
            http: injector.get::<HttpServerManager>()?,
            metrics: injector.get::<MetricsManager>()?,
            injector,
        })
    }

    /// Shortcut for `state.injector.get::<T>()`.
    pub fn get<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, InjectorError> {
        self.injector.get::<T>()
    }
}
