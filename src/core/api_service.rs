// Start of file: /src/core/api_service.rs

// * ApiService wires every manager together and drives the process:
// * build the injector, run startup through the lifecycle events, serve HTTP,
// * then hand control to the shutdown manager.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::{Context, Result};
use axum::{
    error_handling::HandleErrorLayer,
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    Router,
};
use parking_lot::Mutex;
use serde_json::json;
use tower::{timeout::TimeoutLayer, ServiceBuilder};
use tower_http::catch_panic::CatchPanicLayer;
use tracing::{error, info, warn};

use crate::api::{
    health::{health_routes, HealthCheckView},
    metrics::metrics_routes,
    middleware::{cors_layer, record_metrics, request_context, request_logging, request_tracking},
    view::{ApiView, ViewRegistration},
};
use crate::config::{
    manager::ConfigManager,
    settings::{ConfigSource, Settings},
    state::AppState,
};
use crate::core::{
    discovery::{DiscoveredComponents, DiscoveryManager, PackageScanner},
    events::{AppStartEvent, AppStopEvent, EventBus},
    injector::{Injector, Module, Scope},
    lifecycle::{ComponentType, LifecycleContext, LifecycleEventType, LifecycleManager},
    logging::LoggingManager,
    metrics::MetricsManager,
    server::{HttpServerManager, ServerConfig},
    service_manager::{ServiceManager, ServiceStatus},
    shutdown::{ShutdownManager, ShutdownPhase, ShutdownReason},
};
use crate::database::{DatabaseService, RedisCache};
use crate::scheduler::Scheduler;
use crate::utils::error_handler::{fallback_handler, handle_global_error, handle_panic};
use crate::utils::response_handler::normalize_error_response;

/// How `start` runs.
#[derive(Debug, Clone)]
pub struct StartOptions {
    /// Overrides `app.host`.
    pub host: Option<String>,
    /// Overrides `app.port`; 0 picks a free port.
    pub port: Option<u16>,
    /// Wait in `start` until the service has shut down.
    pub block: bool,
    /// Turn Ctrl+C / TERM into a graceful shutdown.
    pub handle_signals: bool,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self { host: None, port: None, block: true, handle_signals: true }
    }
}

// ---------------------------------------------------------------------------
// ServiceModule
// ---------------------------------------------------------------------------

/// Binds the framework managers. Anything a user module bound first is kept.
pub struct ServiceModule {
    app_name: String,
    config: Arc<ConfigManager>,
    lifecycle: Arc<LifecycleManager>,
}

impl ServiceModule {
    pub fn new(app_name: impl Into<String>, config: Arc<ConfigManager>, lifecycle: Arc<LifecycleManager>) -> Self {
        Self { app_name: app_name.into(), config, lifecycle }
    }
}

fn bind_default<T, F>(injector: &Injector, provider: F)
where
    T: Send + Sync + 'static,
    F: Fn(&Injector) -> Result<T> + Send + Sync + 'static,
{
    if !injector.has_binding::<T>() {
        injector.bind_provider::<T, _>(Scope::Singleton, provider);
    }
}

impl Module for ServiceModule {
    fn name(&self) -> &str {
        "ServiceModule"
    }

    fn configure(&self, injector: &Injector) -> Result<()> {
        let settings: Arc<Settings> = self.config.settings();

        if !injector.has_binding::<ConfigManager>() {
            injector.bind_arc(self.config.clone());
        }
        if !injector.has_binding::<LifecycleManager>() {
            injector.bind_arc(self.lifecycle.clone());
        }

        let server_config: ServerConfig = ServerConfig::from_app_config(&settings.app);
        bind_default::<HttpServerManager, _>(injector, move |_| Ok(HttpServerManager::new(server_config.clone())));

        bind_default::<ShutdownManager, _>(injector, |injector: &Injector| {
            Ok(ShutdownManager::new(
                injector.get::<LifecycleManager>()?,
                Some(injector.get::<HttpServerManager>()?),
            ))
        });

        let app_name: String = self.app_name.clone();
        let version: String = settings.app.version.clone();
        bind_default::<ServiceManager, _>(injector, move |injector: &Injector| {
            Ok(ServiceManager::new(app_name.clone(), version.clone(), injector.get::<LifecycleManager>()?))
        });

        let app_name: String = self.app_name.clone();
        bind_default::<MetricsManager, _>(injector, move |_| MetricsManager::new(&app_name));
        bind_default::<EventBus, _>(injector, |_| Ok(EventBus::new()));
        bind_default::<Scheduler, _>(injector, |_| Ok(Scheduler::new()));
        bind_default::<LoggingManager, _>(injector, |_| Ok(LoggingManager::new()));
        bind_default::<DiscoveryManager, _>(injector, |_| Ok(DiscoveryManager::new()));

        if let Some(db) = settings.db.clone() {
            bind_default::<DatabaseService, _>(injector, move |_| Ok(DatabaseService::new(db.clone())));
        }
        if let Some(redis) = settings.redis.clone() {
            bind_default::<RedisCache, _>(injector, move |_| RedisCache::new(redis.clone()));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

type PackageRegistration = Box<dyn FnOnce(&DiscoveryManager) + Send>;

pub struct ApiServiceBuilder {
    app_name: String,
    source: Option<ConfigSource>,
    settings: Option<Settings>,
    modules: Vec<Arc<dyn Module>>,
    views: Vec<ViewRegistration>,
    packages: Vec<PackageRegistration>,
    package_names: Vec<String>,
    lifecycle: Arc<LifecycleManager>,
    configure_logging: bool,
}

impl ApiServiceBuilder {
    fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            source: None,
            settings: None,
            modules: Vec::new(),
            views: Vec::new(),
            packages: Vec::new(),
            package_names: Vec::new(),
            lifecycle: Arc::new(LifecycleManager::new()),
            configure_logging: true,
        }
    }

    /// Load settings from these sources.
    pub fn config(mut self, source: ConfigSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Use these settings as-is; takes precedence over `config`.
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Installed before the framework bindings, so it can replace them.
    pub fn module(mut self, module: impl Module + 'static) -> Self {
        self.modules.push(Arc::new(module));
        self
    }

    pub fn register_view<V: ApiView>(mut self) -> Self {
        push_view(&mut self.views, ViewRegistration::of::<V>());
        self
    }

    /// Registers a package that is discovered when the service starts.
    pub fn discovery_package<F>(mut self, name: impl Into<String>, register: F) -> Self
    where
        F: Fn(&mut PackageScanner) + Send + Sync + 'static,
    {
        let name: String = name.into();
        self.package_names.push(name.clone());
        self.packages.push(Box::new(move |discovery: &DiscoveryManager| discovery.register_package(name, register)));
        self
    }

    /// Lifecycle manager shared with the service, for listeners that must
    /// exist before the injector is built.
    pub fn lifecycle(&self) -> &Arc<LifecycleManager> {
        &self.lifecycle
    }

    /// Install the global tracing subscriber from `log` settings (default on).
    pub fn configure_logging(mut self, enabled: bool) -> Self {
        self.configure_logging = enabled;
        self
    }

    pub async fn build(self) -> Result<ApiService> {
        let config: Arc<ConfigManager> = Arc::new(match (self.settings, self.source) {
            (Some(settings), _) => ConfigManager::from_settings(settings),
            (None, source) => ConfigManager::load(source.unwrap_or_default())?,
        });
        let lifecycle: Arc<LifecycleManager> = self.lifecycle;

        lifecycle.trigger_event(LifecycleEventType::PreInjectorCreation).await?;

        let injector: Injector = Injector::new();
        for module in &self.modules {
            injector
                .install(module.as_ref())
                .with_context(|| format!("Failed to install module {}", module.name()))?;
        }
        injector.install(&ServiceModule::new(&self.app_name, config.clone(), lifecycle.clone()))?;
        let injector: Arc<Injector> = Arc::new(injector);

        let service: ApiService = ApiService {
            app_name: self.app_name,
            config: injector.get::<ConfigManager>()?,
            lifecycle: injector.get::<LifecycleManager>()?,
            http: injector.get::<HttpServerManager>()?,
            shutdown: injector.get::<ShutdownManager>()?,
            services: injector.get::<ServiceManager>()?,
            events: injector.get::<EventBus>()?,
            scheduler: injector.get::<Scheduler>()?,
            discovery: injector.get::<DiscoveryManager>()?,
            logging: injector.get::<LoggingManager>()?,
            injector,
            views: Mutex::new(self.views),
            packages: self.package_names,
            started: AtomicBool::new(false),
        };

        for register in self.packages {
            register(&service.discovery);
        }

        if self.configure_logging {
            service.logging.configure(&service.config.settings().log)?;
        }

        service.configure_shutdown();
        service.register_service_hooks();
        service.register_infrastructure_hooks();
        service.scheduler.attach(&service.events);

        service.lifecycle.trigger_event(LifecycleEventType::PostInjectorCreation).await?;
        info!(app = %service.app_name, bindings = service.injector.binding_count(), "Service built");
        Ok(service)
    }
}

fn push_view(views: &mut Vec<ViewRegistration>, view: ViewRegistration) -> bool {
    if views.iter().any(|known| known.type_id == view.type_id) {
        warn!(view = view.name, "View already registered, ignoring");
        return false;
    }
    views.push(view);
    true
}

// ---------------------------------------------------------------------------
// ApiService
// ---------------------------------------------------------------------------

pub struct ApiService {
    app_name: String,
    injector: Arc<Injector>,
    config: Arc<ConfigManager>,
    lifecycle: Arc<LifecycleManager>,
    http: Arc<HttpServerManager>,
    shutdown: Arc<ShutdownManager>,
    services: Arc<ServiceManager>,
    events: Arc<EventBus>,
    scheduler: Arc<Scheduler>,
    discovery: Arc<DiscoveryManager>,
    logging: Arc<LoggingManager>,
    views: Mutex<Vec<ViewRegistration>>,
    packages: Vec<String>,
    started: AtomicBool,
}

impl std::fmt::Debug for ApiService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiService")
            .field("app_name", &self.app_name)
            .field("status", &self.services.status())
            .field("views", &*self.views.lock())
            .finish()
    }
}

impl ApiService {
    pub fn builder(app_name: impl Into<String>) -> ApiServiceBuilder {
        ApiServiceBuilder::new(app_name)
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn injector(&self) -> &Arc<Injector> {
        &self.injector
    }

    pub fn config(&self) -> &Arc<ConfigManager> {
        &self.config
    }

    pub fn lifecycle(&self) -> &Arc<LifecycleManager> {
        &self.lifecycle
    }

    pub fn shutdown_manager(&self) -> &Arc<ShutdownManager> {
        &self.shutdown
    }

    pub fn services(&self) -> &Arc<ServiceManager> {
        &self.services
    }

    pub fn http(&self) -> &Arc<HttpServerManager> {
        &self.http
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.http.local_addr()
    }

    /// Adds a view before `start`. Returns false if it was already registered.
    pub fn register_view<V: ApiView>(&self) -> bool {
        push_view(&mut self.views.lock(), ViewRegistration::of::<V>())
    }

    fn configure_shutdown(&self) {
        let settings: Arc<Settings> = self.config.settings();
        self.shutdown.update_config(|config| {
            config.timeout = Duration::from_secs(settings.app.shutdown_timeout_secs);
            config.wait_api_requests = settings.app.graceful_shutdown;
        });
    }

    /// Status transitions and the application stop event.
    fn register_service_hooks(&self) {
        let services: Arc<ServiceManager> = self.services.clone();
        self.lifecycle.register_with(
            LifecycleEventType::PreHttpStop,
            "service.stopping",
            ComponentType::Core,
            Some(i32::MAX),
            move |_| {
                services.set_status(ServiceStatus::Stopping);
                futures::future::ready(Ok(()))
            },
        );

        let services: Arc<ServiceManager> = self.services.clone();
        self.lifecycle.register_with(
            LifecycleEventType::PostHttpStop,
            "service.http_stopped",
            ComponentType::Api,
            None,
            move |_| {
                services.update_component_health("http", json!({ "status": "stopped" }));
                futures::future::ready(Ok(()))
            },
        );

        let events: Arc<EventBus> = self.events.clone();
        let app_name: String = self.app_name.clone();
        self.lifecycle.register_with(
            LifecycleEventType::PreServicesStop,
            "service.stop_event",
            ComponentType::Core,
            None,
            move |ctx: LifecycleContext| {
                let events: Arc<EventBus> = events.clone();
                let event: AppStopEvent = AppStopEvent {
                    app_name: app_name.clone(),
                    reason: ctx.shutdown.and_then(|shutdown| shutdown.message),
                };
                async move {
                    events.post(event).await;
                    Ok::<(), anyhow::Error>(())
                }
            },
        );

        let services: Arc<ServiceManager> = self.services.clone();
        self.lifecycle.register_with(
            LifecycleEventType::PostShutdown,
            "service.stopped",
            ComponentType::Core,
            None,
            move |_| {
                services.set_status(ServiceStatus::Stopped);
                futures::future::ready(Ok(()))
            },
        );
    }

    /// Opens configured database / redis connections on startup and closes
    /// them in the cleanup phase.
    fn register_infrastructure_hooks(&self) {
        if let Some(database) = self.injector.try_get::<DatabaseService>() {
            let services: Arc<ServiceManager> = self.services.clone();
            let db: Arc<DatabaseService> = database.clone();
            self.lifecycle.register_with(
                LifecycleEventType::PreStartup,
                "database.initialize",
                ComponentType::Database,
                None,
                move |_| {
                    let services: Arc<ServiceManager> = services.clone();
                    let db: Arc<DatabaseService> = db.clone();
                    async move {
                        match db.initialize().await {
                            Ok(()) => {
                                services.update_component_health("database", json!({ "status": "ok" }));
                                Ok(())
                            }
                            Err(err) => {
                                services.update_component_health(
                                    "database",
                                    json!({ "status": "error", "error": format!("{err:#}") }),
                                );
                                Err(err)
                            }
                        }
                    }
                },
            );

            let services: Arc<ServiceManager> = self.services.clone();
            self.lifecycle.on_shutdown("database.close", ComponentType::Database, move |_| {
                let services: Arc<ServiceManager> = services.clone();
                let db: Arc<DatabaseService> = database.clone();
                async move {
                    db.shutdown().await;
                    services.update_component_health("database", json!({ "status": "closed" }));
                    Ok::<(), anyhow::Error>(())
                }
            });
        }

        if let Some(cache) = self.injector.try_get::<RedisCache>() {
            let services: Arc<ServiceManager> = self.services.clone();
            let redis: Arc<RedisCache> = cache.clone();
            self.lifecycle.register_with(
                LifecycleEventType::PreStartup,
                "redis.initialize",
                ComponentType::Cache,
                None,
                move |_| {
                    let services: Arc<ServiceManager> = services.clone();
                    let redis: Arc<RedisCache> = redis.clone();
                    async move {
                        match redis.initialize().await {
                            Ok(()) => {
                                services.update_component_health("redis", json!({ "status": "ok" }));
                                Ok(())
                            }
                            Err(err) => {
                                services.update_component_health(
                                    "redis",
                                    json!({ "status": "error", "error": format!("{err:#}") }),
                                );
                                Err(err)
                            }
                        }
                    }
                },
            );

            let services: Arc<ServiceManager> = self.services.clone();
            self.lifecycle.on_shutdown("redis.close", ComponentType::Cache, move |_| {
                let services: Arc<ServiceManager> = services.clone();
                let redis: Arc<RedisCache> = cache.clone();
                async move {
                    redis.shutdown().await;
                    services.update_component_health("redis", json!({ "status": "closed" }));
                    Ok::<(), anyhow::Error>(())
                }
            });
        }
    }

    /// Runs discovery and returns every view to mount.
    fn prepare_views(&self) -> Result<Vec<ViewRegistration>> {
        let found: DiscoveredComponents = self.discovery.discover_all(&self.packages);
        self.discovery.register_components(&self.injector, &found)?;

        let mut views = self.views.lock();
        for view in found.views {
            push_view(&mut views, view);
        }
        Ok(views.clone())
    }

    /// Full application router: built-in endpoints, views, fallback and the
    /// middleware stack, with state applied.
    pub fn router(&self) -> Result<Router> {
        let settings: Arc<Settings> = self.config.settings();
        let state: AppState = AppState::from_injector(self.injector.clone())?;

        let mut views: Vec<ViewRegistration> = vec![ViewRegistration::of::<HealthCheckView>()];
        for view in self.views.lock().iter() {
            if !views.iter().any(|known| known.type_id == view.type_id) {
                views.push(*view);
            }
        }

        let mut router: Router<AppState> = health_routes();
        for view in &views {
            view.bind(&self.injector);
            router = router.merge(view.router());
        }
        if settings.middleware.enable_metrics {
            router = router.merge(metrics_routes(&settings.middleware.metrics_path));
        }

        let timeout: Duration = Duration::from_secs(settings.app.request_timeout_secs);

        // * Outermost first. HandleErrorLayer must wrap the timeout so the
        // * layers above it see an infallible service.
        let app: Router = router
            .fallback(fallback_handler)
            .layer(
                ServiceBuilder::new()
                    .layer(from_fn_with_state(state.clone(), request_context))
                    .layer(from_fn_with_state(state.clone(), request_tracking))
                    .layer(from_fn_with_state(state.clone(), record_metrics))
                    .layer(from_fn_with_state(state.clone(), request_logging))
                    .layer(from_fn(normalize_error_response))
                    .layer(CatchPanicLayer::custom(handle_panic))
                    .layer(cors_layer(&settings.app))
                    .layer(HandleErrorLayer::new(handle_global_error))
                    .layer(TimeoutLayer::new(timeout))
                    .layer(DefaultBodyLimit::max(settings.app.max_request_body_size)),
            )
            .with_state(state);

        Ok(app)
    }

    /// Starts the service. With `options.block` this returns once the
    /// service has shut down. Starting twice is a no-op.
    pub async fn start(&self, options: StartOptions) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!(app = %self.app_name, "Service already started");
            return Ok(());
        }

        self.services.set_status(ServiceStatus::Starting);
        if let Err(err) = self.run_startup(&options).await {
            error!(app = %self.app_name, error = %format!("{err:#}"), "Service failed to start");
            self.services.set_status(ServiceStatus::Error);
            self.http.stop().await;
            self.started.store(false, Ordering::SeqCst);
            return Err(err);
        }

        if options.block {
            self.shutdown.wait_until_complete().await;
            self.settle_after_shutdown();
        }
        Ok(())
    }

    async fn run_startup(&self, options: &StartOptions) -> Result<()> {
        let views: Vec<ViewRegistration> = self.prepare_views()?;
        info!(app = %self.app_name, views = views.len(), "Starting service");

        self.lifecycle.trigger_event(LifecycleEventType::PreStartup).await?;

        let router: Router = self.router()?;
        self.http.update_config(|config| {
            if let Some(host) = &options.host {
                config.host = host.clone();
            }
            if let Some(port) = options.port {
                config.port = port;
            }
        });

        if options.handle_signals {
            self.shutdown.register_signal_handlers();
        }

        self.lifecycle.trigger_event(LifecycleEventType::PreHttpStart).await?;
        let addr = self.http.start(router).await?;
        self.services.update_component_health("http", json!({ "status": "ok", "address": addr.to_string() }));
        self.lifecycle.trigger_event(LifecycleEventType::PostHttpStart).await?;
        self.lifecycle.trigger_event(LifecycleEventType::PostStartup).await?;

        self.services.set_status(ServiceStatus::Running);
        self.events.post(AppStartEvent { app_name: self.app_name.clone() }).await;
        info!(app = %self.app_name, address = %addr, "Service started");
        Ok(())
    }

    /// Triggers an API_CALL shutdown and waits for it. Returns whether the
    /// sequence completed in time.
    pub async fn stop(&self) -> bool {
        self.shutdown.trigger_shutdown(ShutdownReason::ApiCall, Some("stop requested".to_string()));
        self.shutdown.wait_for_shutdown(None).await && self.settle_after_shutdown()
    }

    // PostShutdown never fires when the sequence times out
    fn settle_after_shutdown(&self) -> bool {
        match self.shutdown.phase() {
            ShutdownPhase::Failed => {
                error!(app = %self.app_name, "Shutdown did not complete in time");
                self.services.set_status(ServiceStatus::Error);
                false
            }
            _ => true,
        }
    }
}


// End of file: /src/core/api_service.rs
