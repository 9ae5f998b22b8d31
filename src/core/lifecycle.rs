// Start of file: /src/core/lifecycle.rs

// * Ordered lifecycle hooks for startup and shutdown.
// * Listeners are grouped per event type and run one after another.

use std::{
    collections::HashMap,
    fmt,
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use anyhow::Context;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::core::shutdown::ShutdownContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEventType {
    PreStartup,
    PostStartup,
    PreShutdown,
    PostShutdown,
    PreHttpStart,
    PostHttpStart,
    PreHttpStop,
    PostHttpStop,
    PreServicesStop,
    PostServicesStop,
    PreCleanup,
    PostCleanup,
    PreInjectorCreation,
    PostInjectorCreation,
}

impl LifecycleEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreStartup => "pre_startup",
            Self::PostStartup => "post_startup",
            Self::PreShutdown => "pre_shutdown",
            Self::PostShutdown => "post_shutdown",
            Self::PreHttpStart => "pre_http_start",
            Self::PostHttpStart => "post_http_start",
            Self::PreHttpStop => "pre_http_stop",
            Self::PostHttpStop => "post_http_stop",
            Self::PreServicesStop => "pre_services_stop",
            Self::PostServicesStop => "post_services_stop",
            Self::PreCleanup => "pre_cleanup",
            Self::PostCleanup => "post_cleanup",
            Self::PreInjectorCreation => "pre_injector_creation",
            Self::PostInjectorCreation => "post_injector_creation",
        }
    }

    /// Failures in these events abort startup.
    pub fn is_startup(&self) -> bool {
        matches!(
            self,
            Self::PreStartup | Self::PostStartup | Self::PreHttpStart | Self::PostHttpStart
        )
    }
}

impl fmt::Display for LifecycleEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of component a listener belongs to. Drives default ordering and the
/// shutdown phase the listener runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentType {
    Api,
    Database,
    Cache,
    Queue,
    Scheduler,
    Storage,
    Core,
    Other,
}

impl ComponentType {
    /// Higher stops earlier.
    pub fn shutdown_priority(&self) -> i32 {
        match self {
            Self::Api => 100,
            Self::Scheduler => 80,
            Self::Queue => 60,
            Self::Other => 50,
            Self::Cache => 40,
            Self::Storage => 20,
            Self::Database => 10,
            Self::Core => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Database => "database",
            Self::Cache => "cache",
            Self::Queue => "queue",
            Self::Scheduler => "scheduler",
            Self::Storage => "storage",
            Self::Core => "core",
            Self::Other => "other",
        }
    }
}

/// Startup runs in reverse shutdown order.
pub fn default_priority(event_type: LifecycleEventType, component_type: ComponentType) -> i32 {
    if event_type.is_startup() {
        100 - component_type.shutdown_priority()
    } else {
        component_type.shutdown_priority()
    }
}

/// Passed to every listener.
#[derive(Debug, Clone)]
pub struct LifecycleContext {
    pub event: LifecycleEventType,
    pub shutdown: Option<ShutdownContext>,
}

impl LifecycleContext {
    pub fn new(event: LifecycleEventType) -> Self {
        Self { event, shutdown: None }
    }
}

pub type LifecycleCallback =
    Arc<dyn Fn(LifecycleContext) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Clone)]
pub struct LifecycleListener {
    pub id: ListenerId,
    pub name: String,
    pub event_type: LifecycleEventType,
    pub component_type: ComponentType,
    pub priority: i32,
    callback: LifecycleCallback,
}

impl fmt::Debug for LifecycleListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleListener")
            .field("name", &self.name)
            .field("event_type", &self.event_type)
            .field("component_type", &self.component_type)
            .field("priority", &self.priority)
            .finish()
    }
}

impl LifecycleListener {
    pub async fn invoke(&self, context: LifecycleContext) -> anyhow::Result<()> {
        (self.callback)(context).await
    }
}

#[derive(Default)]
pub struct LifecycleManager {
    listeners: RwLock<HashMap<LifecycleEventType, Vec<LifecycleListener>>>,
    next_id: AtomicU64,
}

impl LifecycleManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn wrap<F, Fut>(callback: F) -> LifecycleCallback
    where
        F: Fn(LifecycleContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Arc::new(move |ctx: LifecycleContext| -> BoxFuture<'static, anyhow::Result<()>> { Box::pin(callback(ctx)) })
    }

    /// Registers a listener for an `Other` component with the default priority.
    pub fn register<F, Fut>(&self, event_type: LifecycleEventType, name: impl Into<String>, callback: F) -> ListenerId
    where
        F: Fn(LifecycleContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register_with(event_type, name, ComponentType::Other, None, callback)
    }

    pub fn register_with<F, Fut>(
        &self,
        event_type: LifecycleEventType,
        name: impl Into<String>,
        component_type: ComponentType,
        priority: Option<i32>,
        callback: F,
    ) -> ListenerId
    where
        F: Fn(LifecycleContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register_for_events(&[event_type], name, component_type, priority, callback)
    }

    /// Registers one callback for several events under a single id.
    pub fn register_for_events<F, Fut>(
        &self,
        event_types: &[LifecycleEventType],
        name: impl Into<String>,
        component_type: ComponentType,
        priority: Option<i32>,
        callback: F,
    ) -> ListenerId
    where
        F: Fn(LifecycleContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let id: ListenerId = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let name: String = name.into();
        let callback: LifecycleCallback = Self::wrap(callback);

        let mut listeners = self.listeners.write();
        for event_type in event_types {
            let listener: LifecycleListener = LifecycleListener {
                id,
                name: name.clone(),
                event_type: *event_type,
                component_type,
                priority: priority.unwrap_or_else(|| default_priority(*event_type, component_type)),
                callback: callback.clone(),
            };
            debug!(
                listener = %listener.name,
                event = %event_type,
                component = component_type.as_str(),
                priority = listener.priority,
                "Registered lifecycle listener"
            );

            let bucket: &mut Vec<LifecycleListener> = listeners.entry(*event_type).or_default();
            bucket.push(listener);
            bucket.sort_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then_with(|| a.name.cmp(&b.name))
                    .then_with(|| a.id.0.cmp(&b.id.0))
            });
        }

        id
    }

    /// Runs after the HTTP server is up.
    pub fn on_startup<F, Fut>(&self, name: impl Into<String>, callback: F) -> ListenerId
    where
        F: Fn(LifecycleContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register(LifecycleEventType::PostStartup, name, callback)
    }

    /// Runs during the shutdown phase of `component_type`.
    pub fn on_shutdown<F, Fut>(&self, name: impl Into<String>, component_type: ComponentType, callback: F) -> ListenerId
    where
        F: Fn(LifecycleContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register_with(LifecycleEventType::PreShutdown, name, component_type, None, callback)
    }

    pub fn unregister(&self, event_type: LifecycleEventType, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let Some(bucket) = listeners.get_mut(&event_type) else {
            return false;
        };
        let before: usize = bucket.len();
        bucket.retain(|listener| listener.id != id);
        before != bucket.len()
    }

    /// Removes `id` from every event and returns how many entries were dropped.
    pub fn unregister_all(&self, id: ListenerId) -> usize {
        let mut removed: usize = 0;
        for bucket in self.listeners.write().values_mut() {
            let before: usize = bucket.len();
            bucket.retain(|listener| listener.id != id);
            removed += before - bucket.len();
        }
        removed
    }

    /// Snapshot in execution order.
    pub fn listeners_for_event(&self, event_type: LifecycleEventType) -> Vec<LifecycleListener> {
        self.listeners.read().get(&event_type).cloned().unwrap_or_default()
    }

    pub async fn trigger_event(&self, event_type: LifecycleEventType) -> anyhow::Result<()> {
        self.trigger_event_with(LifecycleContext::new(event_type)).await
    }

    /// Runs the listeners of `context.event` in order. A failure stops the
    /// sequence only for startup events; otherwise it is logged.
    pub async fn trigger_event_with(&self, context: LifecycleContext) -> anyhow::Result<()> {
        let event_type: LifecycleEventType = context.event;
        let listeners: Vec<LifecycleListener> = self.listeners_for_event(event_type);
        if listeners.is_empty() {
            return Ok(());
        }

        debug!(event = %event_type, count = listeners.len(), "Triggering lifecycle event");
        for listener in listeners {
            if let Err(err) = listener.invoke(context.clone()).await {
                if event_type.is_startup() {
                    error!(event = %event_type, listener = %listener.name, error = %err, "Lifecycle listener failed");
                    return Err(err).with_context(|| format!("{event_type} listener '{}' failed", listener.name));
                }
                warn!(event = %event_type, listener = %listener.name, error = %err, "Lifecycle listener failed");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &str) -> impl Fn(LifecycleContext) -> futures::future::Ready<anyhow::Result<()>> + Send + Sync + 'static {
        let log: Arc<Mutex<Vec<String>>> = log.clone();
        let tag: String = tag.to_string();
        move |_| {
            log.lock().push(tag.clone());
            futures::future::ready(Ok(()))
        }
    }

    #[test]
    fn startup_priorities_invert_shutdown_priorities() {
        assert_eq!(default_priority(LifecycleEventType::PreStartup, ComponentType::Database), 90);
        assert_eq!(default_priority(LifecycleEventType::PreStartup, ComponentType::Api), 0);
        assert_eq!(default_priority(LifecycleEventType::PreShutdown, ComponentType::Api), 100);
        assert_eq!(default_priority(LifecycleEventType::PreCleanup, ComponentType::Core), 0);
    }

    #[tokio::test]
    async fn listeners_run_by_priority_then_name() {
        let manager: LifecycleManager = LifecycleManager::new();
        let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        manager.register_with(LifecycleEventType::PreStartup, "api", ComponentType::Api, None, recorder(&log, "api"));
        manager.register_with(LifecycleEventType::PreStartup, "db", ComponentType::Database, None, recorder(&log, "db"));
        manager.register_with(LifecycleEventType::PreStartup, "b-cache", ComponentType::Cache, Some(60), recorder(&log, "b"));
        manager.register_with(LifecycleEventType::PreStartup, "a-cache", ComponentType::Cache, Some(60), recorder(&log, "a"));

        manager.trigger_event(LifecycleEventType::PreStartup).await.unwrap();
        assert_eq!(*log.lock(), vec!["db", "a", "b", "api"]);
    }

    #[tokio::test]
    async fn startup_failures_propagate_other_failures_do_not() {
        let manager: LifecycleManager = LifecycleManager::new();
        let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        for event in [LifecycleEventType::PreStartup, LifecycleEventType::PreCleanup] {
            manager.register_with(event, "boom", ComponentType::Other, Some(10), |_| {
                futures::future::ready(Err::<(), _>(anyhow::anyhow!("boom")))
            });
            manager.register_with(event, "after", ComponentType::Other, Some(1), recorder(&log, event.as_str()));
        }

        assert!(manager.trigger_event(LifecycleEventType::PreStartup).await.is_err());
        assert!(manager.trigger_event(LifecycleEventType::PreCleanup).await.is_ok());
        assert_eq!(*log.lock(), vec!["pre_cleanup"]);
    }

    #[tokio::test]
    async fn unregister_removes_listener_from_all_events() {
        let manager: LifecycleManager = LifecycleManager::new();
        let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let id: ListenerId = manager.register_for_events(
            &[LifecycleEventType::PreStartup, LifecycleEventType::PostShutdown],
            "twice",
            ComponentType::Core,
            None,
            recorder(&log, "twice"),
        );

        assert_eq!(manager.listeners_for_event(LifecycleEventType::PostShutdown).len(), 1);
        assert!(manager.unregister(LifecycleEventType::PreStartup, id));
        assert!(!manager.unregister(LifecycleEventType::PreStartup, id));
        assert_eq!(manager.unregister_all(id), 1);
        manager.trigger_event(LifecycleEventType::PostShutdown).await.unwrap();
        assert!(log.lock().is_empty());
    }
}

// End of file: /src/core/lifecycle.rs
