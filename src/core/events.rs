// Start of file: /src/core/events.rs

// * In-process typed event bus.
// * Handlers are keyed by the event's TypeId and run in ascending priority,
// * so MONITOR handlers see the final state.

use std::{
    any::{type_name, Any, TypeId},
    collections::HashMap,
    future::Future,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventPriority {
    Lowest,
    Low,
    Normal,
    High,
    Highest,
    Monitor,
}

pub trait Event: Send + Sync + 'static {
    /// Whether handlers may cancel the event.
    fn cancellable(&self) -> bool {
        false
    }

    fn event_name(&self) -> &'static str {
        type_name::<Self>()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventError {
    #[error("event {0} cannot be cancelled")]
    NotCancellable(&'static str),
}

/// An event in flight plus its cancellation flag.
#[derive(Debug)]
pub struct Posted<E> {
    event: E,
    cancelled: AtomicBool,
}

impl<E: Event> Posted<E> {
    pub fn event(&self) -> &E {
        &self.event
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn cancel(&self) -> Result<(), EventError> {
        if !self.event.cancellable() {
            return Err(EventError::NotCancellable(self.event.event_name()));
        }
        self.cancelled.store(true, Ordering::SeqCst);
        Ok(())
    }
}

type Handler<E> = Arc<dyn Fn(Arc<Posted<E>>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

struct Registered {
    id: HandlerId,
    name: String,
    priority: EventPriority,
    handler: Box<dyn Any + Send + Sync>,
}

#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<TypeId, Vec<Registered>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<E, F, Fut>(&self, priority: EventPriority, name: impl Into<String>, handler: F) -> HandlerId
    where
        E: Event,
        F: Fn(Arc<Posted<E>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let id: HandlerId = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handler: Handler<E> = Arc::new(move |posted: Arc<Posted<E>>| -> BoxFuture<'static, anyhow::Result<()>> {
            Box::pin(handler(posted))
        });
        let name: String = name.into();
        debug!(event = type_name::<E>(), handler = %name, ?priority, "Registered event handler");

        let mut handlers = self.handlers.write();
        let bucket: &mut Vec<Registered> = handlers.entry(TypeId::of::<E>()).or_default();
        bucket.push(Registered { id, name, priority, handler: Box::new(handler) });
        // ? stable sort keeps registration order within a priority
        bucket.sort_by_key(|registered| registered.priority);
        id
    }

    pub fn unregister<E: Event>(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write();
        let Some(bucket) = handlers.get_mut(&TypeId::of::<E>()) else {
            return false;
        };
        let before: usize = bucket.len();
        bucket.retain(|registered| registered.id != id);
        before != bucket.len()
    }

    pub fn has_handlers<E: Event>(&self) -> bool {
        self.handlers
            .read()
            .get(&TypeId::of::<E>())
            .is_some_and(|bucket| !bucket.is_empty())
    }

    fn snapshot<E: Event>(&self) -> Vec<(String, Handler<E>)> {
        self.handlers
            .read()
            .get(&TypeId::of::<E>())
            .map(|bucket| {
                bucket
                    .iter()
                    .filter_map(|registered| {
                        registered
                            .handler
                            .downcast_ref::<Handler<E>>()
                            .map(|handler| (registered.name.clone(), handler.clone()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Delivers `event` to every handler. Returns false if a handler
    /// cancelled it. Handler errors are logged and do not stop delivery.
    pub async fn post<E: Event>(&self, event: E) -> bool {
        let posted: Arc<Posted<E>> = Arc::new(Posted { event, cancelled: AtomicBool::new(false) });

        for (name, handler) in self.snapshot::<E>() {
            if let Err(err) = handler(posted.clone()).await {
                warn!(event = posted.event.event_name(), handler = %name, error = %err, "Event handler failed");
            }
        }

        !posted.is_cancelled()
    }
}

/// Posted once the HTTP server accepts requests.
#[derive(Debug, Clone)]
pub struct AppStartEvent {
    pub app_name: String,
}

impl Event for AppStartEvent {}

/// Posted when background services are being stopped.
#[derive(Debug, Clone)]
pub struct AppStopEvent {
    pub app_name: String,
    pub reason: Option<String>,
}

impl Event for AppStopEvent {}


// End of file: /src/core/events.rs
