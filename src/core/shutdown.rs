// Start of file: /src/core/shutdown.rs

// * Phased graceful shutdown.
// * API first, then background services, then resource cleanup.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{error, info, warn};

use crate::core::{
    lifecycle::{ComponentType, LifecycleContext, LifecycleEventType, LifecycleManager},
    server::{shutdown_signal, HttpServerManager},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownPhase {
    NotStarted,
    Starting,
    ApiStopping,
    ServicesStopping,
    Cleanup,
    Completed,
    Failed,
    Cancelled,
}

impl ShutdownPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Phase in which listeners of `component` run.
    pub fn for_component(component: ComponentType) -> Self {
        match component {
            ComponentType::Api => Self::ApiStopping,
            ComponentType::Scheduler | ComponentType::Queue | ComponentType::Other => Self::ServicesStopping,
            ComponentType::Cache | ComponentType::Storage | ComponentType::Database | ComponentType::Core => {
                Self::Cleanup
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownReason {
    Signal,
    ApiCall,
    Exception,
    Manual,
    Timeout,
    Other,
}

/// Shutdown details handed to lifecycle listeners.
#[derive(Debug, Clone)]
pub struct ShutdownContext {
    pub phase: ShutdownPhase,
    pub reason: Option<ShutdownReason>,
    pub message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    pub timeout: Duration,
    pub force_exit: bool,
    pub exit_code: i32,
    pub wait_api_requests: bool,
    pub api_request_timeout: Duration,
    pub phase_timeouts: HashMap<ShutdownPhase, Duration>,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            force_exit: false,
            exit_code: 0,
            wait_api_requests: true,
            api_request_timeout: Duration::from_secs(30),
            phase_timeouts: HashMap::from([
                (ShutdownPhase::ApiStopping, Duration::from_secs(30)),
                (ShutdownPhase::ServicesStopping, Duration::from_secs(20)),
                (ShutdownPhase::Cleanup, Duration::from_secs(10)),
            ]),
        }
    }
}

#[derive(Debug, Default)]
struct ShutdownState {
    reason: Option<ShutdownReason>,
    message: Option<String>,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
}

pub struct ShutdownManager {
    lifecycle: Arc<LifecycleManager>,
    http: Option<Arc<HttpServerManager>>,
    config: RwLock<ShutdownConfig>,
    shutting_down: AtomicBool,
    state: RwLock<ShutdownState>,
    phase_tx: watch::Sender<ShutdownPhase>,
    signal_task: Mutex<Option<JoinHandle<()>>>,
}

impl ShutdownManager {
    pub fn new(lifecycle: Arc<LifecycleManager>, http: Option<Arc<HttpServerManager>>) -> Self {
        let (phase_tx, _) = watch::channel(ShutdownPhase::NotStarted);
        Self {
            lifecycle,
            http,
            config: RwLock::new(ShutdownConfig::default()),
            shutting_down: AtomicBool::new(false),
            state: RwLock::new(ShutdownState::default()),
            phase_tx,
            signal_task: Mutex::new(None),
        }
    }

    pub fn configure(&self, config: ShutdownConfig) {
        *self.config.write() = config;
    }

    pub fn update_config(&self, update: impl FnOnce(&mut ShutdownConfig)) {
        update(&mut self.config.write());
    }

    pub fn config(&self) -> ShutdownConfig {
        self.config.read().clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    pub fn phase(&self) -> ShutdownPhase {
        *self.phase_tx.borrow()
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        self.state.read().reason
    }

    pub fn message(&self) -> Option<String> {
        self.state.read().message.clone()
    }

    /// Time spent shutting down; still growing while in progress.
    pub fn shutdown_time(&self) -> Option<Duration> {
        let state = self.state.read();
        let started: Instant = state.started_at?;
        Some(state.finished_at.unwrap_or_else(Instant::now).duration_since(started))
    }

    pub fn subscribe(&self) -> watch::Receiver<ShutdownPhase> {
        self.phase_tx.subscribe()
    }

    fn set_phase(&self, phase: ShutdownPhase) {
        info!(?phase, "Shutdown phase");
        self.phase_tx.send_replace(phase);
    }

    /// Turns Ctrl+C / TERM into a SIGNAL shutdown. Safe to call repeatedly.
    pub fn register_signal_handlers(self: &Arc<Self>) {
        let mut slot = self.signal_task.lock();
        if slot.is_some() {
            return;
        }

        let manager: Arc<ShutdownManager> = self.clone();
        *slot = Some(tokio::spawn(async move {
            let signal: &'static str = shutdown_signal().await;
            manager.trigger_shutdown(ShutdownReason::Signal, Some(format!("received {signal}")));
        }));
    }

    /// Starts the shutdown sequence in the background. Returns false when a
    /// shutdown is already in progress.
    pub fn trigger_shutdown(self: &Arc<Self>, reason: ShutdownReason, message: Option<String>) -> bool {
        if self
            .shutting_down
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!(?reason, "Shutdown already in progress, ignoring trigger");
            return false;
        }

        {
            let mut state = self.state.write();
            state.reason = Some(reason);
            state.message = message.clone();
            state.started_at = Some(Instant::now());
            state.finished_at = None;
        }
        info!(?reason, message = message.as_deref().unwrap_or(""), "Shutdown triggered");
        self.set_phase(ShutdownPhase::Starting);

        let manager: Arc<ShutdownManager> = self.clone();
        tokio::spawn(async move { manager.run().await });
        true
    }

    /// Waits for a triggered shutdown to finish. Returns true right away when
    /// nothing was triggered, false when `timeout` elapses first.
    pub async fn wait_for_shutdown(&self, timeout: Option<Duration>) -> bool {
        if !self.is_shutting_down() {
            return true;
        }
        self.wait_terminal(timeout).await
    }

    /// Waits for a shutdown to be triggered and to finish.
    pub async fn wait_until_complete(&self) {
        self.wait_terminal(None).await;
    }

    async fn wait_terminal(&self, timeout: Option<Duration>) -> bool {
        let mut rx: watch::Receiver<ShutdownPhase> = self.phase_tx.subscribe();
        let wait = async move { rx.wait_for(|phase| phase.is_terminal()).await.is_ok() };
        match timeout {
            Some(limit) => tokio::time::timeout(limit, wait).await.unwrap_or(false),
            None => wait.await,
        }
    }

    async fn run(self: Arc<Self>) {
        let config: ShutdownConfig = self.config();
        let outcome = tokio::time::timeout(config.timeout, self.run_phases(&config)).await;

        match outcome {
            Ok(()) => {
                self.state.write().finished_at = Some(Instant::now());
                self.set_phase(ShutdownPhase::Completed);
                info!(elapsed = ?self.shutdown_time(), "Shutdown completed");
            }
            Err(_) => {
                self.state.write().finished_at = Some(Instant::now());
                error!(timeout = ?config.timeout, "Shutdown timed out");
                self.set_phase(ShutdownPhase::Failed);
            }
        }

        if let Some(task) = self.signal_task.lock().take() {
            task.abort();
        }

        if config.force_exit {
            warn!(code = config.exit_code, "Forcing process exit");
            std::process::exit(config.exit_code);
        }
    }

    async fn run_phases(&self, config: &ShutdownConfig) {
        self.run_phase(config, ShutdownPhase::ApiStopping).await;
        self.run_phase(config, ShutdownPhase::ServicesStopping).await;
        self.run_phase(config, ShutdownPhase::Cleanup).await;
        self.trigger(LifecycleEventType::PostShutdown, ShutdownPhase::Cleanup).await;
    }

    async fn run_phase(&self, config: &ShutdownConfig, phase: ShutdownPhase) {
        self.set_phase(phase);
        let limit: Duration = config
            .phase_timeouts
            .get(&phase)
            .copied()
            .unwrap_or(config.timeout);

        if tokio::time::timeout(limit, self.phase_body(config, phase)).await.is_err() {
            warn!(?phase, timeout = ?limit, "Shutdown phase timed out, moving on");
        }
    }

    async fn phase_body(&self, config: &ShutdownConfig, phase: ShutdownPhase) {
        let (pre, post) = match phase {
            ShutdownPhase::ApiStopping => (LifecycleEventType::PreHttpStop, LifecycleEventType::PostHttpStop),
            ShutdownPhase::ServicesStopping => (LifecycleEventType::PreServicesStop, LifecycleEventType::PostServicesStop),
            _ => (LifecycleEventType::PreCleanup, LifecycleEventType::PostCleanup),
        };

        self.trigger(pre, phase).await;

        if phase == ShutdownPhase::ApiStopping {
            if let Some(http) = &self.http {
                if config.wait_api_requests {
                    http.wait_for_active_requests(config.api_request_timeout).await;
                }
                http.stop().await;
            }
        }

        self.run_component_listeners(phase).await;
        self.trigger(post, phase).await;
    }

    fn context(&self, event: LifecycleEventType, phase: ShutdownPhase) -> LifecycleContext {
        let state = self.state.read();
        LifecycleContext {
            event,
            shutdown: Some(ShutdownContext {
                phase,
                reason: state.reason,
                message: state.message.clone(),
            }),
        }
    }

    async fn trigger(&self, event: LifecycleEventType, phase: ShutdownPhase) {
        if let Err(err) = self.lifecycle.trigger_event_with(self.context(event, phase)).await {
            warn!(event = %event, error = %err, "Shutdown listener failed");
        }
    }

    /// PRE_SHUTDOWN listeners whose component belongs to `phase`.
    async fn run_component_listeners(&self, phase: ShutdownPhase) {
        let listeners = self
            .lifecycle
            .listeners_for_event(LifecycleEventType::PreShutdown)
            .into_iter()
            .filter(|listener| ShutdownPhase::for_component(listener.component_type) == phase);

        for listener in listeners {
            let context: LifecycleContext = self.context(LifecycleEventType::PreShutdown, phase);
            if let Err(err) = listener.invoke(context).await {
                warn!(listener = %listener.name, ?phase, error = %err, "Shutdown listener failed");
            }
        }
    }
}


// End of file: /src/core/shutdown.rs
