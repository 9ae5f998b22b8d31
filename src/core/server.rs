// Application server management: listener setup, serve task, request tracking
// and graceful stop.

use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::{Context, Result};
use axum::Router;
use listenfd::ListenFd;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::{
    net::TcpListener,
    signal,
    sync::{watch, Notify},
    task::JoinHandle,
};
use tracing::{error, info, warn};

use crate::config::settings::AppConfig;

/// How long the serve task gets to finish after the shutdown signal.
const SERVE_TASK_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
    Created,
    Starting,
    Running,
    Stopping,
    Stopped,
    Error,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout: Duration,
    pub graceful_shutdown: bool,
    pub use_listenfd: bool,
}

impl ServerConfig {
    pub fn from_app_config(app: &AppConfig) -> Self {
        Self {
            host: app.host.clone(),
            port: app.port,
            shutdown_timeout: Duration::from_secs(app.shutdown_timeout_secs),
            graceful_shutdown: app.graceful_shutdown,
            use_listenfd: app.use_listenfd,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_app_config(&AppConfig::default())
    }
}

pub struct HttpServerManager {
    config: RwLock<ServerConfig>,
    status: RwLock<ServerStatus>,
    local_addr: RwLock<Option<SocketAddr>>,
    active_requests: AtomicUsize,
    idle: Notify,
    shutdown_tx: watch::Sender<bool>,
    serve_task: Mutex<Option<JoinHandle<std::io::Result<()>>>>,
}

impl HttpServerManager {
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config: RwLock::new(config),
            status: RwLock::new(ServerStatus::Created),
            local_addr: RwLock::new(None),
            active_requests: AtomicUsize::new(0),
            idle: Notify::new(),
            shutdown_tx,
            serve_task: Mutex::new(None),
        }
    }

    pub fn configure_server(&self, config: ServerConfig) {
        *self.config.write() = config;
    }

    /// Applies in-place overrides such as a host/port given at start time.
    pub fn update_config(&self, update: impl FnOnce(&mut ServerConfig)) {
        update(&mut self.config.write());
    }

    pub fn config(&self) -> ServerConfig {
        self.config.read().clone()
    }

    pub fn status(&self) -> ServerStatus {
        *self.status.read()
    }

    fn set_status(&self, status: ServerStatus) {
        *self.status.write() = status;
    }

    pub fn is_running(&self) -> bool {
        self.status() == ServerStatus::Running
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.read()
    }

    pub fn active_request_count(&self) -> usize {
        self.active_requests.load(Ordering::SeqCst)
    }

    /// Counts a request as in flight until the guard drops.
    pub fn track_request(self: &Arc<Self>) -> RequestGuard {
        self.active_requests.fetch_add(1, Ordering::SeqCst);
        RequestGuard { server: self.clone() }
    }

    /// Binds the listener and spawns the serve task. Returns the bound address.
    pub async fn start(&self, app: Router) -> Result<SocketAddr> {
        match self.status() {
            ServerStatus::Starting | ServerStatus::Running => {
                anyhow::bail!("HTTP server is already running");
            }
            _ => {}
        }

        self.set_status(ServerStatus::Starting);
        let config: ServerConfig = self.config();

        let bound: Result<(TcpListener, SocketAddr)> = async {
            let listener: TcpListener = setup_listener(&config).await?;
            let addr: SocketAddr = listener.local_addr().context("Failed to read bound address")?;
            Ok((listener, addr))
        }
        .await;
        let (listener, addr) = match bound {
            Ok(bound) => bound,
            Err(err) => {
                self.set_status(ServerStatus::Error);
                return Err(err);
            }
        };
        *self.local_addr.write() = Some(addr);

        self.shutdown_tx.send_replace(false);
        let mut shutdown_rx: watch::Receiver<bool> = self.shutdown_tx.subscribe();

        let task: JoinHandle<std::io::Result<()>> = tokio::spawn(async move {
            axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.wait_for(|stop| *stop).await;
                })
                .await
        });
        *self.serve_task.lock() = Some(task);

        self.set_status(ServerStatus::Running);
        info!(address = %addr, "HTTP server listening");
        Ok(addr)
    }

    /// Waits until no request is in flight. Returns false on timeout.
    pub async fn wait_for_active_requests(&self, timeout: Duration) -> bool {
        let deadline: tokio::time::Instant = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.idle.notified();
            let active: usize = self.active_request_count();
            if active == 0 {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                warn!(active, "Timed out waiting for in-flight requests");
                return false;
            }
        }
    }

    /// Stops accepting connections and ends the serve task.
    pub async fn stop(&self) {
        match self.status() {
            ServerStatus::Running | ServerStatus::Starting | ServerStatus::Error => {}
            status => {
                info!(?status, "HTTP server not running, nothing to stop");
                return;
            }
        }

        self.set_status(ServerStatus::Stopping);
        let config: ServerConfig = self.config();

        if config.graceful_shutdown && self.active_request_count() > 0 {
            info!(active = self.active_request_count(), "Waiting for in-flight requests");
            self.wait_for_active_requests(config.shutdown_timeout).await;
        }

        self.shutdown_tx.send_replace(true);

        let task: Option<JoinHandle<std::io::Result<()>>> = self.serve_task.lock().take();
        if let Some(mut task) = task {
            match tokio::time::timeout(SERVE_TASK_GRACE, &mut task).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(err))) => error!(error = %err, "HTTP server exited with an error"),
                Ok(Err(err)) => error!(error = %err, "HTTP server task failed"),
                Err(_) => {
                    warn!("HTTP server did not stop in time, aborting");
                    task.abort();
                }
            }
        }

        self.set_status(ServerStatus::Stopped);
        info!("HTTP server stopped");
    }

    pub fn status_info(&self) -> Value {
        let config: ServerConfig = self.config();
        json!({
            "status": self.status(),
            "host": config.host,
            "port": config.port,
            "address": self.local_addr().map(|addr| addr.to_string()),
            "active_requests": self.active_request_count(),
            "graceful_shutdown": config.graceful_shutdown,
        })
    }
}

/// Keeps a request counted while alive.
pub struct RequestGuard {
    server: Arc<HttpServerManager>,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        if self.server.active_requests.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.server.idle.notify_waiters();
        }
    }
}

/// Sets up the TCP listener from environment or binds to new address
pub async fn setup_listener(config: &ServerConfig) -> Result<TcpListener> {
    if config.use_listenfd {
        let mut listenfd: ListenFd = ListenFd::from_env();
        if let Some(std_listener) = listenfd.take_tcp_listener(0)? {
            std_listener.set_nonblocking(true)?;
            info!("Using socket passed through listenfd");
            return Ok(TcpListener::from_std(std_listener)?);
        }
    }

    let addr: String = format!("{}:{}", config.host, config.port);
    TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))
}

/// Resolves when Ctrl+C or TERM arrives and names the signal.
pub async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install TERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutting down via Ctrl+C");
            "SIGINT"
        },
        _ = terminate => {
            info!("Shutting down via TERM signal");
            "SIGTERM"
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;

    fn local_config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            shutdown_timeout: Duration::from_millis(200),
            graceful_shutdown: true,
            use_listenfd: false,
        }
    }

    #[tokio::test]
    async fn starts_and_stops() {
        let server: HttpServerManager = HttpServerManager::new(local_config());
        let app: Router = Router::new().route("/", get(|| async { "ok" }));

        let addr: SocketAddr = server.start(app).await.unwrap();
        assert_ne!(addr.port(), 0);
        assert!(server.is_running());
        assert_eq!(server.status_info()["status"], "running");

        server.stop().await;
        assert_eq!(server.status(), ServerStatus::Stopped);
    }

    #[tokio::test]
    async fn failed_bind_marks_error() {
        let taken: std::net::TcpListener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port: u16 = taken.local_addr().unwrap().port();

        let server: HttpServerManager = HttpServerManager::new(ServerConfig { port, ..local_config() });
        assert!(server.start(Router::new()).await.is_err());
        assert_eq!(server.status(), ServerStatus::Error);
        assert!(!server.is_running());
    }

    #[tokio::test]
    async fn waits_for_tracked_requests() {
        let server: Arc<HttpServerManager> = Arc::new(HttpServerManager::new(local_config()));
        let guard: RequestGuard = server.track_request();
        assert_eq!(server.active_request_count(), 1);

        assert!(!server.wait_for_active_requests(Duration::from_millis(50)).await);

        let waiter = {
            let server: Arc<HttpServerManager> = server.clone();
            tokio::spawn(async move { server.wait_for_active_requests(Duration::from_secs(2)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(guard);

        assert!(waiter.await.unwrap());
        assert_eq!(server.active_request_count(), 0);
    }
}
