// Start of file: /src/core/logging.rs

use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
};

use anyhow::{Context, Result};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};
use tracing_appender::{
    non_blocking::{NonBlocking, WorkerGuard},
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

use crate::config::settings::{LogConfig, LogRotation};

/// Default filter when RUST_LOG is not set.
const DEFAULT_DIRECTIVES: &str = "fautil=info,tower_http=info";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

// Initialize the tracing subscriber with default configuration
pub fn init_tracing() {
    let env_filter: EnvFilter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    // ? Another subscriber may already be installed (tests, embedding apps)
    if let Err(err) = fmt().with_env_filter(env_filter).try_init() {
        debug!(error = %err, "Tracing subscriber already installed");
    }
}

fn rotation(rotation: LogRotation) -> Rotation {
    match rotation {
        LogRotation::Minutely => Rotation::MINUTELY,
        LogRotation::Hourly => Rotation::HOURLY,
        LogRotation::Daily => Rotation::DAILY,
        LogRotation::Never => Rotation::NEVER,
    }
}

/// Non-blocking rolling writer for `path`. `app.log` rolls into
/// `app.<date>.log` files next to it; the writer flushes until the guard drops.
pub fn file_writer(path: &Path, config: &LogConfig) -> Result<(NonBlocking, WorkerGuard)> {
    let dir: &Path = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create log directory {}", dir.display()))?;

    let stem: String = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .with_context(|| format!("Log file path has no file name: {}", path.display()))?;

    let mut builder = RollingFileAppender::builder()
        .rotation(rotation(config.rotation))
        .filename_prefix(stem);
    if let Some(ext) = path.extension() {
        builder = builder.filename_suffix(ext.to_string_lossy().into_owned());
    }
    if let Some(keep) = config.retention {
        builder = builder.max_log_files(keep.max(1));
    }

    let appender: RollingFileAppender = builder
        .build(dir)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;

    Ok(tracing_appender::non_blocking(appender))
}

/// Installs the global subscriber from `LogConfig`.
#[derive(Debug, Default)]
pub struct LoggingManager {
    config: RwLock<Option<LogConfig>>,
    installed: AtomicBool,
    // Keeps the file worker alive; dropping it flushes pending lines
    file_guard: Mutex<Option<WorkerGuard>>,
}

impl LoggingManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> Option<LogConfig> {
        self.config.read().clone()
    }

    pub fn log_file(&self) -> Option<PathBuf> {
        self.config.read().as_ref().and_then(|config| config.file_path.clone())
    }

    /// RUST_LOG wins over the configured level. A second global subscriber
    /// cannot be installed; that case is logged and not an error.
    pub fn configure(&self, config: &LogConfig) -> Result<()> {
        *self.config.write() = Some(config.clone());

        let filter: EnvFilter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.level.as_filter()));

        let mut layers: Vec<BoxedLayer> = Vec::new();

        let stdout = fmt::layer()
            .with_target(config.show_target)
            .with_ansi(config.colorize);
        layers.push(if config.serialize { stdout.json().boxed() } else { stdout.boxed() });

        let mut guard: Option<WorkerGuard> = None;
        if let Some(path) = &config.file_path {
            let (writer, worker) = file_writer(path, config)?;
            guard = Some(worker);

            let file_layer = fmt::layer()
                .with_target(config.show_target)
                .with_ansi(false)
                .with_writer(writer);
            layers.push(if config.serialize { file_layer.json().boxed() } else { file_layer.boxed() });
        }

        match tracing_subscriber::registry().with(layers).with(filter).try_init() {
            Ok(()) => {
                self.installed.store(true, Ordering::SeqCst);
                *self.file_guard.lock() = guard;
                info!(
                    level = %config.level,
                    file = ?config.file_path,
                    rotation = ?config.rotation,
                    retention = ?config.retention,
                    json = config.serialize,
                    "Logging configured"
                );
            }
            Err(err) => {
                warn!(error = %err, "Global tracing subscriber already installed, keeping it");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::LogLevel;
    use std::io::Write;

    #[test]
    fn records_config_and_tolerates_reinstall() {
        let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
        let path: PathBuf = dir.path().join("logs").join("app.log");
        let config: LogConfig = LogConfig {
            level: LogLevel::Debug,
            file_path: Some(path.clone()),
            ..LogConfig::default()
        };

        let manager: LoggingManager = LoggingManager::new();
        manager.configure(&config).unwrap();
        // ? a second call must not fail even though the subscriber is global
        manager.configure(&config).unwrap();

        assert!(path.parent().unwrap().is_dir());
        assert_eq!(manager.log_file(), Some(path));
        assert_eq!(manager.config().map(|c| c.level), Some(LogLevel::Debug));
    }

    #[test]
    fn init_tracing_twice_is_harmless() {
        init_tracing();
        init_tracing();
    }

    #[test]
    fn rolling_writer_writes_into_the_log_directory() {
        let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
        let log_dir: PathBuf = dir.path().join("nested").join("logs");
        let config: LogConfig = LogConfig {
            file_path: Some(log_dir.join("service.log")),
            rotation: LogRotation::Never,
            retention: Some(2),
            ..LogConfig::default()
        };

        let (mut writer, guard) = file_writer(config.file_path.as_deref().unwrap(), &config).unwrap();
        writer.write_all(b"hello from the appender\n").unwrap();
        // dropping the guard flushes the worker
        drop(guard);

        let contents: String = std::fs::read_to_string(log_dir.join("service.log")).unwrap();
        assert!(contents.contains("hello from the appender"));
    }

    #[test]
    fn daily_files_carry_the_date() {
        let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
        let config: LogConfig = LogConfig {
            file_path: Some(dir.path().join("app.log")),
            ..LogConfig::default()
        };

        let (mut writer, guard) = file_writer(config.file_path.as_deref().unwrap(), &config).unwrap();
        writer.write_all(b"line\n").unwrap();
        drop(guard);

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("app.") && names[0].ends_with(".log"), "{names:?}");
        assert_ne!(names[0], "app.log");
    }
}

// End of file: /src/core/logging.rs
