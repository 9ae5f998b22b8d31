// Start of file: /src/config/manager.rs

// * ConfigManager owns the loaded settings and can reload them at runtime.
// * Readers get a cheap Arc snapshot; a reload swaps the snapshot.

use std::sync::Arc;

use anyhow::{Context, Result};
use config::Config;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use tracing::info;

use crate::config::settings::{load_settings, ConfigSource, Settings};

pub struct ConfigManager {
    source: ConfigSource,
    settings: RwLock<Arc<Settings>>,
    raw: RwLock<Arc<Config>>,
}

impl std::fmt::Debug for ConfigManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigManager")
            .field("source", &self.source)
            .field("settings", &*self.settings.read())
            .finish()
    }
}

impl ConfigManager {
    /// Loads settings from `source` (.env, environment, config file).
    pub fn load(source: ConfigSource) -> Result<Self> {
        let (settings, raw) = load_settings(&source)?;
        info!(
            app = %settings.app.title,
            version = %settings.app.version,
            debug = settings.app.debug,
            "Configuration loaded"
        );

        Ok(Self {
            source,
            settings: RwLock::new(Arc::new(settings)),
            raw: RwLock::new(Arc::new(raw)),
        })
    }

    /// Wraps already-built settings. `reload` will then read the default sources.
    pub fn from_settings(settings: Settings) -> Self {
        let raw: Config = Config::try_from(&settings).unwrap_or_default();

        Self {
            source: ConfigSource::default(),
            settings: RwLock::new(Arc::new(settings)),
            raw: RwLock::new(Arc::new(raw)),
        }
    }

    /// Re-reads every source and swaps the snapshot. On failure the previous
    /// settings stay in place.
    pub fn reload(&self) -> Result<()> {
        let (settings, raw) = load_settings(&self.source).context("Failed to reload configuration")?;
        *self.settings.write() = Arc::new(settings);
        *self.raw.write() = Arc::new(raw);
        info!("Configuration reloaded");
        Ok(())
    }

    pub fn settings(&self) -> Arc<Settings> {
        self.settings.read().clone()
    }

    pub fn is_debug(&self) -> bool {
        self.settings.read().app.debug
    }

    pub fn app_version(&self) -> String {
        self.settings.read().app.version.clone()
    }

    /// Deserializes an application-specific section, e.g. `section::<MailConfig>("mail")`.
    pub fn section<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let raw: Arc<Config> = self.raw.read().clone();
        raw.get::<T>(key)
            .with_context(|| format!("Failed to read configuration section '{key}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct MailConfig {
        host: String,
        port: u16,
    }

    #[test]
    fn from_settings_exposes_snapshot() {
        let mut settings: Settings = Settings::default();
        settings.app.debug = true;
        settings.app.version = "2.3.4".to_string();

        let manager: ConfigManager = ConfigManager::from_settings(settings);
        assert!(manager.is_debug());
        assert_eq!(manager.app_version(), "2.3.4");
        assert_eq!(manager.section::<u16>("app.port").unwrap(), 8000);
    }

    #[test]
    fn reads_custom_sections() {
        let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
        let path: std::path::PathBuf = dir.path().join("config.yaml");
        std::fs::write(&path, "mail:\n  host: smtp.local\n  port: 2525\n").unwrap();

        let manager: ConfigManager = ConfigManager::load(
            ConfigSource::default()
                .with_config_path(&path)
                .with_env_prefix("FAUTIL_TEST_SECTION"),
        )
        .unwrap();

        let mail: MailConfig = manager.section("mail").unwrap();
        assert_eq!(mail, MailConfig { host: "smtp.local".into(), port: 2525 });
        assert!(manager.section::<MailConfig>("missing").is_err());
    }

    #[test]
    fn reload_picks_up_file_changes() {
        let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
        let path: std::path::PathBuf = dir.path().join("config.yaml");
        std::fs::write(&path, "app:\n  title: first\n").unwrap();

        let manager: ConfigManager = ConfigManager::load(
            ConfigSource::default()
                .with_config_path(&path)
                .with_env_prefix("FAUTIL_TEST_RELOAD"),
        )
        .unwrap();
        let before: Arc<Settings> = manager.settings();

        std::fs::write(&path, "app:\n  title: second\n").unwrap();
        manager.reload().unwrap();

        assert_eq!(before.app.title, "first");
        assert_eq!(manager.settings().app.title, "second");
    }
}

// End of file: /src/config/manager.rs
