// =============================================================================
// DATABASE SERVICE - PostgreSQL pool + transactional execution
// =============================================================================

use std::{str::FromStr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{ConnectOptions, PgPool, Postgres, Transaction};
use tokio::sync::OnceCell;
use tracing::{debug, info, log::LevelFilter, warn};

use crate::config::settings::DbConfig;

/// `application_name` reported to the server.
const APPLICATION_NAME: &str = "fautil";

// =============================================================================
// DATABASE SERVICE
// =============================================================================

/// Database service managing a single PostgreSQL connection pool.
#[derive(Clone, Debug)]
pub struct DatabaseService {
    /// Created once by `initialize()`
    pool: Arc<OnceCell<PgPool>>,
    config: Arc<DbConfig>,
}

impl DatabaseService {
    /// Creates a new DatabaseService instance.
    /// Note: The pool is not created until `initialize()` is called.
    pub fn new(config: DbConfig) -> Self {
        Self {
            pool: Arc::new(OnceCell::new()),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.pool.initialized()
    }

    /// Creates the pool. Later calls reuse it.
    pub async fn initialize(&self) -> Result<()> {
        if self.is_initialized() {
            debug!("DatabaseService already initialized");
            return Ok(());
        }

        info!("Initializing DatabaseService...");
        self.pool.get_or_try_init(|| async { self.create_pool().await }).await?;
        info!("DatabaseService initialized successfully");
        Ok(())
    }

    /// Gracefully shuts down the service.
    pub async fn shutdown(&self) {
        info!("Initiating DatabaseService shutdown...");
        if let Some(pool) = self.pool.get() {
            pool.close().await;
            info!("Database connection pool closed");
        } else {
            debug!("Database pool was not initialized, nothing to close");
        }
    }

    /// Returns the connection pool.
    /// Errors if the pool has not been initialized.
    pub fn get_pool(&self) -> Result<&PgPool> {
        self.pool.get().ok_or_else(|| anyhow::anyhow!("Database pool not initialized"))
    }

    /// Round-trips `SELECT 1`.
    pub async fn health_check(&self) -> Result<()> {
        let pool: &PgPool = self.get_pool()?;
        let one: i32 = sqlx::query_scalar("SELECT 1")
            .fetch_one(pool)
            .await
            .context("Database health check failed")?;
        if one != 1 {
            warn!(value = one, "Unexpected health check result");
        }
        Ok(())
    }
}

// =============================================================================
// SCOPED EXECUTION
// =============================================================================

impl DatabaseService {
    /// Runs `block` inside a transaction: committed when it returns Ok,
    /// rolled back otherwise.
    pub async fn transactional<F, T>(&self, block: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c mut Transaction<'static, Postgres>) -> BoxFuture<'c, Result<T>> + Send,
        T: Send,
    {
        let pool: &PgPool = self.get_pool()?;
        let mut tx: Transaction<'static, Postgres> = pool.begin().await.context("Failed to begin transaction")?;

        let result: Result<T> = block(&mut tx).await;

        match result {
            Ok(val) => {
                tx.commit().await.context("Failed to commit transaction")?;
                Ok(val)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                Err(e)
            }
        }
    }
}

// =============================================================================
// INTERNAL HELPERS
// =============================================================================

impl DatabaseService {
    /// Pool sizing: `pool_size` idle connections, `pool_size + max_overflow` at most.
    fn pool_options(&self) -> PgPoolOptions {
        let config: &DbConfig = &self.config;
        PgPoolOptions::new()
            .max_connections(config.pool_size + config.max_overflow)
            .min_connections(config.pool_size)
            .max_lifetime(Duration::from_secs(config.pool_recycle_secs))
            .test_before_acquire(config.pool_pre_ping)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
    }

    /// Creates the connection pool from the configured URL
    async fn create_pool(&self) -> Result<PgPool> {
        let connect_options: PgConnectOptions = self.connect_options()?;

        self.pool_options()
            .connect_with(connect_options)
            .await
            .context("Failed to create database connection pool")
    }

    /// Parses the URL; statements log at INFO when `echo` is set.
    fn connect_options(&self) -> Result<PgConnectOptions> {
        let statement_level: LevelFilter = if self.config.echo { LevelFilter::Info } else { LevelFilter::Debug };

        let options: PgConnectOptions = PgConnectOptions::from_str(&self.config.url)
            .context("Invalid database URL")?
            .application_name(APPLICATION_NAME)
            .options([("timezone", "UTC")])
            .log_statements(statement_level);

        Ok(options)
    }
}
