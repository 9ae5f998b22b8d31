// Redis-backed cache: namespaced keys, JSON values, optional TTLs.

use std::{future::Future, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use redis::{aio::MultiplexedConnection, Client};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::settings::RedisConfig;

#[derive(Debug, Clone)]
pub struct RedisCache {
    client: Client,
    config: Arc<RedisConfig>,
    connection: Arc<OnceCell<MultiplexedConnection>>,
}

impl RedisCache {
    /// Validates the URL; no connection is made until first use.
    pub fn new(config: RedisConfig) -> Result<Self> {
        let client: Client = Client::open(config.url.as_str()).context("Failed to create Redis client")?;
        Ok(Self {
            client,
            config: Arc::new(config),
            connection: Arc::new(OnceCell::new()),
        })
    }

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    /// `prefix:key`, or `key` when no prefix is configured.
    pub fn make_key(&self, key: &str) -> String {
        let prefix: &str = self.config.key_prefix.trim_end_matches(':');
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{prefix}:{key}")
        }
    }

    fn default_ttl(&self) -> Option<Duration> {
        self.config.default_ttl_secs.map(Duration::from_secs)
    }

    /// Connects and pings.
    pub async fn initialize(&self) -> Result<()> {
        self.health_check().await?;
        info!("Redis connection established successfully");
        Ok(())
    }

    pub async fn get_connection(&self) -> Result<MultiplexedConnection> {
        let connection: &MultiplexedConnection = self
            .connection
            .get_or_try_init(|| async {
                self.client
                    .get_multiplexed_async_connection()
                    .await
                    .context("Failed to connect to Redis")
            })
            .await?;
        Ok(connection.clone())
    }

    pub async fn health_check(&self) -> Result<()> {
        let mut conn: MultiplexedConnection = self.get_connection().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("Failed to ping Redis")?;
        Ok(())
    }

    /// Missing keys are `None`; values that are not valid JSON for `T` are errors.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let mut conn: MultiplexedConnection = self.get_connection().await?;
        let raw: Option<String> = redis::cmd("GET")
            .arg(self.make_key(key))
            .query_async(&mut conn)
            .await
            .with_context(|| format!("Failed to read '{key}' from Redis"))?;

        raw.map(|value| serde_json::from_str(&value).with_context(|| format!("Invalid cached value for '{key}'")))
            .transpose()
    }

    /// Stores `value` as JSON. `ttl` falls back to the configured default.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<()> {
        let payload: String = serde_json::to_string(value).context("Failed to serialize cache value")?;
        let mut cmd: redis::Cmd = redis::cmd("SET");
        cmd.arg(self.make_key(key)).arg(payload);
        if let Some(ttl) = ttl.or_else(|| self.default_ttl()) {
            cmd.arg("PX").arg(ttl.as_millis().max(1) as u64);
        }

        let mut conn: MultiplexedConnection = self.get_connection().await?;
        let _: () = cmd
            .query_async(&mut conn)
            .await
            .with_context(|| format!("Failed to write '{key}' to Redis"))?;
        debug!(key, "Cached value in Redis");
        Ok(())
    }

    /// True when the key existed.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn: MultiplexedConnection = self.get_connection().await?;
        let removed: i64 = redis::cmd("DEL")
            .arg(self.make_key(key))
            .query_async(&mut conn)
            .await
            .with_context(|| format!("Failed to delete '{key}' from Redis"))?;
        Ok(removed > 0)
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn: MultiplexedConnection = self.get_connection().await?;
        let exists: bool = redis::cmd("EXISTS")
            .arg(self.make_key(key))
            .query_async(&mut conn)
            .await
            .with_context(|| format!("Failed to check '{key}' in Redis"))?;
        Ok(exists)
    }

    /// False when the key does not exist.
    pub async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut conn: MultiplexedConnection = self.get_connection().await?;
        let updated: bool = redis::cmd("PEXPIRE")
            .arg(self.make_key(key))
            .arg(ttl.as_millis().max(1) as u64)
            .query_async(&mut conn)
            .await
            .with_context(|| format!("Failed to set expiry on '{key}'"))?;
        Ok(updated)
    }

    /// Returns the cached value or computes, stores and returns it.
    pub async fn get_or_set<T, F, Fut>(&self, key: &str, ttl: Option<Duration>, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(cached) = self.get::<T>(key).await? {
            debug!(key, "Redis cache hit");
            return Ok(cached);
        }
        debug!(key, "Redis cache miss");
        let value: T = compute().await?;
        self.set(key, &value, ttl).await?;
        Ok(value)
    }

    pub async fn shutdown(&self) {
        // Multiplexed connections close when the last clone drops.
        info!("Redis cache shutdown");
    }
}
