//! Key/value cache capability wrapping every expensive operation.
//!
//! Two backends sit behind the same [`Cache`] trait: an in-process map that
//! is always available, and a Redis-backed store whose `connect` fails fast
//! when the server is unreachable. Values are JSON so both backends share a
//! representation.
//!
//! A TTL of `None` means "no expiry" at the backend. Callers that want the
//! configured default (the query engine's SQL handler) substitute it before
//! calling, so `None` here is always an explicit request for no expiry.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Fixed key under which the active schema snapshot is stored.
pub const SCHEMA_KEY: &str = "database_schema";

#[async_trait]
pub trait Cache: Send + Sync {
    /// Establish the backend connection. The in-memory backend is a no-op;
    /// the Redis backend pings the server and errors when unreachable.
    async fn connect(&self) -> Result<()>;

    /// Returns the value stored under `key`, or `None` on a miss or after
    /// the entry's TTL has elapsed.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Stores `value` under `key`. `ttl: None` means the entry never expires.
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()>;

    async fn close(&self);
}

/// Derives a deterministic cache key from an operation name and its ordered
/// arguments.
pub fn cache_key(operation: &str, args: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(operation.as_bytes());
    for arg in args {
        hasher.update([0u8]);
        hasher.update(arg.as_bytes());
    }
    format!("{}:{}", operation, hex::encode(hasher.finalize()))
}

// ============ In-memory backend ============

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

/// Process-local cache. Entries are evicted lazily on read.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) => {
                if let Some(expires_at) = entry.expires_at {
                    if Instant::now() >= expires_at {
                        entries.remove(key);
                        return Ok(None);
                    }
                }
                Ok(Some(entries[key].value.clone()))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        let entry = Entry {
            value,
            expires_at: ttl.map(|d| Instant::now() + d),
        };
        self.entries.lock().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn close(&self) {}
}

// ============ Redis backend ============

/// Redis-backed cache using a multiplexed async connection.
pub struct RedisCache {
    url: String,
    conn: Mutex<Option<redis::aio::MultiplexedConnection>>,
}

impl RedisCache {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            conn: Mutex::new(None),
        }
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.conn
            .lock()
            .await
            .clone()
            .context("Redis cache not connected")
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn connect(&self) -> Result<()> {
        let client = redis::Client::open(self.url.as_str()).context("open redis url")?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .context("connect to redis")?;
        // Fail fast when the server is unreachable.
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .context("ping redis")?;
        *self.conn.lock().await = Some(conn);
        tracing::info!(url = %self.url, "connected to redis cache");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .context("redis GET")?;
        match raw {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(&value)?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(payload);
        if let Some(ttl) = ttl {
            cmd.arg("EX").arg(ttl.as_secs().max(1));
        }
        cmd.query_async::<()>(&mut conn).await.context("redis SET")?;
        Ok(())
    }

    async fn close(&self) {
        *self.conn.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn roundtrip_returns_stored_value() {
        let cache = MemoryCache::new();
        cache
            .set("k", json!({"rows": 3}), Some(Duration::from_secs(60)))
            .await
            .unwrap();
        let got = cache.get("k").await.unwrap();
        assert_eq!(got, Some(json!({"rows": 3})));
    }

    #[tokio::test]
    async fn miss_returns_none() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get("absent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn entry_expires_after_ttl() {
        let cache = MemoryCache::new();
        cache
            .set("k", json!(1), Some(Duration::from_millis(20)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn no_ttl_means_no_expiry() {
        let cache = MemoryCache::new();
        cache.set("k", json!("v"), None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.get("k").await.unwrap(), Some(json!("v")));
    }

    #[tokio::test]
    async fn set_overwrites_previous_value() {
        let cache = MemoryCache::new();
        cache.set("k", json!(1), None).await.unwrap();
        cache.set("k", json!(2), None).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(json!(2)));
    }

    #[test]
    fn cache_key_is_deterministic() {
        let a = cache_key("handle_sql", &["how many employees"]);
        let b = cache_key("handle_sql", &["how many employees"]);
        assert_eq!(a, b);
    }

    #[test]
    fn cache_key_depends_on_operation_and_args() {
        let a = cache_key("handle_sql", &["q1"]);
        let b = cache_key("handle_sql", &["q2"]);
        let c = cache_key("other_op", &["q1"]);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn cache_key_argument_order_matters() {
        let a = cache_key("op", &["x", "y"]);
        let b = cache_key("op", &["y", "x"]);
        assert_ne!(a, b);
    }
}
