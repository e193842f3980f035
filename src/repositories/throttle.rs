use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::Result;

/// Failed-login counters keyed by house number.
///
/// A counter lives for a fixed window after its latest failure.
#[async_trait]
pub trait LoginThrottle: Send + Sync {
    /// Failures currently counted against `key`.
    async fn failed_attempts(&self, key: &str) -> Result<u32>;

    /// Seconds left before the counter for `key` lapses.
    async fn retry_after_secs(&self, key: &str) -> Result<u64>;

    /// Counts one failure and restarts the window.
    async fn record_failure(&self, key: &str, window_secs: u64) -> Result<()>;

    /// Forgets every failure counted against `key`.
    async fn clear(&self, key: &str) -> Result<()>;
}

/// [`LoginThrottle`] shared across instances through Redis.
#[derive(Clone)]
pub struct RedisThrottle {
    conn: ConnectionManager,
}

impl RedisThrottle {
    /// Creates a new `RedisThrottle`.
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl LoginThrottle for RedisThrottle {
    async fn failed_attempts(&self, key: &str) -> Result<u32> {
        let mut conn = self.conn.clone();
        let attempts: Option<u32> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(attempts.unwrap_or(0))
    }

    async fn retry_after_secs(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        // -2 for a missing key, -1 for a key without expiry.
        let ttl: i64 = redis::cmd("TTL").arg(key).query_async(&mut conn).await?;
        Ok(ttl.max(0) as u64)
    }

    async fn record_failure(&self, key: &str, window_secs: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .cmd("INCR")
            .arg(key)
            .ignore()
            .cmd("EXPIRE")
            .arg(key)
            .arg(window_secs)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL").arg(key).query_async::<()>(&mut conn).await?;
        Ok(())
    }
}

/// In-process [`LoginThrottle`] for single-instance deployments and tests.
#[derive(Clone, Default)]
pub struct MemoryThrottle {
    counters: Arc<Mutex<HashMap<String, (u32, Instant)>>>,
}

impl MemoryThrottle {
    /// Creates a new, empty `MemoryThrottle`.
    pub fn new() -> Self {
        Self::default()
    }

    async fn live_entry(&self, key: &str) -> Option<(u32, Instant)> {
        let mut counters = self.counters.lock().await;
        let entry = counters.get(key).copied()?;
        if Instant::now() >= entry.1 {
            counters.remove(key);
            return None;
        }
        Some(entry)
    }
}

#[async_trait]
impl LoginThrottle for MemoryThrottle {
    async fn failed_attempts(&self, key: &str) -> Result<u32> {
        Ok(self.live_entry(key).await.map_or(0, |(count, _)| count))
    }

    async fn retry_after_secs(&self, key: &str) -> Result<u64> {
        Ok(self.live_entry(key).await.map_or(0, |(_, expires_at)| {
            expires_at
                .saturating_duration_since(Instant::now())
                .as_secs()
        }))
    }

    async fn record_failure(&self, key: &str, window_secs: u64) -> Result<()> {
        let now = Instant::now();
        let expires_at = now + Duration::from_secs(window_secs);

        let mut counters = self.counters.lock().await;
        let entry = counters.entry(key.to_string()).or_insert((0, expires_at));
        if now >= entry.1 {
            entry.0 = 0;
        }
        entry.0 += 1;
        entry.1 = expires_at;
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<()> {
        self.counters.lock().await.remove(key);
        Ok(())
    }
}
