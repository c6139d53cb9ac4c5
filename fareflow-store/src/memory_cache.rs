use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use crate::cache::{CacheBackend, CacheError, RateLimitStatus};

struct StoredValue {
    payload: String,
    expires_at: Instant,
}

struct Window {
    started_at: Instant,
    length: Duration,
    count: u32,
}

impl Window {
    fn is_over(&self, now: Instant) -> bool {
        now.duration_since(self.started_at) >= self.length
    }
}

/// Process-local cache backend (will be replaced by Redis in multi-node deployments).
///
/// Values and rate-limit windows live in separate maps so a problem in one
/// never evicts or corrupts the other.
pub struct MemoryCacheBackend {
    values: RwLock<HashMap<String, StoredValue>>,
    windows: Mutex<HashMap<String, Window>>,
}

impl MemoryCacheBackend {
    pub fn new() -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Drop expired values and finished rate-limit windows; returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut values = self.values.write().await;
        let before = values.len();
        values.retain(|_, v| v.expires_at > now);
        let mut removed = before - values.len();
        drop(values);

        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, w| !w.is_over(now));
        removed += before - windows.len();
        removed
    }

    pub async fn len(&self) -> usize {
        self.values.read().await.len()
    }
}

impl Default for MemoryCacheBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let values = self.values.read().await;
        Ok(values
            .get(key)
            .filter(|v| v.expires_at > Instant::now())
            .map(|v| v.payload.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.values.write().await.insert(
            key.to_string(),
            StoredValue {
                payload: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), CacheError> {
        self.values.write().await.remove(key);
        Ok(())
    }

    async fn flush_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        let mut values = self.values.write().await;
        let before = values.len();
        values.retain(|k, _| !k.starts_with(prefix));
        let mut removed = (before - values.len()) as u64;
        drop(values);

        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|k, _| !k.starts_with(prefix));
        removed += (before - windows.len()) as u64;
        Ok(removed)
    }

    async fn hit_window(
        &self,
        key: &str,
        max_requests: u32,
        window: Duration,
    ) -> Result<RateLimitStatus, CacheError> {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let entry = windows.entry(key.to_string()).or_insert(Window {
            started_at: now,
            length: window,
            count: 0,
        });

        entry.length = window;
        if entry.is_over(now) {
            entry.started_at = now;
            entry.count = 0;
        }

        let allowed = entry.count < max_requests;
        if allowed {
            entry.count += 1;
        }

        let left = window.saturating_sub(now.duration_since(entry.started_at));
        Ok(RateLimitStatus {
            allowed,
            remaining: max_requests.saturating_sub(entry.count),
            reset_time: Utc::now() + chrono::Duration::milliseconds(left.as_millis() as i64),
        })
    }
}
