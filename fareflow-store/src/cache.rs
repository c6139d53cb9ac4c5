//! Namespaced value cache and sliding-window rate limiting.
//!
//! Every read or write goes through [`Cache`], which never surfaces backend
//! errors to callers: an unreachable or corrupt store degrades to a miss.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::app_config::CacheConfig;

const KEY_PREFIX: &str = "fareflow";

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("Corrupt cache entry at {0}")]
    Corrupt(String),
    #[error("Cache serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Unavailable(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheNamespace {
    /// Raw per-source search results
    Search,
    /// Derived aggregates: flexible results, calendars
    Aggregate,
    /// Rate-limit counters, TTL = the limiting window
    RateLimit,
}

impl CacheNamespace {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheNamespace::Search => "search",
            CacheNamespace::Aggregate => "aggregate",
            CacheNamespace::RateLimit => "ratelimit",
        }
    }

    pub fn prefix(self) -> String {
        format!("{}:{}:", KEY_PREFIX, self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_time: DateTime<Utc>,
}

/// Stored envelope. Reads past `inserted_at + ttl_seconds` are misses even if
/// the backend has not evicted the entry yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: Value,
    pub inserted_at: DateTime<Utc>,
    pub ttl_seconds: u64,
}

impl CacheEntry {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.inserted_at + chrono::Duration::seconds(self.ttl_seconds as i64)
    }
}

/// Raw key/value store behind the cache facade.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    async fn del(&self, key: &str) -> Result<(), CacheError>;

    /// Remove every key starting with `prefix`; returns how many were removed.
    async fn flush_prefix(&self, prefix: &str) -> Result<u64, CacheError>;

    /// Atomic count-and-check for one identifier. The counter restarts when
    /// its first request falls outside `window`.
    async fn hit_window(
        &self,
        key: &str,
        max_requests: u32,
        window: Duration,
    ) -> Result<RateLimitStatus, CacheError>;
}

/// Deterministic key for a parameter object: canonical JSON (object keys
/// sorted at every depth) hashed with SHA-256.
pub fn cache_key<T: Serialize + ?Sized>(params: &T) -> Result<String, CacheError> {
    let value = serde_json::to_value(params)?;
    let mut canonical = String::new();
    write_canonical(&value, &mut canonical);
    let digest = Sha256::digest(canonical.as_bytes());
    Ok(hex::encode(digest))
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CacheTtls {
    pub search: Duration,
    pub aggregate: Duration,
}

impl From<&CacheConfig> for CacheTtls {
    fn from(config: &CacheConfig) -> Self {
        Self {
            search: Duration::from_secs(config.search_ttl_seconds),
            aggregate: Duration::from_secs(config.aggregate_ttl_seconds),
        }
    }
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}

/// Shared cache handle. Cheap to clone.
#[derive(Clone)]
pub struct Cache {
    backend: Arc<dyn CacheBackend>,
    ttls: CacheTtls,
}

impl Cache {
    pub fn new(backend: Arc<dyn CacheBackend>, ttls: CacheTtls) -> Self {
        Self { backend, ttls }
    }

    pub fn default_ttl(&self, namespace: CacheNamespace) -> Duration {
        match namespace {
            CacheNamespace::Search => self.ttls.search,
            CacheNamespace::Aggregate | CacheNamespace::RateLimit => self.ttls.aggregate,
        }
    }

    /// Hash of `params`, or None if they cannot be serialized (treated as uncacheable).
    pub fn key_for<T: Serialize + ?Sized>(params: &T) -> Option<String> {
        match cache_key(params) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!("Cannot derive cache key: {}", e);
                None
            }
        }
    }

    fn full_key(namespace: CacheNamespace, key: &str) -> String {
        format!("{}{}", namespace.prefix(), key)
    }

    pub async fn get<T: DeserializeOwned>(&self, namespace: CacheNamespace, key: &str) -> Option<T> {
        let full_key = Self::full_key(namespace, key);
        let raw = match self.backend.get(&full_key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Cache read failed for {}, treating as miss: {}", full_key, e);
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(_) => {
                warn!("{}", CacheError::Corrupt(full_key.clone()));
                let _ = self.backend.del(&full_key).await;
                return None;
            }
        };

        if entry.is_expired_at(Utc::now()) {
            debug!("Cache entry {} past its TTL", full_key);
            return None;
        }

        match serde_json::from_value(entry.value) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Cache entry {} has unexpected shape: {}", full_key, e);
                None
            }
        }
    }

    pub async fn set<T: Serialize + ?Sized>(
        &self,
        namespace: CacheNamespace,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) {
        let ttl = ttl.unwrap_or_else(|| self.default_ttl(namespace));
        let full_key = Self::full_key(namespace, key);

        let payload = serde_json::to_value(value).and_then(|value| {
            serde_json::to_string(&CacheEntry {
                key: full_key.clone(),
                value,
                inserted_at: Utc::now(),
                ttl_seconds: ttl.as_secs(),
            })
        });

        let payload = match payload {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Cache write skipped for {}: {}", full_key, e);
                return;
            }
        };

        if let Err(e) = self.backend.set(&full_key, &payload, ttl).await {
            warn!("Cache write failed for {}: {}", full_key, e);
        }
    }

    pub async fn del(&self, namespace: CacheNamespace, key: &str) {
        let full_key = Self::full_key(namespace, key);
        if let Err(e) = self.backend.del(&full_key).await {
            warn!("Cache delete failed for {}: {}", full_key, e);
        }
    }

    /// Clear one namespace. Other namespaces (rate limits in particular) are untouched.
    pub async fn flush(&self, namespace: CacheNamespace) -> u64 {
        match self.backend.flush_prefix(&namespace.prefix()).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!("Cache flush failed for {}: {}", namespace.as_str(), e);
                0
            }
        }
    }

    /// Sliding-window limiter keyed by `identifier`. Fails open when the
    /// backend is unavailable.
    pub async fn check_rate_limit(
        &self,
        identifier: &str,
        max_requests: u32,
        window_ms: u64,
    ) -> RateLimitStatus {
        let window = Duration::from_millis(window_ms);
        let key = Self::full_key(CacheNamespace::RateLimit, identifier);

        match self.backend.hit_window(&key, max_requests, window).await {
            Ok(status) => status,
            Err(e) => {
                warn!("Rate limit check failed for {}, allowing: {}", identifier, e);
                RateLimitStatus {
                    allowed: true,
                    remaining: max_requests.saturating_sub(1),
                    reset_time: Utc::now() + chrono::Duration::milliseconds(window_ms as i64),
                }
            }
        }
    }
}
