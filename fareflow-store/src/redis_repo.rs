use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use redis::AsyncCommands;
use tracing::info;

use crate::cache::{CacheBackend, CacheError, RateLimitStatus};

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        info!("Redis cache backend configured");
        Ok(Self { client })
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection, CacheError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl CacheBackend for RedisClient {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn().await?;
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1)).await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn flush_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        let mut conn = self.conn().await?;
        let pattern = format!("{}*", prefix);
        let mut cursor: u64 = 0;
        let mut removed: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let deleted: u64 = conn.del(&keys).await?;
                removed += deleted;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(removed)
    }

    async fn hit_window(
        &self,
        key: &str,
        max_requests: u32,
        window: Duration,
    ) -> Result<RateLimitStatus, CacheError> {
        let mut conn = self.conn().await?;

        // First-request timestamp and count live in one hash so the whole
        // check-then-increment runs as a single script.
        let script = redis::Script::new(
            r#"
            local now = tonumber(ARGV[1])
            local window = tonumber(ARGV[2])
            local max = tonumber(ARGV[3])
            local first = tonumber(redis.call("HGET", KEYS[1], "first"))
            local count = tonumber(redis.call("HGET", KEYS[1], "count"))
            if first == nil or count == nil or now - first >= window then
                first = now
                count = 0
            end
            local allowed = 0
            if count < max then
                count = count + 1
                allowed = 1
            end
            redis.call("HSET", KEYS[1], "first", first, "count", count)
            redis.call("PEXPIRE", KEYS[1], math.max(1, window - (now - first)))
            return {allowed, max - count, first + window}
        "#,
        );

        let now_ms = Utc::now().timestamp_millis();
        let (allowed, remaining, reset_ms): (i64, i64, i64) = script
            .key(key)
            .arg(now_ms)
            .arg(window.as_millis() as i64)
            .arg(max_requests)
            .invoke_async(&mut conn)
            .await?;

        let reset_time = Utc
            .timestamp_millis_opt(reset_ms)
            .single()
            .ok_or_else(|| CacheError::Corrupt(key.to_string()))?;

        Ok(RateLimitStatus {
            allowed: allowed == 1,
            remaining: remaining.max(0) as u32,
            reset_time,
        })
    }
}
