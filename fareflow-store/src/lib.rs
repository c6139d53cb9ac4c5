pub mod app_config;
pub mod cache;
pub mod memory_cache;
pub mod redis_repo;
pub mod events;
pub mod database;
pub mod alert_repo;

pub use cache::{Cache, CacheBackend, CacheError, CacheNamespace, CacheTtls, RateLimitStatus};
pub use memory_cache::MemoryCacheBackend;
pub use redis_repo::RedisClient;
pub use events::{EventProducer, KafkaEmailChannel};
pub use database::DbClient;
