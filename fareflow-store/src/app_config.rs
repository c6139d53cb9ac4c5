use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,
    pub redis: Option<RedisConfig>,
    pub database: Option<DatabaseConfig>,
    pub kafka: Option<KafkaConfig>,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    Memory,
    Redis,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_backend")]
    pub backend: CacheBackendKind,
    #[serde(default = "default_search_ttl")]
    pub search_ttl_seconds: u64,
    #[serde(default = "default_aggregate_ttl")]
    pub aggregate_ttl_seconds: u64,
}

fn default_cache_backend() -> CacheBackendKind { CacheBackendKind::Memory }
fn default_search_ttl() -> u64 { 300 }
fn default_aggregate_ttl() -> u64 { 3600 }

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: default_cache_backend(),
            search_ttl_seconds: default_search_ttl(),
            aggregate_ttl_seconds: default_aggregate_ttl(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    #[serde(default = "default_email_topic")]
    pub email_topic: String,
}

fn default_email_topic() -> String { "notifications.email".to_string() }

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Simulated,
    Ndc,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub name: String,
    pub kind: SourceKind,
    pub carrier_code: String,
    pub carrier_name: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_base_price")]
    pub base_price: f64,
    #[serde(default)]
    pub failure_rate: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_min_interval_ms() -> u64 { 1000 }
fn default_timeout_seconds() -> u64 { 30 }
fn default_base_price() -> f64 { 250.0 }
fn default_currency() -> String { "EUR".to_string() }

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_pause_ms")]
    pub batch_pause_ms: u64,
    #[serde(default = "default_best_offers_limit")]
    pub best_offers_limit: usize,
    #[serde(default = "default_timeout_seconds")]
    pub adapter_timeout_seconds: u64,
    #[serde(default = "default_max_flexible_days")]
    pub max_flexible_days: u32,
}

fn default_batch_size() -> usize { 5 }
fn default_batch_pause_ms() -> u64 { 1000 }
fn default_best_offers_limit() -> usize { 20 }
fn default_max_flexible_days() -> u32 { 7 }

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_pause_ms: default_batch_pause_ms(),
            best_offers_limit: default_best_offers_limit(),
            adapter_timeout_seconds: default_timeout_seconds(),
            max_flexible_days: default_max_flexible_days(),
        }
    }
}

/// Weights for the best-value score and the most-flexible tie-break.
#[derive(Debug, Deserialize, Clone)]
pub struct ScoringConfig {
    #[serde(default)]
    pub class_weights: ClassWeights,
    #[serde(default = "default_promotional_weight")]
    pub promotional_weight: f64,
    #[serde(default = "default_regular_weight")]
    pub regular_weight: f64,
    #[serde(default = "default_preferred_hour_start")]
    pub preferred_hour_start: u32,
    #[serde(default = "default_preferred_hour_end")]
    pub preferred_hour_end: u32,
}

fn default_promotional_weight() -> f64 { 1.15 }
fn default_regular_weight() -> f64 { 1.0 }
fn default_preferred_hour_start() -> u32 { 8 }
fn default_preferred_hour_end() -> u32 { 18 }

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            class_weights: ClassWeights::default(),
            promotional_weight: default_promotional_weight(),
            regular_weight: default_regular_weight(),
            preferred_hour_start: default_preferred_hour_start(),
            preferred_hour_end: default_preferred_hour_end(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClassWeights {
    pub economy: f64,
    pub business: f64,
    pub first: f64,
}

impl Default for ClassWeights {
    fn default() -> Self {
        Self { economy: 1.0, business: 1.2, first: 1.5 }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RouteConfig {
    pub origin: String,
    pub destination: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlertConfig {
    #[serde(default = "default_price_drop_ratio")]
    pub price_drop_ratio: f64,
    #[serde(default = "default_low_seat_threshold")]
    pub low_seat_threshold: u32,
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,
    #[serde(default = "default_special_offer_discount")]
    pub special_offer_discount_percent: f64,
    #[serde(default = "default_history_window_days")]
    pub history_window_days: i64,
    #[serde(default = "default_lead_days")]
    pub default_lead_days: i64,
    #[serde(default = "default_special_offer_lead_days")]
    pub special_offer_lead_days: i64,
    #[serde(default = "default_special_offer_flexible_days")]
    pub special_offer_flexible_days: u32,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
    #[serde(default = "default_special_offer_interval")]
    pub special_offer_interval_seconds: u64,
    #[serde(default)]
    pub popular_routes: Vec<RouteConfig>,
    #[serde(default = "default_test_rate_limit")]
    pub test_rate_limit: RateLimitConfig,
}

fn default_price_drop_ratio() -> f64 { 0.9 }
fn default_low_seat_threshold() -> u32 { 5 }
fn default_cooldown_seconds() -> u64 { 3600 }
fn default_special_offer_discount() -> f64 { 30.0 }
fn default_history_window_days() -> i64 { 30 }
fn default_lead_days() -> i64 { 7 }
fn default_special_offer_lead_days() -> i64 { 14 }
fn default_special_offer_flexible_days() -> u32 { 3 }
fn default_sweep_interval() -> u64 { 1800 }
fn default_special_offer_interval() -> u64 { 600 }
fn default_test_rate_limit() -> RateLimitConfig {
    RateLimitConfig { max_requests: 5, window_ms: 60_000 }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            price_drop_ratio: default_price_drop_ratio(),
            low_seat_threshold: default_low_seat_threshold(),
            cooldown_seconds: default_cooldown_seconds(),
            special_offer_discount_percent: default_special_offer_discount(),
            history_window_days: default_history_window_days(),
            default_lead_days: default_lead_days(),
            special_offer_lead_days: default_special_offer_lead_days(),
            special_offer_flexible_days: default_special_offer_flexible_days(),
            sweep_interval_seconds: default_sweep_interval(),
            special_offer_interval_seconds: default_special_offer_interval(),
            popular_routes: Vec::new(),
            test_rate_limit: default_test_rate_limit(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `FAREFLOW_CACHE__BACKEND=redis`
            .add_source(config::Environment::with_prefix("FAREFLOW").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
