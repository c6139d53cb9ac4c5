use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use fareflow_alerts::{AlertMonitor, Dispatcher, PushHub, Scheduler, SpecialOfferScanner};
use fareflow_core::memory::{
    InMemoryAlertRepository, InMemoryNotificationRepository, InMemorySearchHistory, InMemoryUserDirectory,
};
use fareflow_core::repository::{AlertRepository, NotificationRepository, SearchHistoryRepository, UserDirectory};
use fareflow_search::{Aggregator, FlexibleSearch, Scorer};
use fareflow_store::alert_repo::{
    PgAlertRepository, PgNotificationRepository, PgSearchHistoryRepository, PgUserDirectory,
};
use fareflow_store::app_config::{CacheBackendKind, Config};
use fareflow_store::{Cache, CacheTtls, DbClient, EventProducer, KafkaEmailChannel, MemoryCacheBackend, RedisClient};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const CACHE_PURGE_INTERVAL: Duration = Duration::from_secs(60);

struct Repositories {
    alerts: Arc<dyn AlertRepository>,
    notifications: Arc<dyn NotificationRepository>,
    history: Arc<dyn SearchHistoryRepository>,
    users: Arc<dyn UserDirectory>,
}

async fn build_cache(config: &Config) -> anyhow::Result<Cache> {
    let ttls = CacheTtls::from(&config.cache);
    match config.cache.backend {
        CacheBackendKind::Redis => {
            let redis = config
                .redis
                .as_ref()
                .context("cache backend is redis but [redis] is not configured")?;
            let client = RedisClient::new(&redis.url)
                .await
                .context("Failed to connect to Redis")?;
            Ok(Cache::new(Arc::new(client), ttls))
        }
        CacheBackendKind::Memory => {
            let backend = Arc::new(MemoryCacheBackend::new());
            let purger = backend.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(CACHE_PURGE_INTERVAL);
                loop {
                    ticker.tick().await;
                    let purged = purger.purge_expired().await;
                    if purged > 0 {
                        tracing::debug!("Purged {} expired cache entries", purged);
                    }
                }
            });
            Ok(Cache::new(backend, ttls))
        }
    }
}

async fn build_repositories(config: &Config) -> anyhow::Result<Repositories> {
    let Some(database) = &config.database else {
        tracing::warn!("No database configured, alerts are kept in memory only");
        return Ok(Repositories {
            alerts: Arc::new(InMemoryAlertRepository::new()),
            notifications: Arc::new(InMemoryNotificationRepository::new()),
            history: Arc::new(InMemorySearchHistory::new()),
            users: Arc::new(InMemoryUserDirectory::new()),
        });
    };

    let db = DbClient::new(database)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    Ok(Repositories {
        alerts: Arc::new(PgAlertRepository::new(db.pool.clone())),
        notifications: Arc::new(PgNotificationRepository::new(db.pool.clone())),
        history: Arc::new(PgSearchHistoryRepository::new(db.pool.clone())),
        users: Arc::new(PgUserDirectory::new(db.pool)),
    })
}

fn build_dispatcher(config: &Config, repos: &Repositories, push: Arc<PushHub>) -> anyhow::Result<Dispatcher> {
    let mut dispatcher = Dispatcher::new(repos.users.clone(), repos.notifications.clone()).with_push(push);

    match &config.kafka {
        Some(kafka) => {
            let producer = EventProducer::new(&kafka.brokers).context("Failed to create Kafka producer")?;
            dispatcher = dispatcher.with_email(Arc::new(KafkaEmailChannel::new(producer, &kafka.email_topic)));
        }
        None => tracing::warn!("No Kafka configured, email notifications are disabled"),
    }
    Ok(dispatcher)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fareflow_worker=debug,fareflow_search=info,fareflow_alerts=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting FareFlow worker with {} source(s)", config.sources.len());

    let cache = build_cache(&config).await?;
    let sources = fareflow_sources::build_sources(&config.sources, cache.clone())?;
    let aggregator = Arc::new(Aggregator::new(
        sources,
        Duration::from_secs(config.search.adapter_timeout_seconds),
    ));
    tracing::info!("Aggregating over {:?}", aggregator.source_names());
    let search = Arc::new(FlexibleSearch::new(
        aggregator,
        cache,
        Scorer::new(config.scoring.clone()),
        config.search.clone(),
    ));

    let repos = build_repositories(&config).await?;
    let push = Arc::new(PushHub::default());
    let dispatcher = Arc::new(build_dispatcher(&config, &repos, push.clone())?);

    let monitor = Arc::new(AlertMonitor::new(
        search.clone(),
        repos.alerts.clone(),
        dispatcher.clone(),
        config.alerts.clone(),
    ));
    let scanner = Arc::new(SpecialOfferScanner::new(
        search,
        repos.history.clone(),
        dispatcher,
        config.alerts.clone(),
    ));

    let scheduler = Arc::new(Scheduler::new(
        monitor,
        scanner,
        Duration::from_secs(config.alerts.sweep_interval_seconds),
        Duration::from_secs(config.alerts.special_offer_interval_seconds),
    ));
    let handles = scheduler.start();

    tokio::signal::ctrl_c().await.context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutting down");
    for handle in handles {
        handle.abort();
    }
    push.close().await;
    Ok(())
}
