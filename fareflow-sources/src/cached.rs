use std::sync::Arc;

use async_trait::async_trait;
use fareflow_core::{FlightOffer, FlightSource, SearchCriteria, SourceResponse};
use fareflow_store::{Cache, CacheNamespace};
use serde::Serialize;
use tracing::debug;

#[derive(Serialize)]
struct SearchKey<'a> {
    source: &'a str,
    criteria: &'a SearchCriteria,
}

/// Read-through cache in front of any source. Only successful responses are stored.
pub struct CachedSource {
    inner: Arc<dyn FlightSource>,
    cache: Cache,
}

impl CachedSource {
    pub fn new(inner: Arc<dyn FlightSource>, cache: Cache) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl FlightSource for CachedSource {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn search(&self, criteria: &SearchCriteria) -> SourceResponse {
        let key = Cache::key_for(&SearchKey {
            source: self.inner.name(),
            criteria,
        });

        if let Some(key) = &key {
            if let Some(hit) = self
                .cache
                .get::<SourceResponse>(CacheNamespace::Search, key)
                .await
            {
                debug!("{} cache hit for {}", self.inner.name(), criteria.route_label());
                return hit;
            }
        }

        let response = self.inner.search(criteria).await;
        if response.success {
            if let Some(key) = &key {
                self.cache
                    .set(CacheNamespace::Search, key, &response, None)
                    .await;
            }
        }
        response
    }

    async fn get_details(&self, offer_id: &str) -> Option<FlightOffer> {
        self.inner.get_details(offer_id).await
    }
}
