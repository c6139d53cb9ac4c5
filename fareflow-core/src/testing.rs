//! Scripted flight source for tests in this and downstream crates.
//! Only compiled for tests or with the `test-support` feature.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::search::{FlightOffer, SearchCriteria};
use crate::source::{FlightSource, SourceResponse};

/// Source serving a scripted offer list: each search returns the offers on the
/// requested route departing on the requested date.
pub struct StaticSource {
    name: String,
    offers: RwLock<Vec<FlightOffer>>,
    failure: RwLock<Option<String>>,
    delay: Option<std::time::Duration>,
    calls: AtomicUsize,
}

impl StaticSource {
    pub fn new(name: &str, offers: Vec<FlightOffer>) -> Self {
        Self {
            name: name.to_string(),
            offers: RwLock::new(offers),
            failure: RwLock::new(None),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Source whose every search fails with `reason`.
    pub fn failing(name: &str, reason: &str) -> Self {
        let mut source = Self::new(name, Vec::new());
        source.failure = RwLock::new(Some(reason.to_string()));
        source
    }

    /// Sleep this long before answering.
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn set_offers(&self, offers: Vec<FlightOffer>) {
        *self.offers.write().await = offers;
    }

    pub async fn set_failure(&self, reason: Option<&str>) {
        *self.failure.write().await = reason.map(str::to_string);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FlightSource for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, criteria: &SearchCriteria) -> SourceResponse {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = self.failure.read().await.clone() {
            return SourceResponse::failed(&self.name, reason);
        }

        let offers = self
            .offers
            .read()
            .await
            .iter()
            .filter(|o| {
                o.origin_airport == criteria.origin
                    && o.destination_airport == criteria.destination
                    && o.departure_date() == criteria.departure_date
            })
            .cloned()
            .collect();
        SourceResponse::ok(&self.name, offers)
    }

    async fn get_details(&self, offer_id: &str) -> Option<FlightOffer> {
        self.offers
            .read()
            .await
            .iter()
            .find(|o| o.id == offer_id)
            .cloned()
    }
}
