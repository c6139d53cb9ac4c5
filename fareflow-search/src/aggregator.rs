use std::sync::Arc;
use std::time::Duration;

use fareflow_core::search::compare_price;
use fareflow_core::{AggregatedResult, FlightSource, SearchCriteria, SourceFailure, SourceResponse};
use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::{SearchError, SearchResult};

/// Fans one search out to every registered source and merges the answers.
pub struct Aggregator {
    sources: Vec<Arc<dyn FlightSource>>,
    timeout: Duration,
}

impl Aggregator {
    pub fn new(sources: Vec<Arc<dyn FlightSource>>, timeout: Duration) -> Self {
        Self { sources, timeout }
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    /// Merged, filtered, price-sorted offers. Fails with `NoOffers` when nothing survives.
    pub async fn search_all_sources(&self, criteria: &SearchCriteria) -> SearchResult<AggregatedResult> {
        let result = self.collect(criteria).await?;
        if result.offers.is_empty() {
            return Err(SearchError::NoOffers {
                route: criteria.route_label(),
                failed_sources: result.failed_sources,
            });
        }
        Ok(result)
    }

    /// Same as [`Aggregator::search_all_sources`] but an empty merge is a valid result.
    pub async fn collect(&self, criteria: &SearchCriteria) -> SearchResult<AggregatedResult> {
        // Every source is asked; preferences only filter the merge so that each
        // source ends up either contributing or failed.
        // One task per source. A panic comes back as a JoinError; dropping the
        // caller leaves the upstream requests running.
        let handles: Vec<_> = self
            .sources
            .iter()
            .cloned()
            .map(|source| {
                let criteria = criteria.clone();
                let timeout = self.timeout;
                let name = source.name().to_string();
                let handle = tokio::spawn(async move {
                    match tokio::time::timeout(timeout, source.search(&criteria)).await {
                        Ok(response) => response,
                        Err(_) => SourceResponse::failed(
                            source.name(),
                            format!("timed out after {}s", timeout.as_secs_f64()),
                        ),
                    }
                });
                (name, handle)
            })
            .collect();

        let (names, handles): (Vec<String>, Vec<_>) = handles.into_iter().unzip();
        let outcomes = join_all(handles).await;

        let mut result = AggregatedResult::default();
        for (name, outcome) in names.into_iter().zip(outcomes) {
            let response = match outcome {
                Ok(response) => response,
                Err(e) => SourceResponse::failed(&name, format!("source task aborted: {}", e)),
            };

            if response.success {
                debug!("{} returned {} offers", name, response.offers.len());
                result.offers.extend(response.offers);
                result.contributing_sources.insert(name);
            } else {
                let reason = response.error.unwrap_or_else(|| "unknown error".to_string());
                warn!("Source {} failed for {}: {}", name, criteria.route_label(), reason);
                result.failed_sources.push(SourceFailure { source: name, reason });
            }
        }

        apply_post_filters(criteria, &mut result);
        result.offers.sort_by(|a, b| compare_price(a.price_amount, b.price_amount));
        result.failed_sources.sort_by(|a, b| a.source.cmp(&b.source));
        Ok(result)
    }
}

/// Enforced on the merged list whatever the sources already applied.
fn apply_post_filters(criteria: &SearchCriteria, result: &mut AggregatedResult) {
    if let Some(cabin) = criteria.cabin_class {
        result.offers.retain(|o| o.cabin_class == cabin);
    }
    if let Some(max_price) = criteria.max_price {
        result.offers.retain(|o| o.price_amount <= max_price);
    }
    if criteria.direct_only {
        result.offers.retain(|o| o.is_direct());
    }
    if !criteria.preferred_sources.is_empty() {
        result
            .offers
            .retain(|o| criteria.preferred_sources.iter().any(|p| p == &o.source_name));
    }
}
