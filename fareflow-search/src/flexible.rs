//! Flexible-date search: explores `base ± N` days through the aggregator in
//! throttled batches, then derives the calendar, statistics and recommendations.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use fareflow_core::search::compare_price;
use fareflow_core::{AggregatedResult, FlightOffer, SearchCriteria, SourceFailure};
use fareflow_store::app_config::SearchConfig;
use fareflow_store::{Cache, CacheNamespace};
use futures_util::future::join_all;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::aggregator::Aggregator;
use crate::models::{FlexibleResult, PriceCalendarEntry, SearchMetadata};
use crate::scoring::{price_stats, Scorer};
use crate::{SearchError, SearchResult};

#[derive(Serialize)]
struct FlexibleKey<'a> {
    criteria: &'a SearchCriteria,
    flexible_days: u32,
}

pub struct FlexibleSearch {
    aggregator: Arc<Aggregator>,
    cache: Cache,
    scorer: Scorer,
    config: SearchConfig,
}

impl FlexibleSearch {
    pub fn new(aggregator: Arc<Aggregator>, cache: Cache, scorer: Scorer, config: SearchConfig) -> Self {
        Self {
            aggregator,
            cache,
            scorer,
            config,
        }
    }

    pub fn aggregator(&self) -> &Arc<Aggregator> {
        &self.aggregator
    }

    pub fn max_flexible_days(&self) -> u32 {
        self.config.max_flexible_days
    }

    fn clamp_days(&self, flexible_days: u32) -> u32 {
        if flexible_days > self.config.max_flexible_days {
            debug!(
                "Clamping flexible window {} to {} days",
                flexible_days, self.config.max_flexible_days
            );
            return self.config.max_flexible_days;
        }
        flexible_days
    }

    pub async fn search_flexible(
        &self,
        criteria: &SearchCriteria,
        flexible_days: u32,
    ) -> SearchResult<FlexibleResult> {
        let flexible_days = self.clamp_days(flexible_days);

        let key = Cache::key_for(&FlexibleKey {
            criteria,
            flexible_days,
        });
        if let Some(key) = &key {
            if let Some(mut cached) = self
                .cache
                .get::<FlexibleResult>(CacheNamespace::Aggregate, key)
                .await
            {
                debug!("Flexible search cache hit for {}", criteria.route_label());
                cached.metadata.cache_hit = true;
                return Ok(cached);
            }
        }

        let started = Instant::now();
        let (per_date, batches) = self.run_batches(criteria, flexible_days).await?;

        let failed_sources = merge_failures(per_date.iter().map(|(_, r)| r));
        let calendar = build_calendar(&per_date);

        let mut pool: Vec<FlightOffer> = per_date.into_iter().flat_map(|(_, r)| r.offers).collect();
        pool.sort_by(|a, b| compare_price(a.price_amount, b.price_amount));

        let (Some(recommendations), Some(stats)) = (self.scorer.recommend(&pool), price_stats(&pool)) else {
            return Err(SearchError::NoOffers {
                route: criteria.route_label(),
                failed_sources,
            });
        };

        let total_offers = pool.len();
        pool.truncate(self.config.best_offers_limit);

        let result = FlexibleResult {
            origin: criteria.origin.clone(),
            destination: criteria.destination.clone(),
            base_date: criteria.departure_date,
            metadata: SearchMetadata {
                cache_hit: false,
                flexible_days,
                searched_dates: 2 * flexible_days as usize + 1,
                dates_with_offers: calendar.len(),
                batches,
                total_offers,
                elapsed_ms: started.elapsed().as_millis() as u64,
                generated_at: Utc::now(),
                failed_sources,
            },
            calendar,
            best_offers: pool,
            recommendations,
            stats,
        };

        info!(
            "Flexible search {} ±{}d: {} offers over {} dates in {} batches",
            criteria.route_label(),
            flexible_days,
            total_offers,
            result.metadata.dates_with_offers,
            batches
        );

        if let Some(key) = &key {
            self.cache
                .set(CacheNamespace::Aggregate, key, &result, None)
                .await;
        }
        Ok(result)
    }

    /// Calendar only, served from the same (cached) flexible result.
    pub async fn price_calendar(
        &self,
        criteria: &SearchCriteria,
        flexible_days: u32,
    ) -> SearchResult<Vec<PriceCalendarEntry>> {
        Ok(self.search_flexible(criteria, flexible_days).await?.calendar)
    }

    /// Every offer found over `base ± flexible_days`, price-ascending and not cut
    /// to `best_offers_limit`. An empty window is an empty list.
    pub async fn window_offers(
        &self,
        criteria: &SearchCriteria,
        flexible_days: u32,
    ) -> SearchResult<Vec<FlightOffer>> {
        let flexible_days = self.clamp_days(flexible_days);
        let (per_date, _) = self.run_batches(criteria, flexible_days).await?;

        let mut pool: Vec<FlightOffer> = per_date.into_iter().flat_map(|(_, r)| r.offers).collect();
        pool.sort_by(|a, b| compare_price(a.price_amount, b.price_amount));
        debug!(
            "{} offers in the ±{}d window around {}",
            pool.len(),
            flexible_days,
            criteria.route_label()
        );
        Ok(pool)
    }

    /// Searches every shifted date, at most `batch_size` at a time, pausing between batches.
    async fn run_batches(
        &self,
        criteria: &SearchCriteria,
        flexible_days: u32,
    ) -> SearchResult<(Vec<(NaiveDate, AggregatedResult)>, usize)> {
        let radius = flexible_days as i64;
        let shifted: Vec<SearchCriteria> = (-radius..=radius).map(|d| criteria.shifted(d)).collect();
        let batch_size = self.config.batch_size.max(1);
        let pause = Duration::from_millis(self.config.batch_pause_ms);

        let mut per_date = Vec::with_capacity(shifted.len());
        let mut batches = 0;
        for (idx, batch) in shifted.chunks(batch_size).enumerate() {
            if idx > 0 && !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
            batches += 1;

            let outcomes = join_all(batch.iter().map(|c| self.aggregator.collect(c))).await;
            for (c, outcome) in batch.iter().zip(outcomes) {
                per_date.push((c.departure_date, outcome?));
            }
        }
        Ok((per_date, batches))
    }
}

/// One entry per date that produced at least one offer, date-ascending.
pub fn build_calendar(per_date: &[(NaiveDate, AggregatedResult)]) -> Vec<PriceCalendarEntry> {
    let mut by_date: BTreeMap<NaiveDate, Vec<&FlightOffer>> = BTreeMap::new();
    for (date, result) in per_date {
        by_date.entry(*date).or_default().extend(result.offers.iter());
    }

    by_date
        .into_iter()
        .filter_map(|(date, offers)| {
            let cheapest = offers
                .iter()
                .min_by(|a, b| compare_price(a.price_amount, b.price_amount))?;
            Some(PriceCalendarEntry {
                date,
                lowest_price: cheapest.price_amount,
                currency: cheapest.currency.clone(),
                offer_count: offers.len(),
                representative_offer: (*cheapest).clone(),
                is_promotional: offers.iter().any(|o| o.is_promotional),
            })
        })
        .collect()
}

/// First failure reason per source, sorted by source name.
fn merge_failures<'a>(results: impl Iterator<Item = &'a AggregatedResult>) -> Vec<SourceFailure> {
    let mut by_source: BTreeMap<String, String> = BTreeMap::new();
    for result in results {
        for failure in &result.failed_sources {
            by_source
                .entry(failure.source.clone())
                .or_insert_with(|| failure.reason.clone());
        }
    }
    by_source
        .into_iter()
        .map(|(source, reason)| SourceFailure { source, reason })
        .collect()
}
