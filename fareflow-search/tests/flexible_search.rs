use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use fareflow_core::testing::StaticSource;
use fareflow_core::{CabinClass, FlightOffer, FlightSource, SearchCriteria, SourceResponse};
use fareflow_search::{Aggregator, FlexibleSearch, Scorer, SearchError};
use fareflow_store::app_config::{ScoringConfig, SearchConfig};
use fareflow_store::{Cache, CacheTtls, MemoryCacheBackend};

fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 12, 10).unwrap()
}

fn offer(id: &str, date: NaiveDate, hour: u32, price: f64, minutes: u32, stops: u32) -> FlightOffer {
    let departure = Utc.from_utc_datetime(&date.and_hms_opt(hour, 0, 0).unwrap());
    FlightOffer {
        id: id.to_string(),
        source_name: "scripted".to_string(),
        carrier_code: "AH".to_string(),
        carrier_name: "Air Algerie".to_string(),
        flight_number: format!("AH{}", 1000 + hour),
        origin_airport: "CDG".to_string(),
        destination_airport: "ALG".to_string(),
        departure_time: departure,
        arrival_time: departure + chrono::Duration::minutes(minutes as i64),
        duration_minutes: minutes,
        price_amount: price,
        currency: "EUR".to_string(),
        cabin_class: CabinClass::Economy,
        stop_count: stops,
        available_seats: 12,
        is_promotional: false,
        discount_percent: None,
        original_price: None,
    }
}

/// Two offers on every date of the window except base+1, which has none.
fn window_offers() -> Vec<FlightOffer> {
    let mut offers = Vec::new();
    for shift in -3i64..=3 {
        if shift == 1 {
            continue;
        }
        let date = base_date() + chrono::Duration::days(shift);
        let base = 200.0 + (shift * 15) as f64;
        offers.push(offer(&format!("d{}-early", shift), date, 7, base, 180, 1));
        offers.push(offer(&format!("d{}-late", shift), date, 14, base + 40.0, 140, 0));
    }
    offers
}

fn config() -> SearchConfig {
    SearchConfig {
        batch_size: 5,
        batch_pause_ms: 1000,
        ..SearchConfig::default()
    }
}

fn engine(sources: Vec<Arc<dyn FlightSource>>, config: SearchConfig) -> FlexibleSearch {
    let cache = Cache::new(Arc::new(MemoryCacheBackend::new()), CacheTtls::default());
    let aggregator = Arc::new(Aggregator::new(sources, Duration::from_secs(30)));
    FlexibleSearch::new(aggregator, cache, Scorer::new(ScoringConfig::default()), config)
}

fn criteria() -> SearchCriteria {
    SearchCriteria::new("CDG", "ALG", base_date()).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_calendar_has_one_entry_per_date_with_offers() {
    let source = Arc::new(StaticSource::new("scripted", window_offers()));
    let search = engine(vec![source.clone()], config());

    let result = search.search_flexible(&criteria(), 3).await.unwrap();

    assert_eq!(result.metadata.searched_dates, 7);
    assert_eq!(result.calendar.len(), 6);
    assert_eq!(source.calls(), 7);
    assert!(result.calendar.iter().all(|e| e.offer_count > 0));
    assert!(result
        .calendar
        .iter()
        .all(|e| e.date != base_date() + chrono::Duration::days(1)));

    for entry in &result.calendar {
        let min = window_offers()
            .into_iter()
            .filter(|o| o.departure_date() == entry.date)
            .map(|o| o.price_amount)
            .fold(f64::INFINITY, f64::min);
        assert_eq!(entry.lowest_price, min);
    }
}

#[tokio::test(start_paused = true)]
async fn test_pool_stats_and_recommendations() {
    let source = Arc::new(StaticSource::new("scripted", window_offers()));
    let search = engine(vec![source], config());

    let result = search.search_flexible(&criteria(), 3).await.unwrap();
    let prices: Vec<f64> = result.best_offers.iter().map(|o| o.price_amount).collect();
    let mut sorted = prices.clone();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    assert_eq!(prices, sorted);

    assert_eq!(result.metadata.total_offers, 12);
    assert_eq!(result.stats.lowest, 155.0);
    assert_eq!(result.stats.highest, 285.0);
    assert_eq!(result.recommendations.cheapest.id, "d-3-early");
    assert_eq!(result.recommendations.fastest.duration_minutes, 140);
    assert_eq!(result.recommendations.most_flexible.stop_count, 0);

    let scorer = Scorer::new(ScoringConfig::default());
    for offer in &result.best_offers {
        assert!(result.recommendations.best_value_score >= scorer.best_value_score(offer));
    }
}

#[tokio::test(start_paused = true)]
async fn test_best_offers_are_capped() {
    let date = base_date();
    let offers: Vec<FlightOffer> = (0..30)
        .map(|i| offer(&format!("o{}", i), date, 6 + (i % 15) as u32, 100.0 + i as f64, 150, 0))
        .collect();
    let search = engine(vec![Arc::new(StaticSource::new("scripted", offers))], config());

    let result = search.search_flexible(&criteria(), 0).await.unwrap();
    assert_eq!(result.best_offers.len(), 20);
    assert_eq!(result.metadata.total_offers, 30);
    assert_eq!(result.best_offers[19].price_amount, 119.0);
}

#[tokio::test(start_paused = true)]
async fn test_repeat_search_is_served_from_cache() {
    let source = Arc::new(StaticSource::new("scripted", window_offers()));
    let search = engine(vec![source.clone()], config());

    let first = search.search_flexible(&criteria(), 3).await.unwrap();
    let second = search.search_flexible(&criteria(), 3).await.unwrap();

    assert!(!first.metadata.cache_hit);
    assert!(second.metadata.cache_hit);
    assert_eq!(source.calls(), 7);
    assert_eq!(
        serde_json::to_string(&first.best_offers).unwrap(),
        serde_json::to_string(&second.best_offers).unwrap()
    );
    assert_eq!(first.calendar, second.calendar);

    let calendar = search.price_calendar(&criteria(), 3).await.unwrap();
    assert_eq!(calendar, first.calendar);
    assert_eq!(source.calls(), 7);
}

#[tokio::test(start_paused = true)]
async fn test_empty_window_fails_with_no_offers() {
    let empty = Arc::new(StaticSource::new("empty", Vec::new()));
    let down = Arc::new(StaticSource::failing("down", "connection reset"));
    let search = engine(vec![empty, down], config());

    match search.search_flexible(&criteria(), 2).await {
        Err(SearchError::NoOffers { failed_sources, .. }) => {
            assert_eq!(failed_sources.len(), 1);
            assert_eq!(failed_sources[0].source, "down");
        }
        other => panic!("expected NoOffers, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_failing_source_does_not_hide_others() {
    let good = Arc::new(StaticSource::new("scripted", window_offers()));
    let down = Arc::new(StaticSource::failing("down", "HTTP 500"));
    let search = engine(vec![good, down], config());

    let result = search.search_flexible(&criteria(), 3).await.unwrap();
    assert_eq!(result.metadata.total_offers, 12);
    assert_eq!(result.metadata.failed_sources.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_window_is_clamped_to_max() {
    let source = Arc::new(StaticSource::new("scripted", window_offers()));
    let search = engine(
        vec![source.clone()],
        SearchConfig {
            max_flexible_days: 2,
            ..config()
        },
    );

    let result = search.search_flexible(&criteria(), 10).await.unwrap();
    assert_eq!(result.metadata.flexible_days, 2);
    assert_eq!(result.metadata.searched_dates, 5);
    assert_eq!(source.calls(), 5);
}

/// Records the peak number of searches in flight.
struct ProbeSource {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl FlightSource for ProbeSource {
    fn name(&self) -> &str {
        "probe"
    }

    async fn search(&self, criteria: &SearchCriteria) -> SourceResponse {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(200)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        SourceResponse::ok("probe", vec![offer("p", criteria.departure_date, 9, 100.0, 120, 0)])
    }

    async fn get_details(&self, _offer_id: &str) -> Option<FlightOffer> {
        None
    }
}

#[tokio::test(start_paused = true)]
async fn test_batches_cap_concurrency_and_pause_between() {
    let probe = Arc::new(ProbeSource {
        in_flight: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let search = engine(vec![probe.clone()], config());

    let started = tokio::time::Instant::now();
    let result = search.search_flexible(&criteria(), 7).await.unwrap();

    // 15 dates in batches of 5
    assert_eq!(result.metadata.batches, 3);
    assert_eq!(probe.peak.load(Ordering::SeqCst), 5);
    // three batches of 200ms work plus two 1s pauses
    assert!(started.elapsed() >= Duration::from_millis(2600));
}
