use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, NaiveTime, TimeZone, Utc, Weekday};
use fareflow_core::{CabinClass, FlightOffer, FlightSource, SearchCriteria, SourceResponse};
use fareflow_store::app_config::SourceConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::RwLock;
use tracing::debug;

use crate::spacing::RequestSpacer;

/// Offers remembered for `get_details` before the oldest are forgotten.
const ISSUED_CAPACITY: usize = 10_000;

/// Insertion-ordered offer store that evicts the oldest entry once full.
struct IssuedOffers {
    capacity: usize,
    offers: HashMap<String, FlightOffer>,
    order: VecDeque<String>,
}

impl IssuedOffers {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            offers: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn insert(&mut self, offer: FlightOffer) {
        if self.offers.insert(offer.id.clone(), offer.clone()).is_some() {
            return;
        }
        self.order.push_back(offer.id);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.offers.remove(&oldest);
            }
        }
    }

    fn get(&self, offer_id: &str) -> Option<&FlightOffer> {
        self.offers.get(offer_id)
    }

    fn len(&self) -> usize {
        self.offers.len()
    }
}

/// Carrier that synthesizes plausible fares instead of calling a remote API.
///
/// Output is deterministic per (source, route, date, cabin, passengers) so repeated
/// searches agree with each other.
pub struct SimulatedSource {
    name: String,
    carrier_code: String,
    carrier_name: String,
    base_price: f64,
    failure_rate: f64,
    currency: String,
    spacer: RequestSpacer,
    issued: RwLock<IssuedOffers>,
}

impl SimulatedSource {
    pub fn new(config: &SourceConfig) -> Self {
        Self {
            name: config.name.clone(),
            carrier_code: config.carrier_code.clone(),
            carrier_name: config.carrier_name.clone(),
            base_price: config.base_price,
            failure_rate: config.failure_rate.clamp(0.0, 1.0),
            currency: config.currency.clone(),
            spacer: RequestSpacer::new(Duration::from_millis(config.min_interval_ms)),
            issued: RwLock::new(IssuedOffers::new(ISSUED_CAPACITY)),
        }
    }

    fn seed_for(&self, criteria: &SearchCriteria) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.name.hash(&mut hasher);
        criteria.origin.hash(&mut hasher);
        criteria.destination.hash(&mut hasher);
        criteria.departure_date.hash(&mut hasher);
        criteria.cabin_class.hash(&mut hasher);
        criteria.passenger_count.hash(&mut hasher);
        hasher.finish()
    }

    /// Route-stable block time, so every flight on a route has a similar duration.
    fn base_block_minutes(criteria: &SearchCriteria) -> u32 {
        let mut hasher = DefaultHasher::new();
        criteria.origin.hash(&mut hasher);
        criteria.destination.hash(&mut hasher);
        75 + (hasher.finish() % 480) as u32
    }

    fn generate(&self, criteria: &SearchCriteria, rng: &mut StdRng) -> Vec<FlightOffer> {
        let requested = criteria.cabin_class.unwrap_or(CabinClass::Economy);
        let count = rng.gen_range(3..=6);
        let block = Self::base_block_minutes(criteria);
        let weekend = matches!(
            criteria.departure_date.weekday(),
            Weekday::Fri | Weekday::Sat | Weekday::Sun
        );

        (0..count)
            .map(|idx| {
                // Like many real feeds, the cabin filter is not always honoured.
                let cabin = if idx == count - 1 && requested != CabinClass::Economy {
                    CabinClass::Economy
                } else {
                    requested
                };

                let stop_count = match rng.gen_range(0..10) {
                    0..=5 => 0,
                    6..=8 => 1,
                    _ => 2,
                };
                let duration_minutes = block + stop_count * rng.gen_range(55..160);

                let hour = rng.gen_range(5..23);
                let minute = [0, 10, 25, 40, 55][rng.gen_range(0..5)];
                let departure_time = Utc.from_utc_datetime(
                    &criteria.departure_date.and_time(
                        NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN),
                    ),
                );
                let arrival_time = departure_time + chrono::Duration::minutes(duration_minutes as i64);

                let cabin_factor = match cabin {
                    CabinClass::Economy => 1.0,
                    CabinClass::Business => 2.8,
                    CabinClass::First => 4.5,
                };
                let day_factor = if weekend { 1.15 } else { 1.0 };
                let stop_factor = 1.0 - 0.08 * stop_count as f64;
                let noise = rng.gen_range(0.75..1.35);
                let fare = self.base_price * cabin_factor * day_factor * stop_factor * noise;

                let is_promotional = rng.gen_bool(0.15);
                let (price, discount_percent, original_price) = if is_promotional {
                    let discount: f64 = rng.gen_range(10.0..45.0);
                    let discounted = fare * (1.0 - discount / 100.0);
                    (discounted, Some(round2(discount)), Some(round2(fare)))
                } else {
                    (fare, None, None)
                };

                FlightOffer {
                    id: format!(
                        "{}-{}{}-{}-{}",
                        self.name, criteria.origin, criteria.destination, criteria.departure_date, idx
                    ),
                    source_name: self.name.clone(),
                    carrier_code: self.carrier_code.clone(),
                    carrier_name: self.carrier_name.clone(),
                    flight_number: format!("{}{}", self.carrier_code, 1000 + rng.gen_range(0..8999)),
                    origin_airport: criteria.origin.clone(),
                    destination_airport: criteria.destination.clone(),
                    departure_time,
                    arrival_time,
                    duration_minutes,
                    price_amount: round2(price * criteria.passenger_count as f64),
                    currency: self.currency.clone(),
                    cabin_class: cabin,
                    stop_count,
                    available_seats: rng.gen_range(1..=40),
                    is_promotional,
                    discount_percent,
                    original_price: original_price.map(|p| round2(p * criteria.passenger_count as f64)),
                }
            })
            .collect()
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[async_trait]
impl FlightSource for SimulatedSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, criteria: &SearchCriteria) -> SourceResponse {
        self.spacer.wait_turn().await;

        let mut rng = StdRng::seed_from_u64(self.seed_for(criteria));
        if self.failure_rate > 0.0 && rng.gen_bool(self.failure_rate) {
            return SourceResponse::failed(&self.name, "simulated upstream outage");
        }

        let offers = self.generate(criteria, &mut rng);
        debug!("{} produced {} offers for {}", self.name, offers.len(), criteria.route_label());

        let mut issued = self.issued.write().await;
        for offer in &offers {
            issued.insert(offer.clone());
        }
        debug!("{} remembers {} issued offers", self.name, issued.len());

        SourceResponse::ok(&self.name, offers)
    }

    async fn get_details(&self, offer_id: &str) -> Option<FlightOffer> {
        self.issued.read().await.get(offer_id).cloned()
    }
}
