use std::cmp::Ordering;

use fareflow_core::search::compare_price;
use fareflow_core::{CabinClass, FlightOffer};
use fareflow_store::app_config::ScoringConfig;

use crate::models::{PriceStats, Recommendations};

/// Picks the categorized recommendations and computes window statistics.
#[derive(Debug, Clone)]
pub struct Scorer {
    config: ScoringConfig,
}

impl Scorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    fn class_weight(&self, cabin: CabinClass) -> f64 {
        match cabin {
            CabinClass::Economy => self.config.class_weights.economy,
            CabinClass::Business => self.config.class_weights.business,
            CabinClass::First => self.config.class_weights.first,
        }
    }

    fn offer_weight(&self, offer: &FlightOffer) -> f64 {
        if offer.is_promotional {
            self.config.promotional_weight
        } else {
            self.config.regular_weight
        }
    }

    /// `1/price * 1/duration * class_weight * offer_weight`.
    /// Offers with a non-positive price or zero duration score 0.
    pub fn best_value_score(&self, offer: &FlightOffer) -> f64 {
        if !(offer.price_amount > 0.0) || offer.duration_minutes == 0 {
            return 0.0;
        }
        (1.0 / offer.price_amount)
            * (1.0 / offer.duration_minutes as f64)
            * self.class_weight(offer.cabin_class)
            * self.offer_weight(offer)
    }

    pub fn departs_in_preferred_hours(&self, offer: &FlightOffer) -> bool {
        let hour = offer.departure_hour();
        hour >= self.config.preferred_hour_start && hour < self.config.preferred_hour_end
    }

    /// None only for an empty pool.
    pub fn recommend(&self, pool: &[FlightOffer]) -> Option<Recommendations> {
        let cheapest = pool
            .iter()
            .min_by(|a, b| compare_price(a.price_amount, b.price_amount))?;

        let fastest = pool.iter().min_by(|a, b| {
            a.duration_minutes
                .cmp(&b.duration_minutes)
                .then_with(|| compare_price(a.price_amount, b.price_amount))
        })?;

        // max_by keeps the last of equal elements; iterate reversed so ties go to the earlier offer
        let (best_value, best_value_score) = pool
            .iter()
            .rev()
            .map(|o| (o, self.best_value_score(o)))
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))?;

        let most_flexible = pool.iter().min_by(|a, b| {
            a.stop_count
                .cmp(&b.stop_count)
                .then_with(|| {
                    // preferred hours sort first
                    self.departs_in_preferred_hours(b)
                        .cmp(&self.departs_in_preferred_hours(a))
                })
                .then_with(|| compare_price(a.price_amount, b.price_amount))
        })?;

        Some(Recommendations {
            cheapest: cheapest.clone(),
            fastest: fastest.clone(),
            best_value: best_value.clone(),
            best_value_score,
            most_flexible: most_flexible.clone(),
        })
    }
}

/// Statistics over every offer price in the pool. None for an empty pool.
pub fn price_stats(pool: &[FlightOffer]) -> Option<PriceStats> {
    if pool.is_empty() {
        return None;
    }

    let mut prices: Vec<f64> = pool.iter().map(|o| o.price_amount).collect();
    prices.sort_by(|a, b| compare_price(*a, *b));

    let lowest = prices[0];
    let highest = prices[prices.len() - 1];
    let average = prices.iter().sum::<f64>() / prices.len() as f64;
    let mid = prices.len() / 2;
    let median = if prices.len() % 2 == 0 {
        (prices[mid - 1] + prices[mid]) / 2.0
    } else {
        prices[mid]
    };
    let savings_percent = if highest > 0.0 {
        (highest - lowest) / highest * 100.0
    } else {
        0.0
    };

    Some(PriceStats {
        lowest,
        highest,
        average: round2(average),
        median: round2(median),
        savings_percent: round2(savings_percent),
    })
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
