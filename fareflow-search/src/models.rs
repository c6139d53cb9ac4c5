use chrono::{DateTime, NaiveDate, Utc};
use fareflow_core::{FlightOffer, SourceFailure};
use serde::{Deserialize, Serialize};

/// Cheapest fare for one date of a flexible window. Dates without offers get no entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceCalendarEntry {
    pub date: NaiveDate,
    pub lowest_price: f64,
    pub currency: String,
    pub offer_count: usize,
    pub representative_offer: FlightOffer,
    pub is_promotional: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PriceStats {
    pub lowest: f64,
    pub highest: f64,
    pub average: f64,
    pub median: f64,
    /// (highest - lowest) / highest * 100
    pub savings_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendations {
    pub cheapest: FlightOffer,
    pub fastest: FlightOffer,
    pub best_value: FlightOffer,
    pub best_value_score: f64,
    pub most_flexible: FlightOffer,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchMetadata {
    pub cache_hit: bool,
    pub flexible_days: u32,
    pub searched_dates: usize,
    pub dates_with_offers: usize,
    pub batches: usize,
    pub total_offers: usize,
    pub elapsed_ms: u64,
    pub generated_at: DateTime<Utc>,
    pub failed_sources: Vec<SourceFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlexibleResult {
    pub origin: String,
    pub destination: String,
    pub base_date: NaiveDate,
    /// Date-ascending
    pub calendar: Vec<PriceCalendarEntry>,
    /// Cheapest offers across the whole window, price-ascending
    pub best_offers: Vec<FlightOffer>,
    pub recommendations: Recommendations,
    pub stats: PriceStats,
    pub metadata: SearchMetadata,
}

impl FlexibleResult {
    pub fn cheapest(&self) -> &FlightOffer {
        &self.recommendations.cheapest
    }
}
