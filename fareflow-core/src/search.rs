use std::collections::BTreeSet;

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum CabinClass {
    Economy,
    Business,
    First,
}

impl CabinClass {
    pub fn as_str(self) -> &'static str {
        match self {
            CabinClass::Economy => "economy",
            CabinClass::Business => "business",
            CabinClass::First => "first",
        }
    }

    /// Accepts canonical names as well as the single-letter booking codes
    /// and upper-case enum spellings sources tend to send.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ECONOMY" | "Y" | "M" | "PREMIUM_ECONOMY" | "W" => Some(CabinClass::Economy),
            "BUSINESS" | "C" | "J" => Some(CabinClass::Business),
            "FIRST" | "F" => Some(CabinClass::First),
            _ => None,
        }
    }
}

impl std::fmt::Display for CabinClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single logical flight search. Built once, then only copied
/// (e.g. date-shifted) and used as a cache-key seed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchCriteria {
    pub origin: String,
    pub destination: String,
    pub departure_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub passenger_count: u32,
    pub cabin_class: Option<CabinClass>,
    pub max_price: Option<f64>,
    #[serde(default)]
    pub preferred_sources: Vec<String>,
    #[serde(default)]
    pub direct_only: bool,
}

impl SearchCriteria {
    pub fn new(origin: &str, destination: &str, departure_date: NaiveDate) -> CoreResult<Self> {
        let origin = normalize_airport(origin)?;
        let destination = normalize_airport(destination)?;
        if origin == destination {
            return Err(CoreError::ValidationError(format!(
                "origin and destination are both {}",
                origin
            )));
        }

        Ok(Self {
            origin,
            destination,
            departure_date,
            return_date: None,
            passenger_count: 1,
            cabin_class: None,
            max_price: None,
            preferred_sources: Vec::new(),
            direct_only: false,
        })
    }

    pub fn with_return_date(mut self, date: NaiveDate) -> CoreResult<Self> {
        if date < self.departure_date {
            return Err(CoreError::ValidationError(
                "return date precedes departure date".to_string(),
            ));
        }
        self.return_date = Some(date);
        Ok(self)
    }

    pub fn with_passengers(mut self, count: u32) -> CoreResult<Self> {
        if count == 0 || count > 9 {
            return Err(CoreError::ValidationError(format!(
                "passenger count must be between 1 and 9, got {}",
                count
            )));
        }
        self.passenger_count = count;
        Ok(self)
    }

    pub fn with_cabin(mut self, cabin: CabinClass) -> Self {
        self.cabin_class = Some(cabin);
        self
    }

    pub fn with_max_price(mut self, max_price: f64) -> Self {
        self.max_price = Some(max_price);
        self
    }

    pub fn with_preferred_sources(mut self, sources: Vec<String>) -> Self {
        self.preferred_sources = sources;
        self
    }

    pub fn direct_only(mut self) -> Self {
        self.direct_only = true;
        self
    }

    /// Copy of these criteria with departure (and return, if any) moved by `days`.
    pub fn shifted(&self, days: i64) -> Self {
        let mut shifted = self.clone();
        shifted.departure_date = self.departure_date + Duration::days(days);
        shifted.return_date = self.return_date.map(|d| d + Duration::days(days));
        shifted
    }

    pub fn route_label(&self) -> String {
        format!("{}-{}", self.origin, self.destination)
    }
}

fn normalize_airport(code: &str) -> CoreResult<String> {
    let code = code.trim().to_ascii_uppercase();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(CoreError::ValidationError(format!(
            "airport code must be 3 letters, got '{}'",
            code
        )));
    }
    Ok(code)
}

/// Canonical flight offer. Every source adapter emits this shape at its own boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlightOffer {
    pub id: String,
    pub source_name: String,
    pub carrier_code: String,
    pub carrier_name: String,
    pub flight_number: String,
    pub origin_airport: String,
    pub destination_airport: String,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    pub duration_minutes: u32,
    pub price_amount: f64,
    pub currency: String,
    pub cabin_class: CabinClass,
    pub stop_count: u32,
    pub available_seats: u32,
    pub is_promotional: bool,
    pub discount_percent: Option<f64>,
    pub original_price: Option<f64>,
}

impl FlightOffer {
    pub fn departure_date(&self) -> NaiveDate {
        self.departure_time.date_naive()
    }

    pub fn departure_hour(&self) -> u32 {
        self.departure_time.hour()
    }

    pub fn is_direct(&self) -> bool {
        self.stop_count == 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceFailure {
    pub source: String,
    pub reason: String,
}

/// Merged outcome of one fan-out over all adapters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregatedResult {
    /// Price-ascending.
    pub offers: Vec<FlightOffer>,
    pub contributing_sources: BTreeSet<String>,
    pub failed_sources: Vec<SourceFailure>,
}

impl AggregatedResult {
    pub fn cheapest(&self) -> Option<&FlightOffer> {
        self.offers.first()
    }
}

/// Orders two prices ascending, treating NaN as the most expensive.
pub fn compare_price(a: f64, b: f64) -> std::cmp::Ordering {
    a.partial_cmp(&b).unwrap_or_else(|| {
        if a.is_nan() && !b.is_nan() {
            std::cmp::Ordering::Greater
        } else if b.is_nan() && !a.is_nan() {
            std::cmp::Ordering::Less
        } else {
            std::cmp::Ordering::Equal
        }
    })
}
