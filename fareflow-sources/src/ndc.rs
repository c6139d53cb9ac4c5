use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fareflow_core::{CabinClass, FlightOffer, FlightSource, SearchCriteria, SourceResponse};
use fareflow_store::app_config::SourceConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::duration::parse_iso8601_minutes;
use crate::spacing::RequestSpacer;
use crate::SourceError;

// ============================================================================
// NDC AirShopping wire models
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct AirShoppingRequest {
    pub shopping_criteria: ShoppingCriteria,
    pub passenger_count: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ShoppingCriteria {
    pub origin: String,
    pub destination: String,
    pub travel_date: String,
    pub return_date: Option<String>,
    pub cabin: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AirShoppingResponse {
    pub response_id: String,
    pub offers: Vec<NdcOffer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NdcOffer {
    pub offer_id: String,
    pub owner: String, // Airline Code
    pub owner_name: Option<String>,
    pub flight_number: String,
    pub origin: String,
    pub destination: String,
    pub departure: DateTime<Utc>,
    pub arrival: DateTime<Utc>,
    pub duration: String, // ISO-8601, e.g. PT2H35M
    pub cabin: String,
    #[serde(default)]
    pub stops: u32,
    pub seats_left: Option<u32>,
    pub total_price: NdcPrice,
    pub base_price: Option<NdcPrice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NdcPrice {
    pub amount: f64,
    pub currency: String,
}

impl NdcOffer {
    /// Translate to the canonical shape. Fails on unknown cabins or bad durations.
    pub fn into_offer(self, source_name: &str) -> Result<FlightOffer, SourceError> {
        let cabin_class = CabinClass::parse(&self.cabin)
            .ok_or_else(|| SourceError::Parse(format!("unknown cabin '{}'", self.cabin)))?;
        let duration_minutes = parse_iso8601_minutes(&self.duration)
            .ok_or_else(|| SourceError::Parse(format!("bad duration '{}'", self.duration)))?;

        let original_price = self
            .base_price
            .as_ref()
            .map(|p| p.amount)
            .filter(|base| *base > self.total_price.amount);
        let discount_percent = original_price
            .map(|base| ((base - self.total_price.amount) / base * 100.0 * 100.0).round() / 100.0);

        Ok(FlightOffer {
            id: self.offer_id,
            source_name: source_name.to_string(),
            carrier_name: self.owner_name.unwrap_or_else(|| self.owner.clone()),
            carrier_code: self.owner,
            flight_number: self.flight_number,
            origin_airport: self.origin.to_ascii_uppercase(),
            destination_airport: self.destination.to_ascii_uppercase(),
            departure_time: self.departure,
            arrival_time: self.arrival,
            duration_minutes,
            price_amount: self.total_price.amount,
            currency: self.total_price.currency,
            cabin_class,
            stop_count: self.stops,
            available_seats: self.seats_left.unwrap_or(9),
            is_promotional: original_price.is_some(),
            discount_percent,
            original_price,
        })
    }
}

// ============================================================================
// Adapter
// ============================================================================

/// Airline exposing an NDC-style JSON shopping API.
pub struct NdcSource {
    name: String,
    base_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
    spacer: RequestSpacer,
}

impl NdcSource {
    pub fn new(config: &SourceConfig) -> Result<Self, SourceError> {
        let base_url = config
            .base_url
            .clone()
            .ok_or_else(|| SourceError::Config(format!("source '{}' needs base_url", config.name)))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| SourceError::Config(e.to_string()))?;

        Ok(Self {
            name: config.name.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            http,
            spacer: RequestSpacer::new(Duration::from_millis(config.min_interval_ms)),
        })
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn shop(&self, criteria: &SearchCriteria) -> Result<Vec<FlightOffer>, SourceError> {
        let body = AirShoppingRequest {
            shopping_criteria: ShoppingCriteria {
                origin: criteria.origin.clone(),
                destination: criteria.destination.clone(),
                travel_date: criteria.departure_date.to_string(),
                return_date: criteria.return_date.map(|d| d.to_string()),
                cabin: criteria.cabin_class.map(|c| c.as_str().to_ascii_uppercase()),
            },
            passenger_count: criteria.passenger_count,
        };

        let response = self
            .request(self.http.post(format!("{}/air-shopping", self.base_url)))
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let shopping: AirShoppingResponse = response.json().await?;

        let mut offers = Vec::with_capacity(shopping.offers.len());
        for raw in shopping.offers {
            let offer_id = raw.offer_id.clone();
            match raw.into_offer(&self.name) {
                Ok(offer) => offers.push(offer),
                // One malformed offer should not sink the whole response.
                Err(e) => warn!("{} dropped offer {}: {}", self.name, offer_id, e),
            }
        }
        Ok(offers)
    }
}

#[async_trait]
impl FlightSource for NdcSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, criteria: &SearchCriteria) -> SourceResponse {
        self.spacer.wait_turn().await;
        match self.shop(criteria).await {
            Ok(offers) => SourceResponse::ok(&self.name, offers),
            Err(e) => SourceResponse::failed(&self.name, e.to_string()),
        }
    }

    async fn get_details(&self, offer_id: &str) -> Option<FlightOffer> {
        self.spacer.wait_turn().await;
        let url = format!("{}/offers/{}", self.base_url, offer_id);

        let result = async {
            let response = self.request(self.http.get(&url)).send().await?.error_for_status()?;
            Ok::<NdcOffer, SourceError>(response.json().await?)
        }
        .await;

        match result.and_then(|raw| raw.into_offer(&self.name)) {
            Ok(offer) => Some(offer),
            Err(e) => {
                warn!("{} details lookup for {} failed: {}", self.name, offer_id, e);
                None
            }
        }
    }
}
