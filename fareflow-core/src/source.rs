use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::search::{FlightOffer, SearchCriteria};

/// Outcome of one adapter call. Adapters never fail past their boundary;
/// a transport or parse problem comes back as `success: false` with a reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceResponse {
    pub source_name: String,
    pub success: bool,
    pub offers: Vec<FlightOffer>,
    pub error: Option<String>,
}

impl SourceResponse {
    pub fn ok(source_name: &str, offers: Vec<FlightOffer>) -> Self {
        Self {
            source_name: source_name.to_string(),
            success: true,
            offers,
            error: None,
        }
    }

    pub fn failed(source_name: &str, reason: impl Into<String>) -> Self {
        Self {
            source_name: source_name.to_string(),
            success: false,
            offers: Vec::new(),
            error: Some(reason.into()),
        }
    }
}

/// Capability every airline data source implements.
#[async_trait]
pub trait FlightSource: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, criteria: &SearchCriteria) -> SourceResponse;

    /// Look up a single offer previously returned by this source.
    async fn get_details(&self, offer_id: &str) -> Option<FlightOffer>;
}
