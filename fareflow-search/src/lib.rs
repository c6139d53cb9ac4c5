pub mod aggregator;
pub mod flexible;
pub mod models;
pub mod scoring;

pub use aggregator::Aggregator;
pub use flexible::FlexibleSearch;
pub use models::{FlexibleResult, PriceCalendarEntry, PriceStats, Recommendations, SearchMetadata};
pub use scoring::Scorer;

use fareflow_core::SourceFailure;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// Nothing survived aggregation. Distinct from a broken system: every
    /// source may have answered and simply had no matching flights.
    #[error("No offers found for {route} ({} source(s) failed)", .failed_sources.len())]
    NoOffers {
        route: String,
        failed_sources: Vec<SourceFailure>,
    },
}

pub type SearchResult<T> = Result<T, SearchError>;
