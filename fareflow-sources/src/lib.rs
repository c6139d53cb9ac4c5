pub mod cached;
pub mod duration;
pub mod ndc;
pub mod simulated;
pub mod spacing;

use std::sync::Arc;

use fareflow_core::FlightSource;
use fareflow_store::app_config::{SourceConfig, SourceKind};
use fareflow_store::Cache;
use tracing::info;

pub use cached::CachedSource;
pub use ndc::NdcSource;
pub use simulated::SimulatedSource;
pub use spacing::RequestSpacer;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Source misconfigured: {0}")]
    Config(String),
    #[error("Upstream request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Unreadable upstream payload: {0}")]
    Parse(String),
}

/// Instantiate every configured source, each behind the shared search cache.
pub fn build_sources(
    configs: &[SourceConfig],
    cache: Cache,
) -> Result<Vec<Arc<dyn FlightSource>>, SourceError> {
    let mut sources: Vec<Arc<dyn FlightSource>> = Vec::with_capacity(configs.len());
    for config in configs {
        let inner: Arc<dyn FlightSource> = match config.kind {
            SourceKind::Simulated => Arc::new(SimulatedSource::new(config)),
            SourceKind::Ndc => Arc::new(NdcSource::new(config)?),
        };
        info!(
            "Registered source {} ({:?}, min interval {}ms)",
            config.name, config.kind, config.min_interval_ms
        );
        sources.push(Arc::new(CachedSource::new(inner, cache.clone())));
    }
    Ok(sources)
}
