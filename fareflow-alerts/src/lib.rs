pub mod dispatch;
pub mod monitor;
pub mod policy;
pub mod push;
pub mod scheduler;
pub mod service;
pub mod special;

pub use dispatch::{DispatchOutcome, Dispatcher};
pub use monitor::{AlertMonitor, Evaluation, SweepReport};
pub use policy::{AlertMatch, TriggerPolicy};
pub use push::PushHub;
pub use scheduler::{Scheduler, SweepGuard, SweepOutcome};
pub use service::AlertService;
pub use special::{SpecialOfferReport, SpecialOfferScanner};

use chrono::{DateTime, Utc};
use fareflow_core::{BoxError, CoreError};
use fareflow_search::SearchError;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("Alert not found: {0}")]
    NotFound(Uuid),
    #[error("Alert {0} belongs to another user")]
    NotOwner(Uuid),
    #[error("Too many requests, retry after {0}")]
    RateLimited(DateTime<Utc>),
    #[error("Search failed: {0}")]
    Search(#[from] SearchError),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("Repository error: {0}")]
    Repository(String),
}

impl From<BoxError> for MonitorError {
    fn from(err: BoxError) -> Self {
        MonitorError::Repository(err.to_string())
    }
}

pub type MonitorResult<T> = Result<T, MonitorError>;
