pub mod search;
pub mod alert;
pub mod source;
pub mod repository;
pub mod notify;
pub mod memory;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use search::{AggregatedResult, CabinClass, FlightOffer, SearchCriteria, SourceFailure};
pub use alert::{Alert, AlertDraft, AlertUpdate, DateWindow, DeliveryStatus, NotificationChannels, NotificationRecord, Route, TriggerKind};
pub use source::{FlightSource, SourceResponse};
pub use notify::{ChannelKind, DeliveryError, NotificationChannel, OutboundNotification};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
    #[error("Internal service error: {0}")]
    InternalError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Error type shared by the collaborator traits (persistence, identity).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
