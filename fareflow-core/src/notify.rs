use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::alert::{NotificationRecord, TriggerKind};
use crate::search::FlightOffer;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Email,
    Push,
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelKind::Email => f.write_str("email"),
            ChannelKind::Push => f.write_str("push"),
        }
    }
}

/// Semantic payload handed to a delivery channel. Rendering is the channel's job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundNotification {
    pub notification_id: Uuid,
    pub alert_id: Option<Uuid>,
    pub owner_id: String,
    /// Email address or push room, depending on the channel.
    pub destination: String,
    pub title: String,
    pub message: String,
    pub trigger_kind: TriggerKind,
    pub offer: Option<FlightOffer>,
    pub created_at: DateTime<Utc>,
}

impl OutboundNotification {
    pub fn for_record(record: &NotificationRecord, destination: String) -> Self {
        Self {
            notification_id: record.id,
            alert_id: record.alert_id,
            owner_id: record.owner_id.clone(),
            destination,
            title: record.title.clone(),
            message: record.message.clone(),
            trigger_kind: record.trigger_kind,
            offer: record.offer.clone(),
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Channel unavailable: {0}")]
    Unavailable(String),
    #[error("Delivery transport failed: {0}")]
    Transport(String),
    #[error("Payload encoding failed: {0}")]
    Encoding(String),
}

/// Notification delivery collaborator for one channel.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    async fn deliver(&self, notification: &OutboundNotification) -> Result<(), DeliveryError>;
}
