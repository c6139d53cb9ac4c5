use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::alert::{Alert, NotificationRecord, Route};
use crate::BoxError;

/// Repository trait for price alerts
#[async_trait]
pub trait AlertRepository: Send + Sync {
    /// Insert or replace an alert
    async fn save_alert(&self, alert: &Alert) -> Result<(), BoxError>;

    async fn get_alert(&self, id: Uuid) -> Result<Option<Alert>, BoxError>;

    /// Hard delete. Returns false when nothing was removed.
    async fn delete_alert(&self, id: Uuid) -> Result<bool, BoxError>;

    async fn list_active_alerts(&self) -> Result<Vec<Alert>, BoxError>;

    async fn list_alerts_for_owner(&self, owner_id: &str) -> Result<Vec<Alert>, BoxError>;

    /// Sets `last_triggered_at` to `new` only while it still equals `expected`.
    /// Returns false when another writer got there first.
    async fn swap_last_triggered(
        &self,
        id: Uuid,
        expected: Option<DateTime<Utc>>,
        new: Option<DateTime<Utc>>,
    ) -> Result<bool, BoxError>;
}

/// Repository trait for notification records
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Insert or replace a record (status updates go through here too)
    async fn save_notification(&self, record: &NotificationRecord) -> Result<(), BoxError>;

    async fn list_notifications_for_alert(
        &self,
        alert_id: Uuid,
    ) -> Result<Vec<NotificationRecord>, BoxError>;

    async fn list_notifications_for_owner(
        &self,
        owner_id: &str,
    ) -> Result<Vec<NotificationRecord>, BoxError>;
}

/// Repository trait for user search history and route popularity
#[async_trait]
pub trait SearchHistoryRepository: Send + Sync {
    async fn record_search(
        &self,
        user_id: &str,
        route: &Route,
        at: DateTime<Utc>,
    ) -> Result<(), BoxError>;

    /// Distinct users who searched `route` at or after `since`.
    async fn users_who_searched(
        &self,
        route: &Route,
        since: DateTime<Utc>,
    ) -> Result<Vec<String>, BoxError>;

    /// Most searched routes since `since`, busiest first.
    async fn popular_routes(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<(Route, u64)>, BoxError>;
}

/// Identity collaborator: resolves contact details for an owner id.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn email_for(&self, owner_id: &str) -> Result<Option<String>, BoxError>;
}
