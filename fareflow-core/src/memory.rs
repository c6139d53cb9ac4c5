//! In-memory collaborators, used by the worker when no database is configured and by tests.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::alert::{Alert, NotificationRecord, Route};
use crate::repository::{AlertRepository, NotificationRepository, SearchHistoryRepository, UserDirectory};
use crate::BoxError;

#[derive(Default)]
pub struct InMemoryAlertRepository {
    alerts: RwLock<HashMap<Uuid, Alert>>,
}

impl InMemoryAlertRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AlertRepository for InMemoryAlertRepository {
    async fn save_alert(&self, alert: &Alert) -> Result<(), BoxError> {
        self.alerts.write().await.insert(alert.id, alert.clone());
        Ok(())
    }

    async fn get_alert(&self, id: Uuid) -> Result<Option<Alert>, BoxError> {
        Ok(self.alerts.read().await.get(&id).cloned())
    }

    async fn delete_alert(&self, id: Uuid) -> Result<bool, BoxError> {
        Ok(self.alerts.write().await.remove(&id).is_some())
    }

    async fn list_active_alerts(&self) -> Result<Vec<Alert>, BoxError> {
        let mut alerts: Vec<Alert> = self
            .alerts
            .read()
            .await
            .values()
            .filter(|a| a.is_active)
            .cloned()
            .collect();
        alerts.sort_by_key(|a| a.created_at);
        Ok(alerts)
    }

    async fn list_alerts_for_owner(&self, owner_id: &str) -> Result<Vec<Alert>, BoxError> {
        let mut alerts: Vec<Alert> = self
            .alerts
            .read()
            .await
            .values()
            .filter(|a| a.owner_id == owner_id)
            .cloned()
            .collect();
        alerts.sort_by_key(|a| a.created_at);
        Ok(alerts)
    }

    async fn swap_last_triggered(
        &self,
        id: Uuid,
        expected: Option<DateTime<Utc>>,
        new: Option<DateTime<Utc>>,
    ) -> Result<bool, BoxError> {
        let mut alerts = self.alerts.write().await;
        let alert = alerts
            .get_mut(&id)
            .ok_or_else(|| format!("Alert not found: {}", id))?;
        if alert.last_triggered_at != expected {
            return Ok(false);
        }
        alert.last_triggered_at = new;
        Ok(true)
    }
}

#[derive(Default)]
pub struct InMemoryNotificationRepository {
    records: RwLock<Vec<NotificationRecord>>,
}

impl InMemoryNotificationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<NotificationRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl NotificationRepository for InMemoryNotificationRepository {
    async fn save_notification(&self, record: &NotificationRecord) -> Result<(), BoxError> {
        let mut records = self.records.write().await;
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record.clone(),
            None => records.push(record.clone()),
        }
        Ok(())
    }

    async fn list_notifications_for_alert(
        &self,
        alert_id: Uuid,
    ) -> Result<Vec<NotificationRecord>, BoxError> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.alert_id == Some(alert_id))
            .cloned()
            .collect())
    }

    async fn list_notifications_for_owner(
        &self,
        owner_id: &str,
    ) -> Result<Vec<NotificationRecord>, BoxError> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemorySearchHistory {
    entries: RwLock<Vec<(String, Route, DateTime<Utc>)>>,
}

impl InMemorySearchHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SearchHistoryRepository for InMemorySearchHistory {
    async fn record_search(
        &self,
        user_id: &str,
        route: &Route,
        at: DateTime<Utc>,
    ) -> Result<(), BoxError> {
        self.entries
            .write()
            .await
            .push((user_id.to_string(), route.clone(), at));
        Ok(())
    }

    async fn users_who_searched(
        &self,
        route: &Route,
        since: DateTime<Utc>,
    ) -> Result<Vec<String>, BoxError> {
        let users: BTreeSet<String> = self
            .entries
            .read()
            .await
            .iter()
            .filter(|(_, r, at)| r == route && *at >= since)
            .map(|(user, _, _)| user.clone())
            .collect();
        Ok(users.into_iter().collect())
    }

    async fn popular_routes(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<(Route, u64)>, BoxError> {
        let mut counts: HashMap<Route, u64> = HashMap::new();
        for (_, route, at) in self.entries.read().await.iter() {
            if *at >= since {
                *counts.entry(route.clone()).or_default() += 1;
            }
        }
        let mut routes: Vec<(Route, u64)> = counts.into_iter().collect();
        routes.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.to_string().cmp(&b.0.to_string())));
        routes.truncate(limit);
        Ok(routes)
    }
}

#[derive(Default)]
pub struct InMemoryUserDirectory {
    emails: RwLock<HashMap<String, String>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, owner_id: &str, email: &str) {
        self.emails
            .write()
            .await
            .insert(owner_id.to_string(), email.to_string());
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn email_for(&self, owner_id: &str) -> Result<Option<String>, BoxError> {
        Ok(self.emails.read().await.get(owner_id).cloned())
    }
}
