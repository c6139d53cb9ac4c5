use std::sync::Arc;

use fareflow_core::repository::NotificationRepository;
use fareflow_core::{Alert, AlertDraft, AlertUpdate, NotificationRecord};
use fareflow_store::app_config::RateLimitConfig;
use fareflow_store::Cache;
use tracing::info;
use uuid::Uuid;

use crate::monitor::{AlertMonitor, Evaluation};
use crate::{MonitorError, MonitorResult};

/// Owner-scoped alert management. The caller supplies an already
/// authenticated owner id.
pub struct AlertService {
    monitor: Arc<AlertMonitor>,
    notifications: Arc<dyn NotificationRepository>,
    cache: Cache,
    test_limit: RateLimitConfig,
}

impl AlertService {
    pub fn new(
        monitor: Arc<AlertMonitor>,
        notifications: Arc<dyn NotificationRepository>,
        cache: Cache,
        test_limit: RateLimitConfig,
    ) -> Self {
        Self {
            monitor,
            notifications,
            cache,
            test_limit,
        }
    }

    async fn owned(&self, owner_id: &str, id: Uuid) -> MonitorResult<Alert> {
        let alert = self
            .monitor
            .alerts()
            .get_alert(id)
            .await?
            .ok_or(MonitorError::NotFound(id))?;
        AlertMonitor::ensure_owner(&alert, owner_id)?;
        Ok(alert)
    }

    pub async fn create(&self, owner_id: &str, draft: AlertDraft) -> MonitorResult<Alert> {
        let alert = Alert::from_draft(owner_id, draft)?;
        self.monitor.alerts().save_alert(&alert).await?;
        info!("Alert {} created for {} on {}", alert.id, owner_id, alert.route);
        Ok(alert)
    }

    pub async fn update(&self, owner_id: &str, id: Uuid, update: AlertUpdate) -> MonitorResult<Alert> {
        let mut alert = self.owned(owner_id, id).await?;
        alert.apply(update)?;
        self.monitor.alerts().save_alert(&alert).await?;
        Ok(alert)
    }

    /// Flip `is_active`. Inactive alerts are skipped by sweeps but kept.
    pub async fn toggle(&self, owner_id: &str, id: Uuid) -> MonitorResult<Alert> {
        let mut alert = self.owned(owner_id, id).await?;
        alert.is_active = !alert.is_active;
        alert.updated_at = chrono::Utc::now();
        self.monitor.alerts().save_alert(&alert).await?;
        info!("Alert {} is now {}", id, if alert.is_active { "active" } else { "paused" });
        Ok(alert)
    }

    pub async fn delete(&self, owner_id: &str, id: Uuid) -> MonitorResult<()> {
        self.owned(owner_id, id).await?;
        if !self.monitor.alerts().delete_alert(id).await? {
            return Err(MonitorError::NotFound(id));
        }
        info!("Alert {} deleted", id);
        Ok(())
    }

    pub async fn list_for_owner(&self, owner_id: &str) -> MonitorResult<Vec<Alert>> {
        Ok(self.monitor.alerts().list_alerts_for_owner(owner_id).await?)
    }

    pub async fn notifications_for(&self, owner_id: &str, id: Uuid) -> MonitorResult<Vec<NotificationRecord>> {
        self.owned(owner_id, id).await?;
        Ok(self.notifications.list_notifications_for_alert(id).await?)
    }

    /// Evaluate one alert immediately, through the same path as the sweep.
    /// Limited per owner.
    pub async fn test_alert_now(&self, owner_id: &str, id: Uuid) -> MonitorResult<Evaluation> {
        let status = self
            .cache
            .check_rate_limit(
                &format!("alert-test:{}", owner_id),
                self.test_limit.max_requests,
                self.test_limit.window_ms,
            )
            .await;
        if !status.allowed {
            return Err(MonitorError::RateLimited(status.reset_time));
        }

        let alert = self.owned(owner_id, id).await?;
        self.monitor.evaluate_alert(&alert).await
    }
}
