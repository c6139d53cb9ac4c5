use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use fareflow_core::alert::{
    Alert, DateWindow, DeliveryStatus, NotificationChannels, NotificationRecord, Route, TriggerKind,
};
use fareflow_core::repository::{
    AlertRepository, NotificationRepository, SearchHistoryRepository, UserDirectory,
};
use fareflow_core::{BoxError, CabinClass, FlightOffer};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

const ALERT_COLUMNS: &str = r#"
    id, owner_id, origin, destination, window_start, window_end, max_price, min_price,
    cabin_class, max_stops, preferred_sources, email_enabled, push_enabled, is_active,
    last_triggered_at, created_at, updated_at
"#;

#[derive(sqlx::FromRow)]
struct AlertRow {
    id: Uuid,
    owner_id: String,
    origin: String,
    destination: String,
    window_start: Option<NaiveDate>,
    window_end: Option<NaiveDate>,
    max_price: Option<f64>,
    min_price: Option<f64>,
    cabin_class: String,
    max_stops: Option<i32>,
    preferred_sources: Vec<String>,
    email_enabled: bool,
    push_enabled: bool,
    is_active: bool,
    last_triggered_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AlertRow> for Alert {
    type Error = BoxError;

    fn try_from(row: AlertRow) -> Result<Self, Self::Error> {
        let cabin_class = CabinClass::parse(&row.cabin_class)
            .ok_or_else(|| format!("Unknown cabin class '{}' on alert {}", row.cabin_class, row.id))?;
        let date_window = match (row.window_start, row.window_end) {
            (Some(start), Some(end)) => Some(DateWindow::new(start, end)?),
            _ => None,
        };

        Ok(Alert {
            id: row.id,
            owner_id: row.owner_id,
            route: Route::new(&row.origin, &row.destination),
            date_window,
            max_price: row.max_price,
            min_price: row.min_price,
            cabin_class,
            max_stops: row.max_stops.map(|s| s.max(0) as u32),
            preferred_sources: row.preferred_sources,
            channels: NotificationChannels {
                email: row.email_enabled,
                push: row.push_enabled,
            },
            is_active: row.is_active,
            last_triggered_at: row.last_triggered_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub struct PgAlertRepository {
    pool: PgPool,
}

impl PgAlertRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, query: &str, bind: Option<&str>) -> Result<Vec<Alert>, BoxError> {
        let mut q = sqlx::query_as::<_, AlertRow>(query);
        if let Some(value) = bind {
            q = q.bind(value.to_string());
        }
        let rows = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(Alert::try_from).collect()
    }
}

#[async_trait]
impl AlertRepository for PgAlertRepository {
    async fn save_alert(&self, alert: &Alert) -> Result<(), BoxError> {
        sqlx::query(
            r#"
            INSERT INTO price_alerts (
                id, owner_id, origin, destination, window_start, window_end, max_price, min_price,
                cabin_class, max_stops, preferred_sources, email_enabled, push_enabled, is_active,
                last_triggered_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (id) DO UPDATE SET
                window_start = EXCLUDED.window_start,
                window_end = EXCLUDED.window_end,
                max_price = EXCLUDED.max_price,
                min_price = EXCLUDED.min_price,
                cabin_class = EXCLUDED.cabin_class,
                max_stops = EXCLUDED.max_stops,
                preferred_sources = EXCLUDED.preferred_sources,
                email_enabled = EXCLUDED.email_enabled,
                push_enabled = EXCLUDED.push_enabled,
                is_active = EXCLUDED.is_active,
                last_triggered_at = EXCLUDED.last_triggered_at,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(alert.id)
        .bind(&alert.owner_id)
        .bind(&alert.route.origin)
        .bind(&alert.route.destination)
        .bind(alert.date_window.map(|w| w.start))
        .bind(alert.date_window.map(|w| w.end))
        .bind(alert.max_price)
        .bind(alert.min_price)
        .bind(alert.cabin_class.as_str())
        .bind(alert.max_stops.map(|s| s as i32))
        .bind(&alert.preferred_sources)
        .bind(alert.channels.email)
        .bind(alert.channels.push)
        .bind(alert.is_active)
        .bind(alert.last_triggered_at)
        .bind(alert.created_at)
        .bind(alert.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_alert(&self, id: Uuid) -> Result<Option<Alert>, BoxError> {
        let row = sqlx::query_as::<_, AlertRow>(&format!(
            "SELECT {} FROM price_alerts WHERE id = $1",
            ALERT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Alert::try_from).transpose()
    }

    async fn delete_alert(&self, id: Uuid) -> Result<bool, BoxError> {
        let result = sqlx::query("DELETE FROM price_alerts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_active_alerts(&self) -> Result<Vec<Alert>, BoxError> {
        self.fetch(
            &format!(
                "SELECT {} FROM price_alerts WHERE is_active ORDER BY created_at",
                ALERT_COLUMNS
            ),
            None,
        )
        .await
    }

    async fn list_alerts_for_owner(&self, owner_id: &str) -> Result<Vec<Alert>, BoxError> {
        self.fetch(
            &format!(
                "SELECT {} FROM price_alerts WHERE owner_id = $1 ORDER BY created_at",
                ALERT_COLUMNS
            ),
            Some(owner_id),
        )
        .await
    }

    async fn swap_last_triggered(
        &self,
        id: Uuid,
        expected: Option<DateTime<Utc>>,
        new: Option<DateTime<Utc>>,
    ) -> Result<bool, BoxError> {
        let result = sqlx::query(
            "UPDATE price_alerts SET last_triggered_at = $3, updated_at = NOW() \
             WHERE id = $1 AND last_triggered_at IS NOT DISTINCT FROM $2",
        )
        .bind(id)
        .bind(expected)
        .bind(new)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    alert_id: Option<Uuid>,
    owner_id: String,
    title: String,
    message: String,
    trigger_kind: String,
    delivery_status: String,
    offer: Option<Value>,
    created_at: DateTime<Utc>,
    sent_at: Option<DateTime<Utc>>,
}

impl TryFrom<NotificationRow> for NotificationRecord {
    type Error = BoxError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        let trigger_kind = TriggerKind::from_str(&row.trigger_kind)
            .ok_or_else(|| format!("Unknown trigger kind '{}'", row.trigger_kind))?;
        let delivery_status = DeliveryStatus::from_str(&row.delivery_status)
            .ok_or_else(|| format!("Unknown delivery status '{}'", row.delivery_status))?;
        let offer = match row.offer {
            Some(value) => Some(serde_json::from_value::<FlightOffer>(value)?),
            None => None,
        };

        Ok(NotificationRecord {
            id: row.id,
            alert_id: row.alert_id,
            owner_id: row.owner_id,
            title: row.title,
            message: row.message,
            trigger_kind,
            delivery_status,
            offer,
            created_at: row.created_at,
            sent_at: row.sent_at,
        })
    }
}

pub struct PgNotificationRepository {
    pool: PgPool,
}

impl PgNotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationRepository for PgNotificationRepository {
    async fn save_notification(&self, record: &NotificationRecord) -> Result<(), BoxError> {
        let offer = record.offer.as_ref().map(serde_json::to_value).transpose()?;

        // Status is only allowed to leave 'pending'
        sqlx::query(
            r#"
            INSERT INTO alert_notifications (
                id, alert_id, owner_id, title, message, trigger_kind, delivery_status, offer, created_at, sent_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE SET
                delivery_status = EXCLUDED.delivery_status,
                sent_at = EXCLUDED.sent_at
            WHERE alert_notifications.delivery_status = 'pending'
            "#,
        )
        .bind(record.id)
        .bind(record.alert_id)
        .bind(&record.owner_id)
        .bind(&record.title)
        .bind(&record.message)
        .bind(record.trigger_kind.as_str())
        .bind(record.delivery_status.as_str())
        .bind(offer)
        .bind(record.created_at)
        .bind(record.sent_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_notifications_for_alert(
        &self,
        alert_id: Uuid,
    ) -> Result<Vec<NotificationRecord>, BoxError> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            "SELECT * FROM alert_notifications WHERE alert_id = $1 ORDER BY created_at DESC",
        )
        .bind(alert_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(NotificationRecord::try_from).collect()
    }

    async fn list_notifications_for_owner(
        &self,
        owner_id: &str,
    ) -> Result<Vec<NotificationRecord>, BoxError> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            "SELECT * FROM alert_notifications WHERE owner_id = $1 ORDER BY created_at DESC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(NotificationRecord::try_from).collect()
    }
}

pub struct PgSearchHistoryRepository {
    pool: PgPool,
}

impl PgSearchHistoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SearchHistoryRepository for PgSearchHistoryRepository {
    async fn record_search(
        &self,
        user_id: &str,
        route: &Route,
        at: DateTime<Utc>,
    ) -> Result<(), BoxError> {
        sqlx::query(
            "INSERT INTO search_history (user_id, origin, destination, searched_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(user_id)
        .bind(&route.origin)
        .bind(&route.destination)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn users_who_searched(
        &self,
        route: &Route,
        since: DateTime<Utc>,
    ) -> Result<Vec<String>, BoxError> {
        let users: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT user_id
            FROM search_history
            WHERE origin = $1 AND destination = $2 AND searched_at >= $3
            ORDER BY user_id
            "#,
        )
        .bind(&route.origin)
        .bind(&route.destination)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(users.into_iter().map(|(u,)| u).collect())
    }

    async fn popular_routes(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<(Route, u64)>, BoxError> {
        let rows: Vec<(String, String, i64)> = sqlx::query_as(
            r#"
            SELECT origin, destination, COUNT(*) AS searches
            FROM search_history
            WHERE searched_at >= $1
            GROUP BY origin, destination
            ORDER BY searches DESC, origin, destination
            LIMIT $2
            "#,
        )
        .bind(since)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(o, d, n)| (Route::new(&o, &d), n.max(0) as u64))
            .collect())
    }
}

pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn email_for(&self, owner_id: &str) -> Result<Option<String>, BoxError> {
        let row: Option<(Option<String>,)> = sqlx::query_as("SELECT email FROM users WHERE id = $1")
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.and_then(|(email,)| email))
    }
}
