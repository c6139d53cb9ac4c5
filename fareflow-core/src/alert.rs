use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::search::{CabinClass, FlightOffer};
use crate::{CoreError, CoreResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Route {
    pub origin: String,
    pub destination: String,
}

impl Route {
    pub fn new(origin: &str, destination: &str) -> Self {
        Self {
            origin: origin.trim().to_ascii_uppercase(),
            destination: destination.trim().to_ascii_uppercase(),
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.origin, self.destination)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> CoreResult<Self> {
        if end < start {
            return Err(CoreError::ValidationError(
                "date window ends before it starts".to_string(),
            ));
        }
        Ok(Self { start, end })
    }

    /// Center date and the +/- day radius that covers the whole window.
    pub fn center_and_radius(&self) -> (NaiveDate, i64) {
        let span = (self.end - self.start).num_days();
        let radius = (span + 1) / 2;
        (self.start + chrono::Duration::days(span / 2), radius)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationChannels {
    pub email: bool,
    pub push: bool,
}

impl Default for NotificationChannels {
    fn default() -> Self {
        Self { email: true, push: true }
    }
}

/// A user-owned price threshold over one route.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alert {
    pub id: Uuid,
    pub owner_id: String,
    pub route: Route,
    pub date_window: Option<DateWindow>,
    pub max_price: Option<f64>,
    pub min_price: Option<f64>,
    pub cabin_class: CabinClass,
    pub max_stops: Option<u32>,
    pub preferred_sources: Vec<String>,
    pub channels: NotificationChannels,
    pub is_active: bool,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Alert {
    pub fn from_draft(owner_id: &str, draft: AlertDraft) -> CoreResult<Self> {
        draft.validate()?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            route: Route::new(&draft.origin, &draft.destination),
            date_window: draft.date_window,
            max_price: draft.max_price,
            min_price: draft.min_price,
            cabin_class: draft.cabin_class.unwrap_or(CabinClass::Economy),
            max_stops: draft.max_stops,
            preferred_sources: draft.preferred_sources,
            channels: draft.channels.unwrap_or_default(),
            is_active: true,
            last_triggered_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn apply(&mut self, update: AlertUpdate) -> CoreResult<()> {
        if let Some(window) = update.date_window {
            self.date_window = window;
        }
        if let Some(max_price) = update.max_price {
            self.max_price = max_price;
        }
        if let Some(min_price) = update.min_price {
            self.min_price = min_price;
        }
        if let Some(cabin) = update.cabin_class {
            self.cabin_class = cabin;
        }
        if let Some(max_stops) = update.max_stops {
            self.max_stops = max_stops;
        }
        if let Some(sources) = update.preferred_sources {
            self.preferred_sources = sources;
        }
        if let Some(channels) = update.channels {
            self.channels = channels;
        }
        validate_prices(self.max_price, self.min_price)?;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// True while a previous notification is younger than `cooldown`.
    pub fn is_cooling_down(&self, now: DateTime<Utc>, cooldown: chrono::Duration) -> bool {
        match self.last_triggered_at {
            Some(at) => now - at < cooldown,
            None => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertDraft {
    pub origin: String,
    pub destination: String,
    pub date_window: Option<DateWindow>,
    pub max_price: Option<f64>,
    pub min_price: Option<f64>,
    pub cabin_class: Option<CabinClass>,
    pub max_stops: Option<u32>,
    #[serde(default)]
    pub preferred_sources: Vec<String>,
    pub channels: Option<NotificationChannels>,
}

impl AlertDraft {
    fn validate(&self) -> CoreResult<()> {
        for code in [&self.origin, &self.destination] {
            let code = code.trim();
            if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(CoreError::ValidationError(format!(
                    "airport code must be 3 letters, got '{}'",
                    code
                )));
            }
        }
        validate_prices(self.max_price, self.min_price)
    }
}

fn validate_prices(max_price: Option<f64>, min_price: Option<f64>) -> CoreResult<()> {
    for price in [max_price, min_price].into_iter().flatten() {
        if !price.is_finite() || price <= 0.0 {
            return Err(CoreError::ValidationError(format!(
                "price thresholds must be positive, got {}",
                price
            )));
        }
    }
    Ok(())
}

/// Partial update. `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertUpdate {
    pub date_window: Option<Option<DateWindow>>,
    pub max_price: Option<Option<f64>>,
    pub min_price: Option<Option<f64>>,
    pub cabin_class: Option<CabinClass>,
    pub max_stops: Option<Option<u32>>,
    pub preferred_sources: Option<Vec<String>>,
    pub channels: Option<NotificationChannels>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    PriceDrop,
    NewDeal,
    Availability,
}

impl TriggerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerKind::PriceDrop => "price_drop",
            TriggerKind::NewDeal => "new_deal",
            TriggerKind::Availability => "availability",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "price_drop" => Some(TriggerKind::PriceDrop),
            "new_deal" => Some(TriggerKind::NewDeal),
            "availability" => Some(TriggerKind::Availability),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Failed => "failed",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(DeliveryStatus::Pending),
            "sent" => Some(DeliveryStatus::Sent),
            "failed" => Some(DeliveryStatus::Failed),
            _ => None,
        }
    }
}

/// One notification produced by a trigger. Status only moves forward:
/// pending -> sent | failed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationRecord {
    pub id: Uuid,
    /// None for broadcast special offers, which are not tied to an alert.
    pub alert_id: Option<Uuid>,
    pub owner_id: String,
    pub title: String,
    pub message: String,
    pub trigger_kind: TriggerKind,
    pub delivery_status: DeliveryStatus,
    pub offer: Option<FlightOffer>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl NotificationRecord {
    pub fn pending(
        alert_id: Option<Uuid>,
        owner_id: &str,
        title: String,
        message: String,
        trigger_kind: TriggerKind,
        offer: Option<FlightOffer>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            alert_id,
            owner_id: owner_id.to_string(),
            title,
            message,
            trigger_kind,
            delivery_status: DeliveryStatus::Pending,
            offer,
            created_at: Utc::now(),
            sent_at: None,
        }
    }

    pub fn mark_sent(&mut self, at: DateTime<Utc>) -> CoreResult<()> {
        self.transition(DeliveryStatus::Sent)?;
        self.sent_at = Some(at);
        Ok(())
    }

    pub fn mark_failed(&mut self) -> CoreResult<()> {
        self.transition(DeliveryStatus::Failed)
    }

    fn transition(&mut self, to: DeliveryStatus) -> CoreResult<()> {
        if self.delivery_status != DeliveryStatus::Pending {
            return Err(CoreError::InvalidTransition {
                from: self.delivery_status.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }
        self.delivery_status = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> AlertDraft {
        AlertDraft {
            origin: "cdg".to_string(),
            destination: "ALG".to_string(),
            date_window: None,
            max_price: Some(400.0),
            min_price: None,
            cabin_class: None,
            max_stops: Some(1),
            preferred_sources: vec![],
            channels: None,
        }
    }

    #[test]
    fn test_alert_from_draft_defaults() {
        let alert = Alert::from_draft("user-1", draft()).unwrap();
        assert_eq!(alert.route.origin, "CDG");
        assert_eq!(alert.cabin_class, CabinClass::Economy);
        assert!(alert.is_active);
        assert!(alert.channels.email && alert.channels.push);
    }

    #[test]
    fn test_alert_rejects_negative_price() {
        let mut d = draft();
        d.max_price = Some(-5.0);
        assert!(Alert::from_draft("user-1", d).is_err());
    }

    #[test]
    fn test_update_clears_optional_fields() {
        let mut alert = Alert::from_draft("user-1", draft()).unwrap();
        alert
            .apply(AlertUpdate {
                max_price: Some(None),
                max_stops: Some(Some(0)),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(alert.max_price, None);
        assert_eq!(alert.max_stops, Some(0));
    }

    #[test]
    fn test_cooldown_window() {
        let mut alert = Alert::from_draft("user-1", draft()).unwrap();
        let now = Utc::now();
        assert!(!alert.is_cooling_down(now, chrono::Duration::hours(1)));

        alert.last_triggered_at = Some(now - chrono::Duration::minutes(20));
        assert!(alert.is_cooling_down(now, chrono::Duration::hours(1)));

        alert.last_triggered_at = Some(now - chrono::Duration::minutes(61));
        assert!(!alert.is_cooling_down(now, chrono::Duration::hours(1)));
    }

    #[test]
    fn test_window_center_and_radius() {
        let window = DateWindow::new(
            NaiveDate::from_ymd_opt(2026, 11, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 11, 7).unwrap(),
        )
        .unwrap();
        let (center, radius) = window.center_and_radius();
        assert_eq!(center, NaiveDate::from_ymd_opt(2026, 11, 4).unwrap());
        assert_eq!(radius, 3);

        assert!(window.contains(window.start));
        assert!(window.contains(window.end));
        assert!(!window.contains(NaiveDate::from_ymd_opt(2026, 10, 31).unwrap()));
        assert!(!window.contains(NaiveDate::from_ymd_opt(2026, 11, 8).unwrap()));
    }

    #[test]
    fn test_notification_status_never_moves_backward() {
        let mut record = NotificationRecord::pending(
            None,
            "user-1",
            "t".to_string(),
            "m".to_string(),
            TriggerKind::NewDeal,
            None,
        );
        record.mark_sent(Utc::now()).unwrap();
        assert_eq!(record.delivery_status, DeliveryStatus::Sent);
        assert!(record.mark_failed().is_err());
        assert!(record.mark_sent(Utc::now()).is_err());
    }
}
