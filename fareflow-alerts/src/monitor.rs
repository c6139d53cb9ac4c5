//! Single-alert evaluation and the coarse sweep over every active alert.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, SubsecRound, Utc};
use fareflow_core::repository::AlertRepository;
use fareflow_core::{Alert, DateWindow, FlightOffer, NotificationRecord, SearchCriteria, TriggerKind};
use fareflow_search::FlexibleSearch;
use fareflow_store::app_config::AlertConfig;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::dispatch::Dispatcher;
use crate::policy::{render, TriggerPolicy};
use crate::{MonitorError, MonitorResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    NoMatch,
    /// A trigger matched while the alert was cooling down; nothing was sent.
    Suppressed { kind: TriggerKind },
    /// A record was created and dispatch attempted. Its status says how it went.
    Triggered(NotificationRecord),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub evaluated: usize,
    pub triggered: usize,
    pub suppressed: usize,
    pub failed: usize,
}

pub struct AlertMonitor {
    search: Arc<FlexibleSearch>,
    alerts: Arc<dyn AlertRepository>,
    dispatcher: Arc<Dispatcher>,
    policy: TriggerPolicy,
    config: AlertConfig,
}

impl AlertMonitor {
    pub fn new(
        search: Arc<FlexibleSearch>,
        alerts: Arc<dyn AlertRepository>,
        dispatcher: Arc<Dispatcher>,
        config: AlertConfig,
    ) -> Self {
        Self {
            search,
            alerts,
            dispatcher,
            policy: TriggerPolicy::from(&config),
            config,
        }
    }

    pub fn alerts(&self) -> &Arc<dyn AlertRepository> {
        &self.alerts
    }

    fn cooldown(&self) -> Duration {
        Duration::seconds(self.config.cooldown_seconds as i64)
    }

    /// Search for an alert: a flexible search centred on the part of its window
    /// that is not yet in the past, or a fixed search `default_lead_days` out.
    /// None when the whole window has already passed.
    pub fn criteria_for(
        &self,
        alert: &Alert,
        today: NaiveDate,
    ) -> MonitorResult<Option<(SearchCriteria, u32)>> {
        let (date, radius) = match alert.date_window {
            Some(window) => {
                if window.end < today {
                    return Ok(None);
                }
                let remaining = DateWindow::new(window.start.max(today), window.end)?;
                let (centre, radius) = remaining.center_and_radius();
                let radius = (radius as u32).min(self.search.max_flexible_days());
                (centre, radius)
            }
            None => (today + Duration::days(self.config.default_lead_days), 0),
        };

        let criteria = SearchCriteria::new(&alert.route.origin, &alert.route.destination, date)?
            .with_cabin(alert.cabin_class);
        Ok(Some((criteria, radius)))
    }

    async fn candidate_offers(&self, alert: &Alert) -> MonitorResult<Vec<FlightOffer>> {
        let Some((criteria, radius)) = self.criteria_for(alert, Utc::now().date_naive())? else {
            debug!("Alert {} window has passed", alert.id);
            return Ok(Vec::new());
        };

        // Uncut candidate list: the alert's own filters run after this.
        let offers = if radius > 0 {
            self.search.window_offers(&criteria, radius).await?
        } else {
            self.search.aggregator().collect(&criteria).await?.offers
        };
        Ok(offers)
    }

    /// Runs the search, applies the trigger policy and, outside cooldown, dispatches.
    pub async fn evaluate_alert(&self, alert: &Alert) -> MonitorResult<Evaluation> {
        let offers = self.candidate_offers(alert).await?;
        let Some(matched) = self.policy.evaluate(alert, &offers) else {
            return Ok(Evaluation::NoMatch);
        };

        // Postgres keeps microseconds; the stamp must compare equal after a round trip.
        let now = Utc::now().trunc_subsecs(6);
        if alert.is_cooling_down(now, self.cooldown()) {
            debug!(
                "Alert {} matched ({}) but is cooling down",
                alert.id,
                matched.kind.as_str()
            );
            return Ok(Evaluation::Suppressed { kind: matched.kind });
        }

        // Only the evaluation that wins the stamp sends.
        if !self
            .alerts
            .swap_last_triggered(alert.id, alert.last_triggered_at, Some(now))
            .await?
        {
            debug!("Alert {} was triggered by a concurrent evaluation", alert.id);
            return Ok(Evaluation::Suppressed { kind: matched.kind });
        }

        let (title, message) = render(alert, &matched);
        let record = NotificationRecord::pending(
            Some(alert.id),
            &alert.owner_id,
            title,
            message,
            matched.kind,
            Some(matched.offer),
        );

        let dispatched = self.dispatcher.dispatch(record, alert.channels).await;
        if !matches!(&dispatched, Ok(outcome) if outcome.is_sent()) {
            // Undelivered: give the slot back so the next sweep retries.
            self.alerts
                .swap_last_triggered(alert.id, Some(now), alert.last_triggered_at)
                .await?;
        }
        Ok(Evaluation::Triggered(dispatched?.record))
    }

    /// Evaluates every active alert. One alert failing does not stop the others.
    pub async fn run_sweep(&self) -> MonitorResult<SweepReport> {
        let alerts = self.alerts.list_active_alerts().await?;
        let mut report = SweepReport::default();

        for alert in &alerts {
            report.evaluated += 1;
            match self.evaluate_alert(alert).await {
                Ok(Evaluation::NoMatch) => {}
                Ok(Evaluation::Suppressed { .. }) => report.suppressed += 1,
                Ok(Evaluation::Triggered(_)) => report.triggered += 1,
                Err(e) => {
                    error!("Evaluation of alert {} failed: {}", alert.id, e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Alert sweep: {} evaluated, {} triggered, {} suppressed, {} failed",
            report.evaluated, report.triggered, report.suppressed, report.failed
        );
        Ok(report)
    }

    pub(crate) fn ensure_owner(alert: &Alert, owner_id: &str) -> MonitorResult<()> {
        if alert.owner_id != owner_id {
            return Err(MonitorError::NotOwner(alert.id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fareflow_core::memory::{InMemoryAlertRepository, InMemoryNotificationRepository, InMemoryUserDirectory};
    use fareflow_core::AlertDraft;
    use fareflow_search::{Aggregator, Scorer};
    use fareflow_store::app_config::{ScoringConfig, SearchConfig};
    use fareflow_store::{Cache, CacheTtls, MemoryCacheBackend};

    fn monitor() -> AlertMonitor {
        let cache = Cache::new(Arc::new(MemoryCacheBackend::new()), CacheTtls::default());
        let aggregator = Arc::new(Aggregator::new(Vec::new(), std::time::Duration::from_secs(30)));
        let search = Arc::new(FlexibleSearch::new(
            aggregator,
            cache,
            Scorer::new(ScoringConfig::default()),
            SearchConfig::default(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(InMemoryUserDirectory::new()),
            Arc::new(InMemoryNotificationRepository::new()),
        ));
        AlertMonitor::new(
            search,
            Arc::new(InMemoryAlertRepository::new()),
            dispatcher,
            AlertConfig::default(),
        )
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 12, d).unwrap()
    }

    fn alert(window: Option<(u32, u32)>) -> Alert {
        Alert::from_draft(
            "alice",
            AlertDraft {
                origin: "cdg".to_string(),
                destination: "alg".to_string(),
                date_window: window.map(|(s, e)| DateWindow::new(date(s), date(e)).unwrap()),
                max_price: Some(400.0),
                min_price: None,
                cabin_class: None,
                max_stops: None,
                preferred_sources: Vec::new(),
                channels: None,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_no_window_uses_lead_days() {
        let (criteria, radius) = monitor().criteria_for(&alert(None), date(1)).unwrap().unwrap();
        assert_eq!(criteria.departure_date, date(8));
        assert_eq!(criteria.origin, "CDG");
        assert_eq!(radius, 0);
    }

    #[test]
    fn test_window_is_centred_and_clamped() {
        let m = monitor();
        let (criteria, radius) = m.criteria_for(&alert(Some((10, 14))), date(1)).unwrap().unwrap();
        assert_eq!(criteria.departure_date, date(12));
        assert_eq!(radius, 2);

        let (_, radius) = m.criteria_for(&alert(Some((1, 31))), date(1)).unwrap().unwrap();
        assert_eq!(radius, 7);
    }

    #[test]
    fn test_past_part_of_window_is_ignored() {
        let m = monitor();
        let (criteria, _) = m.criteria_for(&alert(Some((2, 10))), date(6)).unwrap().unwrap();
        assert_eq!(criteria.departure_date, date(8));

        assert!(m.criteria_for(&alert(Some((2, 5))), date(6)).unwrap().is_none());
    }
}
