use std::sync::Arc;

use chrono::{Duration, Utc};
use fareflow_core::repository::SearchHistoryRepository;
use fareflow_core::{FlightOffer, NotificationChannels, NotificationRecord, Route, SearchCriteria, TriggerKind};
use fareflow_search::FlexibleSearch;
use fareflow_store::app_config::AlertConfig;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::dispatch::Dispatcher;
use crate::MonitorResult;

const FALLBACK_ROUTE_COUNT: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SpecialOfferReport {
    pub routes_scanned: usize,
    pub routes_with_specials: usize,
    pub users_notified: usize,
    pub failed_routes: usize,
}

/// Offers discounted by strictly more than `threshold_percent`, biggest discount first.
pub fn special_offers(offers: &[FlightOffer], threshold_percent: f64) -> Vec<&FlightOffer> {
    let mut specials: Vec<&FlightOffer> = offers
        .iter()
        .filter(|o| o.discount_percent.is_some_and(|d| d > threshold_percent))
        .collect();
    specials.sort_by(|a, b| {
        b.discount_percent
            .partial_cmp(&a.discount_percent)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    specials
}

/// Fast sweep over high-traffic routes. A deep discount is broadcast to every
/// user who recently searched that route.
pub struct SpecialOfferScanner {
    search: Arc<FlexibleSearch>,
    history: Arc<dyn SearchHistoryRepository>,
    dispatcher: Arc<Dispatcher>,
    config: AlertConfig,
}

impl SpecialOfferScanner {
    pub fn new(
        search: Arc<FlexibleSearch>,
        history: Arc<dyn SearchHistoryRepository>,
        dispatcher: Arc<Dispatcher>,
        config: AlertConfig,
    ) -> Self {
        Self {
            search,
            history,
            dispatcher,
            config,
        }
    }

    /// Configured routes, or the busiest searched routes when none are configured.
    async fn routes(&self) -> MonitorResult<Vec<Route>> {
        if !self.config.popular_routes.is_empty() {
            return Ok(self
                .config
                .popular_routes
                .iter()
                .map(|r| Route::new(&r.origin, &r.destination))
                .collect());
        }
        let since = Utc::now() - Duration::days(self.config.history_window_days);
        let busiest = self.history.popular_routes(since, FALLBACK_ROUTE_COUNT).await?;
        Ok(busiest.into_iter().map(|(route, _)| route).collect())
    }

    async fn already_told(&self, user: &str, offer: &FlightOffer) -> bool {
        let since = Utc::now() - Duration::seconds(self.config.cooldown_seconds as i64);
        match self.dispatcher.notifications().list_notifications_for_owner(user).await {
            Ok(records) => records.iter().any(|r| {
                r.alert_id.is_none()
                    && r.created_at >= since
                    && r.offer.as_ref().is_some_and(|o| o.id == offer.id)
            }),
            Err(e) => {
                warn!("Could not read notifications of {}: {}", user, e);
                false
            }
        }
    }

    /// Users notified on this route, or None when it has no special offer.
    async fn scan_route(&self, route: &Route) -> MonitorResult<Option<usize>> {
        let date = Utc::now().date_naive() + Duration::days(self.config.special_offer_lead_days);
        let criteria = SearchCriteria::new(&route.origin, &route.destination, date)?;

        let offers = self
            .search
            .window_offers(&criteria, self.config.special_offer_flexible_days)
            .await?;

        let specials = special_offers(&offers, self.config.special_offer_discount_percent);
        let Some(best) = specials.first() else {
            return Ok(None);
        };

        let since = Utc::now() - Duration::days(self.config.history_window_days);
        let users = self.history.users_who_searched(route, since).await?;
        debug!("{} special offers on {}, {} interested users", specials.len(), route, users.len());

        let mut notified = 0;
        for user in &users {
            if self.already_told(user, best).await {
                continue;
            }
            let record = NotificationRecord::pending(
                None,
                user,
                format!("Special offer on {}", route),
                format!(
                    "{} {} on {}: {:.2} {} ({:.0}% off)",
                    best.carrier_name,
                    best.flight_number,
                    best.departure_time.format("%Y-%m-%d"),
                    best.price_amount,
                    best.currency,
                    best.discount_percent.unwrap_or_default()
                ),
                TriggerKind::NewDeal,
                Some((*best).clone()),
            );
            match self.dispatcher.dispatch(record, NotificationChannels::default()).await {
                Ok(outcome) if outcome.is_sent() => notified += 1,
                Ok(_) => {}
                Err(e) => warn!("Special offer notification for {} failed: {}", user, e),
            }
        }
        Ok(Some(notified))
    }

    pub async fn scan(&self) -> MonitorResult<SpecialOfferReport> {
        let routes = self.routes().await?;
        let mut report = SpecialOfferReport::default();

        for route in &routes {
            report.routes_scanned += 1;
            match self.scan_route(route).await {
                Ok(None) => {}
                Ok(Some(notified)) => {
                    report.routes_with_specials += 1;
                    report.users_notified += notified;
                }
                Err(e) => {
                    warn!("Special offer scan of {} failed: {}", route, e);
                    report.failed_routes += 1;
                }
            }
        }

        info!(
            "Special offer sweep: {} routes, {} with specials, {} users notified",
            report.routes_scanned, report.routes_with_specials, report.users_notified
        );
        Ok(report)
    }
}
