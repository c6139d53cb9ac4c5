use fareflow_core::{Alert, FlightOffer, TriggerKind};
use fareflow_store::app_config::AlertConfig;

/// The offer that fired an alert and why.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertMatch {
    pub offer: FlightOffer,
    pub kind: TriggerKind,
}

/// Decides whether an offer fires an alert.
#[derive(Debug, Clone, Copy)]
pub struct TriggerPolicy {
    pub price_drop_ratio: f64,
    pub low_seat_threshold: u32,
}

impl Default for TriggerPolicy {
    fn default() -> Self {
        Self::from(&AlertConfig::default())
    }
}

impl From<&AlertConfig> for TriggerPolicy {
    fn from(config: &AlertConfig) -> Self {
        Self {
            price_drop_ratio: config.price_drop_ratio,
            low_seat_threshold: config.low_seat_threshold,
        }
    }
}

impl TriggerPolicy {
    /// Pre-filter applied before any trigger rule. Offers departing outside the
    /// alert's date window never pass. An offer under `min_price` is let through
    /// even when it breaks `max_price`.
    pub fn admits(&self, alert: &Alert, offer: &FlightOffer) -> bool {
        if offer.cabin_class != alert.cabin_class {
            return false;
        }
        if let Some(window) = &alert.date_window {
            if !window.contains(offer.departure_time.date_naive()) {
                return false;
            }
        }
        if let Some(max_stops) = alert.max_stops {
            if offer.stop_count > max_stops {
                return false;
            }
        }
        if !alert.preferred_sources.is_empty()
            && !alert.preferred_sources.iter().any(|s| s == &offer.source_name)
        {
            return false;
        }
        if let Some(max_price) = alert.max_price {
            let below_floor = alert.min_price.is_some_and(|min| offer.price_amount < min);
            if offer.price_amount > max_price && !below_floor {
                return false;
            }
        }
        true
    }

    /// Trigger rule for one admitted offer. Later rules override earlier ones;
    /// low availability wins over both price rules.
    pub fn classify(&self, alert: &Alert, offer: &FlightOffer) -> Option<TriggerKind> {
        let mut kind = None;
        if let Some(max_price) = alert.max_price {
            if offer.price_amount <= max_price * self.price_drop_ratio {
                kind = Some(TriggerKind::PriceDrop);
            }
        }
        if let Some(min_price) = alert.min_price {
            if offer.price_amount <= min_price {
                kind = Some(TriggerKind::NewDeal);
            }
        }
        if offer.available_seats <= self.low_seat_threshold {
            kind = Some(TriggerKind::Availability);
        }
        kind
    }

    /// First matching offer in `offers` order (callers pass them price-ascending).
    pub fn evaluate(&self, alert: &Alert, offers: &[FlightOffer]) -> Option<AlertMatch> {
        offers
            .iter()
            .filter(|offer| self.admits(alert, offer))
            .find_map(|offer| {
                self.classify(alert, offer).map(|kind| AlertMatch {
                    offer: offer.clone(),
                    kind,
                })
            })
    }
}

/// Title and body for a triggered alert.
pub fn render(alert: &Alert, matched: &AlertMatch) -> (String, String) {
    let offer = &matched.offer;
    let flight = format!(
        "{} {} on {} at {:.2} {}",
        offer.carrier_name,
        offer.flight_number,
        offer.departure_time.format("%Y-%m-%d %H:%M"),
        offer.price_amount,
        offer.currency
    );

    match matched.kind {
        TriggerKind::PriceDrop => (
            format!("Price drop on {}", alert.route),
            match alert.max_price {
                Some(max) => format!("{} is well under your {:.2} limit.", flight, max),
                None => format!("{} has dropped in price.", flight),
            },
        ),
        TriggerKind::NewDeal => (
            format!("New deal on {}", alert.route),
            format!("{} is at or below your target price.", flight),
        ),
        TriggerKind::Availability => (
            format!("Only {} seats left on {}", offer.available_seats, alert.route),
            format!("{} is almost sold out.", flight),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use fareflow_core::{AlertDraft, CabinClass, DateWindow};

    fn alert(max_price: Option<f64>, min_price: Option<f64>) -> Alert {
        Alert::from_draft(
            "alice",
            AlertDraft {
                origin: "CDG".to_string(),
                destination: "ALG".to_string(),
                date_window: None,
                max_price,
                min_price,
                cabin_class: None,
                max_stops: None,
                preferred_sources: Vec::new(),
                channels: None,
            },
        )
        .unwrap()
    }

    fn offer(price: f64, seats: u32) -> FlightOffer {
        let departure = Utc.with_ymd_and_hms(2026, 12, 3, 9, 0, 0).unwrap();
        FlightOffer {
            id: format!("o-{}", price),
            source_name: "sim-ah".to_string(),
            carrier_code: "AH".to_string(),
            carrier_name: "Air Algerie".to_string(),
            flight_number: "AH1000".to_string(),
            origin_airport: "CDG".to_string(),
            destination_airport: "ALG".to_string(),
            departure_time: departure,
            arrival_time: departure + chrono::Duration::minutes(150),
            duration_minutes: 150,
            price_amount: price,
            currency: "EUR".to_string(),
            cabin_class: CabinClass::Economy,
            stop_count: 0,
            available_seats: seats,
            is_promotional: false,
            discount_percent: None,
            original_price: None,
        }
    }

    #[test]
    fn test_price_drop_at_ninety_percent() {
        let policy = TriggerPolicy::default();
        let a = alert(Some(1000.0), None);
        assert_eq!(policy.classify(&a, &offer(890.0, 20)), Some(TriggerKind::PriceDrop));
        assert_eq!(policy.classify(&a, &offer(900.0, 20)), Some(TriggerKind::PriceDrop));
        assert_eq!(policy.classify(&a, &offer(901.0, 20)), None);
    }

    #[test]
    fn test_availability_takes_precedence() {
        let policy = TriggerPolicy::default();
        let a = alert(Some(1000.0), None);
        assert_eq!(policy.classify(&a, &offer(950.0, 3)), Some(TriggerKind::Availability));
        assert_eq!(policy.classify(&a, &offer(850.0, 5)), Some(TriggerKind::Availability));
        assert_eq!(policy.classify(&a, &offer(850.0, 6)), Some(TriggerKind::PriceDrop));
    }

    #[test]
    fn test_new_deal_under_min_price() {
        let policy = TriggerPolicy::default();
        let a = alert(Some(1000.0), Some(500.0));
        assert_eq!(policy.classify(&a, &offer(480.0, 30)), Some(TriggerKind::NewDeal));
    }

    #[test]
    fn test_below_min_price_skips_max_filter() {
        let policy = TriggerPolicy::default();
        // min above max: a price under min but over max still passes
        let mut a = alert(Some(300.0), None);
        a.min_price = Some(400.0);
        assert!(policy.admits(&a, &offer(350.0, 30)));
        assert!(!policy.admits(&a, &offer(450.0, 30)));
    }

    #[test]
    fn test_prefilters() {
        let policy = TriggerPolicy::default();
        let mut a = alert(Some(1000.0), None);

        let mut business = offer(500.0, 30);
        business.cabin_class = CabinClass::Business;
        assert!(!policy.admits(&a, &business));

        a.max_stops = Some(0);
        let mut one_stop = offer(500.0, 30);
        one_stop.stop_count = 1;
        assert!(!policy.admits(&a, &one_stop));

        a.preferred_sources = vec!["ndc-af".to_string()];
        assert!(!policy.admits(&a, &offer(500.0, 30)));

        a.preferred_sources.clear();
        assert!(!policy.admits(&a, &offer(1200.0, 30)));
        assert!(policy.admits(&a, &offer(999.0, 30)));
    }

    #[test]
    fn test_offers_outside_date_window_are_rejected() {
        let policy = TriggerPolicy::default();
        let mut a = alert(Some(1000.0), None);
        let day = |d| NaiveDate::from_ymd_opt(2026, 12, d).unwrap();

        a.date_window = Some(DateWindow::new(day(4), day(7)).unwrap());
        assert!(!policy.admits(&a, &offer(500.0, 30)));
        assert!(policy.evaluate(&a, &[offer(500.0, 2)]).is_none());

        a.date_window = Some(DateWindow::new(day(1), day(3)).unwrap());
        assert!(policy.admits(&a, &offer(500.0, 30)));
    }

    #[test]
    fn test_evaluate_returns_first_triggering_offer() {
        let policy = TriggerPolicy::default();
        let a = alert(Some(1000.0), None);
        let offers = vec![offer(920.0, 30), offer(950.0, 2), offer(1100.0, 1)];

        let matched = policy.evaluate(&a, &offers).unwrap();
        assert_eq!(matched.offer.price_amount, 950.0);
        assert_eq!(matched.kind, TriggerKind::Availability);

        assert!(policy.evaluate(&a, &[offer(950.0, 30)]).is_none());
    }

    #[test]
    fn test_render_mentions_route_and_price() {
        let a = alert(Some(1000.0), None);
        let matched = AlertMatch {
            offer: offer(890.0, 20),
            kind: TriggerKind::PriceDrop,
        };
        let (title, message) = render(&a, &matched);
        assert_eq!(title, "Price drop on CDG-ALG");
        assert!(message.contains("890.00 EUR"));
        assert!(message.contains("1000.00"));
    }
}
