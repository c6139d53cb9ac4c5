use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, TimeZone, Utc};
use fareflow_alerts::{
    AlertMonitor, AlertService, Dispatcher, Evaluation, MonitorError, PushHub, Scheduler,
    SpecialOfferScanner, SweepOutcome,
};
use fareflow_core::memory::{
    InMemoryAlertRepository, InMemoryNotificationRepository, InMemorySearchHistory, InMemoryUserDirectory,
};
use fareflow_core::testing::StaticSource;
use fareflow_core::repository::{AlertRepository, SearchHistoryRepository};
use fareflow_core::{
    Alert, AlertDraft, AlertUpdate, CabinClass, DeliveryStatus, FlightOffer, FlightSource, Route, TriggerKind,
};
use fareflow_search::{Aggregator, FlexibleSearch, Scorer};
use fareflow_store::app_config::{AlertConfig, RateLimitConfig, RouteConfig, ScoringConfig, SearchConfig};
use fareflow_store::{Cache, CacheTtls, MemoryCacheBackend};

fn lead_date(days: i64) -> NaiveDate {
    Utc::now().date_naive() + chrono::Duration::days(days)
}

fn offer(id: &str, date: NaiveDate, price: f64, seats: u32) -> FlightOffer {
    let departure = Utc.from_utc_datetime(&date.and_hms_opt(9, 30, 0).unwrap());
    FlightOffer {
        id: id.to_string(),
        source_name: "scripted".to_string(),
        carrier_code: "AH".to_string(),
        carrier_name: "Air Algerie".to_string(),
        flight_number: "AH1006".to_string(),
        origin_airport: "CDG".to_string(),
        destination_airport: "ALG".to_string(),
        departure_time: departure,
        arrival_time: departure + chrono::Duration::minutes(155),
        duration_minutes: 155,
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

fn draft(max_price: Option<f64>) -> AlertDraft {
    AlertDraft {
        origin: "CDG".to_string(),
        destination: "ALG".to_string(),
        date_window: None,
        max_price,
        min_price: None,
        cabin_class: None,
        max_stops: None,
        preferred_sources: Vec::new(),
        channels: None,
    }
}

struct Harness {
    source: Arc<StaticSource>,
    alerts: Arc<InMemoryAlertRepository>,
    notifications: Arc<InMemoryNotificationRepository>,
    history: Arc<InMemorySearchHistory>,
    push: Arc<PushHub>,
    cache: Cache,
    monitor: Arc<AlertMonitor>,
    scanner: Arc<SpecialOfferScanner>,
}

impl Harness {
    async fn new(offers: Vec<FlightOffer>) -> Self {
        Self::with_source(Arc::new(StaticSource::new("scripted", offers))).await
    }

    async fn with_source(source: Arc<StaticSource>) -> Self {
        let cache = Cache::new(Arc::new(MemoryCacheBackend::new()), CacheTtls::default());
        let sources: Vec<Arc<dyn FlightSource>> = vec![source.clone()];
        let aggregator = Arc::new(Aggregator::new(sources, Duration::from_secs(30)));
        let search = Arc::new(FlexibleSearch::new(
            aggregator,
            cache.clone(),
            Scorer::new(ScoringConfig::default()),
            SearchConfig {
                batch_pause_ms: 0,
                ..SearchConfig::default()
            },
        ));

        let users = Arc::new(InMemoryUserDirectory::new());
        users.register("alice", "alice@example.com").await;
        let alerts = Arc::new(InMemoryAlertRepository::new());
        let notifications = Arc::new(InMemoryNotificationRepository::new());
        let history = Arc::new(InMemorySearchHistory::new());
        let push = Arc::new(PushHub::default());
        let dispatcher = Arc::new(Dispatcher::new(users, notifications.clone()).with_push(push.clone()));

        let config = AlertConfig {
            popular_routes: vec![RouteConfig {
                origin: "CDG".to_string(),
                destination: "ALG".to_string(),
            }],
            ..AlertConfig::default()
        };
        let monitor = Arc::new(AlertMonitor::new(
            search.clone(),
            alerts.clone(),
            dispatcher.clone(),
            config.clone(),
        ));
        let scanner = Arc::new(SpecialOfferScanner::new(search, history.clone(), dispatcher, config));

        Self {
            source,
            alerts,
            notifications,
            history,
            push,
            cache,
            monitor,
            scanner,
        }
    }

    async fn save(&self, alert: &Alert) {
        self.alerts.save_alert(alert).await.unwrap();
    }

    async fn reload(&self, alert: &Alert) -> Alert {
        self.alerts.get_alert(alert.id).await.unwrap().unwrap()
    }

    fn service(&self, max_tests: u32) -> AlertService {
        AlertService::new(
            self.monitor.clone(),
            self.notifications.clone(),
            self.cache.clone(),
            RateLimitConfig {
                max_requests: max_tests,
                window_ms: 60_000,
            },
        )
    }
}

#[tokio::test]
async fn test_price_drop_triggers_and_notifies() {
    let h = Harness::new(vec![offer("cheap", lead_date(7), 890.0, 20)]).await;
    let mut inbox = h.push.subscribe("alice").await;
    let alert = Alert::from_draft("alice", draft(Some(1000.0))).unwrap();
    h.save(&alert).await;

    let record = match h.monitor.evaluate_alert(&alert).await.unwrap() {
        Evaluation::Triggered(record) => record,
        other => panic!("expected a trigger, got {:?}", other),
    };
    assert_eq!(record.trigger_kind, TriggerKind::PriceDrop);
    assert_eq!(record.delivery_status, DeliveryStatus::Sent);
    assert_eq!(record.offer.as_ref().unwrap().id, "cheap");

    let pushed = inbox.recv().await.unwrap();
    assert_eq!(pushed.destination, "user:alice");
    assert_eq!(pushed.notification_id, record.id);

    assert!(h.reload(&alert).await.last_triggered_at.is_some());
}

#[tokio::test]
async fn test_low_availability_wins_over_price() {
    let h = Harness::new(vec![offer("scarce", lead_date(7), 950.0, 3)]).await;
    let alert = Alert::from_draft("alice", draft(Some(1000.0))).unwrap();
    h.save(&alert).await;

    match h.monitor.evaluate_alert(&alert).await.unwrap() {
        Evaluation::Triggered(record) => assert_eq!(record.trigger_kind, TriggerKind::Availability),
        other => panic!("expected a trigger, got {:?}", other),
    }
}

#[tokio::test]
async fn test_no_match_above_threshold() {
    let h = Harness::new(vec![offer("meh", lead_date(7), 950.0, 30)]).await;
    let alert = Alert::from_draft("alice", draft(Some(1000.0))).unwrap();
    h.save(&alert).await;

    assert_eq!(h.monitor.evaluate_alert(&alert).await.unwrap(), Evaluation::NoMatch);
    assert!(h.notifications.all().await.is_empty());
}

#[tokio::test]
async fn test_cooldown_suppresses_second_notification() {
    let h = Harness::new(vec![offer("cheap", lead_date(7), 890.0, 20)]).await;
    let alert = Alert::from_draft("alice", draft(Some(1000.0))).unwrap();
    h.save(&alert).await;

    assert!(matches!(
        h.monitor.evaluate_alert(&alert).await.unwrap(),
        Evaluation::Triggered(_)
    ));

    let alert = h.reload(&alert).await;
    assert_eq!(
        h.monitor.evaluate_alert(&alert).await.unwrap(),
        Evaluation::Suppressed {
            kind: TriggerKind::PriceDrop
        }
    );
    assert_eq!(h.notifications.all().await.len(), 1);

    let report = h.monitor.run_sweep().await.unwrap();
    assert_eq!(report.suppressed, 1);
    assert_eq!(h.notifications.all().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_evaluations_notify_once() {
    let source = Arc::new(
        StaticSource::new("scripted", vec![offer("cheap", lead_date(7), 890.0, 20)])
            .with_delay(Duration::from_secs(2)),
    );
    let h = Harness::with_source(source).await;
    let alert = Alert::from_draft("alice", draft(Some(1000.0))).unwrap();
    h.save(&alert).await;

    // Both evaluations see the alert outside cooldown before either sends.
    let (first, second) = tokio::join!(h.monitor.evaluate_alert(&alert), h.monitor.evaluate_alert(&alert));
    let outcomes = [first.unwrap(), second.unwrap()];

    let triggered = outcomes.iter().filter(|e| matches!(e, Evaluation::Triggered(_))).count();
    assert_eq!(triggered, 1);
    assert!(outcomes.contains(&Evaluation::Suppressed {
        kind: TriggerKind::PriceDrop
    }));
    assert_eq!(h.notifications.all().await.len(), 1);
    assert!(h.reload(&alert).await.last_triggered_at.is_some());
}

#[tokio::test]
async fn test_failed_dispatch_keeps_alert_eligible() {
    let h = Harness::new(vec![offer("cheap", lead_date(7), 890.0, 20)]).await;
    h.push.close().await;
    let alert = Alert::from_draft("alice", draft(Some(1000.0))).unwrap();
    h.save(&alert).await;

    match h.monitor.evaluate_alert(&alert).await.unwrap() {
        Evaluation::Triggered(record) => assert_eq!(record.delivery_status, DeliveryStatus::Failed),
        other => panic!("expected a trigger, got {:?}", other),
    }
    let alert = h.reload(&alert).await;
    assert!(alert.last_triggered_at.is_none());
    assert!(matches!(
        h.monitor.evaluate_alert(&alert).await.unwrap(),
        Evaluation::Triggered(_)
    ));
}

#[tokio::test]
async fn test_sweep_isolates_failing_alert() {
    let h = Harness::new(vec![offer("cheap", lead_date(7), 890.0, 20)]).await;

    let good = Alert::from_draft("alice", draft(Some(1000.0))).unwrap();
    let mut broken = Alert::from_draft("alice", draft(Some(1000.0))).unwrap();
    broken.route = Route::new("PARIS", "ALG");
    let mut paused = Alert::from_draft("alice", draft(Some(1000.0))).unwrap();
    paused.is_active = false;
    for alert in [&good, &broken, &paused] {
        h.save(alert).await;
    }

    let report = h.monitor.run_sweep().await.unwrap();
    assert_eq!(report.evaluated, 2);
    assert_eq!(report.triggered, 1);
    assert_eq!(report.failed, 1);
}

#[tokio::test]
async fn test_window_alert_uses_flexible_search() {
    let h = Harness::new(vec![offer("in-window", lead_date(11), 700.0, 20)]).await;
    let mut d = draft(Some(1000.0));
    d.date_window = Some(fareflow_core::DateWindow::new(lead_date(10), lead_date(14)).unwrap());
    let alert = Alert::from_draft("alice", d).unwrap();
    h.save(&alert).await;

    match h.monitor.evaluate_alert(&alert).await.unwrap() {
        Evaluation::Triggered(record) => assert_eq!(record.offer.unwrap().id, "in-window"),
        other => panic!("expected a trigger, got {:?}", other),
    }
    // centre 12, radius 2: one source call per date
    assert_eq!(h.source.calls(), 5);
}

#[tokio::test]
async fn test_offer_outside_window_does_not_trigger() {
    // centre 11, radius 2: the search also covers the day before the window
    let h = Harness::new(vec![offer("day-early", lead_date(9), 700.0, 20)]).await;
    let mut d = draft(Some(1000.0));
    d.date_window = Some(fareflow_core::DateWindow::new(lead_date(10), lead_date(13)).unwrap());
    let alert = Alert::from_draft("alice", d).unwrap();
    h.save(&alert).await;

    assert_eq!(h.monitor.evaluate_alert(&alert).await.unwrap(), Evaluation::NoMatch);
    assert_eq!(h.source.calls(), 5);
    assert!(h.notifications.all().await.is_empty());
}

#[tokio::test]
async fn test_window_alert_sees_offers_past_the_best_list() {
    let mut offers: Vec<FlightOffer> = (0..25)
        .map(|i| {
            let mut o = offer(&format!("stop-{}", i), lead_date(12), 100.0 + i as f64, 20);
            o.stop_count = 1;
            o
        })
        .collect();
    offers.push(offer("direct", lead_date(12), 800.0, 20));
    let h = Harness::new(offers).await;

    let mut d = draft(Some(1000.0));
    d.max_stops = Some(0);
    d.date_window = Some(fareflow_core::DateWindow::new(lead_date(10), lead_date(14)).unwrap());
    let alert = Alert::from_draft("alice", d).unwrap();
    h.save(&alert).await;

    match h.monitor.evaluate_alert(&alert).await.unwrap() {
        Evaluation::Triggered(record) => {
            assert_eq!(record.trigger_kind, TriggerKind::PriceDrop);
            assert_eq!(record.offer.unwrap().id, "direct");
        }
        other => panic!("expected a trigger, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_sweep_is_skipped() {
    let source = Arc::new(
        StaticSource::new("scripted", vec![offer("cheap", lead_date(7), 890.0, 20)])
            .with_delay(Duration::from_secs(5)),
    );
    let h = Harness::with_source(source).await;
    h.save(&Alert::from_draft("alice", draft(Some(1000.0))).unwrap()).await;

    let scheduler = Scheduler::new(
        h.monitor.clone(),
        h.scanner.clone(),
        Duration::from_secs(1800),
        Duration::from_secs(600),
    );
    let (first, second) = tokio::join!(scheduler.run_alert_sweep(), scheduler.run_alert_sweep());

    let first = first.unwrap();
    assert!(matches!(first, SweepOutcome::Completed(report) if report.triggered == 1));
    assert_eq!(second.unwrap(), SweepOutcome::Skipped);

    // guard released afterwards
    assert!(matches!(
        scheduler.run_alert_sweep().await.unwrap(),
        SweepOutcome::Completed(_)
    ));
}

#[tokio::test]
async fn test_special_offer_reaches_recent_searchers_once() {
    let mut deal = offer("deal", lead_date(14), 120.0, 30);
    deal.is_promotional = true;
    deal.discount_percent = Some(40.0);
    deal.original_price = Some(200.0);
    let mut mild = offer("mild", lead_date(13), 150.0, 30);
    mild.is_promotional = true;
    mild.discount_percent = Some(20.0);
    let h = Harness::new(vec![deal, mild]).await;

    let route = Route::new("CDG", "ALG");
    let now = Utc::now();
    h.history.record_search("alice", &route, now).await.unwrap();
    h.history
        .record_search("alice", &route, now - chrono::Duration::days(3))
        .await
        .unwrap();
    h.history
        .record_search("bob", &route, now - chrono::Duration::days(10))
        .await
        .unwrap();
    h.history
        .record_search("carol", &route, now - chrono::Duration::days(45))
        .await
        .unwrap();

    let report = h.scanner.scan().await.unwrap();
    assert_eq!(report.routes_scanned, 1);
    assert_eq!(report.routes_with_specials, 1);
    assert_eq!(report.users_notified, 2);

    let records = h.notifications.all().await;
    let mut owners: Vec<&str> = records.iter().map(|r| r.owner_id.as_str()).collect();
    owners.sort();
    assert_eq!(owners, vec!["alice", "bob"]);
    assert!(records.iter().all(|r| r.offer.as_ref().unwrap().id == "deal"));

    let again = h.scanner.scan().await.unwrap();
    assert_eq!(again.users_notified, 0);
    assert_eq!(h.notifications.all().await.len(), 2);
}

#[tokio::test]
async fn test_service_enforces_ownership() {
    let h = Harness::new(Vec::new()).await;
    let service = h.service(5);

    let alert = service.create("alice", draft(Some(500.0))).await.unwrap();
    assert!(alert.is_active);

    assert!(matches!(
        service.toggle("mallory", alert.id).await,
        Err(MonitorError::NotOwner(_))
    ));

    let toggled = service.toggle("alice", alert.id).await.unwrap();
    assert!(!toggled.is_active);

    let updated = service
        .update(
            "alice",
            alert.id,
            AlertUpdate {
                max_price: Some(Some(450.0)),
                ..AlertUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.max_price, Some(450.0));
    assert_eq!(service.list_for_owner("alice").await.unwrap().len(), 1);

    service.delete("alice", alert.id).await.unwrap();
    assert!(matches!(
        service.delete("alice", alert.id).await,
        Err(MonitorError::NotFound(_))
    ));
    assert!(service.list_for_owner("alice").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_alert_now_is_rate_limited() {
    let h = Harness::new(vec![offer("cheap", lead_date(7), 890.0, 20)]).await;
    let service = h.service(2);
    let alert = service.create("alice", draft(Some(1000.0))).await.unwrap();

    assert!(matches!(
        service.test_alert_now("alice", alert.id).await.unwrap(),
        Evaluation::Triggered(_)
    ));
    assert!(matches!(
        service.test_alert_now("alice", alert.id).await.unwrap(),
        Evaluation::Suppressed { .. }
    ));
    assert!(matches!(
        service.test_alert_now("alice", alert.id).await,
        Err(MonitorError::RateLimited(_))
    ));

    let history = service.notifications_for("alice", alert.id).await.unwrap();
    assert_eq!(history.len(), 1);
}
