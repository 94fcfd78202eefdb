use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::broadcast;

use supply_watch::clock::{Clock, ManualClock};
use supply_watch::collaborators::{
    BroadcastInAppNotifier, ChangeEvent, ChangeKind, InMemoryResourceStore, OrderRequest,
    OrderingService, PushMessage, PushSender, in_app::InAppMessage,
};
use supply_watch::config::ThresholdConfigService;
use supply_watch::database::repositories::{
    AlertRecordRepository, AutoActionRepository, NotificationEventRepository,
    SqlxAlertRecordRepository, SqlxAutoActionRepository, SqlxNotificationEventRepository,
    SqlxThresholdConfigRepository,
};
use supply_watch::database::time::datetime_to_ms;
use supply_watch::database::{DbPool, init_pool, run_migrations};
use supply_watch::domain::{
    ChannelPreferences, ConditionStatus, MonitoredResource, Packaging, ResourceClass,
    ResourceMetric, ThresholdConfig,
};
use supply_watch::monitor::{
    ActionOutcome, Evaluation, MonitorDeps, MonitorEvent, MonitorService, MonitorServiceConfig,
};
use supply_watch::notification::NotificationDispatcher;
use supply_watch::{Error, Result};

/// Ordering fake: rejects the first `rejections` calls, optionally slowly.
#[derive(Default)]
struct ScriptedOrdering {
    rejections: AtomicUsize,
    delay: Option<Duration>,
    calls: AtomicUsize,
    placed: Mutex<Vec<OrderRequest>>,
}

#[async_trait]
impl OrderingService for ScriptedOrdering {
    async fn create_order(&self, request: &OrderRequest) -> Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let rejected = self
            .rejections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            return Err(Error::rejected("supplier inactive"));
        }
        self.placed.lock().push(request.clone());
        Ok(format!("order-{call}"))
    }
}

/// Push fake that can be switched between failing and delivering.
struct FlakyPush {
    failing: AtomicBool,
    attempts: AtomicUsize,
    delivered: Mutex<Vec<PushMessage>>,
}

impl FlakyPush {
    fn new(failing: bool) -> Self {
        Self {
            failing: AtomicBool::new(failing),
            attempts: AtomicUsize::new(0),
            delivered: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl PushSender for FlakyPush {
    async fn has_permission(&self, _owner_id: &str) -> Result<bool> {
        Ok(true)
    }

    async fn send_push(&self, message: &PushMessage) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::transient("send_push", "gateway unavailable"));
        }
        self.delivered.lock().push(message.clone());
        Ok(())
    }
}

struct Harness {
    _dir: TempDir,
    pool: DbPool,
    clock: ManualClock,
    store: Arc<InMemoryResourceStore>,
    ordering: Arc<ScriptedOrdering>,
    push: Arc<FlakyPush>,
    in_app: Arc<BroadcastInAppNotifier>,
    thresholds: Arc<ThresholdConfigService<SqlxThresholdConfigRepository>>,
    monitor: Arc<MonitorService>,
}

fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 12, 9, 0, 0).unwrap()
}

/// A monitor over the given database and collaborators.
fn monitor_for(
    pool: &DbPool,
    clock: &ManualClock,
    store: &Arc<InMemoryResourceStore>,
    ordering: &Arc<ScriptedOrdering>,
    push: &Arc<FlakyPush>,
    in_app: &Arc<BroadcastInAppNotifier>,
    thresholds: &Arc<ThresholdConfigService<SqlxThresholdConfigRepository>>,
) -> Arc<MonitorService> {
    let clock: Arc<dyn Clock> = Arc::new(clock.clone());
    let dispatcher = NotificationDispatcher::new(
        Arc::new(SqlxNotificationEventRepository::new(pool.clone())),
        clock.clone(),
        Duration::from_secs(2),
    )
    .with_in_app(in_app.clone())
    .with_push(push.clone());

    let deps = MonitorDeps {
        resources: store.clone(),
        configs: thresholds.clone(),
        change_feed: Some(store.clone()),
        alert_records: Arc::new(SqlxAlertRecordRepository::new(pool.clone())),
        auto_actions: Arc::new(SqlxAutoActionRepository::new(pool.clone())),
        ordering: ordering.clone(),
        dispatcher,
        clock,
    };
    Arc::new(MonitorService::new(
        deps,
        MonitorServiceConfig {
            external_timeout: Duration::from_secs(2),
            base_url: "https://app.example.com".to_string(),
            ..MonitorServiceConfig::default()
        },
    ))
}

impl Harness {
    async fn new() -> Self {
        Self::with_ordering(ScriptedOrdering::default()).await
    }

    async fn with_ordering(ordering: ScriptedOrdering) -> Self {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite:{}?mode=rwc", dir.path().join("watch.db").display());
        let pool = init_pool(&url).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let clock = ManualClock::new(start_time());
        let store = Arc::new(InMemoryResourceStore::new());
        let ordering = Arc::new(ordering);
        let push = Arc::new(FlakyPush::new(false));
        let in_app = Arc::new(BroadcastInAppNotifier::new());
        let thresholds = Arc::new(ThresholdConfigService::new(Arc::new(
            SqlxThresholdConfigRepository::new(pool.clone()),
        )));
        let monitor = monitor_for(&pool, &clock, &store, &ordering, &push, &in_app, &thresholds);

        Self {
            _dir: dir,
            pool,
            clock,
            store,
            ordering,
            push,
            in_app,
            thresholds,
            monitor,
        }
    }

    /// A second monitor sharing the database, like another process.
    fn build_monitor(&self) -> Arc<MonitorService> {
        monitor_for(
            &self.pool,
            &self.clock,
            &self.store,
            &self.ordering,
            &self.push,
            &self.in_app,
            &self.thresholds,
        )
    }

    async fn configure(&self, owner_id: &str, class: ResourceClass, config: ThresholdConfig) {
        self.thresholds.set_config(owner_id, class, &config).await.unwrap();
    }

    fn alerts(&self) -> SqlxAlertRecordRepository {
        SqlxAlertRecordRepository::new(self.pool.clone())
    }

    fn auto_actions(&self) -> SqlxAutoActionRepository {
        SqlxAutoActionRepository::new(self.pool.clone())
    }

    fn audit(&self) -> SqlxNotificationEventRepository {
        SqlxNotificationEventRepository::new(self.pool.clone())
    }
}

fn drain_for(rx: &mut broadcast::Receiver<InAppMessage>, owner_id: &str) -> Vec<InAppMessage> {
    let mut messages = Vec::new();
    while let Ok(message) = rx.try_recv() {
        if message.owner_id == owner_id {
            messages.push(message);
        }
    }
    messages
}

fn inventory(consumed: f64) -> MonitoredResource {
    MonitoredResource::new(
        "inv-1",
        "cafe-1",
        ResourceClass::Inventory,
        "Yirgacheffe",
        ResourceMetric::Quantity {
            total: 100.0,
            consumed,
        },
    )
    .with_counterparty("supplier-1")
    .with_unit_price(8.5)
    .with_packaging(Packaging {
        unit_size: 60.0,
        unit_label: "bag".to_string(),
    })
}

fn auto_reorder() -> ThresholdConfig {
    ThresholdConfig {
        auto_action_enabled: true,
        auto_action_quantity: 100.0,
        ..ThresholdConfig::defaults_for(ResourceClass::Inventory)
    }
}

fn set_consumed(harness: &Harness, consumed: f64) {
    harness.store.update("inv-1", |r| {
        r.metric = ResourceMetric::Quantity {
            total: 100.0,
            consumed,
        }
    });
}

#[tokio::test]
async fn critical_stock_orders_once_and_notifies_once() {
    let harness = Harness::new().await;
    harness
        .configure("cafe-1", ResourceClass::Inventory, auto_reorder())
        .await;
    harness.store.upsert(inventory(96.0));
    let (_session, mut rx) = harness.in_app.connect("cafe-1");

    let first = harness.monitor.evaluate_resource("inv-1").await.unwrap();
    match first {
        Evaluation::Evaluated {
            status,
            notified,
            action: Some(ActionOutcome::Placed { quantity, total_cost, .. }),
            ..
        } => {
            assert_eq!(status, ConditionStatus::Critical);
            assert!(notified);
            assert_eq!(quantity, 120.0);
            assert_eq!(total_cost, Some(1020.0));
        }
        other => panic!("unexpected evaluation {other:?}"),
    }

    let second = harness.monitor.evaluate_resource("inv-1").await.unwrap();
    assert_eq!(
        second,
        Evaluation::Evaluated {
            status: ConditionStatus::Critical,
            notified: false,
            action: None,
            action_error: None,
        }
    );

    assert_eq!(harness.ordering.placed.lock().len(), 1);
    let toasts = drain_for(&mut rx, "cafe-1");
    assert_eq!(toasts.len(), 1);
    assert!(toasts[0].toast.body.contains("automatic reorder of 120 kg"));
    assert_eq!(
        toasts[0].toast.deep_link,
        "https://app.example.com/inventory/inv-1"
    );
}

#[tokio::test]
async fn offer_expiry_escalates_then_stays_quiet() {
    let harness = Harness::new().await;
    let now = harness.clock.now();
    harness.store.upsert(MonitoredResource::new(
        "offer-1",
        "cafe-1",
        ResourceClass::FavoriteOffer,
        "Kenya AA",
        ResourceMetric::Deadline {
            due_at: now + chrono::Duration::days(1),
        },
    ));
    let (_session, mut rx) = harness.in_app.connect("cafe-1");

    let evaluation = harness.monitor.evaluate_resource("offer-1").await.unwrap();
    assert!(matches!(
        evaluation,
        Evaluation::Evaluated {
            status: ConditionStatus::ExpiringSoon(1),
            notified: true,
            ..
        }
    ));

    harness
        .clock
        .advance(chrono::Duration::days(1) + chrono::Duration::seconds(1));
    let evaluation = harness.monitor.evaluate_resource("offer-1").await.unwrap();
    assert!(matches!(
        evaluation,
        Evaluation::Evaluated {
            status: ConditionStatus::Expired,
            notified: true,
            ..
        }
    ));

    let evaluation = harness.monitor.evaluate_resource("offer-1").await.unwrap();
    assert!(matches!(
        evaluation,
        Evaluation::Evaluated {
            notified: false,
            ..
        }
    ));

    let titles: Vec<String> = drain_for(&mut rx, "cafe-1")
        .into_iter()
        .map(|m| m.toast.title)
        .collect();
    assert_eq!(
        titles,
        vec![
            "Offer expiring soon: Kenya AA".to_string(),
            "Offer expired: Kenya AA".to_string()
        ]
    );
}

#[tokio::test]
async fn cooldown_blocks_reorder_until_elapsed() {
    let harness = Harness::new().await;
    harness
        .configure("cafe-1", ResourceClass::Inventory, auto_reorder())
        .await;
    harness.store.upsert(inventory(96.0));

    harness.monitor.evaluate_resource("inv-1").await.unwrap();
    assert_eq!(harness.ordering.placed.lock().len(), 1);

    harness.clock.advance(chrono::Duration::hours(23));
    harness.monitor.run_cycle("cafe-1", ResourceClass::Inventory).await.unwrap();
    assert_eq!(harness.ordering.placed.lock().len(), 1);

    harness.clock.advance(chrono::Duration::hours(2));
    harness.monitor.run_cycle("cafe-1", ResourceClass::Inventory).await.unwrap();
    assert_eq!(harness.ordering.placed.lock().len(), 2);

    let record = harness.auto_actions().get("inv-1").await.unwrap().unwrap();
    assert_eq!(
        record.last_triggered_at,
        Some(datetime_to_ms(start_time() + chrono::Duration::hours(25)))
    );
    assert_eq!(record.last_order_id.as_deref(), Some("order-2"));
}

#[tokio::test]
async fn delayed_shipment_notifies_buyer_and_supplier() {
    let harness = Harness::new().await;
    let now = harness.clock.now();
    harness.store.upsert(
        MonitoredResource::new(
            "ship-1",
            "cafe-1",
            ResourceClass::Shipment,
            "Order #1001",
            ResourceMetric::Delivery {
                expected_at: now - chrono::Duration::days(3),
                delivered: false,
            },
        )
        .with_counterparty("supplier-1"),
    );
    let (_buyer, mut rx) = harness.in_app.connect("cafe-1");
    let (_supplier, _) = harness.in_app.connect("supplier-1");

    let evaluation = harness.monitor.evaluate_resource("ship-1").await.unwrap();
    assert!(matches!(
        evaluation,
        Evaluation::Evaluated {
            status: ConditionStatus::Delayed(3),
            notified: true,
            ..
        }
    ));

    let all: Vec<InAppMessage> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
    let buyer: Vec<_> = all.iter().filter(|m| m.owner_id == "cafe-1").collect();
    let supplier: Vec<_> = all.iter().filter(|m| m.owner_id == "supplier-1").collect();
    assert_eq!(buyer.len(), 1);
    assert_eq!(supplier.len(), 1);
    assert_eq!(buyer[0].toast.title, "Shipment delayed: Order #1001");
    assert_eq!(supplier[0].toast.title, "Late delivery: Order #1001");

    let audit = harness.audit();
    assert_eq!(audit.list_for_recipient("cafe-1", 10).await.unwrap().len(), 1);
    assert_eq!(audit.list_for_recipient("supplier-1", 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn recovery_resets_alert_state() {
    let harness = Harness::new().await;
    harness.store.upsert(inventory(85.0));
    let (_session, mut rx) = harness.in_app.connect("cafe-1");

    harness.monitor.evaluate_resource("inv-1").await.unwrap();
    harness.monitor.evaluate_resource("inv-1").await.unwrap();
    assert_eq!(drain_for(&mut rx, "cafe-1").len(), 1);

    set_consumed(&harness, 10.0);
    harness.monitor.evaluate_resource("inv-1").await.unwrap();
    assert!(harness.alerts().list_for_resource("inv-1").await.unwrap().is_empty());

    set_consumed(&harness, 85.0);
    let evaluation = harness.monitor.evaluate_resource("inv-1").await.unwrap();
    assert!(matches!(
        evaluation,
        Evaluation::Evaluated {
            status: ConditionStatus::Warning,
            notified: true,
            ..
        }
    ));
    assert_eq!(drain_for(&mut rx, "cafe-1").len(), 1);
}

#[tokio::test]
async fn escalation_renotifies() {
    let harness = Harness::new().await;
    harness.store.upsert(inventory(85.0));
    let (_session, mut rx) = harness.in_app.connect("cafe-1");

    harness.monitor.evaluate_resource("inv-1").await.unwrap();
    set_consumed(&harness, 97.0);
    harness.monitor.evaluate_resource("inv-1").await.unwrap();
    set_consumed(&harness, 85.0);
    harness.monitor.evaluate_resource("inv-1").await.unwrap();

    let titles: Vec<String> = drain_for(&mut rx, "cafe-1")
        .into_iter()
        .map(|m| m.toast.title)
        .collect();
    assert_eq!(
        titles,
        vec![
            "Low stock: Yirgacheffe".to_string(),
            "Critical stock: Yirgacheffe".to_string()
        ]
    );
}

#[tokio::test]
async fn concurrent_evaluations_place_one_order() {
    let harness = Harness::with_ordering(ScriptedOrdering {
        delay: Some(Duration::from_millis(50)),
        ..Default::default()
    })
    .await;
    harness
        .configure("cafe-1", ResourceClass::Inventory, auto_reorder())
        .await;
    harness.store.upsert(inventory(96.0));

    // Two monitors over one database behave like two processes.
    let other = harness.build_monitor();
    let (a, b, c) = tokio::join!(
        harness.monitor.evaluate_resource("inv-1"),
        other.evaluate_resource("inv-1"),
        harness.monitor.evaluate_resource("inv-1"),
    );

    let placed = [a.unwrap(), b.unwrap(), c.unwrap()]
        .into_iter()
        .filter(|e| {
            matches!(
                e,
                Evaluation::Evaluated {
                    action: Some(ActionOutcome::Placed { .. }),
                    ..
                }
            )
        })
        .count();
    assert_eq!(placed, 1);
    assert_eq!(harness.ordering.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unwatch_lets_an_in_flight_reorder_finish() {
    let harness = Harness::with_ordering(ScriptedOrdering {
        delay: Some(Duration::from_millis(300)),
        ..Default::default()
    })
    .await;
    harness
        .configure("cafe-1", ResourceClass::Inventory, auto_reorder())
        .await;
    let mut events = harness.monitor.subscribe_events();

    assert!(harness.monitor.watch("cafe-1", ResourceClass::Inventory));
    loop {
        if let MonitorEvent::CycleCompleted { .. } = events.recv().await.unwrap() {
            break;
        }
    }

    harness.store.upsert(inventory(96.0));
    tokio::time::timeout(Duration::from_secs(2), async {
        while harness.ordering.calls.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(harness.monitor.unwatch("cafe-1"), 1);

    let order_id = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let MonitorEvent::AutoActionPlaced { order_id, .. } = events.recv().await.unwrap() {
                return order_id;
            }
        }
    })
    .await
    .unwrap();

    let record = harness.auto_actions().get("inv-1").await.unwrap().unwrap();
    assert_eq!(record.last_order_id, Some(order_id));
    assert_eq!(record.last_triggered_at, Some(datetime_to_ms(harness.clock.now())));
    assert_eq!(harness.ordering.placed.lock().len(), 1);
}

#[tokio::test]
async fn rejected_reorder_notifies_and_retries_next_cycle() {
    let harness = Harness::with_ordering(ScriptedOrdering {
        rejections: AtomicUsize::new(1),
        ..Default::default()
    })
    .await;
    harness
        .configure("cafe-1", ResourceClass::Inventory, auto_reorder())
        .await;
    harness.store.upsert(inventory(96.0));
    let (_session, mut rx) = harness.in_app.connect("cafe-1");

    let evaluation = harness.monitor.evaluate_resource("inv-1").await.unwrap();
    match evaluation {
        Evaluation::Evaluated {
            action: None,
            action_error: Some(reason),
            notified: true,
            ..
        } => assert_eq!(reason, "supplier inactive"),
        other => panic!("unexpected evaluation {other:?}"),
    }

    let titles: Vec<String> = drain_for(&mut rx, "cafe-1")
        .into_iter()
        .map(|m| m.toast.title)
        .collect();
    assert_eq!(
        titles,
        vec![
            "Automatic reorder failed: Yirgacheffe".to_string(),
            "Critical stock: Yirgacheffe".to_string()
        ]
    );
    let record = harness.auto_actions().get("inv-1").await.unwrap().unwrap();
    assert_eq!(record.last_triggered_at, None);

    // Same cycle: no second attempt.
    harness.monitor.evaluate_resource("inv-1").await.unwrap();
    assert_eq!(harness.ordering.calls.load(Ordering::SeqCst), 1);

    // Next cycle retries and clears the failure record.
    harness.monitor.run_cycle("cafe-1", ResourceClass::Inventory).await.unwrap();
    assert_eq!(harness.ordering.calls.load(Ordering::SeqCst), 2);
    assert_eq!(harness.ordering.placed.lock().len(), 1);
    assert!(
        harness
            .alerts()
            .get("inv-1", "auto_reorder_failed")
            .await
            .unwrap()
            .is_none()
    );
    assert!(drain_for(&mut rx, "cafe-1").is_empty());
}

#[tokio::test]
async fn failed_delivery_is_retried_until_a_channel_succeeds() {
    let harness = Harness::new().await;
    harness
        .configure(
            "cafe-1",
            ResourceClass::Inventory,
            ThresholdConfig {
                channels: ChannelPreferences {
                    in_app: false,
                    sound: false,
                    push: true,
                    ..ChannelPreferences::default()
                },
                ..ThresholdConfig::defaults_for(ResourceClass::Inventory)
            },
        )
        .await;
    harness.push.failing.store(true, Ordering::SeqCst);
    harness.store.upsert(inventory(90.0));

    for _ in 0..2 {
        let evaluation = harness.monitor.evaluate_resource("inv-1").await.unwrap();
        assert!(matches!(
            evaluation,
            Evaluation::Evaluated {
                notified: false,
                ..
            }
        ));
    }
    assert_eq!(harness.push.attempts.load(Ordering::SeqCst), 2);

    harness.push.failing.store(false, Ordering::SeqCst);
    harness.monitor.evaluate_resource("inv-1").await.unwrap();
    harness.monitor.evaluate_resource("inv-1").await.unwrap();

    assert_eq!(harness.push.attempts.load(Ordering::SeqCst), 3);
    let delivered = harness.push.delivered.lock().clone();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].tag, "inv-1:low_stock");

    let audit = harness.audit().list_for_resource("inv-1", 10).await.unwrap();
    assert_eq!(audit.len(), 3);
    assert_eq!(audit.iter().filter(|row| row.success).count(), 1);
}

#[tokio::test]
async fn invalid_resource_does_not_block_siblings() {
    let harness = Harness::new().await;
    harness.store.upsert(inventory(120.0));
    harness.store.upsert(
        MonitoredResource::new(
            "inv-2",
            "cafe-1",
            ResourceClass::Inventory,
            "Sidamo",
            ResourceMetric::Quantity {
                total: 50.0,
                consumed: 48.0,
            },
        ),
    );

    let summary = harness
        .monitor
        .run_cycle("cafe-1", ResourceClass::Inventory)
        .await
        .unwrap();
    assert_eq!(summary.evaluated, 2);
    assert_eq!(summary.failed, 0);

    let alerts = harness.alerts();
    assert!(alerts.get("inv-1", "low_stock").await.unwrap().is_none());
    assert!(alerts.get("inv-2", "low_stock").await.unwrap().is_some());
}

#[tokio::test]
async fn deleted_resource_drops_alert_state() {
    let harness = Harness::new().await;
    harness.store.upsert(inventory(96.0));
    harness.monitor.evaluate_resource("inv-1").await.unwrap();
    assert!(harness.alerts().get("inv-1", "low_stock").await.unwrap().is_some());

    harness.store.remove("inv-1");
    let evaluation = harness
        .monitor
        .handle_change(&ChangeEvent {
            resource_id: "inv-1".to_string(),
            owner_id: "cafe-1".to_string(),
            class: ResourceClass::Inventory,
            kind: ChangeKind::Deleted,
        })
        .await
        .unwrap();

    assert_eq!(evaluation, Evaluation::Removed);
    assert!(harness.alerts().list_for_resource("inv-1").await.unwrap().is_empty());
}

#[tokio::test]
async fn audit_rows_outlive_retention_only_when_recent() {
    let harness = Harness::new().await;
    harness.store.upsert(inventory(96.0));
    let (_session, _rx) = harness.in_app.connect("cafe-1");
    harness.monitor.evaluate_resource("inv-1").await.unwrap();

    let audit = harness.audit();
    let later = harness.clock.now() + chrono::Duration::days(91);
    assert_eq!(
        audit
            .cleanup_older_than(chrono::Duration::days(90), later)
            .await
            .unwrap(),
        1
    );
}
