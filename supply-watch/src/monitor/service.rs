//! Monitor service.
//!
//! Drives the classify -> act -> notify pipeline. Timers and the change feed
//! both funnel into [`MonitorService::evaluate_resource`]; evaluations of one
//! resource are serialized, different resources run in parallel.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{Semaphore, broadcast};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::collaborators::{
    ChangeEvent, ChangeFeed, ChangeKind, ConfigProvider, OrderingService, ResourceProvider,
};
use crate::config::ConfigUpdateEvent;
use crate::database::repositories::{AlertRecordRepository, AutoActionRepository};
use crate::domain::{
    ConditionKind, ConditionStatus, MonitoredResource, ResourceClass, Severity, ThresholdConfig,
};
use crate::notification::{
    Audience, DispatchReport, DispatchTarget, NotificationDispatcher, NotificationPayload,
    TemplateContext, should_mark_notified,
};
use crate::utils::with_timeout;
use crate::{Error, Result};

use super::alert_state::AlertStateStore;
use super::classifier::classify;
use super::events::{MonitorEvent, MonitorEventBroadcaster};
use super::executor::{ActionExecutor, ActionOutcome};
use super::locks::ResourceLocks;
use super::throttle::ActionThrottler;

/// Configuration for the monitor service.
#[derive(Debug, Clone)]
pub struct MonitorServiceConfig {
    /// Maximum resources evaluated at once per cycle or change feed.
    pub max_concurrency: usize,
    /// Budget for every external call.
    pub external_timeout: Duration,
    /// Replaces the per-class polling interval when set.
    pub interval_override: Option<Duration>,
    /// Base URL used for deep links.
    pub base_url: String,
}

impl Default for MonitorServiceConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            external_timeout: Duration::from_secs(10),
            interval_override: None,
            base_url: "http://localhost:3000".to_string(),
        }
    }
}

/// Collaborators and stores the monitor is built from.
pub struct MonitorDeps {
    pub resources: Arc<dyn ResourceProvider>,
    pub configs: Arc<dyn ConfigProvider>,
    pub change_feed: Option<Arc<dyn ChangeFeed>>,
    pub alert_records: Arc<dyn AlertRecordRepository>,
    pub auto_actions: Arc<dyn AutoActionRepository>,
    pub ordering: Arc<dyn OrderingService>,
    pub dispatcher: NotificationDispatcher,
    pub clock: Arc<dyn Clock>,
}

/// Result of evaluating one resource.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// The resource no longer exists; its alert state was dropped.
    Removed,
    /// Monitoring is disabled for the owner's class.
    Disabled,
    /// The snapshot could not be classified.
    Skipped { reason: String },
    Evaluated {
        status: ConditionStatus,
        /// Whether a notification for `status` was dispatched and recorded.
        notified: bool,
        action: Option<ActionOutcome>,
        action_error: Option<String>,
    },
}

/// Summary of one pass over an owner's class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleSummary {
    pub cycle: u64,
    pub evaluated: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
struct ActionStage {
    outcome: Option<ActionOutcome>,
    error: Option<String>,
}

pub struct MonitorService {
    resources: Arc<dyn ResourceProvider>,
    configs: Arc<dyn ConfigProvider>,
    change_feed: Option<Arc<dyn ChangeFeed>>,
    alerts: AlertStateStore,
    throttler: ActionThrottler,
    executor: ActionExecutor,
    dispatcher: NotificationDispatcher,
    clock: Arc<dyn Clock>,
    locks: ResourceLocks,
    events: MonitorEventBroadcaster,
    /// Cycle counter per watched `(owner, class)`.
    cycles: DashMap<(String, ResourceClass), u64>,
    watches: DashMap<(String, ResourceClass), CancellationToken>,
    cancellation: CancellationToken,
    config: MonitorServiceConfig,
}

impl MonitorService {
    pub fn new(deps: MonitorDeps, config: MonitorServiceConfig) -> Self {
        let alerts = AlertStateStore::new(deps.alert_records, deps.clock.clone());
        let throttler = ActionThrottler::new(deps.auto_actions.clone());
        let executor = ActionExecutor::new(
            deps.ordering,
            deps.auto_actions,
            deps.clock.clone(),
            config.external_timeout,
        );

        Self {
            resources: deps.resources,
            configs: deps.configs,
            change_feed: deps.change_feed,
            alerts,
            throttler,
            executor,
            dispatcher: deps.dispatcher,
            clock: deps.clock,
            locks: ResourceLocks::new(),
            events: MonitorEventBroadcaster::new(),
            cycles: DashMap::new(),
            watches: DashMap::new(),
            cancellation: CancellationToken::new(),
            config,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    pub fn alerts(&self) -> &AlertStateStore {
        &self.alerts
    }

    fn current_cycle(&self, owner_id: &str, class: ResourceClass) -> u64 {
        self.cycles
            .get(&(owner_id.to_string(), class))
            .map(|c| *c)
            .unwrap_or(0)
    }

    fn next_cycle(&self, owner_id: &str, class: ResourceClass) -> u64 {
        let mut entry = self.cycles.entry((owner_id.to_string(), class)).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Config for an owner's class; defaults when none is stored.
    async fn resolve_config(&self, owner_id: &str, class: ResourceClass) -> Result<ThresholdConfig> {
        let stored = with_timeout(
            "fetch_config",
            self.config.external_timeout,
            self.configs.fetch_config(owner_id, class),
        )
        .await?;
        Ok(stored.unwrap_or_else(|| ThresholdConfig::defaults_for(class)))
    }

    /// Evaluate one resource from a fresh snapshot.
    pub async fn evaluate_resource(&self, resource_id: &str) -> Result<Evaluation> {
        let snapshot = with_timeout(
            "fetch_resource",
            self.config.external_timeout,
            self.resources.fetch_resource(resource_id),
        )
        .await?;

        match snapshot {
            Some(resource) => {
                let cycle = self.current_cycle(&resource.owner_id, resource.class);
                self.evaluate(&resource, cycle).await
            }
            None => {
                self.forget_resource(resource_id).await?;
                Ok(Evaluation::Removed)
            }
        }
    }

    async fn forget_resource(&self, resource_id: &str) -> Result<()> {
        let _guard = self.locks.acquire(resource_id).await;
        let cleared = self.alerts.clear_resource(resource_id).await?;
        self.throttler.clear_failure(resource_id);
        debug!(resource_id, cleared, "Resource removed, alert state dropped");
        Ok(())
    }

    /// Evaluate a snapshot within `cycle`.
    pub async fn evaluate(&self, resource: &MonitoredResource, cycle: u64) -> Result<Evaluation> {
        let _guard = self.locks.acquire(&resource.id).await;

        let owner_config = self.resolve_config(&resource.owner_id, resource.class).await?;
        if !owner_config.enabled {
            return Ok(Evaluation::Disabled);
        }
        let config = owner_config.effective_for(resource);

        let now = self.clock.now();
        let status = match classify(resource, &config, now) {
            Ok(status) => status,
            Err(Error::InvalidResourceState { reason, .. }) => {
                warn!(resource_id = %resource.id, reason = %reason, "Skipping resource with invalid state");
                self.events.publish(MonitorEvent::ResourceSkipped {
                    resource_id: resource.id.clone(),
                    reason: reason.clone(),
                    timestamp: now,
                });
                return Ok(Evaluation::Skipped { reason });
            }
            Err(e) => return Err(e),
        };
        let kind = resource.condition_kind();

        if status.is_baseline() {
            self.recover(resource, kind, status).await?;
            return Ok(Evaluation::Evaluated {
                status,
                notified: false,
                action: None,
                action_error: None,
            });
        }

        let action = self.action_stage(resource, &config, status, cycle).await?;

        let mut notified = false;
        if self.alerts.should_notify(&resource.id, kind, status).await? {
            notified = self
                .notify(resource, &config, kind, status, action.outcome.as_ref(), None)
                .await?;
        }

        Ok(Evaluation::Evaluated {
            status,
            notified,
            action: action.outcome,
            action_error: action.error,
        })
    }

    async fn recover(
        &self,
        resource: &MonitoredResource,
        kind: ConditionKind,
        status: ConditionStatus,
    ) -> Result<()> {
        let cleared = self.alerts.reconcile(&resource.id, kind, status).await?;
        let failure_cleared = self
            .alerts
            .reconcile(&resource.id, ConditionKind::AutoReorderFailed, status)
            .await?;
        self.throttler.clear_failure(&resource.id);

        let now = self.clock.now();
        for (kind, was_open) in [(kind, cleared), (ConditionKind::AutoReorderFailed, failure_cleared)] {
            if was_open {
                info!(resource_id = %resource.id, kind = %kind, "Condition cleared");
                self.events.publish(MonitorEvent::ConditionCleared {
                    resource_id: resource.id.clone(),
                    kind,
                    timestamp: now,
                });
            }
        }
        Ok(())
    }

    /// Place an automatic order when the condition is critical and allowed.
    async fn action_stage(
        &self,
        resource: &MonitoredResource,
        config: &ThresholdConfig,
        status: ConditionStatus,
        cycle: u64,
    ) -> Result<ActionStage> {
        if !resource.class.supports_auto_action() || status.severity() != Severity::Critical {
            return Ok(ActionStage::default());
        }
        let now = self.clock.now();
        if !self.throttler.can_act(&resource.id, config, now, cycle).await? {
            return Ok(ActionStage::default());
        }

        match self.executor.execute(resource, config).await {
            Ok(outcome) => {
                if let ActionOutcome::Placed {
                    order_id, quantity, ..
                } = &outcome
                {
                    self.throttler.clear_failure(&resource.id);
                    self.alerts
                        .clear(&resource.id, ConditionKind::AutoReorderFailed)
                        .await?;
                    self.events.publish(MonitorEvent::AutoActionPlaced {
                        resource_id: resource.id.clone(),
                        order_id: order_id.clone(),
                        quantity: *quantity,
                        timestamp: now,
                    });
                } else {
                    debug!(resource_id = %resource.id, "Automatic reorder already placed within cooldown");
                }
                Ok(ActionStage {
                    outcome: Some(outcome),
                    error: None,
                })
            }
            Err(e) => {
                self.throttler.mark_failed(&resource.id, cycle, now);
                let rejected = matches!(e, Error::ActionRejected(_));
                let reason = match &e {
                    Error::ActionRejected(reason) => reason.clone(),
                    other => other.to_string(),
                };
                self.events.publish(MonitorEvent::AutoActionFailed {
                    resource_id: resource.id.clone(),
                    reason: reason.clone(),
                    rejected,
                    timestamp: now,
                });

                if rejected {
                    warn!(resource_id = %resource.id, reason = %reason, "Automatic reorder rejected");
                    let failed = ConditionStatus::ActionFailed;
                    let failure_kind = ConditionKind::AutoReorderFailed;
                    if self.alerts.should_notify(&resource.id, failure_kind, failed).await? {
                        self.notify(resource, config, failure_kind, failed, None, Some(&reason))
                            .await?;
                    }
                } else {
                    warn!(resource_id = %resource.id, error = %e, "Automatic reorder failed, will retry next cycle");
                }

                Ok(ActionStage {
                    outcome: None,
                    error: Some(reason),
                })
            }
        }
    }

    /// Dispatch to the owner (and counterparty where the class asks for it),
    /// then open the alert record. Returns whether the record was opened.
    async fn notify(
        &self,
        resource: &MonitoredResource,
        config: &ThresholdConfig,
        kind: ConditionKind,
        status: ConditionStatus,
        action: Option<&ActionOutcome>,
        failure_reason: Option<&str>,
    ) -> Result<bool> {
        let mut reports: Vec<DispatchReport> = Vec::with_capacity(2);

        let owner_ctx = TemplateContext {
            resource,
            kind,
            status,
            audience: Audience::Owner,
            action,
            failure_reason,
            base_url: &self.config.base_url,
        };
        let payload = NotificationPayload::render(&owner_ctx);
        let target = DispatchTarget {
            recipient_id: &resource.owner_id,
            resource_id: &resource.id,
            kind,
            status,
        };
        reports.push(self.dispatcher.dispatch(&target, &payload, &config.channels).await);

        if kind == resource.condition_kind() && resource.class.notifies_counterparty() {
            if let Some(counterparty) = resource.counterparty_id.as_deref() {
                match self.resolve_config(counterparty, resource.class).await {
                    Ok(cp_config) if cp_config.enabled => {
                        let payload = NotificationPayload::render(&TemplateContext {
                            audience: Audience::Counterparty,
                            ..owner_ctx
                        });
                        let target = DispatchTarget {
                            recipient_id: counterparty,
                            ..target
                        };
                        reports.push(
                            self.dispatcher
                                .dispatch(&target, &payload, &cp_config.channels)
                                .await,
                        );
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(resource_id = %resource.id, counterparty, error = %e, "Failed to load counterparty config")
                    }
                }
            }
        }

        if !should_mark_notified(&reports) {
            warn!(resource_id = %resource.id, kind = %kind, "Every notification channel failed, will retry next cycle");
            return Ok(false);
        }

        self.alerts.mark_notified(&resource.id, kind, status).await?;
        info!(resource_id = %resource.id, kind = %kind, status = %status, "Condition notified");
        self.events.publish(MonitorEvent::ConditionDetected {
            resource_id: resource.id.clone(),
            owner_id: resource.owner_id.clone(),
            kind,
            status,
            timestamp: self.clock.now(),
        });
        Ok(true)
    }

    /// Evaluate every resource of an owner's class once.
    ///
    /// A failing resource never stops its siblings; it is counted and logged.
    pub async fn run_cycle(&self, owner_id: &str, class: ResourceClass) -> Result<CycleSummary> {
        let cycle = self.next_cycle(owner_id, class);
        let resources = with_timeout(
            "fetch_resources",
            self.config.external_timeout,
            self.resources.fetch_resources(owner_id, class),
        )
        .await?;

        let evaluated = resources.len();
        let results: Vec<(String, Result<Evaluation>)> = futures::stream::iter(resources)
            .map(|resource| async move {
                let result = self.evaluate(&resource, cycle).await;
                (resource.id, result)
            })
            .buffer_unordered(self.config.max_concurrency.max(1))
            .collect()
            .await;

        let mut failed = 0;
        for (resource_id, result) in &results {
            if let Err(e) = result {
                failed += 1;
                warn!(resource_id = %resource_id, error = %e, transient = e.is_transient(), "Resource evaluation failed");
            }
        }

        debug!(owner_id, class = %class, cycle, evaluated, failed, "Monitor cycle completed");
        self.events.publish(MonitorEvent::CycleCompleted {
            owner_id: owner_id.to_string(),
            class,
            cycle,
            evaluated,
            failed,
            timestamp: self.clock.now(),
        });

        Ok(CycleSummary {
            cycle,
            evaluated,
            failed,
        })
    }

    /// Handle one change-feed event.
    pub async fn handle_change(&self, event: &ChangeEvent) -> Result<Evaluation> {
        match event.kind {
            ChangeKind::Deleted => {
                self.forget_resource(&event.resource_id).await?;
                Ok(Evaluation::Removed)
            }
            ChangeKind::Inserted | ChangeKind::Updated => {
                self.evaluate_resource(&event.resource_id).await
            }
        }
    }

    pub fn is_watching(&self, owner_id: &str, class: ResourceClass) -> bool {
        self.watches.contains_key(&(owner_id.to_string(), class))
    }

    /// Start the timer and change-feed listener for an owner's class.
    ///
    /// Returns `false` when already watching.
    pub fn watch(self: &Arc<Self>, owner_id: &str, class: ResourceClass) -> bool {
        let token = match self.watches.entry((owner_id.to_string(), class)) {
            Entry::Occupied(_) => return false,
            Entry::Vacant(slot) => slot.insert(self.cancellation.child_token()).clone(),
        };

        let interval = self
            .config
            .interval_override
            .unwrap_or_else(|| Duration::from_secs(class.default_interval_secs()));
        info!(owner_id, class = %class, interval_secs = interval.as_secs(), "Watching resources");

        self.spawn_timer(owner_id.to_string(), class, interval, token.clone());
        if let Some(feed) = self.change_feed.clone() {
            self.spawn_change_listener(feed, owner_id.to_string(), class, token);
        }
        true
    }

    fn spawn_timer(
        self: &Arc<Self>,
        owner_id: String,
        class: ResourceClass,
        interval: Duration,
        token: CancellationToken,
    ) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;

                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = this.run_cycle(&owner_id, class).await {
                            warn!(owner_id = %owner_id, class = %class, error = %e, "Monitor cycle failed");
                        }
                    }
                }
            }
            debug!(owner_id = %owner_id, class = %class, "Monitor timer stopped");
        });
    }

    fn spawn_change_listener(
        self: &Arc<Self>,
        feed: Arc<dyn ChangeFeed>,
        owner_id: String,
        class: ResourceClass,
        token: CancellationToken,
    ) {
        let this = Arc::clone(self);
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut changes = feed.subscribe(class, Some(&owner_id));

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    biased;

                    _ = token.cancelled() => break,
                    event = changes.next() => event,
                };
                let Some(event) = event else {
                    debug!(owner_id = %owner_id, class = %class, "Change feed closed");
                    break;
                };

                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    break;
                };
                let this = this.clone();
                let token = token.clone();
                // An evaluation that started runs to completion; unwatching only
                // stops new ones.
                tokio::spawn(async move {
                    let _permit = permit;
                    if token.is_cancelled() {
                        return;
                    }
                    if let Err(e) = this.handle_change(&event).await {
                        warn!(resource_id = %event.resource_id, error = %e, "Change evaluation failed");
                    }
                });
            }
            debug!(owner_id = %owner_id, class = %class, "Change listener stopped");
        });
    }

    /// Re-run a watched class as soon as its thresholds change.
    pub fn spawn_config_listener(self: &Arc<Self>, mut updates: broadcast::Receiver<ConfigUpdateEvent>) {
        let this = Arc::clone(self);
        let token = self.cancellation.clone();

        tokio::spawn(async move {
            loop {
                let update = tokio::select! {
                    biased;

                    _ = token.cancelled() => break,
                    update = updates.recv() => update,
                };
                match update {
                    Ok(event) => {
                        if !this.is_watching(event.owner_id(), event.class()) {
                            continue;
                        }
                        if let Err(e) = this.run_cycle(event.owner_id(), event.class()).await {
                            warn!(owner_id = %event.owner_id(), error = %e, "Re-evaluation after config update failed");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Config update listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    /// Stop watching every class of an owner. Returns the number of watches stopped.
    pub fn unwatch(&self, owner_id: &str) -> usize {
        let mut stopped = 0;
        self.watches.retain(|(owner, _), token| {
            if owner == owner_id {
                token.cancel();
                stopped += 1;
                false
            } else {
                true
            }
        });
        self.cycles.retain(|(owner, _), _| owner != owner_id);
        if stopped > 0 {
            info!(owner_id, stopped, "Stopped watching owner");
        }
        stopped
    }

    /// Cancel every background task.
    pub fn shutdown(&self) {
        info!("Stopping monitor service");
        self.cancellation.cancel();
        self.watches.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::collaborators::{InMemoryOrderingService, InMemoryResourceStore};
    use crate::database::repositories::{
        SqlxAutoActionRepository, SqlxNotificationEventRepository,
    };
    use crate::database::test_pool;
    use crate::domain::ResourceMetric;
    use crate::monitor::InMemoryAlertRecordRepository;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    struct FixedConfig(ThresholdConfig);

    #[async_trait]
    impl ConfigProvider for FixedConfig {
        async fn fetch_config(
            &self,
            _owner_id: &str,
            _class: ResourceClass,
        ) -> Result<Option<ThresholdConfig>> {
            Ok(Some(self.0.clone()))
        }
    }

    async fn service(
        store: Arc<InMemoryResourceStore>,
        config: ThresholdConfig,
    ) -> (Arc<MonitorService>, Arc<InMemoryOrderingService>) {
        let pool = test_pool().await;
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 5, 12, 9, 0, 0).unwrap(),
        ));
        let ordering = Arc::new(InMemoryOrderingService::new());
        let dispatcher = NotificationDispatcher::new(
            Arc::new(SqlxNotificationEventRepository::new(pool.clone())),
            clock.clone(),
            Duration::from_secs(1),
        );
        let deps = MonitorDeps {
            resources: store.clone(),
            configs: Arc::new(FixedConfig(config)),
            change_feed: Some(store),
            alert_records: Arc::new(InMemoryAlertRecordRepository::new()),
            auto_actions: Arc::new(SqlxAutoActionRepository::new(pool)),
            ordering: ordering.clone(),
            dispatcher,
            clock,
        };
        (
            Arc::new(MonitorService::new(deps, MonitorServiceConfig::default())),
            ordering,
        )
    }

    fn stock(id: &str, consumed: f64) -> MonitoredResource {
        MonitoredResource::new(
            id,
            "cafe-1",
            ResourceClass::Inventory,
            "Guji",
            ResourceMetric::Quantity {
                total: 100.0,
                consumed,
            },
        )
    }

    #[tokio::test]
    async fn test_disabled_config_skips_everything() {
        let store = Arc::new(InMemoryResourceStore::new());
        store.upsert(stock("inv-1", 99.0));
        let config = ThresholdConfig {
            enabled: false,
            ..ThresholdConfig::default()
        };
        let (service, _) = service(store, config).await;

        assert_eq!(
            service.evaluate_resource("inv-1").await.unwrap(),
            Evaluation::Disabled
        );
    }

    #[tokio::test]
    async fn test_missing_resource_is_removed() {
        let store = Arc::new(InMemoryResourceStore::new());
        let (service, _) = service(store, ThresholdConfig::default()).await;
        assert_eq!(
            service.evaluate_resource("gone").await.unwrap(),
            Evaluation::Removed
        );
    }

    #[tokio::test]
    async fn test_cycle_isolates_invalid_resources() {
        let store = Arc::new(InMemoryResourceStore::new());
        store.upsert(stock("inv-1", 150.0));
        store.upsert(stock("inv-2", 90.0));
        let (service, _) = service(store, ThresholdConfig::default()).await;
        let mut events = service.subscribe_events();

        let summary = service.run_cycle("cafe-1", ResourceClass::Inventory).await.unwrap();
        assert_eq!(summary.evaluated, 2);
        assert_eq!(summary.failed, 0);

        let mut skipped = false;
        let mut detected = false;
        while let Ok(event) = events.try_recv() {
            match event {
                MonitorEvent::ResourceSkipped { resource_id, .. } => skipped = resource_id == "inv-1",
                MonitorEvent::ConditionDetected { resource_id, .. } => detected = resource_id == "inv-2",
                _ => {}
            }
        }
        assert!(skipped);
        assert!(detected);
    }

    #[tokio::test]
    async fn test_watch_and_unwatch() {
        let store = Arc::new(InMemoryResourceStore::new());
        let (service, _) = service(store, ThresholdConfig::default()).await;

        assert!(service.watch("cafe-1", ResourceClass::Inventory));
        assert!(!service.watch("cafe-1", ResourceClass::Inventory));
        assert!(service.watch("cafe-1", ResourceClass::FavoriteOffer));
        assert!(service.is_watching("cafe-1", ResourceClass::Inventory));

        assert_eq!(service.unwatch("cafe-1"), 2);
        assert!(!service.is_watching("cafe-1", ResourceClass::Inventory));
        service.shutdown();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_watch_starts_one_watcher() {
        let store = Arc::new(InMemoryResourceStore::new());
        let (service, _) = service(store, ThresholdConfig::default()).await;
        let handle = tokio::runtime::Handle::current();

        let started = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..8)
                .map(|_| {
                    let service = service.clone();
                    let handle = handle.clone();
                    scope.spawn(move || {
                        let _runtime = handle.enter();
                        service.watch("cafe-1", ResourceClass::Inventory)
                    })
                })
                .collect();
            workers
                .into_iter()
                .map(|worker| worker.join().unwrap())
                .filter(|started| *started)
                .count()
        });

        assert_eq!(started, 1);
        assert_eq!(service.unwatch("cafe-1"), 1);
        service.shutdown();
    }

    #[tokio::test]
    async fn test_change_feed_triggers_evaluation() {
        let store = Arc::new(InMemoryResourceStore::new());
        let (service, _) = service(store.clone(), ThresholdConfig::default()).await;
        let mut events = service.subscribe_events();

        service.watch("cafe-1", ResourceClass::Inventory);
        // Wait for the initial (empty) cycle so the listener is subscribed.
        loop {
            if let MonitorEvent::CycleCompleted { .. } = events.recv().await.unwrap() {
                break;
            }
        }

        store.upsert(stock("inv-1", 97.0));
        let detected = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if let MonitorEvent::ConditionDetected { resource_id, status, .. } =
                    events.recv().await.unwrap()
                {
                    return (resource_id, status);
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(detected, ("inv-1".to_string(), ConditionStatus::Critical));
        service.shutdown();
    }
}
