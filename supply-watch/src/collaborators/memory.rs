//! In-process collaborators.
//!
//! Used when no remote API is configured, and as the backing store for
//! end-to-end tests.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::{ChangeEvent, ChangeFeed, ChangeKind, OrderRequest, OrderingService, ResourceProvider};
use crate::Result;
use crate::domain::{MonitoredResource, ResourceClass};

/// Resource snapshots held in memory, with a change feed.
#[derive(Clone)]
pub struct InMemoryResourceStore {
    resources: Arc<DashMap<String, MonitoredResource>>,
    changes: broadcast::Sender<ChangeEvent>,
}

impl InMemoryResourceStore {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(capacity);
        Self {
            resources: Arc::new(DashMap::new()),
            changes,
        }
    }

    /// Insert or replace a resource and publish the change.
    pub fn upsert(&self, resource: MonitoredResource) {
        let event = |kind| ChangeEvent {
            resource_id: resource.id.clone(),
            owner_id: resource.owner_id.clone(),
            class: resource.class,
            kind,
        };
        let kind = if self.resources.contains_key(&resource.id) {
            ChangeKind::Updated
        } else {
            ChangeKind::Inserted
        };
        let change = event(kind);
        self.resources.insert(resource.id.clone(), resource);
        // No subscribers is fine; the timer still picks the change up.
        let _ = self.changes.send(change);
    }

    /// Apply `f` to a stored resource and publish an update.
    pub fn update<F>(&self, resource_id: &str, f: F) -> bool
    where
        F: FnOnce(&mut MonitoredResource),
    {
        let change = match self.resources.get_mut(resource_id) {
            Some(mut entry) => {
                f(entry.value_mut());
                ChangeEvent {
                    resource_id: entry.id.clone(),
                    owner_id: entry.owner_id.clone(),
                    class: entry.class,
                    kind: ChangeKind::Updated,
                }
            }
            None => return false,
        };
        let _ = self.changes.send(change);
        true
    }

    pub fn remove(&self, resource_id: &str) -> Option<MonitoredResource> {
        let (_, resource) = self.resources.remove(resource_id)?;
        let _ = self.changes.send(ChangeEvent {
            resource_id: resource.id.clone(),
            owner_id: resource.owner_id.clone(),
            class: resource.class,
            kind: ChangeKind::Deleted,
        });
        Some(resource)
    }

    pub fn get(&self, resource_id: &str) -> Option<MonitoredResource> {
        self.resources.get(resource_id).map(|r| r.value().clone())
    }
}

impl Default for InMemoryResourceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceProvider for InMemoryResourceStore {
    async fn fetch_resources(
        &self,
        owner_id: &str,
        class: ResourceClass,
    ) -> Result<Vec<MonitoredResource>> {
        let mut resources: Vec<MonitoredResource> = self
            .resources
            .iter()
            .filter(|r| r.owner_id == owner_id && r.class == class)
            .map(|r| r.value().clone())
            .collect();
        resources.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(resources)
    }

    async fn fetch_resource(&self, resource_id: &str) -> Result<Option<MonitoredResource>> {
        Ok(self.get(resource_id))
    }
}

impl ChangeFeed for InMemoryResourceStore {
    fn subscribe(
        &self,
        class: ResourceClass,
        owner_filter: Option<&str>,
    ) -> BoxStream<'static, ChangeEvent> {
        let receiver = self.changes.subscribe();
        let owner_filter = owner_filter.map(str::to_string);

        stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => return Some((event, receiver)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Missed events are recovered by the periodic timer.
                        warn!(skipped, "Change feed subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .filter(move |event| {
            let matches = event.class == class
                && owner_filter
                    .as_deref()
                    .is_none_or(|owner| owner == event.owner_id);
            futures::future::ready(matches)
        })
        .boxed()
    }
}

/// Ordering service that accepts every order and remembers it.
#[derive(Default)]
pub struct InMemoryOrderingService {
    orders: Mutex<Vec<(String, OrderRequest)>>,
}

impl InMemoryOrderingService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn orders(&self) -> Vec<(String, OrderRequest)> {
        self.orders.lock().clone()
    }
}

#[async_trait]
impl OrderingService for InMemoryOrderingService {
    async fn create_order(&self, request: &OrderRequest) -> Result<String> {
        let mut orders = self.orders.lock();
        // Same idempotency key, same order.
        if let Some((id, _)) = orders
            .iter()
            .find(|(_, existing)| existing.idempotency_key == request.idempotency_key)
        {
            return Ok(id.clone());
        }
        let id = uuid::Uuid::new_v4().to_string();
        debug!(order_id = %id, resource_id = %request.resource_id, "Recorded in-memory order");
        orders.push((id.clone(), request.clone()));
        Ok(id)
    }
}
