//! Alert state store.
//!
//! Tracks, per `(resource_id, condition_kind)`, whether the current
//! occurrence of a condition has already been notified and at which
//! severity. Records open on the first notified breach and close only when a
//! fresh snapshot shows the resource back at baseline.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::Result;
use crate::clock::Clock;
use crate::database::models::AlertRecordDbModel;
use crate::database::repositories::AlertRecordRepository;
use crate::domain::{ConditionKind, ConditionStatus};

/// Deduplication over an [`AlertRecordRepository`].
pub struct AlertStateStore {
    repo: Arc<dyn AlertRecordRepository>,
    clock: Arc<dyn Clock>,
}

impl AlertStateStore {
    pub fn new(repo: Arc<dyn AlertRecordRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repo, clock }
    }

    /// Whether `status` warrants a notification.
    ///
    /// Baseline never notifies. Otherwise notify when there is no open record
    /// or when `status` is more severe than what was last notified.
    pub async fn should_notify(
        &self,
        resource_id: &str,
        kind: ConditionKind,
        status: ConditionStatus,
    ) -> Result<bool> {
        if status.is_baseline() {
            return Ok(false);
        }
        let notify = match self.repo.get(resource_id, kind.as_str()).await? {
            None => true,
            Some(record) => status.severity() > record.severity(),
        };
        Ok(notify)
    }

    /// Open or escalate the record for this condition.
    pub async fn mark_notified(
        &self,
        resource_id: &str,
        kind: ConditionKind,
        status: ConditionStatus,
    ) -> Result<()> {
        let record = AlertRecordDbModel::new(resource_id, kind, status, self.clock.now());
        self.repo.upsert(&record).await
    }

    /// Close the record when `new_status` is baseline. Returns whether a
    /// record was closed.
    pub async fn reconcile(
        &self,
        resource_id: &str,
        kind: ConditionKind,
        new_status: ConditionStatus,
    ) -> Result<bool> {
        if !new_status.is_baseline() {
            return Ok(false);
        }
        let cleared = self.repo.delete(resource_id, kind.as_str()).await?;
        if cleared {
            debug!(resource_id, kind = %kind, "Alert record cleared on recovery");
        }
        Ok(cleared)
    }

    /// Close the record regardless of status, e.g. after a successful retry
    /// of a previously failed action.
    pub async fn clear(&self, resource_id: &str, kind: ConditionKind) -> Result<bool> {
        self.repo.delete(resource_id, kind.as_str()).await
    }

    /// Drop every record of a deleted resource.
    pub async fn clear_resource(&self, resource_id: &str) -> Result<u64> {
        self.repo.delete_for_resource(resource_id).await
    }

    pub async fn open_record(
        &self,
        resource_id: &str,
        kind: ConditionKind,
    ) -> Result<Option<AlertRecordDbModel>> {
        self.repo.get(resource_id, kind.as_str()).await
    }
}

/// Process-local alert records. Suppresses repeated notifications from one
/// process's polling but offers no guarantee across processes or restarts.
#[derive(Default)]
pub struct InMemoryAlertRecordRepository {
    records: DashMap<(String, String), AlertRecordDbModel>,
}

impl InMemoryAlertRecordRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl AlertRecordRepository for InMemoryAlertRecordRepository {
    async fn get(
        &self,
        resource_id: &str,
        condition_kind: &str,
    ) -> Result<Option<AlertRecordDbModel>> {
        let key = (resource_id.to_string(), condition_kind.to_string());
        Ok(self.records.get(&key).map(|r| r.value().clone()))
    }

    async fn upsert(&self, record: &AlertRecordDbModel) -> Result<()> {
        let key = (record.resource_id.clone(), record.condition_kind.clone());
        self.records.insert(key, record.clone());
        Ok(())
    }

    async fn delete(&self, resource_id: &str, condition_kind: &str) -> Result<bool> {
        let key = (resource_id.to_string(), condition_kind.to_string());
        Ok(self.records.remove(&key).is_some())
    }

    async fn delete_for_resource(&self, resource_id: &str) -> Result<u64> {
        let before = self.records.len();
        self.records.retain(|(id, _), _| id != resource_id);
        Ok((before - self.records.len()) as u64)
    }

    async fn list_for_resource(&self, resource_id: &str) -> Result<Vec<AlertRecordDbModel>> {
        let mut records: Vec<AlertRecordDbModel> = self
            .records
            .iter()
            .filter(|r| r.key().0 == resource_id)
            .map(|r| r.value().clone())
            .collect();
        records.sort_by(|a, b| a.condition_kind.cmp(&b.condition_kind));
        Ok(records)
    }
}
