//! Notification audit log repository.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;

use crate::Result;
use crate::database::begin_immediate;
use crate::database::models::NotificationEventDbModel;
use crate::database::time::datetime_to_ms;

/// Notification audit repository trait. Rows are append-only.
#[async_trait]
pub trait NotificationEventRepository: Send + Sync {
    /// Append all rows in one transaction.
    async fn append_batch(&self, events: &[NotificationEventDbModel]) -> Result<()>;
    async fn list_for_resource(
        &self,
        resource_id: &str,
        limit: i64,
    ) -> Result<Vec<NotificationEventDbModel>>;
    async fn list_for_recipient(
        &self,
        recipient_id: &str,
        limit: i64,
    ) -> Result<Vec<NotificationEventDbModel>>;
    /// Delete rows older than `retention`. Returns the number removed.
    async fn cleanup_older_than(&self, retention: Duration, now: DateTime<Utc>) -> Result<u64>;
}

/// SQLx implementation of NotificationEventRepository.
pub struct SqlxNotificationEventRepository {
    pool: SqlitePool,
}

impl SqlxNotificationEventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationEventRepository for SqlxNotificationEventRepository {
    async fn append_batch(&self, events: &[NotificationEventDbModel]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        let mut tx = begin_immediate(&self.pool).await?;
        for event in events {
            sqlx::query(
                r#"
                INSERT INTO notification_event (
                    id, resource_id, condition_kind, recipient_id, channel,
                    status, success, error, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&event.id)
            .bind(&event.resource_id)
            .bind(&event.condition_kind)
            .bind(&event.recipient_id)
            .bind(&event.channel)
            .bind(&event.status)
            .bind(event.success)
            .bind(&event.error)
            .bind(event.created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_for_resource(
        &self,
        resource_id: &str,
        limit: i64,
    ) -> Result<Vec<NotificationEventDbModel>> {
        let events = sqlx::query_as::<_, NotificationEventDbModel>(
            "SELECT * FROM notification_event WHERE resource_id = ? ORDER BY created_at DESC, id LIMIT ?",
        )
        .bind(resource_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }

    async fn list_for_recipient(
        &self,
        recipient_id: &str,
        limit: i64,
    ) -> Result<Vec<NotificationEventDbModel>> {
        let events = sqlx::query_as::<_, NotificationEventDbModel>(
            "SELECT * FROM notification_event WHERE recipient_id = ? ORDER BY created_at DESC, id LIMIT ?",
        )
        .bind(recipient_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }

    async fn cleanup_older_than(&self, retention: Duration, now: DateTime<Utc>) -> Result<u64> {
        let cutoff = datetime_to_ms(now - retention);
        let result = sqlx::query("DELETE FROM notification_event WHERE created_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
