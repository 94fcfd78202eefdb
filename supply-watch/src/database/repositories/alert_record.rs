//! Alert record repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::AlertRecordDbModel;
use crate::database::retry::retry_on_sqlite_busy;

/// Alert record repository trait.
#[async_trait]
pub trait AlertRecordRepository: Send + Sync {
    async fn get(&self, resource_id: &str, condition_kind: &str)
    -> Result<Option<AlertRecordDbModel>>;
    async fn upsert(&self, record: &AlertRecordDbModel) -> Result<()>;
    /// Returns whether a record was removed.
    async fn delete(&self, resource_id: &str, condition_kind: &str) -> Result<bool>;
    /// Remove every record of a resource. Returns the number removed.
    async fn delete_for_resource(&self, resource_id: &str) -> Result<u64>;
    async fn list_for_resource(&self, resource_id: &str) -> Result<Vec<AlertRecordDbModel>>;
}

/// SQLx implementation of AlertRecordRepository.
pub struct SqlxAlertRecordRepository {
    pool: SqlitePool,
}

impl SqlxAlertRecordRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AlertRecordRepository for SqlxAlertRecordRepository {
    async fn get(
        &self,
        resource_id: &str,
        condition_kind: &str,
    ) -> Result<Option<AlertRecordDbModel>> {
        let record = sqlx::query_as::<_, AlertRecordDbModel>(
            "SELECT * FROM alert_record WHERE resource_id = ? AND condition_kind = ?",
        )
        .bind(resource_id)
        .bind(condition_kind)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn upsert(&self, record: &AlertRecordDbModel) -> Result<()> {
        retry_on_sqlite_busy("alert_record_upsert", || async {
            sqlx::query(
                r#"
                INSERT INTO alert_record (resource_id, condition_kind, last_status, severity, notified_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(resource_id, condition_kind) DO UPDATE SET
                    last_status = excluded.last_status,
                    severity = excluded.severity,
                    notified_at = excluded.notified_at
                "#,
            )
            .bind(&record.resource_id)
            .bind(&record.condition_kind)
            .bind(&record.last_status)
            .bind(record.severity)
            .bind(record.notified_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, resource_id: &str, condition_kind: &str) -> Result<bool> {
        let result = retry_on_sqlite_busy("alert_record_delete", || async {
            Ok(sqlx::query(
                "DELETE FROM alert_record WHERE resource_id = ? AND condition_kind = ?",
            )
            .bind(resource_id)
            .bind(condition_kind)
            .execute(&self.pool)
            .await?)
        })
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_for_resource(&self, resource_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM alert_record WHERE resource_id = ?")
            .bind(resource_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn list_for_resource(&self, resource_id: &str) -> Result<Vec<AlertRecordDbModel>> {
        let records = sqlx::query_as::<_, AlertRecordDbModel>(
            "SELECT * FROM alert_record WHERE resource_id = ? ORDER BY condition_kind",
        )
        .bind(resource_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }
}
