//! Auto-action record repository.
//!
//! The claim is a single conditional upsert, so two evaluators racing on the
//! same resource (in one process or several) can never both win.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::AutoActionRecordDbModel;
use crate::database::retry::retry_on_sqlite_busy;
use crate::database::time::{datetime_to_ms, duration_to_ms};

/// A won claim on a resource's auto-action slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionClaim {
    pub resource_id: String,
    /// Epoch milliseconds written as `last_triggered_at`.
    pub claimed_at: i64,
    /// The timestamp the claim replaced.
    pub previous_triggered_at: Option<i64>,
}

/// Auto-action repository trait.
#[async_trait]
pub trait AutoActionRepository: Send + Sync {
    async fn get(&self, resource_id: &str) -> Result<Option<AutoActionRecordDbModel>>;

    /// Set `last_triggered_at = now` if the cooldown has elapsed.
    ///
    /// Returns `None` when another caller acted within the cooldown.
    async fn try_claim(
        &self,
        resource_id: &str,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> Result<Option<ActionClaim>>;

    /// Attach the created order to a claim.
    async fn confirm(&self, claim: &ActionClaim, order_id: &str) -> Result<()>;

    /// Restore the timestamp and order id that preceded a claim. Returns
    /// false when the claim was already superseded.
    async fn release(&self, claim: &ActionClaim) -> Result<bool>;
}

/// SQLx implementation of AutoActionRepository.
pub struct SqlxAutoActionRepository {
    pool: SqlitePool,
}

impl SqlxAutoActionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AutoActionRepository for SqlxAutoActionRepository {
    async fn get(&self, resource_id: &str) -> Result<Option<AutoActionRecordDbModel>> {
        let record = sqlx::query_as::<_, AutoActionRecordDbModel>(
            "SELECT * FROM auto_action_record WHERE resource_id = ?",
        )
        .bind(resource_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn try_claim(
        &self,
        resource_id: &str,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> Result<Option<ActionClaim>> {
        let now_ms = datetime_to_ms(now);
        let cutoff_ms = now_ms.saturating_sub(duration_to_ms(cooldown));

        let row: Option<(Option<i64>,)> = retry_on_sqlite_busy("auto_action_claim", || async {
            Ok(sqlx::query_as(
                r#"
                INSERT INTO auto_action_record (
                    resource_id, last_triggered_at, previous_triggered_at,
                    last_order_id, previous_order_id, updated_at
                ) VALUES (?, ?, NULL, NULL, NULL, ?)
                ON CONFLICT(resource_id) DO UPDATE SET
                    previous_triggered_at = auto_action_record.last_triggered_at,
                    last_triggered_at = excluded.last_triggered_at,
                    previous_order_id = auto_action_record.last_order_id,
                    last_order_id = NULL,
                    updated_at = excluded.updated_at
                WHERE auto_action_record.last_triggered_at IS NULL
                   OR auto_action_record.last_triggered_at <= ?
                RETURNING previous_triggered_at
                "#,
            )
            .bind(resource_id)
            .bind(now_ms)
            .bind(now_ms)
            .bind(cutoff_ms)
            .fetch_optional(&self.pool)
            .await?)
        })
        .await?;

        Ok(row.map(|(previous,)| ActionClaim {
            resource_id: resource_id.to_string(),
            claimed_at: now_ms,
            previous_triggered_at: previous,
        }))
    }

    async fn confirm(&self, claim: &ActionClaim, order_id: &str) -> Result<()> {
        retry_on_sqlite_busy("auto_action_confirm", || async {
            sqlx::query(
                r#"
                UPDATE auto_action_record SET
                    last_order_id = ?,
                    updated_at = ?
                WHERE resource_id = ? AND last_triggered_at = ?
                "#,
            )
            .bind(order_id)
            .bind(claim.claimed_at)
            .bind(&claim.resource_id)
            .bind(claim.claimed_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn release(&self, claim: &ActionClaim) -> Result<bool> {
        let result = retry_on_sqlite_busy("auto_action_release", || async {
            Ok(sqlx::query(
                r#"
                UPDATE auto_action_record SET
                    last_triggered_at = ?,
                    previous_triggered_at = NULL,
                    last_order_id = previous_order_id,
                    previous_order_id = NULL,
                    updated_at = ?
                WHERE resource_id = ? AND last_triggered_at = ?
                "#,
            )
            .bind(claim.previous_triggered_at)
            .bind(claim.claimed_at)
            .bind(&claim.resource_id)
            .bind(claim.claimed_at)
            .execute(&self.pool)
            .await?)
        })
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
