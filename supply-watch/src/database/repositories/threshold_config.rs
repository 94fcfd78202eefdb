//! Threshold configuration repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::ThresholdConfigDbModel;

/// Threshold configuration repository trait.
#[async_trait]
pub trait ThresholdConfigRepository: Send + Sync {
    async fn get(&self, owner_id: &str, resource_class: &str)
    -> Result<Option<ThresholdConfigDbModel>>;
    async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<ThresholdConfigDbModel>>;
    async fn upsert(&self, config: &ThresholdConfigDbModel) -> Result<()>;
    async fn delete(&self, owner_id: &str, resource_class: &str) -> Result<()>;
}

/// SQLx implementation of ThresholdConfigRepository.
pub struct SqlxThresholdConfigRepository {
    pool: SqlitePool,
}

impl SqlxThresholdConfigRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ThresholdConfigRepository for SqlxThresholdConfigRepository {
    async fn get(
        &self,
        owner_id: &str,
        resource_class: &str,
    ) -> Result<Option<ThresholdConfigDbModel>> {
        let config = sqlx::query_as::<_, ThresholdConfigDbModel>(
            "SELECT * FROM threshold_config WHERE owner_id = ? AND resource_class = ?",
        )
        .bind(owner_id)
        .bind(resource_class)
        .fetch_optional(&self.pool)
        .await?;
        Ok(config)
    }

    async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<ThresholdConfigDbModel>> {
        let configs = sqlx::query_as::<_, ThresholdConfigDbModel>(
            "SELECT * FROM threshold_config WHERE owner_id = ? ORDER BY resource_class",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(configs)
    }

    async fn upsert(&self, config: &ThresholdConfigDbModel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO threshold_config (owner_id, resource_class, settings, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(owner_id, resource_class) DO UPDATE SET
                settings = excluded.settings,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&config.owner_id)
        .bind(&config.resource_class)
        .bind(&config.settings)
        .bind(config.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, owner_id: &str, resource_class: &str) -> Result<()> {
        sqlx::query("DELETE FROM threshold_config WHERE owner_id = ? AND resource_class = ?")
            .bind(owner_id)
            .bind(resource_class)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
