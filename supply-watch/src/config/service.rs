//! Threshold configuration service.
//!
//! Resolves the effective `ThresholdConfig` for an owner and resource class:
//! stored settings when present and valid, class defaults otherwise. Results
//! are cached and invalidated on every write.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{info, warn};

use super::cache::ThresholdCache;
use super::events::{ConfigEventBroadcaster, ConfigUpdateEvent};
use crate::Result;
use crate::collaborators::ConfigProvider;
use crate::database::models::ThresholdConfigDbModel;
use crate::database::repositories::ThresholdConfigRepository;
use crate::domain::{ResourceClass, ThresholdConfig};

/// Cached access to owner threshold configuration.
pub struct ThresholdConfigService<R>
where
    R: ThresholdConfigRepository + ?Sized,
{
    repo: Arc<R>,
    cache: ThresholdCache,
    broadcaster: ConfigEventBroadcaster,
}

impl<R> ThresholdConfigService<R>
where
    R: ThresholdConfigRepository + ?Sized,
{
    pub fn new(repo: Arc<R>) -> Self {
        Self::with_cache(repo, ThresholdCache::new())
    }

    pub fn with_cache(repo: Arc<R>, cache: ThresholdCache) -> Self {
        Self {
            repo,
            cache,
            broadcaster: ConfigEventBroadcaster::new(),
        }
    }

    /// Subscribe to configuration update events.
    pub fn subscribe(&self) -> broadcast::Receiver<ConfigUpdateEvent> {
        self.broadcaster.subscribe()
    }

    /// Stored settings for an owner and class, if any.
    ///
    /// Unparseable or invalid settings are treated as absent.
    pub async fn get_stored(
        &self,
        owner_id: &str,
        class: ResourceClass,
    ) -> Result<Option<ThresholdConfig>> {
        let Some(model) = self.repo.get(owner_id, class.as_str()).await? else {
            return Ok(None);
        };

        let config = match model.config() {
            Ok(config) => config,
            Err(e) => {
                warn!(owner_id, class = %class, error = %e, "Stored thresholds unreadable, using defaults");
                return Ok(None);
            }
        };

        if let Err(e) = config.validate() {
            warn!(owner_id, class = %class, error = %e, "Stored thresholds invalid, using defaults");
            return Ok(None);
        }

        Ok(Some(config))
    }

    /// Effective configuration: stored settings or class defaults.
    pub async fn resolve(&self, owner_id: &str, class: ResourceClass) -> Result<Arc<ThresholdConfig>> {
        if let Some(config) = self.cache.get(owner_id, class) {
            return Ok(config);
        }

        let config = self
            .get_stored(owner_id, class)
            .await?
            .unwrap_or_else(|| ThresholdConfig::defaults_for(class));
        let config = Arc::new(config);
        self.cache.insert(owner_id, class, config.clone());
        Ok(config)
    }

    /// Validate and persist settings, then invalidate the cache.
    pub async fn set_config(
        &self,
        owner_id: &str,
        class: ResourceClass,
        config: &ThresholdConfig,
    ) -> Result<()> {
        config.validate()?;
        let model = ThresholdConfigDbModel::new(owner_id, class, config, Utc::now())?;
        self.repo.upsert(&model).await?;

        self.cache.invalidate(owner_id, class);
        self.broadcaster.publish(ConfigUpdateEvent::ThresholdsUpdated {
            owner_id: owner_id.to_string(),
            class,
        });

        info!(owner_id, class = %class, "Thresholds updated");
        Ok(())
    }

    /// Remove stored settings so class defaults apply.
    pub async fn reset_config(&self, owner_id: &str, class: ResourceClass) -> Result<()> {
        self.repo.delete(owner_id, class.as_str()).await?;

        self.cache.invalidate(owner_id, class);
        self.broadcaster.publish(ConfigUpdateEvent::ThresholdsReset {
            owner_id: owner_id.to_string(),
            class,
        });

        info!(owner_id, class = %class, "Thresholds reset to defaults");
        Ok(())
    }

    /// All classes an owner has configured, with their parsed settings.
    pub async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<(ResourceClass, ThresholdConfig)>> {
        let models = self.repo.list_for_owner(owner_id).await?;
        let mut configs = Vec::with_capacity(models.len());
        for model in models {
            let Some(class) = ResourceClass::parse(&model.resource_class) else {
                warn!(owner_id, class = %model.resource_class, "Unknown resource class in stored thresholds");
                continue;
            };
            match model.config() {
                Ok(config) => configs.push((class, config)),
                Err(e) => warn!(owner_id, class = %class, error = %e, "Skipping unreadable thresholds"),
            }
        }
        Ok(configs)
    }

    pub fn cache(&self) -> &ThresholdCache {
        &self.cache
    }
}

#[async_trait]
impl<R> ConfigProvider for ThresholdConfigService<R>
where
    R: ThresholdConfigRepository + ?Sized,
{
    async fn fetch_config(
        &self,
        owner_id: &str,
        class: ResourceClass,
    ) -> Result<Option<ThresholdConfig>> {
        let config = self.resolve(owner_id, class).await?;
        Ok(Some((*config).clone()))
    }
}
