use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use supply_watch::clock::{Clock, SystemClock};
use supply_watch::collaborators::{
    BroadcastInAppNotifier, ChangeFeed, HttpEmailSender, HttpOrderingService, HttpPushSender,
    HttpResourceProvider, InMemoryOrderingService, InMemoryResourceStore, OrderingService,
    ResourceProvider, TracingSoundPlayer,
};
use supply_watch::config::{AppConfig, ThresholdConfigService};
use supply_watch::database::{
    self,
    repositories::{
        NotificationEventRepository, SqlxAlertRecordRepository, SqlxAutoActionRepository,
        SqlxNotificationEventRepository, SqlxThresholdConfigRepository,
    },
};
use supply_watch::logging;
use supply_watch::monitor::{MonitorDeps, MonitorService, MonitorServiceConfig};
use supply_watch::notification::NotificationDispatcher;
use supply_watch::utils::http_client::build_client;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;

    let (logging_config, _log_guard) = logging::init_logging(&config.log_settings())?;

    let pool = database::init_pool(&config.database_url).await?;
    database::run_migrations(&pool).await?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let client = build_client(config.external_call_timeout)?;

    let (resources, change_feed): (Arc<dyn ResourceProvider>, Option<Arc<dyn ChangeFeed>>) =
        match &config.resource_api_url {
            Some(url) => {
                let provider: Arc<dyn ResourceProvider> = Arc::new(HttpResourceProvider::new(
                    client.clone(),
                    url,
                    config.resource_api_token.clone(),
                )?);
                (provider, None)
            }
            None => {
                warn!("RESOURCE_API_URL not set, using an empty in-memory resource store");
                let store = Arc::new(InMemoryResourceStore::new());
                let feed: Arc<dyn ChangeFeed> = store.clone();
                let provider: Arc<dyn ResourceProvider> = store;
                (provider, Some(feed))
            }
        };

    let ordering: Arc<dyn OrderingService> = match &config.ordering_api_url {
        Some(url) => Arc::new(HttpOrderingService::new(
            client.clone(),
            url,
            config.ordering_api_token.clone(),
        )?),
        None => {
            warn!("ORDERING_API_URL not set, automatic orders are kept in memory");
            Arc::new(InMemoryOrderingService::new())
        }
    };

    let audit = Arc::new(SqlxNotificationEventRepository::new(pool.clone()));
    let mut dispatcher =
        NotificationDispatcher::new(audit.clone(), clock.clone(), config.external_call_timeout)
            .with_in_app(Arc::new(BroadcastInAppNotifier::new()))
            .with_sound(Arc::new(TracingSoundPlayer));
    if let Some(url) = &config.push_gateway_url {
        dispatcher = dispatcher.with_push(Arc::new(HttpPushSender::new(
            client.clone(),
            url,
            config.push_gateway_token.clone(),
        )?));
    }
    if let Some(url) = &config.email_api_url {
        dispatcher = dispatcher.with_email(Arc::new(HttpEmailSender::new(
            client.clone(),
            url,
            config.email_api_token.clone(),
            config.email_from.clone(),
        )?));
    }

    let thresholds = Arc::new(ThresholdConfigService::new(Arc::new(
        SqlxThresholdConfigRepository::new(pool.clone()),
    )));

    let deps = MonitorDeps {
        resources,
        configs: thresholds.clone(),
        change_feed,
        alert_records: Arc::new(SqlxAlertRecordRepository::new(pool.clone())),
        auto_actions: Arc::new(SqlxAutoActionRepository::new(pool.clone())),
        ordering,
        dispatcher,
        clock: clock.clone(),
    };
    let monitor = Arc::new(MonitorService::new(
        deps,
        MonitorServiceConfig {
            max_concurrency: config.monitor_max_concurrency,
            external_timeout: config.external_call_timeout,
            interval_override: config.monitor_interval,
            base_url: config.app_base_url.clone(),
        },
    ));
    monitor.spawn_config_listener(thresholds.subscribe());

    for (owner_id, class) in &config.watch_owners {
        monitor.watch(owner_id, *class);
    }

    let cancel = CancellationToken::new();
    logging_config.start_retention_cleanup(cancel.clone());
    spawn_audit_retention(
        audit,
        clock,
        chrono::Duration::days(config.audit_retention_days),
        cancel.clone(),
    );

    info!(
        watches = config.watch_owners.len(),
        "supply-watch initialized successfully"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    monitor.shutdown();
    cancel.cancel();
    pool.close().await;

    Ok(())
}

/// Prune audit rows past the retention window once a day.
fn spawn_audit_retention(
    audit: Arc<dyn NotificationEventRepository>,
    clock: Arc<dyn Clock>,
    retention: chrono::Duration,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(24 * 60 * 60));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match audit.cleanup_older_than(retention, clock.now()).await {
                        Ok(0) => {}
                        Ok(removed) => info!(removed, "Pruned notification audit rows"),
                        Err(e) => warn!(error = %e, "Failed to prune notification audit rows"),
                    }
                }
            }
        }
    });
}
