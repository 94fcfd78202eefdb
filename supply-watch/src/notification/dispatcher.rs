//! Notification fan-out.
//!
//! One decision is delivered to every channel the recipient enabled. Channels
//! run concurrently and fail independently; each attempted channel leaves one
//! audit row, and a dispatch that attempted nothing leaves a single
//! `none` row.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::templates::NotificationPayload;
use crate::clock::Clock;
use crate::collaborators::{
    EmailSender, InAppNotifier, PushMessage, PushSender, SoundPlayer, Toast,
};
use crate::database::models::{NotificationChannelKind, NotificationEventDbModel};
use crate::database::repositories::NotificationEventRepository;
use crate::domain::{ChannelPreferences, ConditionKind, ConditionStatus};
use crate::utils::with_timeout;

/// Who and what a dispatch is about.
#[derive(Debug, Clone, Copy)]
pub struct DispatchTarget<'a> {
    pub recipient_id: &'a str,
    pub resource_id: &'a str,
    pub kind: ConditionKind,
    pub status: ConditionStatus,
}

/// Result of one channel attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelOutcome {
    pub channel: NotificationChannelKind,
    pub delivered: bool,
    pub error: Option<String>,
}

impl ChannelOutcome {
    fn delivered(channel: NotificationChannelKind) -> Self {
        Self {
            channel,
            delivered: true,
            error: None,
        }
    }

    fn failed(channel: NotificationChannelKind, error: impl Into<String>) -> Self {
        Self {
            channel,
            delivered: false,
            error: Some(error.into()),
        }
    }
}

/// Per-recipient summary of a dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub recipient_id: String,
    /// Attempted channels only.
    pub outcomes: Vec<ChannelOutcome>,
}

impl DispatchReport {
    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    pub fn delivered(&self) -> usize {
        self.outcomes.iter().filter(|o| o.delivered).count()
    }

    pub fn outcome(&self, channel: NotificationChannelKind) -> Option<&ChannelOutcome> {
        self.outcomes.iter().find(|o| o.channel == channel)
    }
}

/// Whether a decision counts as notified across all of its recipients.
///
/// False only when some channel was attempted and none delivered, so a fully
/// failed dispatch is retried on the next cycle.
pub fn should_mark_notified(reports: &[DispatchReport]) -> bool {
    let attempted = reports.iter().any(|r| r.attempted() > 0);
    !attempted || reports.iter().any(|r| r.delivered() > 0)
}

/// Fans notifications out to the configured channels.
pub struct NotificationDispatcher {
    in_app: Option<Arc<dyn InAppNotifier>>,
    sound: Option<Arc<dyn SoundPlayer>>,
    push: Option<Arc<dyn PushSender>>,
    email: Option<Arc<dyn EmailSender>>,
    audit: Arc<dyn NotificationEventRepository>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl NotificationDispatcher {
    /// A dispatcher with no delivery channels; add them with the `with_*` builders.
    pub fn new(
        audit: Arc<dyn NotificationEventRepository>,
        clock: Arc<dyn Clock>,
        timeout: Duration,
    ) -> Self {
        Self {
            in_app: None,
            sound: None,
            push: None,
            email: None,
            audit,
            clock,
            timeout,
        }
    }

    pub fn with_in_app(mut self, in_app: Arc<dyn InAppNotifier>) -> Self {
        self.in_app = Some(in_app);
        self
    }

    pub fn with_sound(mut self, sound: Arc<dyn SoundPlayer>) -> Self {
        self.sound = Some(sound);
        self
    }

    pub fn with_push(mut self, push: Arc<dyn PushSender>) -> Self {
        self.push = Some(push);
        self
    }

    pub fn with_email(mut self, email: Arc<dyn EmailSender>) -> Self {
        self.email = Some(email);
        self
    }

    /// Deliver `payload` to `target.recipient_id` on every enabled channel.
    ///
    /// Never fails: channel errors are recorded in the report and the audit
    /// log, and an audit write failure is only logged.
    pub async fn dispatch(
        &self,
        target: &DispatchTarget<'_>,
        payload: &NotificationPayload,
        channels: &ChannelPreferences,
    ) -> DispatchReport {
        let (in_app, sound, push, email) = tokio::join!(
            self.send_in_app(target, payload, channels),
            self.play_sound(channels),
            self.send_push(target, payload, channels),
            self.send_email(target, payload, channels),
        );

        let outcomes: Vec<ChannelOutcome> =
            [in_app, sound, push, email].into_iter().flatten().collect();

        for outcome in outcomes.iter().filter(|o| !o.delivered) {
            warn!(
                recipient_id = %target.recipient_id,
                resource_id = %target.resource_id,
                channel = %outcome.channel,
                error = outcome.error.as_deref().unwrap_or_default(),
                "Notification channel failed"
            );
        }

        self.write_audit(target, &outcomes).await;

        debug!(
            recipient_id = %target.recipient_id,
            resource_id = %target.resource_id,
            kind = %target.kind,
            attempted = outcomes.len(),
            "Notification dispatched"
        );

        DispatchReport {
            recipient_id: target.recipient_id.to_string(),
            outcomes,
        }
    }

    async fn send_in_app(
        &self,
        target: &DispatchTarget<'_>,
        payload: &NotificationPayload,
        channels: &ChannelPreferences,
    ) -> Option<ChannelOutcome> {
        let notifier = self.in_app.as_ref()?;
        if !channels.in_app || !notifier.is_active(target.recipient_id) {
            return None;
        }

        let toast = Toast {
            title: payload.title.clone(),
            body: payload.body.clone(),
            severity: payload.severity,
            deep_link: payload.deep_link.clone(),
        };
        let outcome = if notifier.show(target.recipient_id, toast) {
            ChannelOutcome::delivered(NotificationChannelKind::InApp)
        } else {
            ChannelOutcome::failed(NotificationChannelKind::InApp, "no active session")
        };
        Some(outcome)
    }

    async fn play_sound(&self, channels: &ChannelPreferences) -> Option<ChannelOutcome> {
        let player = self.sound.as_ref()?;
        if !channels.sound {
            return None;
        }
        player.play(channels.tone, channels.volume.clamp(0.0, 1.0));
        Some(ChannelOutcome::delivered(NotificationChannelKind::Sound))
    }

    async fn send_push(
        &self,
        target: &DispatchTarget<'_>,
        payload: &NotificationPayload,
        channels: &ChannelPreferences,
    ) -> Option<ChannelOutcome> {
        let sender = self.push.as_ref()?;
        if !channels.push {
            return None;
        }

        let channel = NotificationChannelKind::Push;
        match with_timeout(
            "push_permission",
            self.timeout,
            sender.has_permission(target.recipient_id),
        )
        .await
        {
            Ok(true) => {}
            Ok(false) => {
                debug!(recipient_id = %target.recipient_id, "Push permission not granted");
                return None;
            }
            Err(e) => return Some(ChannelOutcome::failed(channel, e.to_string())),
        }

        let message = PushMessage {
            owner_id: target.recipient_id.to_string(),
            title: payload.title.clone(),
            body: payload.body.clone(),
            tag: format!("{}:{}", target.resource_id, target.kind),
            deep_link: payload.deep_link.clone(),
        };
        let outcome = match with_timeout("send_push", self.timeout, sender.send_push(&message)).await
        {
            Ok(()) => ChannelOutcome::delivered(channel),
            Err(e) => ChannelOutcome::failed(channel, e.to_string()),
        };
        Some(outcome)
    }

    async fn send_email(
        &self,
        _target: &DispatchTarget<'_>,
        payload: &NotificationPayload,
        channels: &ChannelPreferences,
    ) -> Option<ChannelOutcome> {
        let sender = self.email.as_ref()?;
        let to = channels.email_target()?;

        let channel = NotificationChannelKind::Email;
        let outcome = match with_timeout(
            "send_email",
            self.timeout,
            sender.send_email(to, &payload.email_subject, &payload.email_html),
        )
        .await
        {
            Ok(()) => ChannelOutcome::delivered(channel),
            Err(e) => ChannelOutcome::failed(channel, e.to_string()),
        };
        Some(outcome)
    }

    async fn write_audit(&self, target: &DispatchTarget<'_>, outcomes: &[ChannelOutcome]) {
        let now = self.clock.now();
        let rows: Vec<NotificationEventDbModel> = if outcomes.is_empty() {
            vec![NotificationEventDbModel::new(
                target.resource_id,
                target.kind,
                target.recipient_id,
                NotificationChannelKind::NoChannel,
                target.status,
                Some("no channel attempted".to_string()),
                now,
            )]
        } else {
            outcomes
            .iter()
            .map(|o| {
                NotificationEventDbModel::new(
                    target.resource_id,
                    target.kind,
                    target.recipient_id,
                    o.channel,
                    target.status,
                    o.error.clone(),
                    now,
                )
            })
            .collect()
        };

        if let Err(e) = self.audit.append_batch(&rows).await {
            warn!(resource_id = %target.resource_id, error = %e, "Failed to write notification audit rows");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::Result;
    use crate::clock::SystemClock;
    use crate::collaborators::BroadcastInAppNotifier;
    use crate::database::repositories::SqlxNotificationEventRepository;
    use crate::database::test_pool;
    use crate::domain::{Severity, Tone};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingPush {
        granted: bool,
        fail: bool,
        sent: Mutex<Vec<PushMessage>>,
    }

    #[async_trait]
    impl PushSender for RecordingPush {
        async fn has_permission(&self, _owner_id: &str) -> Result<bool> {
            Ok(self.granted)
        }

        async fn send_push(&self, message: &PushMessage) -> Result<()> {
            if self.fail {
                return Err(Error::transient("send_push", "gateway unavailable"));
            }
            self.sent.lock().push(message.clone());
            Ok(())
        }
    }

    struct FailingEmail;

    #[async_trait]
    impl EmailSender for FailingEmail {
        async fn send_email(&self, _to: &str, _subject: &str, _html: &str) -> Result<()> {
            Err(Error::transient("send_email", "smtp relay down"))
        }
    }

    #[derive(Default)]
    struct CountingSound {
        played: Mutex<Vec<(Tone, f32)>>,
    }

    impl SoundPlayer for CountingSound {
        fn play(&self, tone: Tone, volume: f32) {
            self.played.lock().push((tone, volume));
        }
    }

    fn payload() -> NotificationPayload {
        NotificationPayload {
            title: "Critical stock: Guji".to_string(),
            body: "Only 4 kg left".to_string(),
            email_subject: "[supply-watch] Critical stock: Guji".to_string(),
            email_html: "<p>Only 4 kg left</p>".to_string(),
            deep_link: "https://app.example.com/inventory/inv-1".to_string(),
            severity: Severity::Critical,
        }
    }

    fn target() -> DispatchTarget<'static> {
        DispatchTarget {
            recipient_id: "cafe-1",
            resource_id: "inv-1",
            kind: ConditionKind::LowStock,
            status: ConditionStatus::Critical,
        }
    }

    async fn audit() -> Arc<SqlxNotificationEventRepository> {
        Arc::new(SqlxNotificationEventRepository::new(test_pool().await))
    }

    #[tokio::test]
    async fn test_all_channels_with_one_failure() {
        let audit = audit().await;
        let in_app = Arc::new(BroadcastInAppNotifier::new());
        let (_session, mut rx) = in_app.connect("cafe-1");
        let push = Arc::new(RecordingPush {
            granted: true,
            ..Default::default()
        });
        let sound = Arc::new(CountingSound::default());

        let dispatcher = NotificationDispatcher::new(
            audit.clone(),
            Arc::new(SystemClock),
            Duration::from_secs(1),
        )
        .with_in_app(in_app.clone())
        .with_sound(sound.clone())
        .with_push(push.clone())
        .with_email(Arc::new(FailingEmail));

        let channels = ChannelPreferences {
            push: true,
            email: true,
            email_address: Some("owner@example.com".to_string()),
            tone: Tone::Alarm,
            volume: 1.4,
            ..ChannelPreferences::default()
        };

        let report = dispatcher.dispatch(&target(), &payload(), &channels).await;

        assert_eq!(report.attempted(), 4);
        assert_eq!(report.delivered(), 3);
        assert!(should_mark_notified(std::slice::from_ref(&report)));
        assert!(!report.outcome(NotificationChannelKind::Email).unwrap().delivered);

        let toast = rx.try_recv().unwrap();
        assert_eq!(toast.toast.title, "Critical stock: Guji");
        assert_eq!(push.sent.lock()[0].tag, "inv-1:low_stock");
        assert_eq!(sound.played.lock()[0], (Tone::Alarm, 1.0));

        let rows = audit.list_for_resource("inv-1", 10).await.unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows.iter().filter(|r| !r.success).count(), 1);
    }

    #[tokio::test]
    async fn test_inactive_and_unpermitted_channels_are_not_attempted() {
        let audit = audit().await;
        let dispatcher = NotificationDispatcher::new(
            audit.clone(),
            Arc::new(SystemClock),
            Duration::from_secs(1),
        )
        .with_in_app(Arc::new(BroadcastInAppNotifier::new()))
        .with_push(Arc::new(RecordingPush::default()));

        let channels = ChannelPreferences {
            push: true,
            ..ChannelPreferences::default()
        };
        let report = dispatcher.dispatch(&target(), &payload(), &channels).await;

        assert_eq!(report.attempted(), 0);
        assert!(should_mark_notified(std::slice::from_ref(&report)));

        let rows = audit.list_for_resource("inv-1", 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].channel, "none");
        assert!(!rows[0].success);
        assert_eq!(rows[0].error.as_deref(), Some("no channel attempted"));
    }

    #[test]
    fn test_notified_when_any_recipient_delivered() {
        let failed = DispatchReport {
            recipient_id: "cafe-1".to_string(),
            outcomes: vec![ChannelOutcome::failed(NotificationChannelKind::Push, "down")],
        };
        let delivered = DispatchReport {
            recipient_id: "supplier-1".to_string(),
            outcomes: vec![ChannelOutcome::delivered(NotificationChannelKind::InApp)],
        };
        let silent = DispatchReport {
            recipient_id: "cafe-1".to_string(),
            outcomes: Vec::new(),
        };

        assert!(should_mark_notified(&[failed.clone(), delivered]));
        assert!(!should_mark_notified(&[silent.clone(), failed]));
        assert!(should_mark_notified(&[silent]));
        assert!(should_mark_notified(&[]));
    }

    #[tokio::test]
    async fn test_all_failed_is_not_marked() {
        let dispatcher =
            NotificationDispatcher::new(audit().await, Arc::new(SystemClock), Duration::from_secs(1))
                .with_push(Arc::new(RecordingPush {
                    granted: true,
                    fail: true,
                    ..Default::default()
                }))
                .with_email(Arc::new(FailingEmail));

        let channels = ChannelPreferences {
            sound: false,
            push: true,
            email: true,
            email_address: Some("owner@example.com".to_string()),
            ..ChannelPreferences::default()
        };
        let report = dispatcher.dispatch(&target(), &payload(), &channels).await;

        assert_eq!(report.attempted(), 2);
        assert!(!should_mark_notified(std::slice::from_ref(&report)));
    }

    #[tokio::test]
    async fn test_slow_channel_times_out() {
        struct SlowEmail;

        #[async_trait]
        impl EmailSender for SlowEmail {
            async fn send_email(&self, _to: &str, _subject: &str, _html: &str) -> Result<()> {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            }
        }

        let dispatcher = NotificationDispatcher::new(
            audit().await,
            Arc::new(SystemClock),
            Duration::from_millis(20),
        )
        .with_email(Arc::new(SlowEmail));

        let channels = ChannelPreferences {
            email: true,
            email_address: Some("owner@example.com".to_string()),
            ..ChannelPreferences::default()
        };
        let report = dispatcher.dispatch(&target(), &payload(), &channels).await;

        let email = report.outcome(NotificationChannelKind::Email).unwrap();
        assert!(!email.delivered);
        assert!(email.error.as_deref().unwrap().contains("send_email"));
    }
}
