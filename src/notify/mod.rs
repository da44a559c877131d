// src/notify/mod.rs
pub mod discord;
pub mod format;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;

use crate::error::NotifyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Minted,
    Transfer,
    Sale,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Footer {
    pub text: String,
    pub icon_url: Option<String>,
}

/// Rendering-ready projection of one feed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedNotification {
    pub kind: NotificationKind,
    /// Dedup/transaction key of the source event, for logs.
    pub tx_key: String,
    pub title: String,
    pub color: u32,
    pub url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub image_url: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub fields: Vec<NotificationField>,
    pub footer: Option<Footer>,
}

impl NormalizedNotification {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }
}

/// A delivery target for notifications (one chat channel, a log, ...).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, n: &NormalizedNotification) -> Result<(), NotifyError>;

    /// Non-secret label for the destination, used in logs.
    fn channel(&self) -> String;
}

/// Fans each notification out to every configured channel. One channel
/// failing does not stop delivery to the others.
#[derive(Default)]
pub struct NotifierMux {
    sinks: Vec<Box<dyn Notifier>>,
}

impl NotifierMux {
    pub fn new(sinks: Vec<Box<dyn Notifier>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Box<dyn Notifier>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl Notifier for NotifierMux {
    async fn send(&self, n: &NormalizedNotification) -> Result<(), NotifyError> {
        if self.sinks.is_empty() {
            tracing::debug!(tx = %n.tx_key, "no notification channels configured");
            return Ok(());
        }

        let mut failed: Vec<String> = Vec::new();
        let mut reasons: Vec<String> = Vec::new();
        for sink in &self.sinks {
            if let Err(e) = sink.send(n).await {
                let channel = sink.channel();
                tracing::warn!(channel = %channel, tx = %n.tx_key, error = %e, "notification delivery failed");
                counter!("feed_channel_failures_total").increment(1);
                reasons.push(e.to_string());
                failed.push(channel);
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(NotifyError::DeliveryFailed {
                channel: failed.join(", "),
                reason: reasons.join("; "),
            })
        }
    }

    fn channel(&self) -> String {
        format!("mux({})", self.sinks.len())
    }
}

/// Dry-run sink: logs the rendered notification instead of posting it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, n: &NormalizedNotification) -> Result<(), NotifyError> {
        let fields: Vec<String> = n
            .fields
            .iter()
            .map(|f| format!("{}={}", f.name, f.value))
            .collect();
        tracing::info!(
            target: "notify",
            title = %n.title,
            tx = %n.tx_key,
            ts = %n.timestamp.to_rfc3339(),
            fields = %fields.join(" | "),
            "dry-run notification"
        );
        Ok(())
    }

    fn channel(&self) -> String {
        "log".to_string()
    }
}
