use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use std::time::Duration;

use super::{NormalizedNotification, Notifier};
use crate::error::NotifyError;

const MAX_TITLE: usize = 256;
const MAX_FIELD_VALUE: usize = 1024;
const MAX_RETRIES: u8 = 8;
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Posts notifications as embeds to one Discord channel webhook.
#[derive(Clone)]
pub struct DiscordNotifier {
    webhook: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl DiscordNotifier {
    pub fn new(webhook: String) -> Self {
        Self {
            webhook,
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.clamp(1, MAX_RETRIES);
        self
    }

    fn fail(&self, reason: String) -> NotifyError {
        NotifyError::DeliveryFailed {
            channel: self.channel(),
            reason,
        }
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn send(&self, n: &NormalizedNotification) -> Result<(), NotifyError> {
        let payload = DiscordWebhookPayload::from_notification(n);

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let last = attempt >= self.max_retries;
            let res = self
                .client
                .post(&self.webhook)
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            let rsp = match res {
                Ok(rsp) => rsp,
                Err(e) => {
                    if last {
                        return Err(self.fail(format!("Discord webhook request failed: {e}")));
                    }
                    tokio::time::sleep(backoff(attempt)).await;
                    continue;
                }
            };

            let status = rsp.status();
            if status.is_success() {
                return Ok(());
            }
            if status == StatusCode::TOO_MANY_REQUESTS && !last {
                let wait = retry_after(rsp).await.unwrap_or_else(|| backoff(attempt));
                tokio::time::sleep(wait).await;
                continue;
            }
            // any other 4xx is permanent (bad webhook or payload)
            if status.is_client_error() || last {
                return Err(self.fail(format!("Discord webhook HTTP error: {status}")));
            }
            tokio::time::sleep(backoff(attempt)).await;
        }
    }

    fn channel(&self) -> String {
        webhook_label(&self.webhook)
    }
}

/// 500ms, 1s, 2s, ... for attempt 1, 2, 3, ...
fn backoff(attempt: u8) -> Duration {
    let shift = u32::from(attempt.saturating_sub(1)).min(u32::from(MAX_RETRIES));
    Duration::from_millis(500u64 << shift)
}

/// Wait requested by a 429: the `Retry-After` header, else the JSON body's
/// `retry_after` (seconds, fractional). Capped at a minute.
async fn retry_after(rsp: Response) -> Option<Duration> {
    let header = rsp
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok());
    let secs = match header {
        Some(s) => s,
        None => {
            let body: serde_json::Value = rsp.json().await.ok()?;
            body.get("retry_after")?.as_f64()?
        }
    };
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Some(Duration::from_secs_f64(secs).min(MAX_RETRY_AFTER))
}

/// `discord#<webhook id>`; the token part of the URL is never logged.
pub fn webhook_label(url: &str) -> String {
    let mut segs = url.split('/');
    while let Some(s) = segs.next() {
        if s == "webhooks" {
            if let Some(id) = segs.next().filter(|id| !id.is_empty()) {
                return format!("discord#{id}");
            }
        }
    }
    "discord".to_string()
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[derive(Debug, Serialize)]
pub struct DiscordWebhookPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    embeds: Vec<DiscordEmbed>,
}

#[derive(Debug, Serialize)]
struct DiscordEmbed {
    title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    color: u32,
    timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    thumbnail: Option<DiscordImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<DiscordImage>,
    fields: Vec<DiscordField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    footer: Option<DiscordFooter>,
}

#[derive(Debug, Serialize)]
struct DiscordImage {
    url: String,
}

#[derive(Debug, Serialize)]
struct DiscordField {
    name: String,
    value: String,
    inline: bool,
}

#[derive(Debug, Serialize)]
struct DiscordFooter {
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon_url: Option<String>,
}

impl DiscordWebhookPayload {
    pub fn from_notification(n: &NormalizedNotification) -> Self {
        let embed = DiscordEmbed {
            title: truncate(&n.title, MAX_TITLE),
            url: n.url.clone(),
            color: n.color,
            timestamp: n.timestamp.to_rfc3339(),
            thumbnail: n.thumbnail_url.clone().map(|url| DiscordImage { url }),
            image: n.image_url.clone().map(|url| DiscordImage { url }),
            fields: n
                .fields
                .iter()
                .map(|f| DiscordField {
                    name: f.name.clone(),
                    value: truncate(&f.value, MAX_FIELD_VALUE),
                    inline: f.inline,
                })
                .collect(),
            footer: n.footer.as_ref().map(|f| DiscordFooter {
                text: f.text.clone(),
                icon_url: f.icon_url.clone(),
            }),
        };
        Self {
            content: None,
            embeds: vec![embed],
        }
    }
}
