// src/ingest/providers/opensea.rs
//! OpenSea v1 `/events` adapter: one HTTP query per call, parsed into
//! `RawEvent`s in upstream (newest-first) order. No retries here.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use metrics::{counter, histogram};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::error::SourceError;
use crate::ingest::types::{AssetInfo, EventCategory, EventSource, RawEvent, Window};

pub const DEFAULT_EVENTS_URL: &str = "https://api.opensea.io/api/v1/events";

#[derive(Debug, Clone)]
pub struct OpenSeaSettings {
    pub events_url: String,
    pub api_key: String,
    pub collection_slug: String,
    pub contract_address: String,
    pub page_limit: u32,
    pub only_opensea: bool,
    pub timeout: Duration,
}

pub struct OpenSeaProvider {
    client: Client,
    settings: OpenSeaSettings,
}

impl OpenSeaProvider {
    pub fn new(settings: OpenSeaSettings) -> Self {
        Self {
            client: Client::new(),
            settings,
        }
    }

    fn query(&self, window: Window, category: EventCategory) -> Vec<(&'static str, String)> {
        let s = &self.settings;
        vec![
            ("event_type", category.api_event_type().to_string()),
            ("offset", "0".to_string()),
            ("only_opensea", s.only_opensea.to_string()),
            ("occurred_before", window.end.to_string()),
            ("occurred_after", window.start.to_string()),
            ("collection_slug", s.collection_slug.clone()),
            ("asset_contract_address", s.contract_address.clone()),
            ("limit", s.page_limit.to_string()),
        ]
    }
}

#[async_trait]
impl EventSource for OpenSeaProvider {
    async fn fetch(
        &self,
        window: Window,
        category: EventCategory,
    ) -> Result<Vec<RawEvent>, SourceError> {
        let t0 = std::time::Instant::now();

        let rsp = self
            .client
            .get(&self.settings.events_url)
            .header("X-API-KEY", &self.settings.api_key)
            .query(&self.query(window, category))
            .timeout(self.settings.timeout)
            .send()
            .await
            .map_err(|e| SourceError::Transport(format!("opensea request: {e}")))?;

        let status = rsp.status();
        let body = rsp
            .text()
            .await
            .map_err(|e| SourceError::Transport(format!("opensea body: {e}")))?;

        classify_status(status, &body)?;
        let out = parse_events(&body, category)?;

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("feed_fetch_ms", "category" => category.as_str()).record(ms);

        Ok(out)
    }

    fn name(&self) -> &'static str {
        "OpenSea"
    }
}

/// Cloudflare's "Access denied | Error 1020" page served when OpenSea
/// throttles a client.
pub fn is_rate_limit_payload(body: &str) -> bool {
    body.contains("cloudflare") && body.contains("1020")
}

fn classify_status(status: StatusCode, body: &str) -> Result<(), SourceError> {
    if status == StatusCode::TOO_MANY_REQUESTS || is_rate_limit_payload(body) {
        return Err(SourceError::RateLimited(format!(
            "opensea throttled the request (HTTP {status})"
        )));
    }
    if !status.is_success() {
        return Err(SourceError::Transport(format!("opensea HTTP {status}")));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct EventsPage {
    asset_events: Vec<ApiEvent>,
}

#[derive(Debug, Deserialize)]
struct ApiEvent {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    created_date: Option<String>,
    #[serde(default)]
    transaction: Option<ApiTransaction>,
    #[serde(default)]
    asset: Option<ApiAsset>,
    #[serde(default)]
    from_account: Option<ApiAccount>,
    #[serde(default)]
    to_account: Option<ApiAccount>,
    #[serde(default)]
    seller: Option<ApiAccount>,
    #[serde(default)]
    winner_account: Option<ApiAccount>,
    #[serde(default)]
    total_price: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ApiTransaction {
    #[serde(default)]
    transaction_hash: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiAccount {
    #[serde(default)]
    address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiAsset {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    token_id: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    permalink: Option<String>,
    #[serde(default)]
    external_link: Option<String>,
    #[serde(default)]
    collection: Option<ApiCollection>,
}

#[derive(Debug, Deserialize)]
struct ApiCollection {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
}

/// Parse an `/events` response body. Records that cannot be keyed, dated or
/// tied to an asset are skipped with a warning; an unparseable body is
/// `Malformed`.
pub fn parse_events(body: &str, category: EventCategory) -> Result<Vec<RawEvent>, SourceError> {
    if is_rate_limit_payload(body) {
        return Err(SourceError::RateLimited(
            "opensea rate-limit page in response body".to_string(),
        ));
    }

    let page: EventsPage = serde_json::from_str(body)
        .map_err(|e| SourceError::Malformed(format!("opensea events json: {e}")))?;

    let mut out = Vec::with_capacity(page.asset_events.len());
    let mut skipped = 0u64;
    for ev in page.asset_events {
        match into_raw(ev, category) {
            Some(raw) => out.push(raw),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        tracing::warn!(category = %category, skipped, "skipped incomplete opensea records");
        counter!("feed_records_skipped_total", "category" => category.as_str()).increment(skipped);
    }
    counter!("feed_events_fetched_total", "category" => category.as_str())
        .increment(out.len() as u64);

    Ok(out)
}

fn into_raw(ev: ApiEvent, category: EventCategory) -> Option<RawEvent> {
    let tx_key = ev
        .transaction
        .and_then(|t| t.transaction_hash)
        .filter(|h| !h.trim().is_empty())
        .or_else(|| ev.id.map(|id| format!("event:{id}")))?;
    let created_at = ev.created_date.as_deref().and_then(parse_created_date)?;
    let asset = ev.asset?;

    let (from, to) = match category {
        EventCategory::Transfer => (ev.from_account, ev.to_account),
        EventCategory::Sale => (ev.seller, ev.winner_account),
    };

    let total_price = ev.total_price.and_then(|v| match v {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    });

    let (collection_name, collection_image_url) = match asset.collection {
        Some(c) => (c.name, c.image_url),
        None => (None, None),
    };

    Some(RawEvent {
        category,
        tx_key,
        asset: AssetInfo {
            name: asset.name,
            token_id: asset.token_id,
            collection_name,
            collection_image_url,
            image_url: asset.image_url,
            permalink: asset.permalink,
            external_link: asset.external_link,
        },
        from_address: from.and_then(|a| a.address),
        to_address: to.and_then(|a| a.address),
        total_price,
        created_at,
    })
}

/// OpenSea sends naive UTC timestamps (`2021-09-01T12:00:00.123456`);
/// offset-qualified RFC 3339 is accepted too.
pub fn parse_created_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|n| Utc.from_utc_datetime(&n))
}
