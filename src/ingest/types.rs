// src/ingest/types.rs
use chrono::{DateTime, Utc};

use crate::error::SourceError;

/// The two kinds of on-chain activity the poller tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Transfer,
    Sale,
}

impl EventCategory {
    pub const ALL: [EventCategory; 2] = [EventCategory::Transfer, EventCategory::Sale];

    /// Stable label used in dedup keys, logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Transfer => "transfer",
            EventCategory::Sale => "sale",
        }
    }

    /// Value of the upstream `event_type` query parameter.
    pub fn api_event_type(&self) -> &'static str {
        match self {
            EventCategory::Transfer => "transfer",
            EventCategory::Sale => "successful",
        }
    }
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Half-open polling range `[start, end)` in unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: u64,
    pub end: u64,
}

impl Window {
    pub fn new(start: u64, end: u64) -> Self {
        Self {
            start: start.min(end),
            end,
        }
    }
}

impl std::fmt::Display for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AssetInfo {
    pub name: Option<String>,
    pub token_id: Option<String>,
    pub collection_name: Option<String>,
    pub collection_image_url: Option<String>,
    pub image_url: Option<String>,
    pub permalink: Option<String>,
    pub external_link: Option<String>,
}

/// One upstream event, as reported by the feed. Never mutated after parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub category: EventCategory,
    /// Transaction hash, or `event:<id>` when upstream omits the transaction.
    pub tx_key: String,
    pub asset: AssetInfo,
    /// Sender (transfer) or seller (sale).
    pub from_address: Option<String>,
    /// Recipient (transfer) or buyer (sale).
    pub to_address: Option<String>,
    /// Sale price in wei, as the decimal string upstream sends.
    pub total_price: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RawEvent {
    /// Transaction hash when the key is one (not an `event:` fallback).
    pub fn tx_hash(&self) -> Option<&str> {
        if self.tx_key.starts_with("event:") {
            None
        } else {
            Some(&self.tx_key)
        }
    }
}

/// Upstream event feed. One call performs one query and returns events in
/// upstream order.
#[async_trait::async_trait]
pub trait EventSource: Send + Sync {
    async fn fetch(
        &self,
        window: Window,
        category: EventCategory,
    ) -> Result<Vec<RawEvent>, SourceError>;

    fn name(&self) -> &'static str;
}
