// tests/common/mod.rs
#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use poap_bots::ingest::types::{AssetInfo, EventCategory, EventSource, RawEvent, Window};
use poap_bots::{NormalizedNotification, Notifier, NotifyError, SourceError};

pub type Scripted = Result<Vec<RawEvent>, SourceError>;

pub fn raw(category: EventCategory, tx: &str, ts: i64) -> RawEvent {
    RawEvent {
        category,
        tx_key: tx.to_string(),
        asset: AssetInfo {
            name: Some(format!("POAP {tx}")),
            ..AssetInfo::default()
        },
        from_address: Some("0xfrom".to_string()),
        to_address: Some("0xto".to_string()),
        total_price: Some("1000000000000000000".to_string()),
        created_at: Utc.timestamp_opt(ts, 0).unwrap(),
    }
}

pub fn sale(tx: &str, ts: i64) -> RawEvent {
    raw(EventCategory::Sale, tx, ts)
}

pub fn transfer(tx: &str, ts: i64) -> RawEvent {
    raw(EventCategory::Transfer, tx, ts)
}

/// Feed stand-in: per category, pops the next scripted response; an empty
/// script yields an empty page.
#[derive(Default)]
pub struct ScriptedSource {
    script: Mutex<HashMap<EventCategory, VecDeque<Scripted>>>,
    calls: Mutex<Vec<(Window, EventCategory)>>,
    delay: Mutex<Option<(EventCategory, Duration)>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, category: EventCategory, response: Scripted) {
        self.script
            .lock()
            .entry(category)
            .or_default()
            .push_back(response);
    }

    /// Make every fetch of `category` take `d` before answering.
    pub fn slow(&self, category: EventCategory, d: Duration) {
        *self.delay.lock() = Some((category, d));
    }

    pub fn calls(&self) -> Vec<(Window, EventCategory)> {
        self.calls.lock().clone()
    }

    pub fn windows(&self) -> Vec<Window> {
        let mut out: Vec<Window> = Vec::new();
        for (w, _) in self.calls.lock().iter() {
            if out.last() != Some(w) {
                out.push(*w);
            }
        }
        out
    }
}

#[async_trait]
impl EventSource for ScriptedSource {
    async fn fetch(
        &self,
        window: Window,
        category: EventCategory,
    ) -> Result<Vec<RawEvent>, SourceError> {
        self.calls.lock().push((window, category));
        let delay = *self.delay.lock();
        if let Some((c, d)) = delay {
            if c == category {
                tokio::time::sleep(d).await;
            }
        }
        let next = self
            .script
            .lock()
            .get_mut(&category)
            .and_then(|q| q.pop_front());
        next.unwrap_or_else(|| Ok(Vec::new()))
    }

    fn name(&self) -> &'static str {
        "Scripted"
    }
}

/// Sink stand-in that records every delivery attempt, rejects the keys
/// listed in `fail_keys` and stalls on the keys in `slow_keys`.
#[derive(Default)]
pub struct RecordingNotifier {
    pub delivered: Mutex<Vec<NormalizedNotification>>,
    pub attempts: Mutex<Vec<String>>,
    pub fail_keys: Mutex<HashSet<String>>,
    pub slow_keys: Mutex<HashMap<String, Duration>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_on(&self, tx: &str) {
        self.fail_keys.lock().insert(tx.to_string());
    }

    /// Make delivering `tx` take `d`.
    pub fn slow_on(&self, tx: &str, d: Duration) {
        self.slow_keys.lock().insert(tx.to_string(), d);
    }

    pub fn heal(&self) {
        self.fail_keys.lock().clear();
    }

    pub fn delivered_keys(&self) -> Vec<String> {
        self.delivered
            .lock()
            .iter()
            .map(|n| n.tx_key.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, n: &NormalizedNotification) -> Result<(), NotifyError> {
        self.attempts.lock().push(n.tx_key.clone());
        let stall = self.slow_keys.lock().get(&n.tx_key).copied();
        if let Some(d) = stall {
            tokio::time::sleep(d).await;
        }
        if self.fail_keys.lock().contains(&n.tx_key) {
            return Err(NotifyError::DeliveryFailed {
                channel: "recording".to_string(),
                reason: "rejected".to_string(),
            });
        }
        self.delivered.lock().push(n.clone());
        Ok(())
    }

    fn channel(&self) -> String {
        "recording".to_string()
    }
}
