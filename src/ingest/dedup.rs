// src/ingest/dedup.rs
//! Time-bounded set of already dispatched transaction keys.
//!
//! The cache is the single source of truth for "already reported". It is
//! owned by the driver loop and lent to the pipeline for each tick; the
//! mutex only serializes the two category pipelines of one tick.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::Deserialize;

use crate::ingest::types::RawEvent;

/// How transaction keys are namespaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DedupScope {
    /// A sale and its underlying transfer are tracked separately.
    #[default]
    PerCategory,
    /// One key space across categories: a tx hash is reported once.
    Global,
}

impl DedupScope {
    pub fn key_for(&self, ev: &RawEvent) -> String {
        match self {
            DedupScope::PerCategory => format!("{}:{}", ev.category.as_str(), ev.tx_key),
            DedupScope::Global => ev.tx_key.clone(),
        }
    }
}

impl std::str::FromStr for DedupScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "per-category" | "per_category" | "category" => Ok(DedupScope::PerCategory),
            "global" => Ok(DedupScope::Global),
            other => Err(format!("unknown dedup scope `{other}`")),
        }
    }
}

#[derive(Debug)]
pub struct DedupCache {
    retention_secs: u64,
    /// key -> recorded_at (unix seconds)
    inner: Mutex<HashMap<String, u64>>,
}

impl DedupCache {
    pub fn new(retention_secs: u64) -> Self {
        Self {
            retention_secs,
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub fn retention_secs(&self) -> u64 {
        self.retention_secs
    }

    pub fn seen(&self, key: &str) -> bool {
        self.inner.lock().contains_key(key)
    }

    /// Record `key` as dispatched at `now`. An existing entry keeps its
    /// original timestamp.
    pub fn record(&self, key: &str, now: u64) {
        self.inner.lock().entry(key.to_string()).or_insert(now);
    }

    /// Check-and-record in one step. Returns `true` if the key was new.
    pub fn admit(&self, key: &str, now: u64) -> bool {
        let mut map = self.inner.lock();
        if map.contains_key(key) {
            return false;
        }
        map.insert(key.to_string(), now);
        true
    }

    /// Drop an entry so the key may be dispatched again.
    pub fn forget(&self, key: &str) -> bool {
        self.inner.lock().remove(key).is_some()
    }

    /// Remove every entry with `now - recorded_at > retention`. Returns the
    /// number of entries removed.
    pub fn evict(&self, now: u64) -> usize {
        let retention = self.retention_secs;
        let mut map = self.inner.lock();
        let before = map.len();
        map.retain(|_, recorded_at| now.saturating_sub(*recorded_at) <= retention);
        before - map.len()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::{AssetInfo, EventCategory};
    use chrono::{TimeZone, Utc};

    fn ev(category: EventCategory, tx: &str) -> RawEvent {
        RawEvent {
            category,
            tx_key: tx.to_string(),
            asset: AssetInfo::default(),
            from_address: None,
            to_address: None,
            total_price: None,
            created_at: Utc.timestamp_opt(0, 0).unwrap(),
        }
    }

    #[test]
    fn record_then_seen() {
        let c = DedupCache::new(240);
        assert!(!c.seen("a"));
        c.record("a", 10);
        assert!(c.seen("a"));
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn admit_is_first_wins() {
        let c = DedupCache::new(240);
        assert!(c.admit("a", 0));
        assert!(!c.admit("a", 1));
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn evict_boundary_is_strictly_greater() {
        let c = DedupCache::new(240);
        c.record("a", 0);
        assert_eq!(c.evict(239), 0);
        assert!(c.seen("a"));
        assert_eq!(c.evict(240), 0);
        assert!(c.seen("a"));
        assert_eq!(c.evict(241), 1);
        assert!(!c.seen("a"));
    }

    #[test]
    fn rerecord_keeps_original_timestamp() {
        let c = DedupCache::new(10);
        c.record("a", 0);
        c.record("a", 100);
        assert_eq!(c.evict(11), 1);
    }

    #[test]
    fn forget_allows_readmission() {
        let c = DedupCache::new(240);
        assert!(c.admit("a", 0));
        assert!(c.forget("a"));
        assert!(!c.forget("a"));
        assert!(c.admit("a", 5));
    }

    #[test]
    fn scope_keys() {
        let sale = ev(EventCategory::Sale, "0xabc");
        let transfer = ev(EventCategory::Transfer, "0xabc");
        assert_eq!(DedupScope::PerCategory.key_for(&sale), "sale:0xabc");
        assert_ne!(
            DedupScope::PerCategory.key_for(&sale),
            DedupScope::PerCategory.key_for(&transfer)
        );
        assert_eq!(
            DedupScope::Global.key_for(&sale),
            DedupScope::Global.key_for(&transfer)
        );
    }

    #[test]
    fn scope_parses_from_config_strings() {
        assert_eq!("global".parse::<DedupScope>(), Ok(DedupScope::Global));
        assert_eq!(
            " Per-Category ".parse::<DedupScope>(),
            Ok(DedupScope::PerCategory)
        );
        assert!("nope".parse::<DedupScope>().is_err());
    }
}
