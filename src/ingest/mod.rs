// src/ingest/mod.rs
pub mod clock;
pub mod dedup;
pub mod providers;
pub mod scheduler;
pub mod types;
pub mod window;

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;
use serde::Deserialize;

use crate::error::SourceError;
use crate::ingest::clock::{Clock, SystemClock};
use crate::ingest::dedup::{DedupCache, DedupScope};
use crate::ingest::types::{EventCategory, EventSource, RawEvent, Window};
use crate::notify::{format, Notifier};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "feed_events_fetched_total",
            "Events parsed from the upstream feed."
        );
        describe_counter!(
            "feed_dispatched_total",
            "Events admitted past deduplication and handed to the sink."
        );
        describe_counter!(
            "feed_dedup_skipped_total",
            "Events skipped because their transaction was already reported."
        );
        describe_counter!(
            "feed_fetch_errors_total",
            "Feed fetch failures by category and kind."
        );
        describe_counter!(
            "feed_delivery_failures_total",
            "Notifications the sink rejected."
        );
        describe_counter!("feed_ticks_total", "Completed polling ticks.");
        describe_histogram!("feed_fetch_ms", "Feed fetch time in milliseconds.");
        describe_gauge!("feed_dedup_cache_entries", "Entries held by the dedup cache.");
        describe_gauge!("feed_last_tick_ts", "Unix ts when the poller last ran a tick.");
    });
}

/// When a transaction key is written to the dedup cache relative to delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdmissionPolicy {
    /// Record first: a failed delivery is lost, never duplicated.
    #[default]
    BeforeDelivery,
    /// Reserve first and release on failure: a failed delivery is retried by
    /// the next overlapping window.
    AfterDelivery,
}

impl std::str::FromStr for AdmissionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "before-delivery" | "before_delivery" | "before" => Ok(AdmissionPolicy::BeforeDelivery),
            "after-delivery" | "after_delivery" | "after" => Ok(AdmissionPolicy::AfterDelivery),
            other => Err(format!("unknown admission policy `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub fetch_timeout: Duration,
    pub scope: DedupScope,
    pub admission: AdmissionPolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(10),
            scope: DedupScope::default(),
            admission: AdmissionPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryFailure {
    pub category: EventCategory,
    pub error: SourceError,
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub window: Window,
    pub fetched: usize,
    /// Events that passed deduplication this tick.
    pub admitted: usize,
    pub delivered: usize,
    pub skipped_duplicates: usize,
    pub delivery_failures: usize,
    pub failures: Vec<CategoryFailure>,
}

impl TickReport {
    pub fn empty(window: Window) -> Self {
        Self {
            window,
            fetched: 0,
            admitted: 0,
            delivered: 0,
            skipped_duplicates: 0,
            delivery_failures: 0,
            failures: Vec::new(),
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.failures.iter().any(|f| f.error.is_rate_limited())
    }

    fn absorb(&mut self, other: TickReport) {
        self.fetched += other.fetched;
        self.admitted += other.admitted;
        self.delivered += other.delivered;
        self.skipped_duplicates += other.skipped_duplicates;
        self.delivery_failures += other.delivery_failures;
        self.failures.extend(other.failures);
    }
}

/// Reverse upstream (newest-first) order, then stable-sort by creation time
/// so each category is processed oldest-first.
pub fn chronological(mut events: Vec<RawEvent>) -> Vec<RawEvent> {
    events.reverse();
    events.sort_by_key(|e| e.created_at);
    events
}

/// Merge & dispatch: fetch both categories, order, dedup, deliver.
pub struct Pipeline {
    source: Arc<dyn EventSource>,
    notifier: Arc<dyn Notifier>,
    settings: PipelineSettings,
    clock: Arc<dyn Clock>,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn EventSource>,
        notifier: Arc<dyn Notifier>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            source,
            notifier,
            settings,
            clock: Arc::new(SystemClock),
        }
    }

    /// Clock used to timestamp dedup entries at admission.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Run one tick over `window`. The two categories are fetched and
    /// dispatched concurrently; within a category delivery is sequential and
    /// oldest-first. Keys are recorded at the clock's time of admission, so
    /// a slow delivery never shortens the retention of later keys.
    pub async fn run(&self, window: Window, cache: &DedupCache) -> TickReport {
        ensure_metrics_described();

        let (transfers, sales) = tokio::join!(
            self.run_category(window, EventCategory::Transfer, cache),
            self.run_category(window, EventCategory::Sale, cache),
        );

        let mut report = TickReport::empty(window);
        report.absorb(transfers);
        report.absorb(sales);
        report
    }

    async fn fetch(
        &self,
        window: Window,
        category: EventCategory,
    ) -> Result<Vec<RawEvent>, SourceError> {
        let timeout = self.settings.fetch_timeout;
        match tokio::time::timeout(timeout, self.source.fetch(window, category)).await {
            Ok(res) => res,
            Err(_) => Err(SourceError::Transport(format!(
                "{} fetch timed out after {}s",
                self.source.name(),
                timeout.as_secs()
            ))),
        }
    }

    async fn run_category(
        &self,
        window: Window,
        category: EventCategory,
        cache: &DedupCache,
    ) -> TickReport {
        let mut report = TickReport::empty(window);

        let events = match self.fetch(window, category).await {
            Ok(v) => v,
            Err(error) => {
                counter!(
                    "feed_fetch_errors_total",
                    "category" => category.as_str(),
                    "kind" => error.kind()
                )
                .increment(1);
                report.failures.push(CategoryFailure { category, error });
                return report;
            }
        };
        report.fetched = events.len();

        for ev in chronological(events) {
            let key = self.settings.scope.key_for(&ev);
            if !cache.admit(&key, self.clock.now_unix()) {
                report.skipped_duplicates += 1;
                tracing::debug!(category = %category, key = %key, "already reported, skipping");
                continue;
            }
            report.admitted += 1;

            let notification = format::normalize(&ev);
            match self.notifier.send(&notification).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.delivery_failures += 1;
                    counter!("feed_delivery_failures_total").increment(1);
                    let released = self.settings.admission == AdmissionPolicy::AfterDelivery
                        && cache.forget(&key);
                    tracing::warn!(
                        category = %category,
                        key = %key,
                        released,
                        error = %e,
                        "delivery failed"
                    );
                }
            }
        }

        counter!("feed_dispatched_total", "category" => category.as_str())
            .increment(report.admitted as u64);
        counter!("feed_dedup_skipped_total", "category" => category.as_str())
            .increment(report.skipped_duplicates as u64);

        report
    }
}
