// src/ingest/scheduler.rs
//! Driver loop: alternates Polling and Sleeping until shutdown.

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge};
use tokio::sync::watch;

use crate::ingest::clock::Clock;
use crate::ingest::dedup::DedupCache;
use crate::ingest::types::Window;
use crate::ingest::window::WindowScheduler;
use crate::ingest::{Pipeline, TickReport};

#[derive(Clone, Copy, Debug)]
pub struct PollerCfg {
    /// Sleep between ticks.
    pub interval: Duration,
    /// Added to the next sleep after a rate-limited tick.
    pub rate_limit_backoff: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Polling,
    Sleeping(Duration),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollerSummary {
    pub ticks: u64,
    pub dispatched: u64,
    /// Ticks where at least one category fetch failed.
    pub failed_ticks: u64,
    pub last_window: Option<Window>,
}

pub struct Poller {
    pipeline: Pipeline,
    windows: WindowScheduler,
    cache: DedupCache,
    clock: Arc<dyn Clock>,
    cfg: PollerCfg,
    previous_end: Option<u64>,
}

impl Poller {
    pub fn new(
        pipeline: Pipeline,
        windows: WindowScheduler,
        cache: DedupCache,
        clock: Arc<dyn Clock>,
        cfg: PollerCfg,
    ) -> Self {
        Self {
            pipeline: pipeline.with_clock(clock.clone()),
            windows,
            cache,
            clock,
            cfg,
            previous_end: None,
        }
    }

    pub fn cache(&self) -> &DedupCache {
        &self.cache
    }

    /// One Polling phase: pick the next window and run the pipeline over it.
    /// Failures are logged and never roll the window back.
    pub async fn tick(&mut self) -> TickReport {
        let now = self.clock.now_unix();
        let window = self.windows.next_window(self.previous_end, now);

        let report = self.pipeline.run(window, &self.cache).await;
        self.previous_end = Some(window.end);

        for f in &report.failures {
            tracing::warn!(
                target: "ingest",
                window_start = window.start,
                window_end = window.end,
                category = %f.category,
                kind = f.error.kind(),
                error = %f.error,
                "feed fetch failed, category yields no events this tick"
            );
        }
        let noun = if report.admitted == 1 { "event" } else { "events" };
        tracing::info!(
            target: "ingest",
            window_start = window.start,
            window_end = window.end,
            fetched = report.fetched,
            admitted = report.admitted,
            skipped = report.skipped_duplicates,
            delivery_failures = report.delivery_failures,
            "Published {} {} in window {}",
            report.admitted,
            noun,
            window
        );

        counter!("feed_ticks_total").increment(1);
        gauge!("feed_last_tick_ts").set(now as f64);
        gauge!("feed_dedup_cache_entries").set(self.cache.len() as f64);

        report
    }

    /// Run until `shutdown` turns true (or its sender is dropped). Shutdown
    /// aborts an in-flight tick or sleep; no further ticks are attempted.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> PollerSummary {
        let mut summary = PollerSummary::default();
        let mut phase = Phase::Polling;

        tracing::info!(
            target: "ingest",
            interval_secs = self.cfg.interval.as_secs(),
            overlap_secs = self.windows.overlap_margin_secs,
            retention_secs = self.cache.retention_secs(),
            "poller started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            match phase {
                Phase::Polling => {
                    let report = tokio::select! {
                        r = self.tick() => r,
                        _ = wait_for_shutdown(&mut shutdown) => break,
                    };
                    summary.ticks += 1;
                    summary.dispatched += report.admitted as u64;
                    summary.last_window = Some(report.window);
                    if !report.failures.is_empty() {
                        summary.failed_ticks += 1;
                    }

                    let mut delay = self.cfg.interval;
                    if report.is_rate_limited() {
                        delay += self.cfg.rate_limit_backoff;
                    }
                    phase = Phase::Sleeping(delay);
                }
                Phase::Sleeping(delay) => {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = wait_for_shutdown(&mut shutdown) => break,
                    }
                    let evicted = self.cache.evict(self.clock.now_unix());
                    if evicted > 0 {
                        tracing::debug!(target: "ingest", evicted, remaining = self.cache.len(), "evicted dedup entries");
                    }
                    gauge!("feed_dedup_cache_entries").set(self.cache.len() as f64);
                    phase = Phase::Polling;
                }
            }
        }

        tracing::info!(
            target: "ingest",
            ticks = summary.ticks,
            dispatched = summary.dispatched,
            "poller stopped"
        );
        summary
    }
}

async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
