//! One-shot run: a single window covering the last `POLL_ONCE_LOOKBACK_SECS`
//! (default one hour), for cron/serverless schedules instead of the
//! long-running poller.

use anyhow::{Context, Result};
use poap_bots::ingest::clock::{Clock, SystemClock};
use poap_bots::ingest::dedup::DedupCache;
use poap_bots::ingest::window::WindowScheduler;
use poap_bots::{build_pipeline, init_tracing, FeedConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = FeedConfig::load().context("loading feed configuration")?;
    let lookback: u64 = match std::env::var("POLL_ONCE_LOOKBACK_SECS") {
        Ok(v) => v
            .trim()
            .parse()
            .with_context(|| format!("POLL_ONCE_LOOKBACK_SECS is not a number: {v}"))?,
        Err(_) => 3_600,
    };

    let window = WindowScheduler::new(lookback, cfg.overlap_margin_secs)
        .next_window(None, SystemClock.now_unix());
    let cache = DedupCache::new(cfg.retention_secs.max(lookback));

    let report = build_pipeline(&cfg).run(window, &cache).await;
    for f in &report.failures {
        tracing::warn!(category = %f.category, kind = f.error.kind(), error = %f.error, "fetch failed");
    }

    println!("Published {} events", report.admitted);
    Ok(())
}
