//! POAP feed bot: long-running poller.
//! Polls OpenSea for transfers and sales on a sliding window and relays each
//! newly seen transaction to the configured Discord channels.

use std::sync::Arc;

use anyhow::{Context, Result};
use poap_bots::ingest::clock::SystemClock;
use poap_bots::ingest::dedup::DedupCache;
use poap_bots::ingest::scheduler::Poller;
use poap_bots::metrics::Metrics;
use poap_bots::{build_pipeline, init_tracing, FeedConfig};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when the file is absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = FeedConfig::load().context("loading feed configuration")?;
    tracing::info!(
        collection = %cfg.collection_slug,
        contract = %cfg.contract_address,
        interval = cfg.poll_interval_secs,
        overlap = cfg.overlap_margin_secs,
        retention = cfg.retention_secs,
        scope = ?cfg.dedup_scope,
        admission = ?cfg.admission,
        "feed config loaded"
    );

    let _metrics_task = match cfg.metrics_addr {
        Some(addr) => {
            let metrics = Metrics::init()?;
            Some(metrics.serve(addr).await?)
        }
        None => None,
    };

    let poller = Poller::new(
        build_pipeline(&cfg),
        cfg.window_scheduler(),
        DedupCache::new(cfg.retention_secs),
        Arc::new(SystemClock),
        cfg.poller_cfg(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("shutdown signal received"),
            Err(e) => {
                // Without a signal handler the poller simply runs until killed.
                tracing::warn!("ctrl-c handler failed: {e:#}");
                std::future::pending::<()>().await;
            }
        }
        let _ = shutdown_tx.send(true);
    });

    let summary = poller.run(shutdown_rx).await;
    tracing::info!(
        ticks = summary.ticks,
        dispatched = summary.dispatched,
        failed_ticks = summary.failed_ticks,
        "exiting"
    );
    Ok(())
}
