// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod config;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod notify;

use std::sync::Arc;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub use crate::config::FeedConfig;
pub use crate::error::{ConfigError, NotifyError, SourceError};
pub use crate::ingest::{Pipeline, TickReport};
pub use crate::notify::{NormalizedNotification, Notifier, NotifierMux};

use crate::ingest::providers::opensea::OpenSeaProvider;
use crate::notify::{discord::DiscordNotifier, LogNotifier};

/// Initialize tracing for the binaries. `RUST_LOG` selects verbosity,
/// `LOG_FORMAT=json` switches to JSON lines.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("poap_bots=info,warn"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

/// Notification sink for `cfg`: every webhook behind one mux, or the log in dry-run mode.
pub fn build_notifier(cfg: &FeedConfig) -> Arc<dyn Notifier> {
    if cfg.dry_run {
        tracing::info!("dry run: notifications are logged, not posted");
        return Arc::new(LogNotifier);
    }
    let mut mux = NotifierMux::default();
    for hook in &cfg.webhooks {
        mux.push(Box::new(DiscordNotifier::new(hook.clone())));
    }
    tracing::info!(channels = mux.len(), "discord channels configured");
    Arc::new(mux)
}

/// Feed adapter + sink wired into a pipeline according to `cfg`.
pub fn build_pipeline(cfg: &FeedConfig) -> Pipeline {
    let source = Arc::new(OpenSeaProvider::new(cfg.opensea_settings()));
    Pipeline::new(source, build_notifier(cfg), cfg.pipeline_settings())
}
