// src/config.rs
//! Startup configuration: optional TOML file, then environment overrides.
//! Loaded once and immutable afterwards.

use std::collections::HashMap;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::ingest::dedup::DedupScope;
use crate::ingest::providers::opensea::{OpenSeaSettings, DEFAULT_EVENTS_URL};
use crate::ingest::scheduler::PollerCfg;
use crate::ingest::window::WindowScheduler;
use crate::ingest::{AdmissionPolicy, PipelineSettings};

const ENV_PATH: &str = "FEED_CONFIG_PATH";
const DEFAULT_PATH: &str = "config/feed.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct FeedConfig {
    pub api_key: String,
    pub collection_slug: String,
    pub contract_address: String,
    /// One Discord webhook per destination channel.
    pub webhooks: Vec<String>,
    pub events_url: String,
    pub page_limit: u32,
    pub only_opensea: bool,
    pub poll_interval_secs: u64,
    pub overlap_margin_secs: u64,
    pub initial_lookback_secs: u64,
    pub retention_secs: u64,
    pub fetch_timeout_secs: u64,
    pub rate_limit_backoff_secs: u64,
    pub dedup_scope: DedupScope,
    pub admission: AdmissionPolicy,
    pub dry_run: bool,
    pub metrics_addr: Option<SocketAddr>,
}

/// File layer: every field optional, env wins on conflict.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    api_key: Option<String>,
    collection_slug: Option<String>,
    contract_address: Option<String>,
    webhooks: Option<Vec<String>>,
    events_url: Option<String>,
    page_limit: Option<u32>,
    only_opensea: Option<bool>,
    poll_interval_secs: Option<u64>,
    overlap_margin_secs: Option<u64>,
    initial_lookback_secs: Option<u64>,
    retention_secs: Option<u64>,
    fetch_timeout_secs: Option<u64>,
    rate_limit_backoff_secs: Option<u64>,
    dedup_scope: Option<DedupScope>,
    admission: Option<AdmissionPolicy>,
    dry_run: Option<bool>,
    metrics_addr: Option<String>,
}

impl FeedConfig {
    /// Load using the process environment:
    /// 1) $FEED_CONFIG_PATH (must exist if set)
    /// 2) config/feed.toml (if present)
    /// 3) environment variables on top.
    pub fn load() -> Result<Self, ConfigError> {
        let file = match std::env::var(ENV_PATH) {
            Ok(p) => Some(read_file(&PathBuf::from(p))?),
            Err(_) => {
                let p = PathBuf::from(DEFAULT_PATH);
                if p.exists() {
                    Some(read_file(&p)?)
                } else {
                    None
                }
            }
        };
        Self::from_sources(file.unwrap_or_default(), |k| std::env::var(k).ok())
    }

    /// Environment only, read through `get` (tests pass a map).
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::from_sources(FileConfig::default(), get)
    }

    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_lookup(|k| vars.get(k).cloned())
    }

    fn from_sources<F>(file: FileConfig, get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |k: &str| get(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_key = env("OPENSEA_API_KEY").or(file.api_key);
        let collection_slug = env("OPENSEA_COLLECTION").or(file.collection_slug);
        let contract_address = env("OPENSEA_CONTRACT_ADDRESS").or(file.contract_address);
        let webhooks = match env("DISCORD_WEBHOOK_URL") {
            Some(v) => split_channels(&v),
            None => clean_list(file.webhooks.unwrap_or_default()),
        };
        let dry_run = parse_env(&env, "DRY_RUN", parse_bool)?
            .or(file.dry_run)
            .unwrap_or(false);

        let poll_interval_secs = parse_env(&env, "POLL_INTERVAL_SECS", parse_u64)?
            .or(file.poll_interval_secs)
            .unwrap_or(20);
        let overlap_margin_secs = parse_env(&env, "OVERLAP_MARGIN_SECS", parse_u64)?
            .or(file.overlap_margin_secs)
            .unwrap_or(40);
        let retention_secs = parse_env(&env, "DEDUP_RETENTION_SECS", parse_u64)?
            .or(file.retention_secs)
            .unwrap_or(2 * (poll_interval_secs + overlap_margin_secs));

        let metrics_addr = match env("METRICS_ADDR").or(file.metrics_addr) {
            Some(s) => Some(s.parse::<SocketAddr>().map_err(|e| ConfigError::InvalidValue {
                field: "METRICS_ADDR",
                reason: format!("{e}"),
            })?),
            None => None,
        };

        let cfg = FeedConfig {
            api_key: api_key.ok_or(ConfigError::MissingField {
                field: "OPENSEA_API_KEY",
            })?,
            collection_slug: collection_slug.ok_or(ConfigError::MissingField {
                field: "OPENSEA_COLLECTION",
            })?,
            contract_address: contract_address.ok_or(ConfigError::MissingField {
                field: "OPENSEA_CONTRACT_ADDRESS",
            })?,
            webhooks,
            events_url: env("OPENSEA_API_URL")
                .or(file.events_url)
                .unwrap_or_else(|| DEFAULT_EVENTS_URL.to_string()),
            page_limit: parse_env(&env, "OPENSEA_PAGE_LIMIT", parse_u32)?
                .or(file.page_limit)
                .unwrap_or(300),
            only_opensea: parse_env(&env, "ONLY_OPENSEA", parse_bool)?
                .or(file.only_opensea)
                .unwrap_or(false),
            poll_interval_secs,
            overlap_margin_secs,
            initial_lookback_secs: parse_env(&env, "INITIAL_LOOKBACK_SECS", parse_u64)?
                .or(file.initial_lookback_secs)
                .unwrap_or(1000),
            retention_secs,
            fetch_timeout_secs: parse_env(&env, "FETCH_TIMEOUT_SECS", parse_u64)?
                .or(file.fetch_timeout_secs)
                .unwrap_or(10),
            rate_limit_backoff_secs: parse_env(&env, "RATE_LIMIT_BACKOFF_SECS", parse_u64)?
                .or(file.rate_limit_backoff_secs)
                .unwrap_or(0),
            dedup_scope: parse_env(&env, "DEDUP_SCOPE", |s| s.parse::<DedupScope>())?
                .or(file.dedup_scope)
                .unwrap_or_default(),
            admission: parse_env(&env, "ADMISSION_POLICY", |s| s.parse::<AdmissionPolicy>())?
                .or(file.admission)
                .unwrap_or_default(),
            dry_run,
            metrics_addr,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.webhooks.is_empty() && !self.dry_run {
            return Err(ConfigError::MissingField {
                field: "DISCORD_WEBHOOK_URL",
            });
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "POLL_INTERVAL_SECS",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.page_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "OPENSEA_PAGE_LIMIT",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.overlap_margin_secs <= self.poll_interval_secs {
            tracing::warn!(
                overlap = self.overlap_margin_secs,
                interval = self.poll_interval_secs,
                "overlap margin does not exceed the polling cadence; late events may be missed"
            );
        }
        Ok(())
    }

    pub fn opensea_settings(&self) -> OpenSeaSettings {
        OpenSeaSettings {
            events_url: self.events_url.clone(),
            api_key: self.api_key.clone(),
            collection_slug: self.collection_slug.clone(),
            contract_address: self.contract_address.clone(),
            page_limit: self.page_limit,
            only_opensea: self.only_opensea,
            timeout: Duration::from_secs(self.fetch_timeout_secs),
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
            scope: self.dedup_scope,
            admission: self.admission,
        }
    }

    pub fn window_scheduler(&self) -> WindowScheduler {
        WindowScheduler::new(self.initial_lookback_secs, self.overlap_margin_secs)
    }

    pub fn poller_cfg(&self) -> PollerCfg {
        PollerCfg {
            interval: Duration::from_secs(self.poll_interval_secs),
            rate_limit_backoff: Duration::from_secs(self.rate_limit_backoff_secs),
        }
    }
}

fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
    toml::from_str(&content).map_err(ConfigError::Parse)
}

fn parse_env<T, G, P, E>(env: &G, key: &'static str, parse: P) -> Result<Option<T>, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    P: Fn(&str) -> Result<T, E>,
    E: std::fmt::Display,
{
    match env(key) {
        Some(v) => parse(&v).map(Some).map_err(|e| ConfigError::InvalidValue {
            field: key,
            reason: e.to_string(),
        }),
        None => Ok(None),
    }
}

fn parse_u64(s: &str) -> Result<u64, std::num::ParseIntError> {
    s.parse()
}

fn parse_u32(s: &str) -> Result<u32, std::num::ParseIntError> {
    s.parse()
}

fn parse_bool(s: &str) -> Result<bool, String> {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(format!("not a boolean: `{other}`")),
    }
}

/// Split a `;`-delimited channel list, trimming and dropping empties.
pub fn split_channels(s: &str) -> Vec<String> {
    clean_list(s.split(';').map(str::to_string).collect())
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for it in items {
        let t = it.trim();
        if !t.is_empty() && !out.iter().any(|o| o == t) {
            out.push(t.to_string());
        }
    }
    out
}
