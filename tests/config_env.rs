// tests/config_env.rs
use std::{env, fs};

use poap_bots::ingest::dedup::DedupScope;
use poap_bots::{ConfigError, FeedConfig};

const VARS: &[&str] = &[
    "FEED_CONFIG_PATH",
    "OPENSEA_API_KEY",
    "OPENSEA_COLLECTION",
    "OPENSEA_CONTRACT_ADDRESS",
    "DISCORD_WEBHOOK_URL",
    "POLL_INTERVAL_SECS",
    "OVERLAP_MARGIN_SECS",
    "DEDUP_RETENTION_SECS",
    "DEDUP_SCOPE",
    "DRY_RUN",
    "METRICS_ADDR",
];

fn clear_env() {
    for v in VARS {
        env::remove_var(v);
    }
}

#[serial_test::serial]
#[test]
fn file_from_env_path_then_env_overrides() {
    clear_env();
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("feed.toml");
    fs::write(
        &path,
        r#"
api_key = "file-key"
collection_slug = "poap-v2"
contract_address = "0x22c1f6050e56d2876009903609a2cc3fef83b415"
webhooks = ["https://discord.com/api/webhooks/1/a"]
poll_interval_secs = 30
overlap_margin_secs = 60
dedup_scope = "global"
metrics_addr = "127.0.0.1:9100"
"#,
    )
    .unwrap();
    env::set_var("FEED_CONFIG_PATH", path.display().to_string());

    let c = FeedConfig::load().unwrap();
    assert_eq!(c.api_key, "file-key");
    assert_eq!(c.poll_interval_secs, 30);
    assert_eq!(c.retention_secs, 2 * (30 + 60));
    assert_eq!(c.dedup_scope, DedupScope::Global);
    assert_eq!(c.metrics_addr, Some("127.0.0.1:9100".parse().unwrap()));

    // environment wins over the file
    env::set_var("OPENSEA_API_KEY", "env-key");
    env::set_var(
        "DISCORD_WEBHOOK_URL",
        "https://discord.com/api/webhooks/2/b;https://discord.com/api/webhooks/3/c",
    );
    env::set_var("POLL_INTERVAL_SECS", "10");
    let c = FeedConfig::load().unwrap();
    assert_eq!(c.api_key, "env-key");
    assert_eq!(c.webhooks.len(), 2);
    assert_eq!(c.poll_interval_secs, 10);
    assert_eq!(c.overlap_margin_secs, 60);

    clear_env();
}

#[serial_test::serial]
#[test]
fn explicit_path_must_exist_and_parse() {
    clear_env();
    let tmp = tempfile::tempdir().unwrap();

    env::set_var(
        "FEED_CONFIG_PATH",
        tmp.path().join("missing.toml").display().to_string(),
    );
    assert!(matches!(
        FeedConfig::load().unwrap_err(),
        ConfigError::ReadFile(_)
    ));

    let bad = tmp.path().join("bad.toml");
    fs::write(&bad, "poll_interval_secs = 20\nunknown_knob = true\n").unwrap();
    env::set_var("FEED_CONFIG_PATH", bad.display().to_string());
    assert!(matches!(
        FeedConfig::load().unwrap_err(),
        ConfigError::Parse(_)
    ));

    clear_env();
}

#[serial_test::serial]
#[test]
fn env_only_without_any_file() {
    clear_env();
    // isolate CWD so the repo's config/feed.toml is not picked up
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();

    env::set_var("OPENSEA_API_KEY", "k");
    env::set_var("OPENSEA_COLLECTION", "poap-v2");
    env::set_var("OPENSEA_CONTRACT_ADDRESS", "0x22c1");
    env::set_var("DRY_RUN", "true");
    let c = FeedConfig::load();

    env::set_current_dir(&old).unwrap();
    clear_env();

    let c = c.unwrap();
    assert!(c.dry_run);
    assert!(c.webhooks.is_empty());
    assert_eq!(c.poll_interval_secs, 20);
}

#[serial_test::serial]
#[test]
fn shipped_example_config_parses() {
    clear_env();
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("config/feed.example.toml");
    env::set_var("FEED_CONFIG_PATH", path.display().to_string());
    let c = FeedConfig::load();
    clear_env();

    let c = c.unwrap();
    assert_eq!(c.collection_slug, "poap-v2");
    assert_eq!(c.webhooks.len(), 1);
    assert_eq!(c.dedup_scope, DedupScope::PerCategory);
    assert!(c.metrics_addr.is_none());
}
