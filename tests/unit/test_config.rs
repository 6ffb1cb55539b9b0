use procinfo::config::MonitorConfig;
use procinfo::dispatch::Backpressure;
use procinfo::models::MonitorError;

const FULL_DOCUMENT: &str = r#"
[audit]
device = "/dev/auditpipe"
class_mask = 0x40000080
poll_interval_ms = 100
seed_running_processes = true

[table]
grace_period_secs = 10.0
capacity = 512

[classifier]
workers = 8
queue_limit = 64
cache_capacity = 0
eager_entitlements = true
shutdown_timeout_ms = 500

[dispatch]
queue_capacity = 16

[dispatch.backpressure]
policy = "drop-oldest"
"#;

#[test]
fn test_full_document() {
    let config = MonitorConfig::from_toml(FULL_DOCUMENT).unwrap();

    assert_eq!(config.audit.class_mask, 0x4000_0080);
    assert!(config.audit.seed_running_processes);
    assert_eq!(config.table.capacity, 512);
    assert_eq!(config.classifier.workers, 8);
    assert_eq!(config.classifier.cache_capacity, 0);
    assert_eq!(config.dispatch.queue_capacity, 16);
    assert_eq!(config.dispatch.backpressure, Backpressure::DropOldest);
    assert_eq!(config.shutdown_timeout().as_millis(), 500);
}

#[test]
fn test_serialized_config_parses_back() {
    let config = MonitorConfig::from_toml(FULL_DOCUMENT).unwrap();
    let document = toml::to_string(&config).unwrap();

    assert_eq!(MonitorConfig::from_toml(&document).unwrap(), config);
}

#[test]
fn test_unknown_backpressure_policy_is_rejected() {
    let result = MonitorConfig::from_toml("[dispatch.backpressure]\npolicy = \"drop-newest\"");
    assert!(matches!(result, Err(MonitorError::ConfigParse(_))));
}
