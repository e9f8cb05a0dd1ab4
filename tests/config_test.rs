//! 配置加载测试

use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;

use flare_discovery_core::config::{Config, LogFormat, LoggingConfig, StorageBackend};
use flare_discovery_core::init_logging;
use tokio_test::{assert_err, assert_ok};

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn defaults_are_valid() {
    let config = Config::default();
    assert_ok!(config.validate());

    assert_eq!(config.registry.heartbeat_interval(), Duration::from_secs(30));
    assert_eq!(config.registry.timeout_threshold(), Duration::from_secs(90));
    assert_eq!(config.registry.health_check_interval(), Duration::from_secs(30));
    assert_eq!(config.storage.backend, StorageBackend::Memory);
    assert_eq!(config.storage.namespace, "flare");

    let breaker = config.breaker.to_breaker_config();
    assert_eq!(breaker.failure_threshold, 5);
    assert_eq!(breaker.reset_timeout, Duration::from_secs(30));
    assert_eq!(breaker.half_open_success_threshold, 2);
    assert_eq!(breaker.timeout, Duration::from_secs(10));
    assert_eq!(breaker.half_open_max_probes, 1);
}

#[test]
fn loads_from_toml_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[registry]
heartbeat_interval_ms = 5000
timeout_threshold_ms = 15000

[storage]
backend = "redis"
url = "redis://cache:6379"
namespace = "staging"

[breaker]
failure_threshold = 3
reset_timeout_ms = 2000

[logging]
level = "debug"
format = "json"
"#
    )
    .unwrap();

    let config = assert_ok!(Config::load_from_file(file.path()));
    assert_eq!(config.registry.heartbeat_interval(), Duration::from_secs(5));
    assert_eq!(config.registry.timeout_threshold(), Duration::from_secs(15));
    assert_eq!(config.storage.backend, StorageBackend::Redis);
    assert_eq!(config.storage.url.as_deref(), Some("redis://cache:6379"));
    assert_eq!(config.storage.namespace, "staging");
    assert_eq!(config.logging.format, LogFormat::Json);

    let breaker = config.breaker.to_breaker_config();
    assert_eq!(breaker.failure_threshold, 3);
    assert_eq!(breaker.reset_timeout, Duration::from_secs(2));
    // 未出现的字段保留默认值
    assert_eq!(breaker.half_open_success_threshold, 2);
}

#[test]
fn missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::load_from_file(dir.path().join("absent.toml")).unwrap_err();
    assert!(err.to_string().contains("failed to read config file"));
}

#[test]
fn overrides_replace_file_values() {
    let mut config = Config::default();
    assert_ok!(config.apply_overrides_from(lookup(&[
        ("DISCOVERY_HEARTBEAT_INTERVAL_MS", "1000"),
        ("DISCOVERY_TIMEOUT_THRESHOLD_MS", "4000"),
        ("DISCOVERY_STORAGE_BACKEND", "etcd"),
        ("DISCOVERY_STORAGE_URL", "http://etcd-0:2379, http://etcd-1:2379"),
        ("DISCOVERY_NAMESPACE", "prod"),
    ])));

    assert_eq!(config.registry.heartbeat_interval_ms, 1000);
    assert_eq!(config.registry.timeout_threshold_ms, 4000);
    assert_eq!(config.storage.backend, StorageBackend::Etcd);
    assert_eq!(
        config.storage.endpoints,
        vec!["http://etcd-0:2379", "http://etcd-1:2379"]
    );
    assert_eq!(config.storage.namespace, "prod");
}

#[test]
fn redis_url_override_sets_url() {
    let mut config = Config::default();
    assert_ok!(config.apply_overrides_from(lookup(&[
        ("DISCOVERY_STORAGE_BACKEND", "redis"),
        ("DISCOVERY_STORAGE_URL", "redis://127.0.0.1:6380"),
    ])));
    assert_eq!(config.storage.url.as_deref(), Some("redis://127.0.0.1:6380"));
    assert!(config.storage.endpoints.is_empty());
}

#[test]
fn invalid_overrides_are_rejected() {
    let mut config = Config::default();
    let err = assert_err!(
        config.apply_overrides_from(lookup(&[("DISCOVERY_STORAGE_BACKEND", "dynamo")]))
    );
    assert!(err.to_string().contains("unknown storage backend"));

    let mut config = Config::default();
    assert_err!(
        config.apply_overrides_from(lookup(&[("DISCOVERY_HEARTBEAT_INTERVAL_MS", "soon")]))
    );
}

#[test]
fn validation_rejects_zero_intervals() {
    let mut config = Config::default();
    config.registry.heartbeat_interval_ms = 0;
    assert_err!(config.validate());

    let mut config = Config::default();
    config.breaker.failure_threshold = 0;
    assert_err!(config.validate());
}

#[test]
fn init_logging_only_installs_once() {
    let config = LoggingConfig {
        level: "warn".to_string(),
        format: LogFormat::Pretty,
    };
    assert_ok!(init_logging(&config));
    assert_err!(init_logging(&config));
}
