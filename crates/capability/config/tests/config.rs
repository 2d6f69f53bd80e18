use domain::QosLevel;
use rain_config::{CloudConfig, ConfigError, DEFAULT_LOCAL_DATABASE_URL, GatewayConfig};
use std::collections::HashMap;
use std::time::Duration;

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn gateway_defaults() {
    let config = GatewayConfig::from_lookup(lookup(&[])).expect("config");
    assert_eq!(config.device_path, "/dev/ttyACM0");
    assert_eq!(config.packet_length_max, 7);
    assert_eq!(config.device_timeout, Duration::from_secs(10));
    assert_eq!(config.mqtt.port, 1883);
    assert_eq!(config.mqtt.qos, QosLevel::AtLeastOnce);
    assert_eq!(config.heartbeat_interval, Duration::from_secs(10));
    assert_eq!(config.rain_mm_per_tip, 0.2794);
    assert_eq!(config.local_database_url, "sqlite://rain-local.db");
    assert!(config.run_duration.is_none());
}

#[test]
fn gateway_overrides() {
    let config = GatewayConfig::from_lookup(lookup(&[
        ("RAIN_DEVICE_PATH", "/dev/ttyUSB1"),
        ("RAIN_MQTT_QOS", "0"),
        ("RAIN_MQTT_USERNAME", "gateway"),
        ("RAIN_HEARTBEAT_INTERVAL_MS", "2000"),
        ("RAIN_RUN_DURATION_MS", "1500"),
        ("RAIN_LOCAL_DATABASE_URL", ""),
    ]))
    .expect("config");
    assert_eq!(config.device_path, "/dev/ttyUSB1");
    assert_eq!(config.mqtt.qos, QosLevel::AtMostOnce);
    assert_eq!(config.mqtt.username.as_deref(), Some("gateway"));
    assert_eq!(config.heartbeat_interval, Duration::from_secs(2));
    assert_eq!(config.run_duration, Some(Duration::from_millis(1500)));
    // 空值回落到默认的 SQLite 文件
    assert_eq!(config.local_database_url, DEFAULT_LOCAL_DATABASE_URL);

    let config = GatewayConfig::from_lookup(lookup(&[(
        "RAIN_LOCAL_DATABASE_URL",
        "postgres://rain@localhost/local",
    )]))
    .expect("config");
    assert_eq!(config.local_database_url, "postgres://rain@localhost/local");
}

#[test]
fn invalid_values_are_rejected() {
    for (key, value) in [
        ("RAIN_MQTT_QOS", "3"),
        ("RAIN_MQTT_PORT", "70000"),
        ("RAIN_PACKET_LENGTH_MAX", "1"),
        ("RAIN_DEVICE_TIMEOUT_MS", "soon"),
        ("RAIN_RAIN_MM_PER_TIP", "-0.1"),
    ] {
        let err = GatewayConfig::from_lookup(lookup(&[(key, value)])).expect_err(key);
        assert!(matches!(err, ConfigError::Invalid(ref k, _) if k == key), "{key}: {err}");
    }
}

#[test]
fn cloud_requires_database_url() {
    let err = CloudConfig::from_lookup(lookup(&[])).expect_err("missing url");
    assert!(matches!(err, ConfigError::Missing(ref key) if key == "RAIN_DATABASE_URL"));

    let config = CloudConfig::from_lookup(lookup(&[
        ("RAIN_DATABASE_URL", "postgres://rain@localhost/rain"),
        ("RAIN_DATABASE_RETRY_MS", "50"),
    ]))
    .expect("config");
    assert_eq!(config.database_retry.backoff, Duration::from_millis(50));
    assert_eq!(config.database_retry.timeout, Duration::from_secs(10));
}

#[test]
fn load_cloud_config_from_env() {
    // Rust 2024 中 set_var 需要显式标注 unsafe（测试进程内可控）。
    unsafe {
        std::env::set_var("RAIN_DATABASE_URL", "postgres://rain@localhost/rain");
        std::env::set_var("RAIN_MQTT_HOST", "broker.local");
    }

    let config = CloudConfig::from_env().expect("config");
    assert_eq!(config.database_url, "postgres://rain@localhost/rain");
    assert_eq!(config.mqtt.host, "broker.local");
}
