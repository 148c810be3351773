// Configuration Module Tests
// Tests for OrchestratorConfig loading, defaults, and validation

use cache_orchestrator::{CompressionAlgorithm, OrchestratorConfig};
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(yaml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file
}

#[test]
fn test_config_default_values() {
    let config = OrchestratorConfig::default();

    // Server defaults
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 15600);

    // Logging defaults
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.format, "json");

    // Warmup defaults
    assert!(config.warmup.enabled);
    assert_eq!(config.warmup_tick(), Duration::from_secs(60));

    // Monitoring defaults
    assert!(config.monitoring.enabled);
    assert_eq!(config.health_check_interval(), Duration::from_secs(30));
    assert_eq!(config.metrics_interval(), Duration::from_secs(60));
    assert_eq!(config.metrics_retention(), Duration::from_secs(86_400));
    assert_eq!(config.monitoring.alert_thresholds.hit_rate, 80.0);
    assert_eq!(config.monitoring.alert_thresholds.response_time_ms, 100.0);
    assert_eq!(config.monitoring.alert_thresholds.error_rate, 5.0);
    assert_eq!(config.monitoring.alert_thresholds.memory_usage, 85.0);

    // Cleanup defaults
    assert_eq!(config.cleanup_interval(), Duration::from_secs(3600));
    assert_eq!(config.alert_max_age(), Duration::from_secs(86_400));
    assert_eq!(config.cleanup.max_size, 1000);

    assert!(config.prefetch.enabled);
    assert!(!config.compression.enabled);
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_server_addr() {
    let config = OrchestratorConfig::default();
    assert_eq!(config.server_addr(), "0.0.0.0:15600");

    let mut custom_config = OrchestratorConfig::default();
    custom_config.server.host = "127.0.0.1".to_string();
    custom_config.server.port = 8080;
    assert_eq!(custom_config.server_addr(), "127.0.0.1:8080");
}

#[test]
fn test_config_from_file() {
    let file = write_config(
        r#"
server:
  host: "127.0.0.1"
  port: 9999

logging:
  level: "debug"
  format: "pretty"

warmup:
  enabled: false
  patterns: ["content:featured:*"]
  tick_interval_secs: 30

monitoring:
  health_check_interval_secs: 10
  alert_thresholds:
    hit_rate: 90

cleanup:
  max_size: 250

compression:
  enabled: true
  algorithm: "zstd"
  zstd_level: 9
"#,
    );

    let config = OrchestratorConfig::from_file(file.path()).unwrap();

    assert_eq!(config.server_addr(), "127.0.0.1:9999");
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, "pretty");

    assert!(!config.warmup.enabled);
    assert_eq!(config.warmup.patterns, vec!["content:featured:*"]);
    assert_eq!(config.warmup_tick(), Duration::from_secs(30));

    assert_eq!(config.health_check_interval(), Duration::from_secs(10));
    assert_eq!(config.monitoring.alert_thresholds.hit_rate, 90.0);
    // Unset fields keep their defaults
    assert_eq!(config.monitoring.alert_thresholds.error_rate, 5.0);
    assert_eq!(config.metrics_interval(), Duration::from_secs(60));

    assert_eq!(config.cleanup.max_size, 250);
    assert_eq!(config.cleanup_interval(), Duration::from_secs(3600));

    assert!(config.compression.enabled);
    assert_eq!(config.compression.algorithm, CompressionAlgorithm::Zstd);
    assert_eq!(config.compression.zstd_level, 9);
}

#[test]
fn test_config_empty_file_uses_defaults() {
    let file = write_config("{}\n");
    let config = OrchestratorConfig::from_file(file.path()).unwrap();
    assert_eq!(config.server.port, 15600);
    assert!(config.monitoring.enabled);
}

#[test]
fn test_config_rejects_invalid_tick() {
    let file = write_config("warmup:\n  tick_interval_secs: 120\n");
    assert!(OrchestratorConfig::from_file(file.path()).is_err());

    let mut config = OrchestratorConfig::default();
    config.warmup.tick_interval_secs = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_config_rejects_out_of_range_thresholds() {
    let mut config = OrchestratorConfig::default();
    config.monitoring.alert_thresholds.error_rate = 150.0;
    assert!(config.validate().is_err());

    let mut config = OrchestratorConfig::default();
    config.monitoring.alert_thresholds.response_time_ms = 0.0;
    assert!(config.validate().is_err());

    let mut config = OrchestratorConfig::default();
    config.compression.zstd_level = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_config_rejects_malformed_yaml() {
    let file = write_config("server: [not, a, map\n");
    assert!(OrchestratorConfig::from_file(file.path()).is_err());
}

#[test]
fn test_config_missing_file() {
    assert!(OrchestratorConfig::from_file("/nonexistent/orchestrator.yml").is_err());
}
