use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::compression::CompressionConfig;
use crate::core::{OrchestratorError, Result};

/// Main orchestrator configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub warmup: WarmupConfig,
    pub monitoring: MonitoringConfig,
    pub cleanup: CleanupConfig,
    pub prefetch: PrefetchConfig,
    pub compression: CompressionConfig,
    pub local_cache: LocalCacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 15600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `json` or `pretty`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WarmupConfig {
    pub enabled: bool,
    /// Patterns warmed by `warmup_cache` when none are given
    pub patterns: Vec<String>,
    /// Scheduler tick (seconds, at most 60)
    pub tick_interval_secs: u64,
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            patterns: vec![
                "content:popular:*".to_string(),
                "session:active:*".to_string(),
            ],
            tick_interval_secs: 60,
        }
    }
}

/// Alert thresholds; percentages are 0-100
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    pub hit_rate: f64,
    pub response_time_ms: f64,
    pub error_rate: f64,
    pub memory_usage: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            hit_rate: 80.0,
            response_time_ms: 100.0,
            error_rate: 5.0,
            memory_usage: 85.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub health_check_interval_secs: u64,
    pub metrics_interval_secs: u64,
    /// How long operation records are kept
    pub metrics_retention_secs: u64,
    pub alert_thresholds: AlertThresholds,
    /// Denominator for the memory usage percentage
    pub max_memory_bytes: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            health_check_interval_secs: 30,
            metrics_interval_secs: 60,
            metrics_retention_secs: 86_400, // 24 hours
            alert_thresholds: AlertThresholds::default(),
            max_memory_bytes: 1024 * 1024 * 1024, // 1 GiB
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    pub interval_secs: u64,
    /// Age after which resolved alerts are purged
    pub max_age_secs: u64,
    /// Upper bound on operation records kept after cleanup
    pub max_size: usize,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600,  // 1 hour
            max_age_secs: 86_400, // 24 hours
            max_size: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefetchConfig {
    pub enabled: bool,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalCacheConfig {
    pub max_entries: usize,
}

impl Default for LocalCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: OrchestratorConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(OrchestratorError::Config(msg.to_string()));

        if self.warmup.tick_interval_secs == 0 || self.warmup.tick_interval_secs > 60 {
            return invalid("warmup.tick_interval_secs must be between 1 and 60");
        }
        if self.monitoring.health_check_interval_secs == 0
            || self.monitoring.metrics_interval_secs == 0
        {
            return invalid("monitoring intervals must be greater than zero");
        }
        if self.monitoring.metrics_retention_secs == 0 {
            return invalid("monitoring.metrics_retention_secs must be greater than zero");
        }
        if self.monitoring.max_memory_bytes == 0 {
            return invalid("monitoring.max_memory_bytes must be greater than zero");
        }

        let thresholds = &self.monitoring.alert_thresholds;
        for (name, value) in [
            ("hit_rate", thresholds.hit_rate),
            ("error_rate", thresholds.error_rate),
            ("memory_usage", thresholds.memory_usage),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(OrchestratorError::Config(format!(
                    "alert threshold {} must be a percentage (0-100), got {}",
                    name, value
                )));
            }
        }
        if thresholds.response_time_ms <= 0.0 {
            return invalid("alert threshold response_time_ms must be positive");
        }

        if self.cleanup.interval_secs == 0 {
            return invalid("cleanup.interval_secs must be greater than zero");
        }
        if self.cleanup.max_size == 0 {
            return invalid("cleanup.max_size must be greater than zero");
        }
        if !(1..=22).contains(&self.compression.zstd_level) {
            return invalid("compression.zstd_level must be between 1 and 22");
        }

        Ok(())
    }

    /// Get server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn warmup_tick(&self) -> Duration {
        Duration::from_secs(self.warmup.tick_interval_secs)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.monitoring.health_check_interval_secs)
    }

    pub fn metrics_interval(&self) -> Duration {
        Duration::from_secs(self.monitoring.metrics_interval_secs)
    }

    pub fn metrics_retention(&self) -> Duration {
        Duration::from_secs(self.monitoring.metrics_retention_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup.interval_secs)
    }

    pub fn alert_max_age(&self) -> Duration {
        Duration::from_secs(self.cleanup.max_age_secs)
    }
}
