//! Device configuration
//!
//! Defaults are the values the probe ships with; a `probe.toml` next to the
//! binary and `PROBE__SECTION__KEY` environment variables override them.

use probe_shared::{delivery, Position};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable naming an alternative config file
pub const CONFIG_PATH_ENV: &str = "PROBE_CONFIG";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub device: DeviceConfig,
    pub storage: StorageConfig,
    pub collector: CollectorConfig,
    pub schedule: ScheduleConfig,
}

/// Identity and placement of this probe
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub probe_id: u32,
    pub x_position: f64,
    pub y_position: f64,
    pub z_position: f64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            probe_id: 0,
            x_position: 0.0,
            y_position: 0.0,
            z_position: 0.0,
        }
    }
}

impl DeviceConfig {
    pub fn position(&self) -> Position {
        Position {
            x: self.x_position,
            y: self.y_position,
            z: self.z_position,
        }
    }
}

/// Location of the durable queue
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub queue_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            queue_path: PathBuf::from("data_to_send.csv"),
        }
    }
}

impl StorageConfig {
    /// Measure id counter lives next to the queue
    pub fn sequence_path(&self) -> PathBuf {
        self.queue_path.with_extension("seq")
    }
}

/// Remote collector endpoint and retry policy
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Scheme, host and optional port
    pub base_url: String,
    /// Path records are posted to
    pub measure_path: String,
    /// Query appended to the measure path for the liveness probe
    pub liveness_query: String,
    /// Whether to run the liveness probe before each bulk send
    pub liveness_probe: bool,
    pub request_timeout_ms: u64,
    pub connect_attempts: u32,
    pub connect_backoff_ms: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://192.168.34.199".into(),
            measure_path: "/api/measure/".into(),
            liveness_query: "format=api".into(),
            liveness_probe: true,
            request_timeout_ms: delivery::REQUEST_TIMEOUT_MS,
            connect_attempts: delivery::CONNECT_ATTEMPTS,
            connect_backoff_ms: delivery::CONNECT_BACKOFF_MS,
        }
    }
}

impl CollectorConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_backoff(&self) -> Duration {
        Duration::from_millis(self.connect_backoff_ms)
    }
}

/// Cadence of the two independent triggers
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub sample_interval_secs: u64,
    pub delivery_interval_secs: u64,
    /// Delay before the first delivery cycle, so it follows the first sample
    pub delivery_offset_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            sample_interval_secs: 60,
            delivery_interval_secs: 60,
            delivery_offset_secs: 1,
        }
    }
}

impl ScheduleConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.sample_interval_secs.max(1))
    }

    pub fn delivery_interval(&self) -> Duration {
        Duration::from_secs(self.delivery_interval_secs.max(1))
    }

    pub fn delivery_offset(&self) -> Duration {
        Duration::from_secs(self.delivery_offset_secs)
    }
}

impl ProbeConfig {
    /// Load from `$PROBE_CONFIG` (default `probe.toml`) and the environment
    pub fn load() -> Result<Self, config::ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "probe".into());
        Self::load_from(&path)
    }

    /// Load from a specific file (optional) and the environment
    pub fn load_from(path: &str) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("PROBE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }
}
