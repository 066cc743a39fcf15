//! Configuration file parsing and structures.
//!
//! homekeeper reads a single TOML file. MQTT credentials may additionally be
//! supplied through `HOMEKEEPER_`-prefixed environment variables so they do
//! not have to live in the file.

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use tracing_subscriber::filter::LevelFilter;

use crate::scheduler::Location;

/// Prefix of the environment variables that override file values.
pub const ENV_PREFIX: &str = "HOMEKEEPER_";

/// Top-level configuration structure
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    pub location: LocationConfig,
    pub mqtt: MqttConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

#[derive(
    Debug,
    Default,
    Deserialize,
    Serialize,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default)]
    pub level: LogLevel,

    /// Per-target levels, e.g. `"homekeeper::engine" = "debug"`
    #[serde(default)]
    pub overrides: BTreeMap<String, LogLevel>,
}

impl LoggingConfig {
    /// Filter directives in `EnvFilter` syntax: the default level followed by
    /// every per-target override.
    pub fn directives(&self) -> String {
        std::iter::once(self.level.to_string())
            .chain(
                self.overrides
                    .iter()
                    .map(|(target, level)| format!("{}={}", target, level)),
            )
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Where the house is, for sunrise and sunset
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LocationConfig {
    /// Latitude in decimal degrees
    pub latitude: f64,

    /// Longitude in decimal degrees
    pub longitude: f64,
}

impl From<LocationConfig> for Location {
    fn from(config: LocationConfig) -> Self {
        Location {
            latitude: config.latitude,
            longitude: config.longitude,
        }
    }
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    format!("homekeeper-{}", std::process::id() % 1000)
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    pub broker: String,

    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    #[serde(default = "default_client_id")]
    pub client_id: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// JSON document store file
    pub path: PathBuf,
}

fn default_ping_interval_secs() -> u64 {
    30
}

fn default_stats_interval_secs() -> u64 {
    20 * 60
}

fn default_stats_initial_delay_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Period of the mobile device reachability sampling
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,

    /// Period of the device telemetry poll
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,

    #[serde(default = "default_stats_initial_delay_secs")]
    pub stats_initial_delay_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: default_ping_interval_secs(),
            stats_interval_secs: default_stats_interval_secs(),
            stats_initial_delay_secs: default_stats_initial_delay_secs(),
        }
    }
}

impl SchedulerConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }

    pub fn stats_initial_delay(&self) -> Duration {
        Duration::from_secs(self.stats_initial_delay_secs)
    }
}

fn default_true() -> bool {
    true
}

/// Where switch commands are published
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct NotifyConfig {
    /// Also publish a human readable line to `send_message`
    #[serde(default)]
    pub publish_to_notify: bool,

    /// Publish the power command to the device itself
    #[serde(default = "default_true")]
    pub publish_to_devices: bool,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            publish_to_notify: false,
            publish_to_devices: true,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, apply environment overrides and
    /// validate the result.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().to_path_buf(), e))?;

        toml::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Override MQTT credentials from `HOMEKEEPER_MQTT_USERNAME` and
    /// `HOMEKEEPER_MQTT_PASSWORD`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(username) = lookup(&format!("{}MQTT_USERNAME", ENV_PREFIX)) {
            self.mqtt.username = Some(username);
        }
        if let Some(password) = lookup(&format!("{}MQTT_PASSWORD", ENV_PREFIX)) {
            self.mqtt.password = Some(password);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let LocationConfig {
            latitude,
            longitude,
        } = self.location;
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(ConfigError::Invalid(format!(
                "location.latitude must be within -90..90, got {}",
                latitude
            )));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(ConfigError::Invalid(format!(
                "location.longitude must be within -180..180, got {}",
                longitude
            )));
        }

        if self.mqtt.broker.trim().is_empty() {
            return Err(ConfigError::Invalid("mqtt.broker must not be empty".into()));
        }
        if self.store.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("store.path must not be empty".into()));
        }

        let intervals = [
            ("scheduler.ping_interval_secs", self.scheduler.ping_interval_secs),
            ("scheduler.stats_interval_secs", self.scheduler.stats_interval_secs),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be positive", name)));
            }
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
