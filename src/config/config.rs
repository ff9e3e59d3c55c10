//! Application configuration
//!
//! Configuration is layered: a preset (environment, industry, region) provides
//! the base values, a TOML file overrides any subset of them, and command-line
//! flags win last. Every field has a default so an empty file is valid.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Cadence used when a configured interval cannot be represented
const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default log filter when RUST_LOG is not set
    pub log_level: String,
    pub detection: DetectionConfig,
    pub emissions: EmissionsConfig,
    pub publisher: PublisherConfig,
    pub source: SourceConfig,
    pub server: ServerConfig,
    pub simulator: SimulatorConfig,
}

/// Anomaly detection thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Peak temperature must exceed the mean times this factor to spike
    pub temperature_multiplier: f64,
    /// Peak vibration above this value is anomalous
    pub vibration_threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmissionsConfig {
    /// kg CO2 per kWh
    pub co2_emission_factor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    pub poll_interval_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// CSV file the readings are appended to
    pub data_file: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// HTML page served at `/`
    pub dashboard_path: PathBuf,
    /// Directory mounted at `/static` when it exists
    pub static_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub enabled: bool,
    pub interval_seconds: f64,
    pub machines: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            detection: DetectionConfig::default(),
            emissions: EmissionsConfig::default(),
            publisher: PublisherConfig::default(),
            source: SourceConfig::default(),
            server: ServerConfig::default(),
            simulator: SimulatorConfig::default(),
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            temperature_multiplier: 1.2,
            vibration_threshold: 0.8,
        }
    }
}

impl Default for EmissionsConfig {
    fn default() -> Self {
        Self {
            co2_emission_factor: 0.475,
        }
    }
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 1.0,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from("data/sensors.csv"),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            dashboard_path: PathBuf::from("dashboard.html"),
            static_dir: PathBuf::from("static"),
        }
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 1.0,
            machines: vec!["M1".to_string(), "M2".to_string(), "M3".to_string()],
        }
    }
}

impl Config {
    /// Load configuration from a TOML file on top of the defaults
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ReadError` if the file cannot be read, and a parse
    /// or validation error if its content is invalid.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Self::from_file_with_base(path, &Self::default())
    }

    /// Load configuration from a TOML file, overriding the values of `base`
    ///
    /// Only keys present in the file replace base values, so a preset can be
    /// tuned by a file that names a single threshold.
    pub fn from_file_with_base(path: &Path, base: &Config) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str_with_base(&content, base)
    }

    /// Parse configuration from TOML text on top of the defaults
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Self::from_toml_str_with_base(content, &Self::default())
    }

    /// Parse TOML text and overlay it on `base`
    pub fn from_toml_str_with_base(content: &str, base: &Config) -> Result<Self, ConfigError> {
        let overrides: toml::Table = toml::from_str(content)?;

        let mut merged = match toml::Value::try_from(base) {
            Ok(toml::Value::Table(table)) => table,
            Ok(other) => {
                return Err(ConfigError::ParseError(format!(
                    "base configuration is not a table: {}",
                    other.type_str()
                )))
            }
            Err(e) => return Err(ConfigError::ParseError(e.to_string())),
        };
        merge_tables(&mut merged, overrides);

        let config: Config = toml::Value::Table(merged).try_into()?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every value is usable
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            (
                "detection.temperature_multiplier",
                self.detection.temperature_multiplier,
            ),
            (
                "detection.vibration_threshold",
                self.detection.vibration_threshold,
            ),
            (
                "publisher.poll_interval_seconds",
                self.publisher.poll_interval_seconds,
            ),
            (
                "simulator.interval_seconds",
                self.simulator.interval_seconds,
            ),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be a positive number, got {}",
                    name, value
                )));
            }
        }

        let intervals = [
            (
                "publisher.poll_interval_seconds",
                self.publisher.poll_interval_seconds,
            ),
            (
                "simulator.interval_seconds",
                self.simulator.interval_seconds,
            ),
        ];
        for (name, seconds) in intervals {
            if Duration::try_from_secs_f64(seconds).is_err() {
                return Err(ConfigError::ValidationError(format!(
                    "{} is too large to be a duration, got {}",
                    name, seconds
                )));
            }
        }

        let factor = self.emissions.co2_emission_factor;
        if !factor.is_finite() || factor < 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "emissions.co2_emission_factor must not be negative, got {}",
                factor
            )));
        }

        if self.source.data_file.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "source.data_file must not be empty".to_string(),
            ));
        }

        if self.server.host.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "server.host must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Publisher cadence; an unrepresentable value falls back to the default
    pub fn poll_interval(&self) -> Duration {
        interval_or_default(self.publisher.poll_interval_seconds)
    }

    pub fn simulator_interval(&self) -> Duration {
        interval_or_default(self.simulator.interval_seconds)
    }

    /// Socket address string the HTTP server binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn interval_or_default(seconds: f64) -> Duration {
    match Duration::try_from_secs_f64(seconds) {
        Ok(interval) if !interval.is_zero() => interval,
        _ => DEFAULT_INTERVAL,
    }
}

/// Recursively overlay `overrides` onto `base`
fn merge_tables(base: &mut toml::Table, overrides: toml::Table) {
    for (key, value) in overrides {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(nested)) => {
                merge_tables(existing, nested);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
