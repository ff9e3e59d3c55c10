//! Deployment presets
//!
//! Environment presets set where data lives and how chatty the logs are.
//! Industry presets retune the anomaly thresholds and CO2 factor for a type of
//! plant, and a grid region pins the CO2 factor to the local electricity mix.

use crate::config::Config;
use crate::error::ConfigError;
use std::path::PathBuf;
use std::str::FromStr;

/// Global average grid intensity, used for unknown regions
pub const GLOBAL_AVERAGE_CO2_FACTOR: f64 = 0.475;

/// kg CO2 per kWh by grid region
pub const CO2_FACTORS_BY_REGION: [(&str, f64); 7] = [
    ("North America", 0.425),
    ("Europe", 0.350),
    ("India", 0.625),
    ("China", 0.700),
    ("Brazil", 0.150),
    ("Australia", 0.800),
    ("Global Average", GLOBAL_AVERAGE_CO2_FACTOR),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(ConfigError::ValidationError(format!(
                "unknown environment '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Industry {
    /// Looms vibrate; dyeing is energy-hungry
    Textile,
    /// Robotics with tight temperature control and low vibration tolerance
    AutomotiveAssembly,
    /// Precision equipment, many small machines
    ElectronicsManufacturing,
    /// Strict temperature and vibration control
    PharmaceuticalManufacturing,
}

impl FromStr for Industry {
    type Err = ConfigError;

    /// Accepts names with spaces, dashes or underscores in any case
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "textile" | "textile_industry" => Ok(Industry::Textile),
            "automotive" | "automotive_assembly" => Ok(Industry::AutomotiveAssembly),
            "electronics" | "electronics_manufacturing" => {
                Ok(Industry::ElectronicsManufacturing)
            }
            "pharmaceutical" | "pharmaceutical_manufacturing" => {
                Ok(Industry::PharmaceuticalManufacturing)
            }
            _ => Err(ConfigError::ValidationError(format!(
                "unknown industry '{}'",
                s.trim()
            ))),
        }
    }
}

impl Industry {
    /// (temperature multiplier, vibration threshold, CO2 factor)
    fn thresholds(self) -> (f64, f64, f64) {
        match self {
            Industry::Textile => (1.25, 0.85, 0.520),
            Industry::AutomotiveAssembly => (1.1, 0.6, 0.425),
            Industry::ElectronicsManufacturing => (1.05, 0.5, 0.475),
            Industry::PharmaceuticalManufacturing => (1.02, 0.3, 0.475),
        }
    }
}

/// CO2 factor for a grid region, case-insensitive; unknown regions get the global average
pub fn region_co2_factor(region: &str) -> f64 {
    let wanted = region.trim();
    CO2_FACTORS_BY_REGION
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(wanted))
        .map(|(_, factor)| *factor)
        .unwrap_or(GLOBAL_AVERAGE_CO2_FACTOR)
}

/// Base configuration for an environment
pub fn environment_config(environment: Environment) -> Config {
    let mut config = Config::default();

    match environment {
        Environment::Development => {
            config.log_level = "debug".to_string();
            config.server.host = "127.0.0.1".to_string();
            config.source.data_file = PathBuf::from("./data/sensors.csv");
        }
        Environment::Staging => {
            config.server.host = "0.0.0.0".to_string();
            config.source.data_file = PathBuf::from("/staging/data/sensors.csv");
        }
        Environment::Production => {
            config.server.host = "0.0.0.0".to_string();
            config.source.data_file = PathBuf::from("/var/data/ecosync/sensors.csv");
            config.detection.temperature_multiplier = 1.15;
            config.detection.vibration_threshold = 0.75;
            // real producers write the store in production
            config.simulator.enabled = false;
        }
    }

    config
}

/// Combine environment, optional industry and optional region presets
///
/// The industry overrides the environment's thresholds; the region, applied
/// last, overrides the CO2 factor.
pub fn preset_config(
    environment: Environment,
    industry: Option<Industry>,
    region: Option<&str>,
) -> Config {
    let mut config = environment_config(environment);

    if let Some(industry) = industry {
        let (multiplier, threshold, factor) = industry.thresholds();
        config.detection.temperature_multiplier = multiplier;
        config.detection.vibration_threshold = threshold;
        config.emissions.co2_emission_factor = factor;
    }

    if let Some(region) = region {
        config.emissions.co2_emission_factor = region_co2_factor(region);
    }

    config
}
