//! Core data types shared across the engine
//!
//! This module defines the sensor reading ingested from the input store and the
//! three output categories the publisher distributes: alerts, emission records
//! and the global status snapshot.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp type for consistent time handling across the application
pub type Timestamp = DateTime<Utc>;

/// A single sensor reading from one machine
///
/// Numeric fields are optional: a value whose text could not be parsed is kept
/// as missing rather than rejecting the whole reading.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reading {
    /// When the reading was taken, in unix seconds
    pub timestamp: Option<f64>,
    /// Machine that produced the reading
    pub machine_id: String,
    /// Temperature in degrees Celsius
    pub temperature: Option<f64>,
    /// Vibration amplitude (normalised units)
    pub vibration: Option<f64>,
    /// Energy consumed since the previous reading, in kWh
    pub energy_consumption: Option<f64>,
}

impl Reading {
    /// Timestamp used for "most recent" comparisons; missing orders first
    pub fn sort_timestamp(&self) -> f64 {
        self.timestamp.unwrap_or(0.0)
    }
}

/// Kind of anomaly detected on a machine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyType {
    /// Peak temperature far above the running average
    TempSpike,
    /// Peak vibration above the absolute threshold
    HighVibration,
}

/// Severity of an alert
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Medium,
    High,
}

/// Anomaly alert for a single machine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alert {
    pub machine_id: String,
    pub anomaly_type: AnomalyType,
    /// Temperature of the most recent reading
    pub current_temperature: Option<f64>,
    pub avg_temperature: f64,
    /// Vibration of the most recent reading
    pub current_vibration: Option<f64>,
    /// ISO-8601 time of the most recent reading
    pub alert_time: String,
    pub severity: Severity,
}

/// Cumulative CO2 estimate for one machine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmissionRecord {
    pub machine_id: String,
    pub cumulative_co2_kg: f64,
}

/// Global health classification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemHealth {
    Healthy,
    Degraded,
    Critical,
}

/// Fleet-wide status derived from the current aggregates and alerts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusSnapshot {
    pub system_health: SystemHealth,
    pub total_records_processed: u64,
    pub active_machines: usize,
    pub total_anomalies_detected: usize,
    pub avg_co2_per_machine: f64,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            system_health: SystemHealth::Healthy,
            total_records_processed: 0,
            active_machines: 0,
            total_anomalies_detected: 0,
            avg_co2_per_machine: 0.0,
        }
    }
}

/// Convert unix seconds into a UTC timestamp
///
/// Returns `None` for non-finite or out-of-range values.
pub fn timestamp_from_unix(seconds: f64) -> Option<Timestamp> {
    if !seconds.is_finite() {
        return None;
    }
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1_000_000_000.0).round() as u32;
    DateTime::from_timestamp(whole as i64, nanos.min(999_999_999))
}

/// Format a timestamp the way every published payload carries it
pub fn format_iso8601(timestamp: Timestamp) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}
