//! Built-in anomaly rules
//!
//! Each rule inspects one machine's running aggregate and decides whether that
//! machine is anomalous. Rules are evaluated in precedence order by the
//! [`AlertEvaluator`](crate::triggers::AlertEvaluator); the first one that fires
//! names the alert.

use crate::aggregator::MachineAggregate;
use crate::events::{AnomalyType, Severity};

/// Factor applied to the vibration threshold above which a vibration alert is HIGH
pub const HIGH_SEVERITY_VIBRATION_FACTOR: f64 = 1.2;

/// Trait for anomaly predicates over a machine aggregate
pub trait AnomalyRule: Send + Sync {
    /// Whether the machine's current statistics are anomalous
    fn evaluate(&self, aggregate: &MachineAggregate) -> bool;

    /// Severity to report when this rule names the alert
    fn severity(&self, aggregate: &MachineAggregate) -> Severity;

    /// Anomaly type reported when this rule fires
    fn anomaly_type(&self) -> AnomalyType;

    /// Get a human-readable name for this rule
    fn name(&self) -> &str;
}

/// Fires when the peak temperature exceeds the running mean by a multiplier
///
/// A machine whose readings never carried a temperature cannot spike.
pub struct TempSpikeRule {
    /// Peak must be strictly greater than `avg * multiplier`
    pub multiplier: f64,
}

impl TempSpikeRule {
    pub fn new(multiplier: f64) -> Self {
        Self { multiplier }
    }

    /// Create a default rule (peak more than 20% above the mean)
    pub fn with_defaults() -> Self {
        Self::new(1.2)
    }
}

impl AnomalyRule for TempSpikeRule {
    fn evaluate(&self, aggregate: &MachineAggregate) -> bool {
        match (aggregate.temperature_max, aggregate.avg_temperature()) {
            (Some(max), Some(avg)) => max > avg * self.multiplier,
            _ => false,
        }
    }

    fn severity(&self, _aggregate: &MachineAggregate) -> Severity {
        Severity::High
    }

    fn anomaly_type(&self) -> AnomalyType {
        AnomalyType::TempSpike
    }

    fn name(&self) -> &str {
        "TempSpikeRule"
    }
}

/// Fires when the peak vibration exceeds an absolute threshold
pub struct HighVibrationRule {
    /// Peak must be strictly greater than this value
    pub threshold: f64,
}

impl HighVibrationRule {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Create a default rule (peak above 0.8)
    pub fn with_defaults() -> Self {
        Self::new(0.8)
    }
}

impl AnomalyRule for HighVibrationRule {
    fn evaluate(&self, aggregate: &MachineAggregate) -> bool {
        aggregate
            .vibration_max
            .is_some_and(|max| max > self.threshold)
    }

    fn severity(&self, aggregate: &MachineAggregate) -> Severity {
        let severe = aggregate
            .vibration_max
            .is_some_and(|max| max > self.threshold * HIGH_SEVERITY_VIBRATION_FACTOR);
        if severe {
            Severity::High
        } else {
            Severity::Medium
        }
    }

    fn anomaly_type(&self) -> AnomalyType {
        AnomalyType::HighVibration
    }

    fn name(&self) -> &str {
        "HighVibrationRule"
    }
}
