use crate::aggregator::MachineAggregate;
use crate::events::{Alert, EmissionRecord, StatusSnapshot, SystemHealth};
use std::collections::{BTreeMap, BTreeSet};

/// Classify fleet health from the anomaly count
///
/// Any anomaly degrades the fleet; a quarter of the machines (integer division,
/// never less than one) being anomalous makes it critical.
pub fn classify_health(total_anomalies: usize, active_machines: usize) -> SystemHealth {
    if total_anomalies == 0 {
        SystemHealth::Healthy
    } else if total_anomalies >= std::cmp::max(1, active_machines / 4) {
        SystemHealth::Critical
    } else {
        SystemHealth::Degraded
    }
}

/// Derive the global status snapshot
///
/// # Arguments
///
/// * `total_records` - Readings accepted so far
/// * `aggregates` - Current per-machine aggregates
/// * `alerts` - Alerts from the latest evaluation
/// * `emissions` - Emission records from the latest evaluation
pub fn reduce_status(
    total_records: u64,
    aggregates: &BTreeMap<String, MachineAggregate>,
    alerts: &[Alert],
    emissions: &[EmissionRecord],
) -> StatusSnapshot {
    let active_machines = aggregates.len();

    // A machine counts once no matter how many of its conditions fired
    let total_anomalies_detected = alerts
        .iter()
        .map(|alert| alert.machine_id.as_str())
        .collect::<BTreeSet<_>>()
        .len();

    let total_co2: f64 = emissions.iter().map(|record| record.cumulative_co2_kg).sum();
    let avg_co2_per_machine = if active_machines == 0 {
        0.0
    } else {
        total_co2 / active_machines as f64
    };

    StatusSnapshot {
        system_health: classify_health(total_anomalies_detected, active_machines),
        total_records_processed: total_records,
        active_machines,
        total_anomalies_detected,
        avg_co2_per_machine,
    }
}
