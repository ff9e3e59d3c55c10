//! Incremental per-machine aggregation
//!
//! This module provides the MachineAggregator, which folds every accepted reading
//! into running counts, sums and maxima keyed by machine. Memory grows with the
//! number of distinct machines, never with the number of readings: the only raw
//! data kept is the single most recent reading per machine, which the alert
//! evaluator needs for its "current" values.

use crate::events::Reading;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Running statistics for one machine
///
/// Averages are derived on demand. Temperature and vibration are averaged over
/// the readings that actually carried a value, so a malformed field does not
/// pull the mean toward zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MachineAggregate {
    pub machine_id: String,
    /// Number of readings folded in (always at least 1)
    pub count: u64,
    pub temperature_count: u64,
    pub temperature_sum: f64,
    pub temperature_max: Option<f64>,
    pub vibration_count: u64,
    pub vibration_sum: f64,
    pub vibration_max: Option<f64>,
    /// Total energy in kWh; missing values contribute nothing
    pub energy_sum: f64,
}

impl MachineAggregate {
    fn new(machine_id: String) -> Self {
        Self {
            machine_id,
            count: 0,
            temperature_count: 0,
            temperature_sum: 0.0,
            temperature_max: None,
            vibration_count: 0,
            vibration_sum: 0.0,
            vibration_max: None,
            energy_sum: 0.0,
        }
    }

    /// Fold one reading into the running values
    fn absorb(&mut self, reading: &Reading) {
        self.count += 1;

        if let Some(temperature) = reading.temperature {
            self.temperature_count += 1;
            self.temperature_sum += temperature;
            self.temperature_max = Some(running_max(self.temperature_max, temperature));
        }

        if let Some(vibration) = reading.vibration {
            self.vibration_count += 1;
            self.vibration_sum += vibration;
            self.vibration_max = Some(running_max(self.vibration_max, vibration));
        }

        if let Some(energy) = reading.energy_consumption {
            self.energy_sum += energy;
        }
    }

    /// Mean temperature, `None` if no reading carried a temperature
    pub fn avg_temperature(&self) -> Option<f64> {
        mean(self.temperature_sum, self.temperature_count)
    }

    /// Mean vibration, `None` if no reading carried a vibration
    pub fn avg_vibration(&self) -> Option<f64> {
        mean(self.vibration_sum, self.vibration_count)
    }
}

fn running_max(current: Option<f64>, value: f64) -> f64 {
    match current {
        Some(max) if max >= value => max,
        _ => value,
    }
}

fn mean(sum: f64, count: u64) -> Option<f64> {
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Aggregate plus the latest raw reading for one machine
#[derive(Debug, Clone)]
struct MachineEntry {
    aggregate: MachineAggregate,
    latest: Reading,
}

/// Owner of all per-machine running statistics
///
/// `update` is O(1) amortized. Snapshots are taken through `&self`, so a caller
/// can never observe a half-applied reading.
#[derive(Debug, Default)]
pub struct MachineAggregator {
    machines: HashMap<String, MachineEntry>,
    total_readings: u64,
}

impl MachineAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Incorporate one reading, creating the machine's aggregate if needed
    ///
    /// The latest reading is replaced when the new one is at least as recent,
    /// so equal timestamps resolve to the last write.
    pub fn update(&mut self, reading: Reading) {
        self.total_readings += 1;

        match self.machines.get_mut(&reading.machine_id) {
            Some(entry) => {
                entry.aggregate.absorb(&reading);
                if reading.sort_timestamp() >= entry.latest.sort_timestamp() {
                    entry.latest = reading;
                }
            }
            None => {
                let mut aggregate = MachineAggregate::new(reading.machine_id.clone());
                aggregate.absorb(&reading);
                self.machines.insert(
                    reading.machine_id.clone(),
                    MachineEntry {
                        aggregate,
                        latest: reading,
                    },
                );
            }
        }
    }

    /// Point-in-time copy of every aggregate, ordered by machine id
    pub fn snapshot(&self) -> BTreeMap<String, MachineAggregate> {
        self.machines
            .iter()
            .map(|(id, entry)| (id.clone(), entry.aggregate.clone()))
            .collect()
    }

    /// Most recent raw reading per machine, ordered by machine id
    pub fn latest_readings(&self) -> BTreeMap<String, Reading> {
        self.machines
            .iter()
            .map(|(id, entry)| (id.clone(), entry.latest.clone()))
            .collect()
    }

    pub fn get(&self, machine_id: &str) -> Option<&MachineAggregate> {
        self.machines.get(machine_id).map(|entry| &entry.aggregate)
    }

    /// Number of readings incorporated since creation or the last reset
    pub fn total_readings(&self) -> u64 {
        self.total_readings
    }

    pub fn machine_count(&self) -> usize {
        self.machines.len()
    }

    /// Discard all state, e.g. after the input store was truncated
    pub fn reset(&mut self) {
        self.machines.clear();
        self.total_readings = 0;
    }
}
