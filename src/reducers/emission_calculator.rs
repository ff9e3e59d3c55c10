use crate::aggregator::MachineAggregate;
use crate::events::EmissionRecord;
use std::collections::BTreeMap;

/// Global average grid intensity in kg CO2 per kWh
pub const DEFAULT_CO2_FACTOR: f64 = 0.475;

/// Convert accumulated energy into cumulative CO2 per machine
///
/// Records are sorted by emissions, highest first; equal values are ordered by
/// machine id so the output is stable across runs.
pub fn compute_emissions(
    aggregates: &BTreeMap<String, MachineAggregate>,
    co2_factor: f64,
) -> Vec<EmissionRecord> {
    let mut records: Vec<EmissionRecord> = aggregates
        .values()
        .map(|aggregate| EmissionRecord {
            machine_id: aggregate.machine_id.clone(),
            cumulative_co2_kg: aggregate.energy_sum * co2_factor,
        })
        .collect();

    records.sort_by(|a, b| {
        b.cumulative_co2_kg
            .total_cmp(&a.cumulative_co2_kg)
            .then_with(|| a.machine_id.cmp(&b.machine_id))
    });
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::MachineAggregator;
    use crate::events::Reading;

    fn aggregates(energy: &[(&str, f64)]) -> BTreeMap<String, MachineAggregate> {
        let mut aggregator = MachineAggregator::new();
        for (machine_id, kwh) in energy {
            aggregator.update(Reading {
                timestamp: Some(1.0),
                machine_id: machine_id.to_string(),
                temperature: None,
                vibration: None,
                energy_consumption: Some(*kwh),
            });
        }
        aggregator.snapshot()
    }

    #[test]
    fn test_co2_is_energy_times_factor() {
        let records = compute_emissions(&aggregates(&[("M1", 10.0), ("M1", 30.0)]), 0.5);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].machine_id, "M1");
        assert_eq!(records[0].cumulative_co2_kg, 20.0);
    }

    #[test]
    fn test_sorted_descending_with_id_tie_break() {
        let records = compute_emissions(
            &aggregates(&[("M3", 10.0), ("M1", 20.0), ("M2", 10.0), ("M4", 5.0)]),
            DEFAULT_CO2_FACTOR,
        );

        let order: Vec<&str> = records.iter().map(|r| r.machine_id.as_str()).collect();
        assert_eq!(order, vec!["M1", "M2", "M3", "M4"]);
    }

    #[test]
    fn test_machine_without_energy_emits_nothing() {
        let mut aggregator = MachineAggregator::new();
        aggregator.update(Reading {
            timestamp: Some(1.0),
            machine_id: "M1".to_string(),
            temperature: Some(70.0),
            vibration: None,
            energy_consumption: None,
        });

        let records = compute_emissions(&aggregator.snapshot(), DEFAULT_CO2_FACTOR);
        assert_eq!(records[0].cumulative_co2_kg, 0.0);
    }

    #[test]
    fn test_no_machines_no_records() {
        assert!(compute_emissions(&BTreeMap::new(), DEFAULT_CO2_FACTOR).is_empty());
    }
}
