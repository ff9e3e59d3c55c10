use crate::aggregator::MachineAggregate;
use crate::events::{format_iso8601, timestamp_from_unix, Alert, Reading, Timestamp};
use crate::triggers::rules::{AnomalyRule, HighVibrationRule, TempSpikeRule};
use chrono::Utc;
use log::debug;
use std::collections::BTreeMap;

/// Evaluates anomaly rules against every machine aggregate
///
/// Rules are kept in precedence order: when several fire for one machine, the
/// first names the alert and decides its severity. A machine therefore yields
/// at most one alert per evaluation.
pub struct AlertEvaluator {
    rules: Vec<Box<dyn AnomalyRule>>,
}

impl Default for AlertEvaluator {
    fn default() -> Self {
        Self::new(1.2, 0.8)
    }
}

impl AlertEvaluator {
    /// Create an evaluator with the built-in rules
    ///
    /// # Arguments
    ///
    /// * `temperature_multiplier` - Peak/mean ratio above which temperature spikes
    /// * `vibration_threshold` - Peak vibration above which the machine shakes too much
    pub fn new(temperature_multiplier: f64, vibration_threshold: f64) -> Self {
        let mut evaluator = Self::with_rules(Vec::new());
        evaluator.add_rule(Box::new(TempSpikeRule::new(temperature_multiplier)));
        evaluator.add_rule(Box::new(HighVibrationRule::new(vibration_threshold)));
        evaluator
    }

    /// Create an evaluator with a custom, ordered rule set
    pub fn with_rules(rules: Vec<Box<dyn AnomalyRule>>) -> Self {
        Self { rules }
    }

    /// Append a rule with the lowest precedence so far
    pub fn add_rule(&mut self, rule: Box<dyn AnomalyRule>) {
        self.rules.push(rule);
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Evaluate all machines, stamping readings without a timestamp with now
    pub fn evaluate(
        &self,
        aggregates: &BTreeMap<String, MachineAggregate>,
        latest: &BTreeMap<String, Reading>,
    ) -> Vec<Alert> {
        self.evaluate_at(aggregates, latest, Utc::now())
    }

    /// Evaluate all machines in machine-id order
    ///
    /// The alert's current temperature, vibration and time come from the
    /// machine's most recent reading; `now` is the fallback time when that
    /// reading carries no usable timestamp.
    pub fn evaluate_at(
        &self,
        aggregates: &BTreeMap<String, MachineAggregate>,
        latest: &BTreeMap<String, Reading>,
        now: Timestamp,
    ) -> Vec<Alert> {
        let mut alerts = Vec::new();

        for (machine_id, aggregate) in aggregates {
            let Some(rule) = self.rules.iter().find(|rule| rule.evaluate(aggregate)) else {
                continue;
            };

            debug!("{} fired for machine {}", rule.name(), machine_id);

            let latest_reading = latest.get(machine_id);
            let alert_time = latest_reading
                .and_then(|reading| reading.timestamp)
                .and_then(timestamp_from_unix)
                .unwrap_or(now);

            alerts.push(Alert {
                machine_id: machine_id.clone(),
                anomaly_type: rule.anomaly_type(),
                current_temperature: latest_reading.and_then(|reading| reading.temperature),
                avg_temperature: aggregate.avg_temperature().unwrap_or(0.0),
                current_vibration: latest_reading.and_then(|reading| reading.vibration),
                alert_time: format_iso8601(alert_time),
                severity: rule.severity(aggregate),
            });
        }

        alerts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::MachineAggregator;
    use crate::events::{AnomalyType, Severity};
    use chrono::TimeZone;

    fn feed(aggregator: &mut MachineAggregator, machine_id: &str, samples: &[(f64, f64)]) {
        for (i, (temperature, vibration)) in samples.iter().enumerate() {
            aggregator.update(Reading {
                timestamp: Some(1_700_000_000.0 + i as f64),
                machine_id: machine_id.to_string(),
                temperature: Some(*temperature),
                vibration: Some(*vibration),
                energy_consumption: Some(10.0),
            });
        }
    }

    fn evaluate(aggregator: &MachineAggregator) -> Vec<Alert> {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        AlertEvaluator::default().evaluate_at(
            &aggregator.snapshot(),
            &aggregator.latest_readings(),
            now,
        )
    }

    #[test]
    fn test_temp_spike_single_alert() {
        let mut aggregator = MachineAggregator::new();
        feed(
            &mut aggregator,
            "M1",
            &[(70.0, 0.2), (70.0, 0.2), (70.0, 0.2), (100.0, 0.3)],
        );

        let alerts = evaluate(&aggregator);
        assert_eq!(alerts.len(), 1);
        let alert = &alerts[0];
        assert_eq!(alert.machine_id, "M1");
        assert_eq!(alert.anomaly_type, AnomalyType::TempSpike);
        assert_eq!(alert.severity, Severity::High);
        assert_eq!(alert.avg_temperature, 77.5);
        assert_eq!(alert.current_temperature, Some(100.0));
        assert_eq!(alert.current_vibration, Some(0.3));
        assert_eq!(alert.alert_time, "2023-11-14T22:13:23.000000Z");
    }

    #[test]
    fn test_temperature_takes_precedence_over_vibration() {
        let mut aggregator = MachineAggregator::new();
        feed(&mut aggregator, "M1", &[(70.0, 0.9), (70.0, 0.2), (100.0, 0.2)]);

        let alerts = evaluate(&aggregator);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].anomaly_type, AnomalyType::TempSpike);
    }

    #[test]
    fn test_high_vibration_medium_and_high() {
        let mut aggregator = MachineAggregator::new();
        feed(&mut aggregator, "M1", &[(70.0, 0.2), (71.0, 0.85)]);
        feed(&mut aggregator, "M2", &[(70.0, 0.2), (71.0, 0.99)]);

        let alerts = evaluate(&aggregator);
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].machine_id, "M1");
        assert_eq!(alerts[0].anomaly_type, AnomalyType::HighVibration);
        assert_eq!(alerts[0].severity, Severity::Medium);
        assert_eq!(alerts[1].machine_id, "M2");
        assert_eq!(alerts[1].severity, Severity::High);
    }

    #[test]
    fn test_quiet_machines_produce_no_alerts() {
        let mut aggregator = MachineAggregator::new();
        feed(&mut aggregator, "M1", &[(70.0, 0.2), (72.0, 0.3), (71.0, 0.25)]);
        assert!(evaluate(&aggregator).is_empty());
    }

    #[test]
    fn test_alerts_are_sorted_by_machine_id() {
        let mut aggregator = MachineAggregator::new();
        for id in ["M3", "M1", "M2"] {
            feed(&mut aggregator, id, &[(70.0, 0.95)]);
        }

        let ids: Vec<String> = evaluate(&aggregator)
            .into_iter()
            .map(|alert| alert.machine_id)
            .collect();
        assert_eq!(ids, vec!["M1", "M2", "M3"]);
    }

    #[test]
    fn test_current_values_come_from_newest_reading() {
        let mut aggregator = MachineAggregator::new();
        let mk = |ts: f64, temperature: f64, vibration: f64| Reading {
            timestamp: Some(ts),
            machine_id: "M1".to_string(),
            temperature: Some(temperature),
            vibration: Some(vibration),
            energy_consumption: None,
        };
        aggregator.update(mk(20.0, 71.0, 0.3));
        aggregator.update(mk(10.0, 70.0, 0.95)); // arrives late with the spike

        let alerts = evaluate(&aggregator);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].current_temperature, Some(71.0));
        assert_eq!(alerts[0].current_vibration, Some(0.3));
        assert_eq!(alerts[0].alert_time, "1970-01-01T00:00:20.000000Z");
    }

    #[test]
    fn test_missing_timestamp_falls_back_to_now() {
        let mut aggregator = MachineAggregator::new();
        aggregator.update(Reading {
            timestamp: None,
            machine_id: "M1".to_string(),
            temperature: Some(70.0),
            vibration: Some(0.9),
            energy_consumption: None,
        });

        let alerts = evaluate(&aggregator);
        assert_eq!(alerts[0].alert_time, "2024-01-01T00:00:00.000000Z");
    }

    #[test]
    fn test_custom_thresholds() {
        let mut aggregator = MachineAggregator::new();
        feed(&mut aggregator, "M1", &[(70.0, 0.2), (71.0, 0.65)]);

        let strict = AlertEvaluator::new(1.1, 0.6);
        let alerts = strict.evaluate(&aggregator.snapshot(), &aggregator.latest_readings());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].anomaly_type, AnomalyType::HighVibration);
        assert_eq!(strict.rule_count(), 2);
    }

    #[test]
    fn test_empty_rule_set_never_alerts() {
        let mut aggregator = MachineAggregator::new();
        feed(&mut aggregator, "M1", &[(70.0, 0.99), (140.0, 0.99)]);

        let evaluator = AlertEvaluator::with_rules(Vec::new());
        let alerts = evaluator.evaluate(&aggregator.snapshot(), &aggregator.latest_readings());
        assert!(alerts.is_empty());
    }
}
