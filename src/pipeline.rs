//! One pass of the aggregation engine
//!
//! The pipeline owns the aggregator and the rule set. It consumes raw records
//! from an append-only store through a cursor, so each record is folded into the
//! running statistics exactly once, and derives alerts, emissions and status
//! from the current aggregates on demand.

use crate::aggregator::MachineAggregator;
use crate::collectors::{ingest, RawRecord};
use crate::config::Config;
use crate::events::{Alert, EmissionRecord, StatusSnapshot, Timestamp};
use crate::reducers::{compute_emissions, reduce_status};
use crate::triggers::AlertEvaluator;
use log::{debug, info};

/// What one `sync` call did with the store content
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// New records that became readings
    pub accepted: u64,
    /// New records rejected by the ingestor
    pub rejected: u64,
    /// The store was truncated or replaced and the aggregates were rebuilt
    pub reset: bool,
}

/// Derived outputs of one evaluation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineOutput {
    pub alerts: Vec<Alert>,
    pub emissions: Vec<EmissionRecord>,
    pub status: StatusSnapshot,
}

pub struct Pipeline {
    aggregator: MachineAggregator,
    evaluator: AlertEvaluator,
    co2_factor: f64,
    /// Records of the store already consumed
    cursor: usize,
    /// First record seen in the store, identifies it across rotations
    first_record: Option<RawRecord>,
}

impl Pipeline {
    pub fn new(evaluator: AlertEvaluator, co2_factor: f64) -> Self {
        Self {
            aggregator: MachineAggregator::new(),
            evaluator,
            co2_factor,
            cursor: 0,
            first_record: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            AlertEvaluator::new(
                config.detection.temperature_multiplier,
                config.detection.vibration_threshold,
            ),
            config.emissions.co2_emission_factor,
        )
    }

    /// Bring the aggregates up to date with the full store content
    ///
    /// Only records past the cursor are ingested. A store with fewer records
    /// than already consumed, or whose first record differs from the one seen
    /// before, was truncated or rotated, so everything is discarded and the
    /// store is consumed again from its start.
    pub fn sync(&mut self, records: &[RawRecord]) -> SyncStats {
        let mut stats = SyncStats::default();

        if records.len() < self.cursor {
            info!(
                "Input store shrank from {} to {} records, rebuilding aggregates",
                self.cursor,
                records.len()
            );
            stats.reset = true;
        } else if self.cursor > 0 && records.first() != self.first_record.as_ref() {
            info!(
                "Input store was replaced ({} records), rebuilding aggregates",
                records.len()
            );
            stats.reset = true;
        }

        if stats.reset {
            self.aggregator.reset();
            self.cursor = 0;
        }

        for raw in &records[self.cursor..] {
            match ingest(raw) {
                Ok(reading) => {
                    self.aggregator.update(reading);
                    stats.accepted += 1;
                }
                Err(e) => {
                    debug!("Rejected record: {}", e);
                    stats.rejected += 1;
                }
            }
        }
        self.cursor = records.len();
        self.first_record = records.first().cloned();

        stats
    }

    /// Derive alerts, emissions and status from the current aggregates
    pub fn evaluate(&self, now: Timestamp) -> PipelineOutput {
        let aggregates = self.aggregator.snapshot();
        let latest = self.aggregator.latest_readings();

        let alerts = self.evaluator.evaluate_at(&aggregates, &latest, now);
        let emissions = compute_emissions(&aggregates, self.co2_factor);
        let status = reduce_status(
            self.aggregator.total_readings(),
            &aggregates,
            &alerts,
            &emissions,
        );

        PipelineOutput {
            alerts,
            emissions,
            status,
        }
    }

    pub fn aggregator(&self) -> &MachineAggregator {
        &self.aggregator
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }
}
