//! Self-monitoring of the publishing pipeline
//!
//! This module tracks how the engine itself is doing: how many ticks ran, how
//! often the input store could not be read, how many records were accepted or
//! rejected, and how fan-out to subscribers went. A stale dashboard is the only
//! visible failure mode of the engine, so these counters are what an operator
//! looks at to find out why.

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Number of tick latencies kept for the rolling average
const MAX_LATENCY_SAMPLES: usize = 100;

/// Tick latency above which a warning is logged
const SLOW_TICK_THRESHOLD: Duration = Duration::from_millis(500);

/// Point-in-time copy of the pipeline counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonitorSnapshot {
    /// Ticks that read the store successfully
    pub ticks_completed: u64,
    /// Ticks skipped because the store was unavailable
    pub source_failures: u64,
    pub records_accepted: u64,
    pub records_rejected: u64,
    /// Times the store shrank and the aggregates were rebuilt
    pub store_resets: u64,
    pub messages_delivered: u64,
    pub subscribers_dropped: u64,
    pub last_tick_latency_ms: f64,
    /// Mean over the most recent ticks
    pub avg_tick_latency_ms: f64,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct MonitorState {
    snapshot: MonitorSnapshot,
    latencies: VecDeque<Duration>,
}

/// Shared counters for the publisher and the HTTP health endpoint
///
/// Cloning is cheap and every clone observes the same counters.
#[derive(Debug, Clone, Default)]
pub struct PipelineMonitor {
    state: Arc<Mutex<MonitorState>>,
}

impl PipelineMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        // Counters stay meaningful even if a holder panicked
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a tick whose source read succeeded
    pub fn record_tick(&self, latency: Duration, accepted: u64, rejected: u64) {
        let mut state = self.lock();

        state.latencies.push_back(latency);
        while state.latencies.len() > MAX_LATENCY_SAMPLES {
            state.latencies.pop_front();
        }
        let total_ms: f64 = state
            .latencies
            .iter()
            .map(|l| l.as_secs_f64() * 1000.0)
            .sum();
        let avg_ms = total_ms / state.latencies.len() as f64;

        let snapshot = &mut state.snapshot;
        snapshot.ticks_completed += 1;
        snapshot.records_accepted += accepted;
        snapshot.records_rejected += rejected;
        snapshot.last_tick_latency_ms = latency.as_secs_f64() * 1000.0;
        snapshot.avg_tick_latency_ms = avg_ms;
        snapshot.last_tick_at = Some(Utc::now());

        if latency > SLOW_TICK_THRESHOLD {
            warn!("Slow publisher tick: {:?}", latency);
        }
        debug!(
            "Tick recorded: accepted={}, rejected={}, latency={:?}",
            accepted, rejected, latency
        );
    }

    /// Record a tick skipped because the store could not be read
    pub fn record_source_failure(&self, error: impl Into<String>) {
        let mut state = self.lock();
        state.snapshot.source_failures += 1;
        state.snapshot.last_error = Some(error.into());
    }

    pub fn record_store_reset(&self) {
        self.lock().snapshot.store_resets += 1;
    }

    /// Record the outcome of one fan-out pass
    pub fn record_delivery(&self, delivered: u64, dropped: u64) {
        let mut state = self.lock();
        state.snapshot.messages_delivered += delivered;
        state.snapshot.subscribers_dropped += dropped;
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        self.lock().snapshot.clone()
    }
}
