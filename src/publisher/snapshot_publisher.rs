//! Tick-driven snapshot publisher
//!
//! Each tick re-reads the input store, brings the pipeline up to date, swaps
//! the published state and notifies subscribers of the categories whose value
//! changed since they were last published. A tick whose store read fails
//! publishes nothing and leaves the previous state (and `last_update`) as is.

use crate::collectors::ReadingSource;
use crate::error::WorkerError;
use crate::events::format_iso8601;
use crate::monitoring::PipelineMonitor;
use crate::pipeline::{Pipeline, PipelineOutput};
use crate::publisher::state::{PublishedState, StateHandle};
use crate::publisher::subscribers::{Category, PublishedMessage, SubscriberRegistry};
use chrono::Utc;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Result of a single tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The store was read and the state replaced
    Published {
        /// Categories pushed to subscribers, in publication order
        changed: Vec<Category>,
        delivered: u64,
        dropped: u64,
    },
    /// The store could not be read; nothing changed
    SourceUnavailable,
}

pub struct SnapshotPublisher {
    source: Box<dyn ReadingSource>,
    pipeline: Pipeline,
    state: StateHandle,
    subscribers: SubscriberRegistry,
    monitor: PipelineMonitor,
    /// Canonical form of the value last pushed per category
    last_published: HashMap<Category, serde_json::Value>,
}

impl SnapshotPublisher {
    pub fn new(
        source: Box<dyn ReadingSource>,
        pipeline: Pipeline,
        state: StateHandle,
        subscribers: SubscriberRegistry,
        monitor: PipelineMonitor,
    ) -> Self {
        Self {
            source,
            pipeline,
            state,
            subscribers,
            monitor,
            last_published: HashMap::new(),
        }
    }

    pub fn state(&self) -> &StateHandle {
        &self.state
    }

    pub fn subscribers(&self) -> &SubscriberRegistry {
        &self.subscribers
    }

    /// Run one Idle -> Publishing -> Idle cycle
    pub fn tick(&mut self) -> TickOutcome {
        let started = Instant::now();

        let records = match self.source.read_all() {
            Ok(records) => records,
            Err(e) => {
                warn!("Skipping tick, {} unreadable: {}", self.source.describe(), e);
                self.monitor.record_source_failure(e.to_string());
                return TickOutcome::SourceUnavailable;
            }
        };

        let stats = self.pipeline.sync(&records);
        if stats.reset {
            self.monitor.record_store_reset();
        }

        let now = Utc::now();
        let last_update = format_iso8601(now);
        let output = self.pipeline.evaluate(now);
        let changes = self.detect_changes(&output);

        self.state
            .replace(PublishedState::from_output(output, last_update.clone()));

        let mut changed = Vec::with_capacity(changes.len());
        let mut delivered = 0;
        let mut dropped = 0;
        for (category, data) in changes {
            let message = PublishedMessage {
                kind: category,
                data,
                last_update: last_update.clone(),
            };
            let report = self.subscribers.broadcast(&message);
            delivered += report.delivered;
            dropped += report.dropped;
            changed.push(category);
        }

        if !changed.is_empty() {
            debug!(
                "Published {:?} to {} subscriber queue(s)",
                changed, delivered
            );
        }

        self.monitor.record_delivery(delivered, dropped);
        self.monitor
            .record_tick(started.elapsed(), stats.accepted, stats.rejected);

        TickOutcome::Published {
            changed,
            delivered,
            dropped,
        }
    }

    /// Categories whose value differs from the last one pushed
    ///
    /// Values are compared as JSON trees, so object key order never counts as
    /// a change. The remembered values are updated as a side effect.
    fn detect_changes(&mut self, output: &PipelineOutput) -> Vec<(Category, serde_json::Value)> {
        let mut changes = Vec::new();

        for category in Category::ALL {
            let serialized = match category {
                Category::Alerts => serde_json::to_value(&output.alerts),
                Category::Emissions => serde_json::to_value(&output.emissions),
                Category::Status => serde_json::to_value(&output.status),
            };
            let value = match serialized {
                Ok(value) => value,
                Err(e) => {
                    error!("Failed to serialize {}: {}", category.as_str(), e);
                    continue;
                }
            };

            if self.last_published.get(&category) != Some(&value) {
                self.last_published.insert(category, value.clone());
                changes.push((category, value));
            }
        }

        changes
    }
}

/// Background thread driving a `SnapshotPublisher` at a fixed cadence
pub struct PublisherService {
    thread_handle: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
}

impl PublisherService {
    /// Start ticking every `interval`
    ///
    /// The first tick runs immediately. A tick that overruns the interval is
    /// followed by the next one right away rather than a burst of catch-up ticks.
    ///
    /// # Errors
    ///
    /// Returns `WorkerError::SpawnFailed` if the thread cannot be created.
    pub fn start(publisher: SnapshotPublisher, interval: Duration) -> Result<Self, WorkerError> {
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);

        let handle = thread::Builder::new()
            .name("snapshot-publisher".to_string())
            .spawn(move || Self::publisher_thread(publisher, interval, thread_running))
            .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;

        info!("Snapshot publisher started, interval {:?}", interval);
        Ok(Self {
            thread_handle: Some(handle),
            running,
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop after the current tick and wait for the thread
    pub fn stop(&mut self) -> Result<(), WorkerError> {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            handle
                .join()
                .map_err(|_| WorkerError::JoinFailed("snapshot-publisher".to_string()))?;
            info!("Snapshot publisher stopped");
        }
        Ok(())
    }

    fn publisher_thread(
        mut publisher: SnapshotPublisher,
        interval: Duration,
        running: Arc<AtomicBool>,
    ) {
        let sleep_step = Duration::from_millis(50);
        let mut next_tick = Instant::now();

        while running.load(Ordering::SeqCst) {
            let now = Instant::now();
            if now < next_tick {
                thread::sleep(std::cmp::min(next_tick - now, sleep_step));
                continue;
            }

            publisher.tick();

            next_tick += interval;
            let after = Instant::now();
            if next_tick < after {
                // overran: skip the missed ticks
                next_tick = after;
            }
        }
    }
}

impl Drop for PublisherService {
    fn drop(&mut self) {
        if self.is_running() {
            if let Err(e) = self.stop() {
                warn!("Failed to stop publisher on drop: {}", e);
            }
        }
    }
}
