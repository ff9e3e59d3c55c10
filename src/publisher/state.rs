use crate::events::{Alert, EmissionRecord, StatusSnapshot};
use crate::pipeline::PipelineOutput;
use serde::Serialize;
use std::sync::{Arc, RwLock};

/// The latest values handed out to pull queries
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PublishedState {
    pub alerts: Vec<Alert>,
    pub emissions: Vec<EmissionRecord>,
    pub status: StatusSnapshot,
    /// ISO-8601 time of the last successful tick, `None` before the first one
    pub last_update: Option<String>,
}

impl PublishedState {
    pub fn from_output(output: PipelineOutput, last_update: String) -> Self {
        Self {
            alerts: output.alerts,
            emissions: output.emissions,
            status: output.status,
            last_update: Some(last_update),
        }
    }
}

/// Shared handle on the published state
///
/// The publisher tick is the only writer and swaps the whole state at once;
/// readers clone the inner `Arc` and never see a half-written update.
#[derive(Debug, Clone, Default)]
pub struct StateHandle {
    inner: Arc<RwLock<Arc<PublishedState>>>,
}

impl StateHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Arc<PublishedState> {
        let guard = self
            .inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    pub fn replace(&self, state: PublishedState) {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::new(state);
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.current().alerts.clone()
    }

    pub fn emissions(&self) -> Vec<EmissionRecord> {
        self.current().emissions.clone()
    }

    pub fn status(&self) -> StatusSnapshot {
        self.current().status.clone()
    }

    pub fn last_update(&self) -> Option<String> {
        self.current().last_update.clone()
    }
}
