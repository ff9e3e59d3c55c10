/// Error types for ingestion, sources, configuration and transport
pub mod error;

/// Core data types: readings, alerts, emissions, status
pub mod events;

/// Raw record parsing, the CSV source and the reading simulator
pub mod collectors;

/// Incremental per-machine aggregation
pub mod aggregator;

/// Anomaly rules and the alert evaluator
pub mod triggers;

/// Emission and status reducers
pub mod reducers;

/// One evaluation pass over the aggregates
pub mod pipeline;

/// Change detection and subscriber fan-out
pub mod publisher;

/// HTTP and SSE transport
pub mod server;

/// Configuration management
pub mod config;

/// Self-monitoring of the publishing pipeline
pub mod monitoring;

// Re-export commonly used types
pub use error::{ConfigError, IngestError, ServerError, SourceError, WorkerError};
pub use pipeline::{Pipeline, PipelineOutput};
pub use publisher::{SnapshotPublisher, StateHandle, SubscriberRegistry};
