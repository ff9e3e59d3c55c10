/// Published state shared with pull queries
pub mod state;

/// Subscriber registry and change messages
pub mod subscribers;

/// Tick loop detecting and pushing category changes
pub mod snapshot_publisher;

pub use snapshot_publisher::{PublisherService, SnapshotPublisher, TickOutcome};
pub use state::{PublishedState, StateHandle};
pub use subscribers::{
    BroadcastReport, Category, PublishedMessage, SubscriberRegistry, Subscription,
};
