/// Incremental per-machine statistics
pub mod machine_aggregator;

pub use machine_aggregator::{MachineAggregate, MachineAggregator};
