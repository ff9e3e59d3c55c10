/// Cumulative CO2 estimates per machine
pub mod emission_calculator;

/// Fleet-wide health classification
pub mod status_reducer;

pub use emission_calculator::{compute_emissions, DEFAULT_CO2_FACTOR};
pub use status_reducer::{classify_health, reduce_status};
