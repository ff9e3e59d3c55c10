/// Raw record parsing into typed readings
pub mod reading_parser;

/// Input store abstraction and the CSV-backed implementation
pub mod csv_source;

/// Synthetic reading producer for development runs
pub mod simulator;

pub use csv_source::{CsvReadingSource, ReadingSource};
pub use reading_parser::{ingest, RawRecord};
pub use simulator::ReadingSimulator;
