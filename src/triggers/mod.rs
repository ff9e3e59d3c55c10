/// Alert evaluator and anomaly rule implementations
pub mod alert_evaluator;
pub mod rules;

pub use alert_evaluator::AlertEvaluator;
pub use rules::{AnomalyRule, HighVibrationRule, TempSpikeRule};
