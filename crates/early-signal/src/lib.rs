//! In-flight campaign analysis from early telemetry.

pub mod analyzer;
pub mod rules;
pub mod types;

pub use analyzer::{EarlySignalAnalyzer, EARLY_FEATURE_NAMES};
pub use types::{
    EarlyMetricsSnapshot, EarlyPrediction, LabeledSnapshot, Recommendation, SignalWarning,
    SuccessCategory,
};
