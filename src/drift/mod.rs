pub mod evaluator;
pub mod report;

use serde::{Deserialize, Serialize};

pub use evaluator::{drift_percent, evaluate, williams_threshold, DriftPolicy};
pub use report::{DriftReport, DriftScenario, ThresholdRow};

/// Outcome of comparing a proposed SHM against the accepted baseline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MergeDriftResult {
    pub approved: bool,
    /// Relative drift, in percent of the baseline SHM.
    pub drift: f64,
    /// Auto-approve cutoff, in percent.
    pub threshold: f64,
    pub williams_value: f64,
    pub commit_count: u64,
    pub reason: String,
}
