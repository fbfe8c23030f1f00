use serde::{Deserialize, Serialize};

use crate::drift::MergeDriftResult;

/// Tolerance granted to the first commit after a reset, where `√1 × log₂(1)`
/// would otherwise be zero.
pub const FIRST_COMMIT_THRESHOLD: f64 = 0.5;
/// Share of the Williams value used as the auto-approve cutoff (in percent).
pub const AUTO_APPROVE_MULTIPLIER: f64 = 0.05;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DriftPolicy {
    #[serde(default = "default_first_commit_threshold")]
    pub first_commit_threshold: f64,
    #[serde(default = "default_auto_approve_multiplier")]
    pub auto_approve_multiplier: f64,
}

impl Default for DriftPolicy {
    fn default() -> Self {
        Self {
            first_commit_threshold: FIRST_COMMIT_THRESHOLD,
            auto_approve_multiplier: AUTO_APPROVE_MULTIPLIER,
        }
    }
}

impl DriftPolicy {
    /// `√t × log₂(t)`, with no tolerance at `t = 0` and the first-commit floor at `t = 1`.
    pub fn williams_threshold(&self, commits: u64) -> f64 {
        match commits {
            0 => 0.0,
            1 => self.first_commit_threshold,
            t => {
                let t = t as f64;
                t.sqrt() * t.log2()
            }
        }
    }

    pub fn auto_approve_cutoff(&self, commits: u64) -> f64 {
        self.williams_threshold(commits) * self.auto_approve_multiplier
    }

    pub fn evaluate(&self, baseline_shm: f64, proposed_shm: f64, commits: u64) -> MergeDriftResult {
        let drift = drift_percent(baseline_shm, proposed_shm);
        let williams_value = self.williams_threshold(commits);
        let threshold = williams_value * self.auto_approve_multiplier;
        // Strict: a drift equal to the cutoff still needs review. NaN never passes.
        let approved = drift < threshold;

        let reason = if approved {
            format!(
                "Drift {drift:.2}% is within auto-approve threshold {threshold:.2}% (√{commits} × log₂({commits}) × {:.0}%)",
                self.auto_approve_multiplier * 100.0
            )
        } else {
            format!(
                "Drift {drift:.2}% exceeds auto-approve threshold {threshold:.2}% after {commits} commits - manual review required"
            )
        };

        MergeDriftResult {
            approved,
            drift,
            threshold,
            williams_value,
            commit_count: commits,
            reason,
        }
    }
}

/// Relative change in percent. A zero baseline yields an infinite (or NaN) value.
pub fn drift_percent(baseline_shm: f64, proposed_shm: f64) -> f64 {
    (proposed_shm - baseline_shm).abs() / baseline_shm * 100.0
}

pub fn williams_threshold(commits: u64) -> f64 {
    DriftPolicy::default().williams_threshold(commits)
}

pub fn evaluate(baseline_shm: f64, proposed_shm: f64, commits: u64) -> MergeDriftResult {
    DriftPolicy::default().evaluate(baseline_shm, proposed_shm, commits)
}

fn default_first_commit_threshold() -> f64 {
    FIRST_COMMIT_THRESHOLD
}

fn default_auto_approve_multiplier() -> f64 {
    AUTO_APPROVE_MULTIPLIER
}
