use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::drift::{DriftPolicy, MergeDriftResult};

/// Commit counts listed by [`threshold_table`].
pub const THRESHOLD_TABLE_COMMITS: [u64; 9] = [1, 2, 4, 8, 16, 32, 64, 100, 200];
const MAX_RECOMMENDED_COMMITS: u64 = 1_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DriftReport {
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    pub current: f64,
    pub proposed: f64,
    pub absolute_drift: f64,
    pub analysis: MergeDriftResult,
    pub recommendation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DriftScenario {
    pub baseline: f64,
    pub proposed: f64,
    pub commit_count: u64,
    #[serde(default)]
    pub team_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdRow {
    pub commits: u64,
    pub williams: f64,
    pub auto_approve: f64,
}

impl DriftPolicy {
    pub fn drift_report(
        &self,
        current: f64,
        proposed: f64,
        commits: u64,
        team_id: Option<&str>,
    ) -> DriftReport {
        let analysis = self.evaluate(current, proposed, commits);
        let recommendation = if analysis.approved {
            "AUTO-APPROVE: drift is within acceptable bounds, merge can proceed automatically."
        } else {
            "MANUAL REVIEW REQUIRED: drift exceeds the Williams threshold, cross-team impact assessment needed."
        };
        DriftReport {
            timestamp: Utc::now(),
            team_id: team_id.map(str::to_string),
            current,
            proposed,
            absolute_drift: (proposed - current).abs(),
            analysis,
            recommendation: recommendation.to_string(),
        }
    }

    pub fn batch_analyze(&self, scenarios: &[DriftScenario]) -> Vec<DriftReport> {
        scenarios
            .iter()
            .map(|s| self.drift_report(s.baseline, s.proposed, s.commit_count, s.team_id.as_deref()))
            .collect()
    }

    /// Smallest commit count whose auto-approve cutoff reaches `drift_tolerance`
    /// (in percent). Saturates at 1000.
    pub fn recommended_commit_frequency(&self, drift_tolerance: f64) -> u64 {
        (1..MAX_RECOMMENDED_COMMITS)
            .find(|t| self.auto_approve_cutoff(*t) >= drift_tolerance)
            .unwrap_or(MAX_RECOMMENDED_COMMITS)
    }

    pub fn threshold_table(&self) -> Vec<ThresholdRow> {
        THRESHOLD_TABLE_COMMITS
            .iter()
            .map(|commits| ThresholdRow {
                commits: *commits,
                williams: self.williams_threshold(*commits),
                auto_approve: self.auto_approve_cutoff(*commits),
            })
            .collect()
    }

    pub fn drift_report_markdown(&self, report: &DriftReport) -> String {
        let analysis = &report.analysis;
        let mut md = String::from("# Baseline Drift Report\n\n");
        md.push_str(&format!("**Timestamp:** {}\n", report.timestamp.to_rfc3339()));
        if let Some(team) = &report.team_id {
            md.push_str(&format!("**Team:** {team}\n"));
        }
        md.push_str("\n## Baseline Comparison\n");
        md.push_str(&format!("- **Current SHM:** {:.4}\n", report.current));
        md.push_str(&format!("- **Proposed SHM:** {:.4}\n", report.proposed));
        md.push_str(&format!("- **Absolute Drift:** {:.4}\n", report.absolute_drift));
        md.push_str(&format!("- **Drift Percentage:** {:.2}%\n", analysis.drift));
        md.push_str("\n## Williams Threshold\n");
        md.push_str("- **Formula:** √t × log₂(t) where t = commits since last update\n");
        md.push_str(&format!("- **Commit Count:** {}\n", analysis.commit_count));
        md.push_str(&format!("- **Williams Value:** {:.2}\n", analysis.williams_value));
        md.push_str(&format!(
            "- **Auto-Approve Threshold:** {:.2}% ({:.0}% of Williams value)\n",
            analysis.threshold,
            self.auto_approve_multiplier * 100.0
        ));
        md.push_str(&format!(
            "- **Auto-Approve:** {}\n",
            if analysis.approved { "YES" } else { "NO" }
        ));
        md.push_str(&format!("\n## Analysis\n{}\n", analysis.reason));
        md.push_str(&format!("\n## Recommendation\n{}\n", report.recommendation));
        md
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_carries_inputs_and_recommendation() {
        let policy = DriftPolicy::default();
        let report = policy.drift_report(0.82, 0.85, 5, Some("team-ux"));
        assert_eq!(report.team_id.as_deref(), Some("team-ux"));
        assert_eq!(report.current, 0.82);
        assert_eq!(report.proposed, 0.85);
        assert_eq!(report.analysis.commit_count, 5);
        assert!((report.absolute_drift - 0.03).abs() < 1e-9);
        assert!(!report.analysis.approved);
        assert!(report.recommendation.starts_with("MANUAL REVIEW"));
    }

    #[test]
    fn batch_preserves_scenario_order() {
        let policy = DriftPolicy::default();
        let reports = policy.batch_analyze(&[
            DriftScenario {
                baseline: 0.82,
                proposed: 0.8205,
                commit_count: 10,
                team_id: Some("team-ux".to_string()),
            },
            DriftScenario {
                baseline: 0.82,
                proposed: 0.90,
                commit_count: 10,
                team_id: None,
            },
        ]);
        assert_eq!(reports.len(), 2);
        assert!(reports[0].analysis.approved);
        assert!(!reports[1].analysis.approved);
    }

    #[test]
    fn threshold_table_matches_formula() {
        let table = DriftPolicy::default().threshold_table();
        assert_eq!(table.len(), 9);
        let t16 = table.iter().find(|row| row.commits == 16).expect("t=16 row");
        assert!((t16.williams - 16.0).abs() < 1e-9);
        assert!((t16.auto_approve - 0.8).abs() < 1e-9);
        assert_eq!(table[0].williams, 0.5);
    }

    #[test]
    fn recommended_frequency_finds_first_sufficient_count() {
        let policy = DriftPolicy::default();
        assert_eq!(policy.recommended_commit_frequency(0.8), 16);
        assert_eq!(policy.recommended_commit_frequency(0.0), 1);
        assert_eq!(policy.recommended_commit_frequency(1e6), 1_000);
    }

    #[test]
    fn markdown_mentions_decision() {
        let policy = DriftPolicy::default();
        let report = policy.drift_report(0.82, 0.821, 3, None);
        let md = policy.drift_report_markdown(&report);
        assert!(md.starts_with("# Baseline Drift Report"));
        assert!(md.contains("**Auto-Approve:** YES"));
        assert!(!md.contains("**Team:**"));
    }
}
