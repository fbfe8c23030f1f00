pub mod builder;
pub mod markdown;
pub mod writer;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::governor::MergeLogEntry;
use crate::regime::{MismatchSeverity, Regime, TeamRegime};

pub use builder::{CrossTeamReporter, ReportSettings};
pub use markdown::to_markdown;
pub use writer::{save_report, SavedReport};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    pub shm: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrendAnalysis {
    /// Most recent history entries followed by the current value.
    pub recent_commits: Vec<TrendPoint>,
    pub average_shm: f64,
    /// Population standard deviation over `recent_commits`.
    pub volatility: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TeamContribution {
    pub team_id: String,
    pub current_shm: f64,
    /// Weight-mass share relative to the global weights, in percent.
    pub contribution: f64,
    pub regime: Regime,
    pub last_update: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DriftAlert {
    pub team_id: String,
    pub timestamp: DateTime<Utc>,
    pub drift: f64,
    pub threshold: f64,
    pub approved: bool,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegimeMismatch {
    pub teams: Vec<TeamRegime>,
    pub severity: MismatchSeverity,
    pub recommendation: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    MergeFreeze,
    Instability,
    RegimeConflict,
    StabilizationFocus,
    ExplorationInvestment,
    AllNominal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    pub kind: RecommendationKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CrossTeamReport {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "globalSHM")]
    pub global_shm: f64,
    pub trend_analysis: TrendAnalysis,
    pub team_contributions: Vec<TeamContribution>,
    pub drift_alerts: Vec<DriftAlert>,
    pub regime_mismatches: Vec<RegimeMismatch>,
    pub merge_log: Vec<MergeLogEntry>,
    pub recommendations: Vec<Recommendation>,
}
