use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Ux,
    Design,
    Code,
    Semantic,
    Journey,
    State,
}

impl Dimension {
    pub const ALL: [Dimension; 6] = [
        Dimension::Ux,
        Dimension::Design,
        Dimension::Code,
        Dimension::Semantic,
        Dimension::Journey,
        Dimension::State,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ux => "ux",
            Self::Design => "design",
            Self::Code => "code",
            Self::Semantic => "semantic",
            Self::Journey => "journey",
            Self::State => "state",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-dimension importance. Not required to sum to 1.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct DimensionWeights {
    pub ux: f64,
    pub design: f64,
    pub code: f64,
    pub semantic: f64,
    pub journey: f64,
    pub state: f64,
}

impl DimensionWeights {
    pub fn get(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Ux => self.ux,
            Dimension::Design => self.design,
            Dimension::Code => self.code,
            Dimension::Semantic => self.semantic,
            Dimension::Journey => self.journey,
            Dimension::State => self.state,
        }
    }

    pub fn total(&self) -> f64 {
        Dimension::ALL.iter().map(|d| self.get(*d)).sum()
    }

    /// Linear interpolation per dimension: `self * own_share + other * (1 - own_share)`.
    pub fn mix(&self, other: &Self, own_share: f64) -> Self {
        let other_share = 1.0 - own_share;
        Self {
            ux: self.ux * own_share + other.ux * other_share,
            design: self.design * own_share + other.design * other_share,
            code: self.code * own_share + other.code * other_share,
            semantic: self.semantic * own_share + other.semantic * other_share,
            journey: self.journey * own_share + other.journey * other_share,
            state: self.state * own_share + other.state * other_share,
        }
    }
}

/// Normalized per-dimension scores for one team, supplied by the telemetry pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct TeamScores {
    pub ux: f64,
    pub design: f64,
    pub code: f64,
    pub semantic: f64,
    pub journey: f64,
    pub state: f64,
}

impl TeamScores {
    pub fn get(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Ux => self.ux,
            Dimension::Design => self.design,
            Dimension::Code => self.code,
            Dimension::Semantic => self.semantic,
            Dimension::Journey => self.journey,
            Dimension::State => self.state,
        }
    }
}

/// Exploration / optimization / stabilization mixture, serialized as a 3-element array.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(transparent)]
pub struct RegimeBlend(pub [f64; 3]);

impl RegimeBlend {
    pub fn new(exploration: f64, optimization: f64, stabilization: f64) -> Self {
        Self([exploration, optimization, stabilization])
    }

    pub fn exploration(&self) -> f64 {
        self.0[0]
    }

    pub fn optimization(&self) -> f64 {
        self.0[1]
    }

    pub fn stabilization(&self) -> f64 {
        self.0[2]
    }

    pub fn mix(&self, other: &Self, own_share: f64) -> Self {
        let other_share = 1.0 - own_share;
        Self([
            self.0[0] * own_share + other.0[0] * other_share,
            self.0[1] * own_share + other.0[1] * other_share,
            self.0[2] * own_share + other.0[2] * other_share,
        ])
    }
}

/// Audit entry holding a superseded global SHM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BaselineSnapshot {
    pub shm: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commits_since_update: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GlobalBaseline {
    pub shm: f64,
    pub regime_blend: RegimeBlend,
    pub weights: DimensionWeights,
    pub commits_since_update: u64,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub history: Vec<BaselineSnapshot>,
    /// Bumped by the store on every successful save.
    #[serde(default)]
    pub version: u64,
}

impl GlobalBaseline {
    pub fn new(shm: f64, regime_blend: RegimeBlend, weights: DimensionWeights) -> Self {
        Self {
            shm,
            regime_blend,
            weights,
            commits_since_update: 0,
            last_updated: Utc::now(),
            history: Vec::new(),
            version: 0,
        }
    }

    /// Global SHM must lie in `(0, 1]` for drift percentages to be meaningful.
    pub fn has_usable_shm(&self) -> bool {
        self.shm.is_finite() && self.shm > 0.0 && self.shm <= 1.0
    }

    /// Accepts `proposed_shm` as the new global value. The superseded value is
    /// appended to history and the commit counter is reset in the same step.
    pub fn supersede(
        &mut self,
        proposed_shm: f64,
        team_id: &str,
        commit_hash: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.history.push(BaselineSnapshot {
            shm: self.shm,
            timestamp: self.last_updated,
            commit_hash,
            team_id: Some(team_id.to_string()),
            commits_since_update: Some(self.commits_since_update),
        });
        self.shm = proposed_shm;
        self.commits_since_update = 0;
        self.last_updated = now;
    }

    pub fn record_commit(&mut self) {
        self.commits_since_update = self.commits_since_update.saturating_add(1);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HarmonyThreshold {
    pub harmony: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TeamOverride {
    pub team_id: String,
    pub weights: DimensionWeights,
    pub regime_blend: RegimeBlend,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub thresholds: BTreeMap<String, HarmonyThreshold>,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub commits_since_update: u64,
}

impl TeamOverride {
    pub fn new(team_id: impl Into<String>, weights: DimensionWeights, regime_blend: RegimeBlend) -> Self {
        Self {
            team_id: team_id.into(),
            weights,
            regime_blend,
            thresholds: BTreeMap::new(),
            last_updated: Utc::now(),
            commits_since_update: 0,
        }
    }
}

/// One auto-merge attempt, accepted or not. Persisted next to the global
/// baseline so every process sees the same audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MergeLogEntry {
    pub timestamp: DateTime<Utc>,
    pub team_id: String,
    pub approved: bool,
    pub reason: String,
}

impl MergeLogEntry {
    pub fn new(team_id: &str, approved: bool, reason: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            team_id: team_id.to_string(),
            approved,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{TimeZone, Utc};

    use super::{DimensionWeights, GlobalBaseline, RegimeBlend, TeamOverride};

    pub fn global_weights() -> DimensionWeights {
        DimensionWeights {
            ux: 0.20,
            design: 0.15,
            code: 0.20,
            semantic: 0.15,
            journey: 0.15,
            state: 0.15,
        }
    }

    pub fn global_baseline() -> GlobalBaseline {
        let mut baseline =
            GlobalBaseline::new(0.82, RegimeBlend::new(0.30, 0.20, 0.50), global_weights());
        baseline.commits_since_update = 3;
        baseline.last_updated = Utc.with_ymd_and_hms(2025, 10, 1, 12, 0, 0).unwrap();
        baseline
    }

    pub fn team(team_id: &str, weights: DimensionWeights, regime: RegimeBlend) -> TeamOverride {
        let mut team = TeamOverride::new(team_id, weights, regime);
        team.last_updated = Utc.with_ymd_and_hms(2025, 10, 2, 9, 30, 0).unwrap();
        team
    }

    pub fn ux_team() -> TeamOverride {
        team(
            "team-ux",
            DimensionWeights {
                ux: 0.25,
                design: 0.30,
                code: 0.10,
                semantic: 0.10,
                journey: 0.15,
                state: 0.10,
            },
            RegimeBlend::new(0.90, 0.05, 0.05),
        )
    }

    pub fn backend_team() -> TeamOverride {
        team(
            "team-backend",
            DimensionWeights {
                ux: 0.10,
                design: 0.05,
                code: 0.30,
                semantic: 0.20,
                journey: 0.10,
                state: 0.25,
            },
            RegimeBlend::new(0.10, 0.20, 0.70),
        )
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::fixtures::global_baseline;
    use super::*;

    #[test]
    fn supersede_appends_previous_value_and_resets_counter() {
        let mut baseline = global_baseline();
        let previous_updated = baseline.last_updated;
        baseline.supersede(0.825, "team-ux", Some("abc123".to_string()), Utc::now());

        assert_eq!(baseline.shm, 0.825);
        assert_eq!(baseline.commits_since_update, 0);
        assert_eq!(baseline.history.len(), 1);
        let entry = &baseline.history[0];
        assert_eq!(entry.shm, 0.82);
        assert_eq!(entry.timestamp, previous_updated);
        assert_eq!(entry.team_id.as_deref(), Some("team-ux"));
        assert_eq!(entry.commit_hash.as_deref(), Some("abc123"));
        assert_eq!(entry.commits_since_update, Some(3));
    }

    #[test]
    fn parses_camel_case_records_without_optional_fields() {
        let raw = r#"{
            "shm": 0.82,
            "regimeBlend": [0.30, 0.20, 0.50],
            "weights": {"ux": 0.2, "design": 0.15, "code": 0.2, "semantic": 0.15, "journey": 0.15, "state": 0.15},
            "commitsSinceUpdate": 3,
            "lastUpdated": "2025-10-01T12:00:00Z",
            "history": [{"shm": 0.80, "timestamp": "2025-09-30T08:00:00Z", "teamId": "team-qa"}]
        }"#;
        let parsed: GlobalBaseline = serde_json::from_str(raw).expect("parse baseline");
        assert_eq!(parsed.regime_blend.stabilization(), 0.50);
        assert_eq!(parsed.version, 0);
        assert_eq!(parsed.history[0].commit_hash, None);
        assert_eq!(parsed.history[0].team_id.as_deref(), Some("team-qa"));
    }

    #[test]
    fn weights_mix_is_per_dimension() {
        let a = DimensionWeights {
            ux: 0.4,
            ..DimensionWeights::default()
        };
        let b = DimensionWeights {
            ux: 0.2,
            code: 1.0,
            ..DimensionWeights::default()
        };
        let mixed = a.mix(&b, 0.5);
        assert!((mixed.ux - 0.3).abs() < 1e-12);
        assert!((mixed.code - 0.5).abs() < 1e-12);
        assert_eq!(mixed.design, 0.0);
    }

    #[test]
    fn usable_shm_excludes_zero_and_out_of_range() {
        let mut baseline = global_baseline();
        assert!(baseline.has_usable_shm());
        baseline.shm = 0.0;
        assert!(!baseline.has_usable_shm());
        baseline.shm = 1.2;
        assert!(!baseline.has_usable_shm());
    }
}
