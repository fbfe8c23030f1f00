use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::baseline::RegimeBlend;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    Exploration,
    Optimization,
    Stabilization,
}

impl Regime {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exploration => "exploration",
            Self::Optimization => "optimization",
            Self::Stabilization => "stabilization",
        }
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown regime: {0}")]
pub struct RegimeParseError(pub String);

impl FromStr for Regime {
    type Err = RegimeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exploration" => Ok(Self::Exploration),
            "optimization" => Ok(Self::Optimization),
            "stabilization" => Ok(Self::Stabilization),
            _ => Err(RegimeParseError(s.to_string())),
        }
    }
}

/// The one regime classifier: argmax of the blend triple. The triple is not
/// normalized; ties go to exploration, then optimization.
pub fn classify(blend: &RegimeBlend) -> Regime {
    let max = blend
        .exploration()
        .max(blend.optimization())
        .max(blend.stabilization());
    if blend.exploration() == max {
        Regime::Exploration
    } else if blend.optimization() == max {
        Regime::Optimization
    } else {
        Regime::Stabilization
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TeamRegime {
    pub team_id: String,
    pub regime: Regime,
}

impl TeamRegime {
    pub fn new(team_id: impl Into<String>, regime: Regime) -> Self {
        Self {
            team_id: team_id.into(),
            regime,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegimeCheck {
    pub mismatch: bool,
    pub details: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum MismatchSeverity {
    Low,
    Medium,
    High,
}

impl MismatchSeverity {
    pub fn recommendation(self) -> &'static str {
        match self {
            Self::High => "Critical: teams are in opposing regimes. Coordinate sprint planning to align objectives.",
            Self::Medium => "Moderate: multiple regimes active. Consider staggering feature releases.",
            Self::Low => "Low impact: adjacent regimes active. Monitor for alignment opportunities.",
        }
    }
}

impl fmt::Display for MismatchSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        };
        f.write_str(label)
    }
}

pub fn check_regime_mismatch(teams: &[TeamRegime]) -> RegimeCheck {
    if teams.len() < 2 {
        return RegimeCheck {
            mismatch: false,
            details: "Not enough teams to compare".to_string(),
        };
    }

    if distinct_regimes(teams).len() > 1 {
        let details = teams
            .iter()
            .map(|t| format!("{}: {}", t.team_id, t.regime))
            .collect::<Vec<_>>()
            .join(", ");
        return RegimeCheck {
            mismatch: true,
            details: format!("Regime mismatch detected - {details}"),
        };
    }

    RegimeCheck {
        mismatch: false,
        details: "All teams in sync".to_string(),
    }
}

/// `None` when every team shares one regime.
pub fn mismatch_severity(teams: &[TeamRegime]) -> Option<MismatchSeverity> {
    let regimes = distinct_regimes(teams);
    if regimes.len() <= 1 {
        return None;
    }
    let severity = if regimes.contains(&Regime::Exploration) && regimes.contains(&Regime::Stabilization) {
        MismatchSeverity::High
    } else if regimes.len() == 3 {
        MismatchSeverity::Medium
    } else {
        MismatchSeverity::Low
    };
    Some(severity)
}

fn distinct_regimes(teams: &[TeamRegime]) -> BTreeSet<Regime> {
    teams.iter().map(|t| t.regime).collect()
}
