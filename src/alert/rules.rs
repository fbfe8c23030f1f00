use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlertEventKind {
    MergeRejected,
    DriftSpike,
    RegimeMismatch,
}

impl AlertEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MergeRejected => "merge_rejected",
            Self::DriftSpike => "drift_spike",
            Self::RegimeMismatch => "regime_mismatch",
        }
    }
}

/// Per-kind switches, read from `[alerts.rules]`. Every kind is on unless disabled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AlertRules {
    pub merge_rejected: bool,
    pub drift_spike: bool,
    pub regime_mismatch: bool,
}

impl Default for AlertRules {
    fn default() -> Self {
        Self {
            merge_rejected: true,
            drift_spike: true,
            regime_mismatch: true,
        }
    }
}

impl AlertRules {
    pub fn allows(&self, kind: AlertEventKind) -> bool {
        match kind {
            AlertEventKind::MergeRejected => self.merge_rejected,
            AlertEventKind::DriftSpike => self.drift_spike,
            AlertEventKind::RegimeMismatch => self.regime_mismatch,
        }
    }
}
