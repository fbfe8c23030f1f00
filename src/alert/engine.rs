use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::alert::rules::{AlertEventKind, AlertRules};
use crate::alert::sink::AlertSink;
use crate::drift::MergeDriftResult;
use crate::report::CrossTeamReport;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub kind: AlertEventKind,
    pub timestamp: DateTime<Utc>,
    pub title: String,
    pub body: String,
}

impl AlertEvent {
    pub fn new(kind: AlertEventKind, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            title: title.into(),
            body: body.into(),
        }
    }
}

pub fn merge_rejected(team_id: &str, result: &MergeDriftResult) -> AlertEvent {
    AlertEvent::new(
        AlertEventKind::MergeRejected,
        format!("Merge from {team_id} rejected"),
        result.reason.clone(),
    )
}

/// Alerts worth raising from a freshly built report.
pub fn report_alerts(report: &CrossTeamReport) -> Vec<AlertEvent> {
    let mut events = Vec::new();

    for alert in &report.drift_alerts {
        events.push(AlertEvent::new(
            AlertEventKind::DriftSpike,
            format!("Baseline swing of {:.2}% attributed to {}", alert.drift, alert.team_id),
            format!(
                "{} (would auto-approve: {})",
                alert.reason,
                if alert.approved { "yes" } else { "no" }
            ),
        ));
    }

    for mismatch in &report.regime_mismatches {
        let teams = mismatch
            .teams
            .iter()
            .map(|t| format!("{}: {}", t.team_id, t.regime))
            .collect::<Vec<_>>()
            .join(", ");
        events.push(AlertEvent::new(
            AlertEventKind::RegimeMismatch,
            format!("Regime mismatch ({} severity)", mismatch.severity),
            format!("{teams}. {}", mismatch.recommendation),
        ));
    }

    events
}

/// Sends each allowed event to every sink. Sink failures are logged, never returned.
pub async fn dispatch(sinks: &[std::sync::Arc<dyn AlertSink>], rules: &AlertRules, events: &[AlertEvent]) {
    for event in events.iter().filter(|e| rules.allows(e.kind)) {
        for sink in sinks {
            if let Err(err) = sink.send(event).await {
                warn!("failed sending alert: {err}");
            }
        }
    }
}
