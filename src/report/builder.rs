use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::baseline::{GlobalBaseline, TeamOverride};
use crate::blend::BlendEngine;
use crate::drift::{drift_percent, DriftPolicy};
use crate::governor::MergeLogEntry;
use crate::regime::{mismatch_severity, MismatchSeverity, TeamRegime};
use crate::report::{
    CrossTeamReport, DriftAlert, Recommendation, RecommendationKind, RegimeMismatch,
    TeamContribution, TrendAnalysis, TrendPoint,
};
use crate::store::{BaselineStore, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportSettings {
    #[serde(default = "default_trend_window")]
    pub trend_window: usize,
    /// History swings above this percentage become drift alerts.
    #[serde(default = "default_alert_drift_pct")]
    pub alert_drift_pct: f64,
    #[serde(default = "default_freeze_alert_count")]
    pub freeze_alert_count: usize,
    #[serde(default = "default_volatility_limit")]
    pub volatility_limit: f64,
    #[serde(default = "default_low_shm")]
    pub low_shm: f64,
    #[serde(default = "default_high_shm")]
    pub high_shm: f64,
    /// Newest merge log entries carried into a report.
    #[serde(default = "default_merge_log_limit")]
    pub merge_log_limit: usize,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            trend_window: default_trend_window(),
            alert_drift_pct: default_alert_drift_pct(),
            freeze_alert_count: default_freeze_alert_count(),
            volatility_limit: default_volatility_limit(),
            low_shm: default_low_shm(),
            high_shm: default_high_shm(),
            merge_log_limit: default_merge_log_limit(),
        }
    }
}

/// Read-only aggregation over the global baseline, team overrides and merge log.
#[derive(Debug, Clone, Default)]
pub struct CrossTeamReporter {
    pub policy: DriftPolicy,
    pub blend: BlendEngine,
    pub settings: ReportSettings,
}

impl CrossTeamReporter {
    pub fn new(policy: DriftPolicy, blend: BlendEngine, settings: ReportSettings) -> Self {
        Self {
            policy,
            blend,
            settings,
        }
    }

    /// Loads the global baseline, the listed teams and the merge log, then
    /// builds the report. A listed team without an override record is skipped.
    pub async fn generate_report<S>(
        &self,
        store: &S,
        team_ids: &[String],
    ) -> Result<CrossTeamReport, StoreError>
    where
        S: BaselineStore + ?Sized,
    {
        let global = store.load_global().await?;
        let mut teams = Vec::with_capacity(team_ids.len());
        for team_id in team_ids {
            match store.load_team(team_id).await {
                Ok(team) => teams.push(team),
                Err(err) if err.is_not_found() => {
                    warn!(team = team_id.as_str(), "no override record, team left out of report");
                }
                Err(err) => return Err(err),
            }
        }
        let merge_log = store.load_merge_log().await?;
        let report = self.build(&global, &teams, &merge_log);
        info!(
            teams = report.team_contributions.len(),
            alerts = report.drift_alerts.len(),
            "cross-team report generated"
        );
        Ok(report)
    }

    pub fn build(
        &self,
        global: &GlobalBaseline,
        teams: &[TeamOverride],
        merge_log: &[MergeLogEntry],
    ) -> CrossTeamReport {
        let trend_analysis = self.analyze_trend(global);
        let team_contributions = self.analyze_contributions(global, teams);
        let drift_alerts = self.analyze_drift_alerts(global);
        let regime_mismatches = self.analyze_regime_mismatches(global, teams);
        let recommendations =
            self.recommendations(&drift_alerts, &regime_mismatches, &trend_analysis);

        CrossTeamReport {
            timestamp: chrono::Utc::now(),
            global_shm: global.shm,
            trend_analysis,
            team_contributions,
            drift_alerts,
            regime_mismatches,
            merge_log: merge_log[merge_log.len().saturating_sub(self.settings.merge_log_limit)..]
                .to_vec(),
            recommendations,
        }
    }

    pub fn analyze_trend(&self, global: &GlobalBaseline) -> TrendAnalysis {
        let skip = global.history.len().saturating_sub(self.settings.trend_window);
        let mut recent_commits: Vec<TrendPoint> = global.history[skip..]
            .iter()
            .map(|h| TrendPoint {
                shm: h.shm,
                timestamp: h.timestamp,
                team_id: h.team_id.clone(),
            })
            .collect();
        recent_commits.push(TrendPoint {
            shm: global.shm,
            timestamp: global.last_updated,
            team_id: None,
        });

        let n = recent_commits.len() as f64;
        let average_shm = recent_commits.iter().map(|p| p.shm).sum::<f64>() / n;
        let variance = recent_commits
            .iter()
            .map(|p| (p.shm - average_shm).powi(2))
            .sum::<f64>()
            / n;

        TrendAnalysis {
            recent_commits,
            average_shm,
            volatility: variance.sqrt(),
        }
    }

    pub fn analyze_contributions(
        &self,
        global: &GlobalBaseline,
        teams: &[TeamOverride],
    ) -> Vec<TeamContribution> {
        let global_weight = global.weights.total();
        teams
            .iter()
            .map(|team| {
                let share = if global_weight > 0.0 {
                    team.weights.total() / global_weight
                } else {
                    0.0
                };
                TeamContribution {
                    team_id: team.team_id.clone(),
                    current_shm: share * global.shm,
                    contribution: share * 100.0,
                    regime: self.blend.team_regime(global, Some(team), &team.team_id).regime,
                    last_update: team.last_updated,
                }
            })
            .collect()
    }

    /// Replays consecutive history pairs. The earlier snapshot of a pair was
    /// superseded by the merge that produced the swing, so its team and commit
    /// count describe that merge.
    pub fn analyze_drift_alerts(&self, global: &GlobalBaseline) -> Vec<DriftAlert> {
        global
            .history
            .windows(2)
            .filter_map(|pair| {
                let (prev, current) = (&pair[0], &pair[1]);
                let drift = drift_percent(prev.shm, current.shm);
                if !(drift > self.settings.alert_drift_pct) {
                    return None;
                }
                let commits = prev
                    .commits_since_update
                    .unwrap_or(global.commits_since_update);
                let analysis = self.policy.evaluate(prev.shm, current.shm, commits);
                Some(DriftAlert {
                    team_id: prev
                        .team_id
                        .clone()
                        .unwrap_or_else(|| "unknown".to_string()),
                    timestamp: current.timestamp,
                    drift,
                    threshold: analysis.threshold,
                    approved: analysis.approved,
                    reason: analysis.reason,
                })
            })
            .collect()
    }

    pub fn analyze_regime_mismatches(
        &self,
        global: &GlobalBaseline,
        teams: &[TeamOverride],
    ) -> Vec<RegimeMismatch> {
        let regimes: Vec<TeamRegime> = teams
            .iter()
            .map(|team| self.blend.team_regime(global, Some(team), &team.team_id))
            .collect();
        match mismatch_severity(&regimes) {
            Some(severity) => vec![RegimeMismatch {
                teams: regimes,
                severity,
                recommendation: severity.recommendation().to_string(),
            }],
            None => Vec::new(),
        }
    }

    pub fn recommendations(
        &self,
        drift_alerts: &[DriftAlert],
        mismatches: &[RegimeMismatch],
        trend: &TrendAnalysis,
    ) -> Vec<Recommendation> {
        let settings = &self.settings;
        let mut out = Vec::new();

        if drift_alerts.len() > settings.freeze_alert_count {
            out.push(Recommendation {
                kind: RecommendationKind::MergeFreeze,
                message: format!(
                    "High drift frequency detected ({} alerts). Consider a baseline freeze or coordinated merge windows.",
                    drift_alerts.len()
                ),
            });
        }

        if trend.volatility > settings.volatility_limit {
            out.push(Recommendation {
                kind: RecommendationKind::Instability,
                message: format!(
                    "High SHM volatility ({:.3}). Investigate unstable components.",
                    trend.volatility
                ),
            });
        }

        for mismatch in mismatches {
            if mismatch.severity >= MismatchSeverity::Medium {
                out.push(Recommendation {
                    kind: RecommendationKind::RegimeConflict,
                    message: mismatch.recommendation.clone(),
                });
            }
        }

        if trend.average_shm < settings.low_shm {
            out.push(Recommendation {
                kind: RecommendationKind::StabilizationFocus,
                message: format!(
                    "Below target SHM ({:.2} < {:.2}). Focus on the stabilization regime.",
                    trend.average_shm, settings.low_shm
                ),
            });
        } else if trend.average_shm > settings.high_shm {
            out.push(Recommendation {
                kind: RecommendationKind::ExplorationInvestment,
                message: format!(
                    "Excellent SHM ({:.2}). Consider exploration initiatives.",
                    trend.average_shm
                ),
            });
        }

        if out.is_empty() {
            out.push(Recommendation {
                kind: RecommendationKind::AllNominal,
                message: "All systems nominal. Continue current development patterns.".to_string(),
            });
        }
        out
    }
}

fn default_trend_window() -> usize {
    10
}

fn default_alert_drift_pct() -> f64 {
    5.0
}

fn default_freeze_alert_count() -> usize {
    3
}

fn default_volatility_limit() -> f64 {
    0.05
}

fn default_low_shm() -> f64 {
    0.75
}

fn default_high_shm() -> f64 {
    0.90
}

fn default_merge_log_limit() -> usize {
    50
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::baseline::fixtures::{backend_team, global_baseline, ux_team};
    use crate::baseline::BaselineSnapshot;
    use crate::regime::Regime;
    use crate::store::MemoryStore;

    fn snapshot(shm: f64, minutes: i64, team: &str, commits: Option<u64>) -> BaselineSnapshot {
        BaselineSnapshot {
            shm,
            timestamp: Utc.with_ymd_and_hms(2025, 9, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes),
            commit_hash: None,
            team_id: Some(team.to_string()),
            commits_since_update: commits,
        }
    }

    #[test]
    fn trend_uses_last_window_plus_current() {
        let mut global = global_baseline();
        for i in 0..15 {
            global.history.push(snapshot(0.5 + i as f64 * 0.01, i, "team-ux", None));
        }
        let trend = CrossTeamReporter::default().analyze_trend(&global);
        assert_eq!(trend.recent_commits.len(), 11);
        assert!((trend.recent_commits[0].shm - 0.55).abs() < 1e-12);
        assert_eq!(trend.recent_commits.last().map(|p| p.shm), Some(0.82));

        let expected_avg = trend.recent_commits.iter().map(|p| p.shm).sum::<f64>() / 11.0;
        assert!((trend.average_shm - expected_avg).abs() < 1e-12);
    }

    #[test]
    fn trend_with_no_history_is_flat() {
        let trend = CrossTeamReporter::default().analyze_trend(&global_baseline());
        assert_eq!(trend.recent_commits.len(), 1);
        assert_eq!(trend.average_shm, 0.82);
        assert_eq!(trend.volatility, 0.0);
    }

    #[test]
    fn volatility_is_population_std_dev() {
        let mut global = global_baseline();
        global.shm = 0.9;
        global.history.push(snapshot(0.7, 0, "team-ux", None));
        let trend = CrossTeamReporter::default().analyze_trend(&global);
        assert!((trend.average_shm - 0.8).abs() < 1e-12);
        assert!((trend.volatility - 0.1).abs() < 1e-12);
    }

    #[test]
    fn contribution_is_weight_mass_share() {
        let global = global_baseline();
        let mut team = ux_team();
        team.weights.ux += 0.5;
        let contributions = CrossTeamReporter::default().analyze_contributions(&global, &[team]);
        let c = &contributions[0];
        assert!((c.contribution - 150.0).abs() < 1e-9);
        assert!((c.current_shm - 1.5 * 0.82).abs() < 1e-9);
        assert_eq!(c.regime, Regime::Exploration);
    }

    #[test]
    fn drift_alerts_flag_large_swings_only() {
        let mut global = global_baseline();
        global.commits_since_update = 0;
        global.history = vec![
            snapshot(0.80, 0, "team-ux", Some(4)),
            snapshot(0.81, 10, "team-backend", Some(100)),
            snapshot(0.90, 20, "team-qa", Some(2)),
        ];
        let alerts = CrossTeamReporter::default().analyze_drift_alerts(&global);
        assert_eq!(alerts.len(), 1);
        let alert = &alerts[0];
        assert_eq!(alert.team_id, "team-backend");
        assert_eq!(alert.timestamp, global.history[2].timestamp);
        assert!((alert.drift - 11.111).abs() < 1e-2);
        // 100 commits: cutoff ~3.32%, still below an 11% swing.
        assert!(!alert.approved);
        assert!((alert.threshold - 3.3219).abs() < 1e-3);
    }

    #[test]
    fn drift_alerts_fall_back_to_global_counter() {
        let mut global = global_baseline();
        global.commits_since_update = 1_000_000;
        global.history = vec![
            snapshot(0.80, 0, "team-ux", None),
            snapshot(0.85, 10, "team-ux", None),
        ];
        let alerts = CrossTeamReporter::default().analyze_drift_alerts(&global);
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].approved);
    }

    #[test]
    fn opposing_team_regimes_are_high_severity() {
        let reporter = CrossTeamReporter::default();
        let mismatches =
            reporter.analyze_regime_mismatches(&global_baseline(), &[ux_team(), backend_team()]);
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].severity, MismatchSeverity::High);
        assert!(reporter
            .analyze_regime_mismatches(&global_baseline(), &[backend_team()])
            .is_empty());
    }

    #[test]
    fn recommendations_follow_thresholds() {
        let reporter = CrossTeamReporter::default();
        let alert = DriftAlert {
            team_id: "team-ux".to_string(),
            timestamp: Utc::now(),
            drift: 10.0,
            threshold: 0.1,
            approved: false,
            reason: String::new(),
        };
        let alerts = vec![alert; 4];
        let noisy = TrendAnalysis {
            recent_commits: Vec::new(),
            average_shm: 0.70,
            volatility: 0.08,
        };
        let kinds: Vec<_> = reporter
            .recommendations(&alerts, &[], &noisy)
            .into_iter()
            .map(|r| r.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                RecommendationKind::MergeFreeze,
                RecommendationKind::Instability,
                RecommendationKind::StabilizationFocus
            ]
        );

        let excellent = TrendAnalysis {
            recent_commits: Vec::new(),
            average_shm: 0.95,
            volatility: 0.0,
        };
        let recs = reporter.recommendations(&alerts[..3], &[], &excellent);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].kind, RecommendationKind::ExplorationInvestment);

        let steady = TrendAnalysis {
            recent_commits: Vec::new(),
            average_shm: 0.82,
            volatility: 0.01,
        };
        let recs = reporter.recommendations(&[], &[], &steady);
        assert_eq!(recs[0].kind, RecommendationKind::AllNominal);
    }

    #[tokio::test]
    async fn generate_report_skips_unknown_teams() {
        let store = MemoryStore::with_global(global_baseline())
            .with_team(ux_team())
            .with_team(backend_team());
        let report = CrossTeamReporter::default()
            .generate_report(
                &store,
                &[
                    "team-ux".to_string(),
                    "team-backend".to_string(),
                    "team-ghost".to_string(),
                ],
            )
            .await
            .expect("report");
        assert_eq!(report.global_shm, 0.82);
        assert_eq!(report.team_contributions.len(), 2);
        assert_eq!(report.regime_mismatches.len(), 1);
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.kind == RecommendationKind::RegimeConflict));
    }

    #[tokio::test]
    async fn report_carries_newest_merge_log_entries() {
        let store = MemoryStore::with_global(global_baseline());
        for team in ["team-ux", "team-backend", "team-qa"] {
            store
                .append_merge_log(&MergeLogEntry::new(team, true, "drift within tolerance"))
                .await
                .expect("append");
        }
        let reporter = CrossTeamReporter {
            settings: ReportSettings {
                merge_log_limit: 2,
                ..ReportSettings::default()
            },
            ..CrossTeamReporter::default()
        };
        let report = reporter.generate_report(&store, &[]).await.expect("report");
        let teams: Vec<_> = report.merge_log.iter().map(|e| e.team_id.as_str()).collect();
        assert_eq!(teams, vec!["team-backend", "team-qa"]);
    }
}
