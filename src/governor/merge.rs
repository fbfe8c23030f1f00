use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::alert::{self, AlertRules, AlertSink};
use crate::baseline::{GlobalBaseline, TeamOverride};
use crate::blend::BlendEngine;
use crate::drift::{DriftPolicy, MergeDriftResult};
use crate::governor::{GovernanceError, GovernorSettings, MergeLogEntry};
use crate::regime::{check_regime_mismatch, RegimeCheck, TeamRegime};
use crate::store::BaselineStore;

/// Owns every write to the global baseline.
///
/// Evaluate-then-write runs under one async mutex per governor, so merges and
/// commit bumps issued through the same instance are linearized. Writers in
/// other processes are serialized by the store and caught by its version
/// check: the governor reloads, re-evaluates and retries up to
/// `max_conflict_retries` times. Every attempt lands in the store's merge log.
pub struct MergeGovernor {
    store: Arc<dyn BaselineStore>,
    policy: DriftPolicy,
    settings: GovernorSettings,
    sinks: Vec<Arc<dyn AlertSink>>,
    alert_rules: AlertRules,
    write_lock: Mutex<()>,
}

impl MergeGovernor {
    pub fn new(store: Arc<dyn BaselineStore>, policy: DriftPolicy, settings: GovernorSettings) -> Self {
        Self {
            store,
            policy,
            settings,
            sinks: Vec::new(),
            alert_rules: AlertRules::default(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn with_alert_rules(mut self, rules: AlertRules) -> Self {
        self.alert_rules = rules;
        self
    }

    pub fn store(&self) -> &Arc<dyn BaselineStore> {
        &self.store
    }

    pub fn policy(&self) -> &DriftPolicy {
        &self.policy
    }

    pub fn sinks(&self) -> &[Arc<dyn AlertSink>] {
        &self.sinks
    }

    pub fn alert_rules(&self) -> &AlertRules {
        &self.alert_rules
    }

    pub async fn load_global(&self) -> Result<GlobalBaseline, GovernanceError> {
        Ok(self.store.load_global().await?)
    }

    pub async fn load_team(&self, team_id: &str) -> Result<TeamOverride, GovernanceError> {
        Ok(self.store.load_team(team_id).await?)
    }

    /// Side-effect free drift check against the current global baseline.
    pub async fn check_merge_drift(
        &self,
        team_id: &str,
        proposed_shm: f64,
    ) -> Result<MergeDriftResult, GovernanceError> {
        validate_proposal(proposed_shm)?;
        let global = self.store.load_global().await?;
        let result = self.evaluate_against(&global, proposed_shm)?;
        debug!(team = team_id, drift = result.drift, approved = result.approved, "merge drift checked");
        Ok(result)
    }

    /// Accepts `proposed_shm` as the new global SHM when its drift is under the
    /// auto-approve cutoff. Returns `false` (state untouched, alert raised) otherwise.
    pub async fn approve_auto_merge(
        &self,
        team_id: &str,
        proposed_shm: f64,
        commit_hash: Option<String>,
    ) -> Result<bool, GovernanceError> {
        validate_proposal(proposed_shm)?;
        let guard = self.write_lock.lock().await;

        let mut conflicts = 0u32;
        loop {
            let mut global = self.store.load_global().await?;
            let result = self.evaluate_against(&global, proposed_shm)?;

            if !result.approved {
                drop(guard);
                self.reject(team_id, &result).await;
                return Ok(false);
            }

            let previous_shm = global.shm;
            global.supersede(proposed_shm, team_id, commit_hash.clone(), Utc::now());
            match self.persist(&global).await {
                Ok(saved) => {
                    info!(
                        team = team_id,
                        from = previous_shm,
                        to = saved.shm,
                        drift_pct = result.drift,
                        version = saved.version,
                        "auto-merge approved"
                    );
                    self.log_merge(team_id, true, result.reason).await;
                    return Ok(true);
                }
                Err(GovernanceError::Store(err)) if err.is_retryable() => {
                    conflicts += 1;
                    if conflicts > self.settings.max_conflict_retries {
                        let err = GovernanceError::Contention { attempts: conflicts };
                        drop(guard);
                        self.fail(team_id, &err).await;
                        return Err(err);
                    }
                    warn!(team = team_id, attempt = conflicts, "global baseline changed underneath merge, re-evaluating");
                }
                Err(err) => {
                    drop(guard);
                    self.fail(team_id, &err).await;
                    return Err(err);
                }
            }
        }
    }

    /// Bumps `commitsSinceUpdate` by one and persists it. Returns the new count.
    pub async fn record_commit(&self) -> Result<u64, GovernanceError> {
        let _guard = self.write_lock.lock().await;
        let mut conflicts = 0u32;
        loop {
            let mut global = self.store.load_global().await?;
            global.record_commit();
            match self.persist(&global).await {
                Ok(saved) => {
                    debug!(commits = saved.commits_since_update, "commit recorded");
                    return Ok(saved.commits_since_update);
                }
                Err(GovernanceError::Store(err)) if err.is_retryable() => {
                    conflicts += 1;
                    if conflicts > self.settings.max_conflict_retries {
                        return Err(GovernanceError::Contention { attempts: conflicts });
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    pub fn check_regime_mismatch(&self, teams: &[TeamRegime]) -> RegimeCheck {
        check_regime_mismatch(teams)
    }

    /// Blended regime per team. Teams without an override take the global regime.
    pub async fn team_regimes(
        &self,
        blend: &BlendEngine,
        team_ids: &[String],
    ) -> Result<Vec<TeamRegime>, GovernanceError> {
        let global = self.store.load_global().await?;
        let mut regimes = Vec::with_capacity(team_ids.len());
        for team_id in team_ids {
            let team = match self.store.load_team(team_id).await {
                Ok(team) => Some(team),
                Err(err) if err.is_not_found() => None,
                Err(err) => return Err(err.into()),
            };
            regimes.push(blend.team_regime(&global, team.as_ref(), team_id));
        }
        Ok(regimes)
    }

    pub async fn merge_log(&self) -> Result<Vec<MergeLogEntry>, GovernanceError> {
        Ok(self.store.load_merge_log().await?)
    }

    fn evaluate_against(
        &self,
        global: &GlobalBaseline,
        proposed_shm: f64,
    ) -> Result<MergeDriftResult, GovernanceError> {
        if !global.has_usable_shm() {
            return Err(GovernanceError::DegenerateBaseline { shm: global.shm });
        }
        Ok(self
            .policy
            .evaluate(global.shm, proposed_shm, global.commits_since_update))
    }

    async fn persist(&self, global: &GlobalBaseline) -> Result<GlobalBaseline, GovernanceError> {
        let timeout = self.settings.write_timeout;
        match tokio::time::timeout(timeout, self.store.save_global(global)).await {
            Ok(saved) => Ok(saved?),
            Err(_) => Err(GovernanceError::WriteTimeout {
                millis: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    async fn reject(&self, team_id: &str, result: &MergeDriftResult) {
        warn!(team = team_id, drift = result.drift, threshold = result.threshold, "auto-merge rejected");
        self.log_merge(team_id, false, format!("Merge from {team_id} rejected: {}", result.reason))
            .await;
        let event = alert::merge_rejected(team_id, result);
        alert::dispatch(&self.sinks, &self.alert_rules, std::slice::from_ref(&event)).await;
    }

    /// An approved proposal that could not be written.
    async fn fail(&self, team_id: &str, err: &GovernanceError) {
        warn!(team = team_id, error = %err, "auto-merge failed");
        self.log_merge(team_id, false, format!("Merge from {team_id} failed: {err}"))
            .await;
    }

    async fn log_merge(&self, team_id: &str, approved: bool, reason: String) {
        let entry = MergeLogEntry::new(team_id, approved, reason);
        if let Err(err) = self.store.append_merge_log(&entry).await {
            warn!(team = team_id, error = %err, "merge log entry not recorded");
        }
    }
}

fn validate_proposal(proposed_shm: f64) -> Result<(), GovernanceError> {
    if proposed_shm.is_finite() && (0.0..=1.0).contains(&proposed_shm) {
        Ok(())
    } else {
        Err(GovernanceError::InvalidProposal { shm: proposed_shm })
    }
}
