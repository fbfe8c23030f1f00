use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::alert::{AlertRules, AlertSink, LogSink, StdoutSink, WebhookSink};
use crate::blend::{BlendEngine, ZeroScorePolicy, DEFAULT_SCORE_FLOOR};
use crate::drift::evaluator::{AUTO_APPROVE_MULTIPLIER, FIRST_COMMIT_THRESHOLD};
use crate::drift::DriftPolicy;
use crate::governor::{GovernorSettings, DEFAULT_MAX_CONFLICT_RETRIES, DEFAULT_WRITE_TIMEOUT};
use crate::report::ReportSettings;
use crate::store::json::{DEFAULT_GLOBAL_PATH, DEFAULT_TEAMS_DIR};
use crate::store::{JsonFileStore, DEFAULT_MERGE_LOG_CAPACITY};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub drift: DriftConfig,
    #[serde(default)]
    pub blend: BlendConfig,
    #[serde(default)]
    pub governor: GovernorConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_root")]
    pub root: String,
    /// Relative paths resolve against `root`.
    #[serde(default = "default_global_path")]
    pub global_path: String,
    #[serde(default = "default_teams_dir")]
    pub teams_dir: String,
    /// Newest entries kept in `merge-log.json` beside the global baseline.
    #[serde(default = "default_merge_log_capacity")]
    pub merge_log_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftConfig {
    #[serde(default = "default_auto_approve_multiplier")]
    pub auto_approve_multiplier: f64,
    #[serde(default = "default_first_commit_threshold")]
    pub first_commit_threshold: f64,
    #[serde(default = "default_alert_drift_pct")]
    pub alert_drift_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlendConfig {
    #[serde(default)]
    pub zero_score_policy: ZeroScorePolicy,
    #[serde(default = "default_score_floor")]
    pub score_floor: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernorConfig {
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_trend_window")]
    pub trend_window: usize,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default = "default_freeze_alert_count")]
    pub freeze_alert_count: usize,
    #[serde(default = "default_volatility_limit")]
    pub volatility_limit: f64,
    #[serde(default = "default_low_shm")]
    pub low_shm: f64,
    #[serde(default = "default_high_shm")]
    pub high_shm: f64,
    #[serde(default = "default_merge_log_limit")]
    pub merge_log_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    #[serde(default = "default_true")]
    pub enable_stdout: bool,
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default)]
    pub rules: AlertRules,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub root: Option<String>,
    pub webhook_url: Option<String>,
}

impl Config {
    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".config/baseline-governor/config.toml")
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(|p| p.to_path_buf())
            .unwrap_or_else(Self::default_path);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(&path)
            .with_context(|| format!("failed reading config: {}", path.display()))?;
        Self::parse(&data).with_context(|| format!("failed parsing TOML config: {}", path.display()))
    }

    pub fn parse(data: &str) -> Result<Self> {
        Ok(toml::from_str(data)?)
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(root) = overrides.root {
            self.storage.root = root;
        }
        if let Some(url) = overrides.webhook_url {
            self.alerts.webhook_url = url;
        }
    }

    pub fn write_template(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed creating config directory: {}", parent.display())
            })?;
        }
        fs::write(path, Self::default_template())
            .with_context(|| format!("failed writing config template: {}", path.display()))
    }

    pub fn resolved_root(&self) -> PathBuf {
        expand_tilde(&self.storage.root)
    }

    pub fn resolved_global_path(&self) -> PathBuf {
        self.resolved_root().join(expand_tilde(&self.storage.global_path))
    }

    pub fn resolved_teams_dir(&self) -> PathBuf {
        self.resolved_root().join(expand_tilde(&self.storage.teams_dir))
    }

    pub fn resolved_report_dir(&self) -> PathBuf {
        self.resolved_root().join(expand_tilde(&self.report.output_dir))
    }

    /// Writer leases wait no longer than the governor's write timeout.
    pub fn open_store(&self) -> JsonFileStore {
        JsonFileStore::with_layout(self.resolved_global_path(), self.resolved_teams_dir())
            .with_lease_timeout(Duration::from_millis(self.governor.write_timeout_ms))
            .with_merge_log_capacity(self.storage.merge_log_capacity)
    }

    pub fn drift_policy(&self) -> DriftPolicy {
        DriftPolicy {
            first_commit_threshold: self.drift.first_commit_threshold,
            auto_approve_multiplier: self.drift.auto_approve_multiplier,
        }
    }

    pub fn blend_engine(&self) -> BlendEngine {
        BlendEngine::new(self.blend.zero_score_policy, self.blend.score_floor)
    }

    pub fn governor_settings(&self) -> GovernorSettings {
        GovernorSettings {
            write_timeout: Duration::from_millis(self.governor.write_timeout_ms),
            max_conflict_retries: self.governor.max_conflict_retries,
        }
    }

    pub fn report_settings(&self) -> ReportSettings {
        ReportSettings {
            trend_window: self.report.trend_window,
            alert_drift_pct: self.drift.alert_drift_pct,
            freeze_alert_count: self.report.freeze_alert_count,
            volatility_limit: self.report.volatility_limit,
            low_shm: self.report.low_shm,
            high_shm: self.report.high_shm,
            merge_log_limit: self.report.merge_log_limit,
        }
    }

    /// The log sink is always present; stdout and webhook follow `[alerts]`.
    pub fn alert_sinks(&self) -> Vec<Arc<dyn AlertSink>> {
        let mut sinks: Vec<Arc<dyn AlertSink>> = vec![Arc::new(LogSink)];
        if self.alerts.enable_stdout {
            sinks.push(Arc::new(StdoutSink));
        }
        if !self.alerts.webhook_url.trim().is_empty() {
            sinks.push(Arc::new(WebhookSink::new(self.alerts.webhook_url.trim())));
        }
        sinks
    }

    pub fn default_template() -> String {
        let template = r#"[storage]
root = "."
global_path = "baselines/global-baseline.json"
teams_dir = "teams"
merge_log_capacity = 500

[drift]
# Auto-approve cutoff (percent) = auto_approve_multiplier * sqrt(t) * log2(t)
auto_approve_multiplier = 0.05
first_commit_threshold = 0.5
alert_drift_pct = 5.0

[blend]
# "clamp" floors zero scores, "reject" fails the blend
zero_score_policy = "clamp"
score_floor = 0.01

[governor]
write_timeout_ms = 5000
max_conflict_retries = 3

[report]
trend_window = 10
output_dir = "reports"
freeze_alert_count = 3
volatility_limit = 0.05
low_shm = 0.75
high_shm = 0.90
merge_log_limit = 50

[alerts]
enable_stdout = true
webhook_url = ""

[alerts.rules]
merge_rejected = true
drift_spike = true
regime_mismatch = true
"#;
        template.to_string()
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            global_path: default_global_path(),
            teams_dir: default_teams_dir(),
            merge_log_capacity: default_merge_log_capacity(),
        }
    }
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            auto_approve_multiplier: default_auto_approve_multiplier(),
            first_commit_threshold: default_first_commit_threshold(),
            alert_drift_pct: default_alert_drift_pct(),
        }
    }
}

impl Default for BlendConfig {
    fn default() -> Self {
        Self {
            zero_score_policy: ZeroScorePolicy::default(),
            score_floor: default_score_floor(),
        }
    }
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            write_timeout_ms: default_write_timeout_ms(),
            max_conflict_retries: default_max_conflict_retries(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        let settings = ReportSettings::default();
        Self {
            trend_window: settings.trend_window,
            output_dir: default_output_dir(),
            freeze_alert_count: settings.freeze_alert_count,
            volatility_limit: settings.volatility_limit,
            low_shm: settings.low_shm,
            high_shm: settings.high_shm,
            merge_log_limit: settings.merge_log_limit,
        }
    }
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            enable_stdout: default_true(),
            webhook_url: String::new(),
            rules: AlertRules::default(),
        }
    }
}

fn default_root() -> String {
    ".".to_string()
}

fn default_global_path() -> String {
    DEFAULT_GLOBAL_PATH.to_string()
}

fn default_teams_dir() -> String {
    DEFAULT_TEAMS_DIR.to_string()
}

fn default_merge_log_capacity() -> usize {
    DEFAULT_MERGE_LOG_CAPACITY
}

fn default_auto_approve_multiplier() -> f64 {
    AUTO_APPROVE_MULTIPLIER
}

fn default_first_commit_threshold() -> f64 {
    FIRST_COMMIT_THRESHOLD
}

fn default_alert_drift_pct() -> f64 {
    ReportSettings::default().alert_drift_pct
}

fn default_score_floor() -> f64 {
    DEFAULT_SCORE_FLOOR
}

fn default_write_timeout_ms() -> u64 {
    DEFAULT_WRITE_TIMEOUT.as_millis() as u64
}

fn default_max_conflict_retries() -> u32 {
    DEFAULT_MAX_CONFLICT_RETRIES
}

fn default_trend_window() -> usize {
    ReportSettings::default().trend_window
}

fn default_output_dir() -> String {
    "reports".to_string()
}

fn default_freeze_alert_count() -> usize {
    ReportSettings::default().freeze_alert_count
}

fn default_volatility_limit() -> f64 {
    ReportSettings::default().volatility_limit
}

fn default_low_shm() -> f64 {
    ReportSettings::default().low_shm
}

fn default_high_shm() -> f64 {
    ReportSettings::default().high_shm
}

fn default_merge_log_limit() -> usize {
    ReportSettings::default().merge_log_limit
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_parses_to_defaults() {
        let parsed = Config::parse(&Config::default_template()).expect("template parses");
        let defaults = Config::default();
        assert_eq!(parsed.drift_policy(), defaults.drift_policy());
        assert_eq!(parsed.blend_engine(), defaults.blend_engine());
        assert_eq!(parsed.governor_settings(), GovernorSettings::default());
        assert_eq!(parsed.report_settings(), ReportSettings::default());
        assert_eq!(parsed.storage.global_path, DEFAULT_GLOBAL_PATH);
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let parsed = Config::parse(
            r#"
[drift]
auto_approve_multiplier = 0.1

[blend]
zero_score_policy = "reject"
"#,
        )
        .expect("parse");
        assert_eq!(parsed.drift.auto_approve_multiplier, 0.1);
        assert_eq!(parsed.drift.first_commit_threshold, FIRST_COMMIT_THRESHOLD);
        assert_eq!(parsed.blend.zero_score_policy, ZeroScorePolicy::Reject);
        assert_eq!(parsed.governor.max_conflict_retries, 3);
        assert!(parsed.alerts.rules.merge_rejected);
    }

    #[test]
    fn root_override_moves_store_paths() {
        let mut config = Config::default();
        config.apply_overrides(ConfigOverrides {
            root: Some("/srv/quality".to_string()),
            webhook_url: None,
        });
        assert_eq!(
            config.resolved_global_path(),
            PathBuf::from("/srv/quality/baselines/global-baseline.json")
        );
        assert_eq!(config.resolved_teams_dir(), PathBuf::from("/srv/quality/teams"));
        assert_eq!(config.resolved_report_dir(), PathBuf::from("/srv/quality/reports"));
    }

    #[test]
    fn merge_log_lives_beside_global_baseline() {
        let config = Config::parse(
            r#"
[storage]
root = "/srv/quality"
merge_log_capacity = 20

[report]
merge_log_limit = 5
"#,
        )
        .expect("parse");
        assert_eq!(
            config.open_store().merge_log_path(),
            Path::new("/srv/quality/baselines/merge-log.json")
        );
        assert_eq!(config.storage.merge_log_capacity, 20);
        assert_eq!(config.report_settings().merge_log_limit, 5);
        assert_eq!(Config::default().storage.merge_log_capacity, DEFAULT_MERGE_LOG_CAPACITY);
    }

    #[test]
    fn sinks_follow_alert_settings() {
        let mut config = Config::default();
        assert_eq!(config.alert_sinks().len(), 2);
        config.alerts.enable_stdout = false;
        config.alerts.webhook_url = "https://hooks.slack.com/services/T/B/X".to_string();
        assert_eq!(config.alert_sinks().len(), 2);
        config.alerts.webhook_url = "  ".to_string();
        assert_eq!(config.alert_sinks().len(), 1);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config::load(Some(&dir.path().join("absent.toml"))).expect("load");
        assert_eq!(config.storage.root, ".");
    }
}
