use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use baseline_governor::alert;
use baseline_governor::baseline::{DimensionWeights, GlobalBaseline, RegimeBlend, TeamOverride, TeamScores};
use baseline_governor::config::{Config, ConfigOverrides};
use baseline_governor::drift::{DriftReport, DriftScenario};
use baseline_governor::governor::MergeGovernor;
use baseline_governor::output::csv::{contributions_to_csv, history_to_csv, thresholds_to_csv};
use baseline_governor::output::json::render_json;
use baseline_governor::output::table::{
    render_baseline_table, render_blend_table, render_drift_reports_table, render_drift_table,
    render_history_table, render_regime_table, render_report_summary, render_team_table,
    render_threshold_table,
};
use baseline_governor::report::{save_report, CrossTeamReporter};
use baseline_governor::server::run_server;
use baseline_governor::store::{BaselineStore, JsonFileStore};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[derive(Debug, Parser)]
#[command(
    name = "baseline-governor",
    about = "Multi-team quality baseline governance with drift-gated auto-merge"
)]
struct Cli {
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Directory holding `baselines/` and `teams/`
    #[arg(short, long)]
    root: Option<String>,
    #[arg(long)]
    webhook: Option<String>,
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, clap::Args, Clone, Copy)]
struct ScoreArgs {
    #[arg(long)]
    ux: f64,
    #[arg(long)]
    design: f64,
    #[arg(long)]
    code: f64,
    #[arg(long)]
    semantic: f64,
    #[arg(long)]
    journey: f64,
    #[arg(long)]
    state: f64,
}

impl From<ScoreArgs> for TeamScores {
    fn from(value: ScoreArgs) -> Self {
        Self {
            ux: value.ux,
            design: value.design,
            code: value.code,
            semantic: value.semantic,
            journey: value.journey,
            state: value.state,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Write a starter global baseline (and optionally a team override)
    Init {
        #[arg(long, default_value_t = 0.80)]
        shm: f64,
        /// Exploration, optimization, stabilization
        #[arg(long, default_value = "0.3,0.2,0.5")]
        regime: String,
        #[arg(long)]
        team: Option<String>,
    },
    Status {
        #[arg(long)]
        history: bool,
    },
    Team {
        id: String,
    },
    Blend {
        team: String,
        #[command(flatten)]
        scores: ScoreArgs,
    },
    Check {
        team: String,
        shm: f64,
    },
    Merge {
        team: String,
        shm: f64,
        #[arg(long)]
        commit: Option<String>,
    },
    Commit,
    Regime {
        #[arg(long, value_delimiter = ',')]
        teams: Vec<String>,
    },
    Report {
        #[arg(long, value_delimiter = ',')]
        teams: Vec<String>,
        #[arg(long)]
        save: bool,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    Thresholds {
        /// Also print the commit count needed to auto-approve this drift (percent)
        #[arg(long)]
        tolerance: Option<f64>,
    },
    DriftReport {
        /// JSON array of scenarios; replaces the single-scenario flags
        #[arg(long)]
        batch: Option<PathBuf>,
        /// Defaults to the stored global SHM
        #[arg(long)]
        current: Option<f64>,
        #[arg(long)]
        proposed: Option<f64>,
        /// Defaults to the stored commit counter
        #[arg(long)]
        commits: Option<u64>,
        #[arg(long)]
        team: Option<String>,
        #[arg(long)]
        markdown: bool,
    },
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 3001)]
        port: u16,
    },
    Config {
        #[arg(long)]
        init: bool,
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load(Some(&config_path))?;
    config.apply_overrides(ConfigOverrides {
        root: cli.root.clone(),
        webhook_url: cli.webhook.clone(),
    });

    if matches!(cli.command, Commands::Config { .. }) {
        return handle_config_command(&cli.command, &config, &config_path);
    }
    if let Commands::Serve { host, port } = &cli.command {
        let bind = format!("{host}:{port}");
        let addr: SocketAddr = bind
            .parse()
            .map_err(|e| anyhow!("invalid bind address {bind}: {e}"))?;
        return run_server(config, addr).await;
    }
    if let Commands::Init { shm, regime, team } = &cli.command {
        return bootstrap(&config.open_store(), *shm, regime, team.as_deref()).await;
    }

    let store: Arc<dyn BaselineStore> = Arc::new(config.open_store());
    let mut governor = MergeGovernor::new(store.clone(), config.drift_policy(), config.governor_settings())
        .with_alert_rules(config.alerts.rules.clone());
    for sink in config.alert_sinks() {
        governor = governor.with_sink(sink);
    }
    let blend = config.blend_engine();

    match &cli.command {
        Commands::Status { history } => {
            let global = governor.load_global().await?;
            match cli.output {
                OutputFormat::Table if *history => println!("{}", render_history_table(&global)),
                OutputFormat::Table => println!("{}", render_baseline_table(&global)),
                OutputFormat::Json => println!("{}", render_json(&global)?),
                OutputFormat::Csv => println!("{}", history_to_csv(&global.history)?),
            }
        }
        Commands::Team { id } => {
            let team = governor.load_team(id).await?;
            print_team(&team, cli.output)?;
        }
        Commands::Blend { team, scores } => {
            let blended = blend
                .blend_for_team(store.as_ref(), team, &TeamScores::from(*scores))
                .await?;
            match cli.output {
                OutputFormat::Table => println!("{}", render_blend_table(&blended)),
                OutputFormat::Json => println!("{}", render_json(&blended)?),
                OutputFormat::Csv => {
                    warn!("CSV output for blend not implemented, using JSON");
                    println!("{}", render_json(&blended)?);
                }
            }
        }
        Commands::Check { team, shm } => {
            let result = governor.check_merge_drift(team, *shm).await?;
            match cli.output {
                OutputFormat::Table => println!("{}", render_drift_table(team, *shm, &result)),
                _ => println!("{}", render_json(&result)?),
            }
        }
        Commands::Merge { team, shm, commit } => {
            let approved = governor.approve_auto_merge(team, *shm, commit.clone()).await?;
            let global = governor.load_global().await?;
            if approved {
                println!("Merge from {team} approved: global SHM is now {:.4}", global.shm);
            } else {
                println!(
                    "Merge from {team} needs manual review: global SHM stays {:.4} after {} commits",
                    global.shm, global.commits_since_update
                );
            }
        }
        Commands::Commit => {
            let commits = governor.record_commit().await?;
            println!("Commits since last baseline update: {commits}");
        }
        Commands::Regime { teams } => {
            let regimes = governor.team_regimes(&blend, teams).await?;
            let check = governor.check_regime_mismatch(&regimes);
            match cli.output {
                OutputFormat::Table => println!("{}", render_regime_table(&regimes, &check)),
                _ => println!("{}", render_json(&check)?),
            }
        }
        Commands::Report { teams, save, out } => {
            let reporter = CrossTeamReporter::new(
                config.drift_policy(),
                blend,
                config.report_settings(),
            );
            let report = reporter.generate_report(store.as_ref(), teams).await?;
            alert::dispatch(
                governor.sinks(),
                governor.alert_rules(),
                &alert::report_alerts(&report),
            )
            .await;

            match cli.output {
                OutputFormat::Table => println!("{}", render_report_summary(&report)),
                OutputFormat::Json => println!("{}", render_json(&report)?),
                OutputFormat::Csv => println!("{}", contributions_to_csv(&report.team_contributions)?),
            }
            if *save || out.is_some() {
                let dir = out.clone().unwrap_or_else(|| config.resolved_report_dir());
                let saved = save_report(&report, &dir)?;
                println!(
                    "Saved {} and {}",
                    saved.json_path.display(),
                    saved.markdown_path.display()
                );
            }
        }
        Commands::Thresholds { tolerance } => {
            let rows = governor.policy().threshold_table();
            match cli.output {
                OutputFormat::Table => println!("{}", render_threshold_table(&rows)),
                OutputFormat::Json => println!("{}", render_json(&rows)?),
                OutputFormat::Csv => println!("{}", thresholds_to_csv(&rows)?),
            }
            if let Some(tolerance) = tolerance {
                println!(
                    "A {tolerance:.2}% drift auto-approves after {} commits",
                    governor.policy().recommended_commit_frequency(*tolerance)
                );
            }
        }
        Commands::DriftReport {
            batch: Some(path), ..
        } => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed reading scenarios: {}", path.display()))?;
            let scenarios: Vec<DriftScenario> = serde_json::from_str(&raw)
                .with_context(|| format!("failed parsing scenarios: {}", path.display()))?;
            let reports = governor.policy().batch_analyze(&scenarios);
            match cli.output {
                OutputFormat::Table => println!("{}", render_drift_reports_table(&reports)),
                _ => println!("{}", render_json(&reports)?),
            }
        }
        Commands::DriftReport {
            batch: None,
            current,
            proposed,
            commits,
            team,
            markdown,
        } => {
            let (current, commits) = match (current, commits) {
                (Some(current), Some(commits)) => (*current, *commits),
                _ => {
                    let global = governor
                        .load_global()
                        .await
                        .context("--current and --commits default to the stored global baseline")?;
                    (
                        current.unwrap_or(global.shm),
                        commits.unwrap_or(global.commits_since_update),
                    )
                }
            };
            let proposed = proposed.ok_or_else(|| anyhow!("--proposed is required without --batch"))?;
            let report = governor
                .policy()
                .drift_report(current, proposed, commits, team.as_deref());
            print_drift_report(&report, *markdown, &governor, cli.output)?;
        }
        Commands::Init { .. } | Commands::Config { .. } | Commands::Serve { .. } => {
            unreachable!("handled before dispatch")
        }
    }

    Ok(())
}

fn handle_config_command(command: &Commands, config: &Config, config_path: &PathBuf) -> Result<()> {
    let Commands::Config { init, show } = command else {
        return Ok(());
    };
    if *init {
        Config::write_template(config_path)?;
        println!("Wrote config template to {}", config_path.display());
    }
    if *show || !*init {
        println!("{}", render_json(config)?);
    }
    Ok(())
}

async fn bootstrap(store: &JsonFileStore, shm: f64, regime: &str, team: Option<&str>) -> Result<()> {
    if !(shm > 0.0 && shm <= 1.0) {
        return Err(anyhow!("starter SHM must lie in (0, 1], got {shm}"));
    }
    let regime_blend = parse_regime(regime)?;
    let weights = starter_weights();
    let global = GlobalBaseline::new(shm, regime_blend, weights);
    store
        .create_global(&global)
        .await
        .with_context(|| format!("refusing to overwrite {}", store.global_path().display()))?;
    println!("Wrote global baseline to {}", store.global_path().display());

    if let Some(team_id) = team {
        store
            .save_team(&TeamOverride::new(team_id, weights, regime_blend))
            .await?;
        info!(team = team_id, "starter team override written");
        println!("Wrote team override to {}", store.team_path(team_id).display());
    }
    Ok(())
}

fn starter_weights() -> DimensionWeights {
    DimensionWeights {
        ux: 0.20,
        design: 0.15,
        code: 0.20,
        semantic: 0.15,
        journey: 0.15,
        state: 0.15,
    }
}

fn parse_regime(raw: &str) -> Result<RegimeBlend> {
    let parts = raw
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f64>()
                .with_context(|| format!("invalid regime share: {part}"))
        })
        .collect::<Result<Vec<_>>>()?;
    match parts.as_slice() {
        [exploration, optimization, stabilization] => {
            Ok(RegimeBlend::new(*exploration, *optimization, *stabilization))
        }
        _ => Err(anyhow!(
            "regime needs exactly three shares (exploration,optimization,stabilization), got {raw}"
        )),
    }
}

fn print_team(team: &TeamOverride, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_team_table(team)),
        OutputFormat::Json => println!("{}", render_json(team)?),
        OutputFormat::Csv => {
            warn!("CSV output for team not implemented, using JSON");
            println!("{}", render_json(team)?);
        }
    }
    Ok(())
}

fn print_drift_report(
    report: &DriftReport,
    markdown: bool,
    governor: &MergeGovernor,
    format: OutputFormat,
) -> Result<()> {
    if markdown {
        println!("{}", governor.policy().drift_report_markdown(report));
        return Ok(());
    }
    match format {
        OutputFormat::Table => {
            println!("{}", render_drift_reports_table(std::slice::from_ref(report)));
            println!("{}", report.recommendation);
        }
        _ => println!("{}", render_json(report)?),
    }
    Ok(())
}
