use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Row, Table};

use crate::baseline::{Dimension, GlobalBaseline, TeamOverride};
use crate::blend::BlendedScores;
use crate::drift::{DriftReport, MergeDriftResult, ThresholdRow};
use crate::regime::{classify, RegimeCheck, TeamRegime};
use crate::report::CrossTeamReport;

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn decision_cell(approved: bool) -> Cell {
    if approved {
        Cell::new("APPROVED").fg(Color::Green)
    } else {
        Cell::new("REVIEW").fg(Color::Red)
    }
}

pub fn render_baseline_table(global: &GlobalBaseline) -> String {
    let mut table = new_table();
    table.set_header(vec!["Field", "Value"]);
    table.add_row(vec!["SHM".to_string(), format!("{:.4}", global.shm)]);
    table.add_row(vec![
        "Regime".to_string(),
        format!(
            "{} [{:.2}, {:.2}, {:.2}]",
            classify(&global.regime_blend),
            global.regime_blend.exploration(),
            global.regime_blend.optimization(),
            global.regime_blend.stabilization()
        ),
    ]);
    table.add_row(vec![
        "Commits since update".to_string(),
        global.commits_since_update.to_string(),
    ]);
    table.add_row(vec!["Last updated".to_string(), global.last_updated.to_rfc3339()]);
    table.add_row(vec!["History entries".to_string(), global.history.len().to_string()]);
    table.add_row(vec!["Version".to_string(), global.version.to_string()]);
    for dimension in Dimension::ALL {
        table.add_row(vec![
            format!("Weight: {dimension}"),
            format!("{:.3}", global.weights.get(dimension)),
        ]);
    }
    table.to_string()
}

pub fn render_team_table(team: &TeamOverride) -> String {
    let mut table = new_table();
    table.set_header(vec!["Field", "Value"]);
    table.add_row(vec!["Team".to_string(), team.team_id.clone()]);
    table.add_row(vec![
        "Regime blend".to_string(),
        format!(
            "[{:.2}, {:.2}, {:.2}]",
            team.regime_blend.exploration(),
            team.regime_blend.optimization(),
            team.regime_blend.stabilization()
        ),
    ]);
    table.add_row(vec!["Last updated".to_string(), team.last_updated.to_rfc3339()]);
    for dimension in Dimension::ALL {
        table.add_row(vec![
            format!("Weight: {dimension}"),
            format!("{:.3}", team.weights.get(dimension)),
        ]);
    }
    table.to_string()
}

pub fn render_history_table(global: &GlobalBaseline) -> String {
    let mut table = new_table();
    table.set_header(vec!["#", "Superseded At", "SHM", "Team", "Commit", "Commits"]);
    for (idx, entry) in global.history.iter().enumerate() {
        table.add_row(vec![
            (idx + 1).to_string(),
            entry.timestamp.to_rfc3339(),
            format!("{:.4}", entry.shm),
            entry.team_id.clone().unwrap_or_else(|| "-".to_string()),
            entry.commit_hash.clone().unwrap_or_else(|| "-".to_string()),
            entry
                .commits_since_update
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".to_string()),
        ]);
    }
    table.to_string()
}

pub fn render_drift_table(team_id: &str, proposed: f64, result: &MergeDriftResult) -> String {
    let mut table = new_table();
    table.set_header(vec![
        "Team",
        "Proposed SHM",
        "Drift",
        "Cutoff",
        "Williams",
        "Commits",
        "Decision",
    ]);
    table.add_row(Row::from(vec![
        Cell::new(team_id),
        Cell::new(format!("{proposed:.4}")),
        Cell::new(format!("{:.3}%", result.drift)),
        Cell::new(format!("{:.3}%", result.threshold)),
        Cell::new(format!("{:.3}", result.williams_value)),
        Cell::new(result.commit_count.to_string()),
        decision_cell(result.approved),
    ]));
    format!("{table}\n{}", result.reason)
}

pub fn render_drift_reports_table(reports: &[DriftReport]) -> String {
    let mut table = new_table();
    table.set_header(vec!["Team", "Current", "Proposed", "Drift", "Cutoff", "Decision"]);
    for report in reports {
        table.add_row(Row::from(vec![
            Cell::new(report.team_id.as_deref().unwrap_or("-")),
            Cell::new(format!("{:.4}", report.current)),
            Cell::new(format!("{:.4}", report.proposed)),
            Cell::new(format!("{:.3}%", report.analysis.drift)),
            Cell::new(format!("{:.3}%", report.analysis.threshold)),
            decision_cell(report.analysis.approved),
        ]));
    }
    table.to_string()
}

pub fn render_threshold_table(rows: &[ThresholdRow]) -> String {
    let mut table = new_table();
    table.set_header(vec!["Commits", "Williams √t·log₂t", "Auto-approve cutoff"]);
    for row in rows {
        table.add_row(vec![
            row.commits.to_string(),
            format!("{:.2}", row.williams),
            format!("{:.3}%", row.auto_approve),
        ]);
    }
    table.to_string()
}

pub fn render_blend_table(blended: &BlendedScores) -> String {
    let mut table = new_table();
    table.set_header(vec!["Dimension", "Blended weight"]);
    for dimension in Dimension::ALL {
        let mut cell = Cell::new(format!("{:.3}", blended.weights.get(dimension)));
        if blended.clamped_dimensions.contains(&dimension) {
            cell = cell.fg(Color::Yellow);
        }
        table.add_row(Row::from(vec![Cell::new(dimension.to_string()), cell]));
    }
    format!(
        "{table}\nTeam {}: SHM {:.4}, regime {}, global influence {:.0}%",
        blended.team_id,
        blended.shm,
        blended.regime(),
        blended.global_influence * 100.0
    )
}

pub fn render_regime_table(teams: &[TeamRegime], check: &RegimeCheck) -> String {
    let mut table = new_table();
    table.set_header(vec!["Team", "Regime"]);
    for team in teams {
        table.add_row(vec![team.team_id.clone(), team.regime.to_string()]);
    }
    format!("{table}\n{}", check.details)
}

pub fn render_report_summary(report: &CrossTeamReport) -> String {
    let mut table = new_table();
    table.set_header(vec!["Team", "SHM", "Contribution", "Regime", "Last Update"]);
    for team in &report.team_contributions {
        table.add_row(vec![
            team.team_id.clone(),
            format!("{:.4}", team.current_shm),
            format!("{:.1}%", team.contribution),
            team.regime.to_string(),
            team.last_update.to_rfc3339(),
        ]);
    }

    let mut out = format!(
        "Global SHM {:.4} | average {:.4} | volatility {:.4} | drift alerts {} | merges logged {}\n",
        report.global_shm,
        report.trend_analysis.average_shm,
        report.trend_analysis.volatility,
        report.drift_alerts.len(),
        report.merge_log.len()
    );
    out.push_str(&table.to_string());
    for mismatch in &report.regime_mismatches {
        out.push_str(&format!(
            "\nRegime mismatch ({}): {}",
            mismatch.severity, mismatch.recommendation
        ));
    }
    for rec in &report.recommendations {
        out.push_str(&format!("\n- {}", rec.message));
    }
    out
}
