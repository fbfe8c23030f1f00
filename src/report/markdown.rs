use std::fmt::Write;

use crate::regime::MismatchSeverity;
use crate::report::CrossTeamReport;

pub fn to_markdown(report: &CrossTeamReport) -> String {
    let mut md = String::new();
    // Writing into a String cannot fail.
    let _ = write_report(&mut md, report);
    md
}

fn write_report(md: &mut String, report: &CrossTeamReport) -> std::fmt::Result {
    writeln!(md, "# Cross-Team Baseline Report\n")?;
    writeln!(md, "**Generated:** {}", report.timestamp.to_rfc3339())?;
    writeln!(md, "**Global SHM:** {:.4}\n", report.global_shm)?;

    let trend = &report.trend_analysis;
    writeln!(
        md,
        "## Trend Analysis (Last {} Commits)\n",
        trend.recent_commits.len().saturating_sub(1)
    )?;
    writeln!(md, "- **Average SHM:** {:.4}", trend.average_shm)?;
    writeln!(md, "- **Volatility:** {:.4}\n", trend.volatility)?;
    writeln!(md, "| # | SHM | Team | Timestamp |")?;
    writeln!(md, "|---|-----|------|-----------|")?;
    for (idx, point) in trend.recent_commits.iter().enumerate() {
        writeln!(
            md,
            "| {} | {:.4} | {} | {} |",
            idx + 1,
            point.shm,
            point.team_id.as_deref().unwrap_or("N/A"),
            point.timestamp.to_rfc3339()
        )?;
    }
    writeln!(md)?;

    writeln!(md, "## Team Contributions\n")?;
    writeln!(md, "| Team | SHM | Contribution | Regime | Last Update |")?;
    writeln!(md, "|------|-----|--------------|--------|-------------|")?;
    for team in &report.team_contributions {
        writeln!(
            md,
            "| {} | {:.4} | {:.1}% | {} | {} |",
            team.team_id,
            team.current_shm,
            team.contribution,
            team.regime,
            team.last_update.to_rfc3339()
        )?;
    }
    writeln!(md)?;

    if !report.drift_alerts.is_empty() {
        writeln!(md, "## Drift Alerts\n")?;
        for alert in &report.drift_alerts {
            let status = if alert.approved { "[auto-approvable]" } else { "[review]" };
            writeln!(md, "### {status} {} - {}", alert.team_id, alert.timestamp.to_rfc3339())?;
            writeln!(md, "- **Drift:** {:.2}%", alert.drift)?;
            writeln!(md, "- **Threshold:** {:.2}%", alert.threshold)?;
            writeln!(md, "- **Reason:** {}\n", alert.reason)?;
        }
    }

    if !report.regime_mismatches.is_empty() {
        writeln!(md, "## Regime Mismatches\n")?;
        for mismatch in &report.regime_mismatches {
            let label = match mismatch.severity {
                MismatchSeverity::High => "HIGH",
                MismatchSeverity::Medium => "MEDIUM",
                MismatchSeverity::Low => "LOW",
            };
            writeln!(md, "### {label} Severity")?;
            writeln!(md, "**Teams:**")?;
            for team in &mismatch.teams {
                writeln!(md, "- {}: {}", team.team_id, team.regime)?;
            }
            writeln!(md, "\n**Recommendation:** {}\n", mismatch.recommendation)?;
        }
    }

    if !report.merge_log.is_empty() {
        writeln!(md, "## Merge Log\n")?;
        writeln!(md, "| Timestamp | Team | Status | Reason |")?;
        writeln!(md, "|-----------|------|--------|--------|")?;
        for entry in &report.merge_log {
            let status = if entry.approved { "Approved" } else { "Rejected" };
            writeln!(
                md,
                "| {} | {} | {status} | {} |",
                entry.timestamp.to_rfc3339(),
                entry.team_id,
                entry.reason.replace('|', "\\|")
            )?;
        }
        writeln!(md)?;
    }

    writeln!(md, "## Recommendations\n")?;
    for rec in &report.recommendations {
        writeln!(md, "- {}", rec.message)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::fixtures::{backend_team, global_baseline, ux_team};
    use crate::governor::MergeLogEntry;
    use crate::report::CrossTeamReporter;

    #[test]
    fn renders_all_sections_for_populated_report() {
        let log = vec![MergeLogEntry {
            timestamp: chrono::Utc::now(),
            team_id: "team-backend".to_string(),
            approved: false,
            reason: "Merge from team-backend rejected: drift too high".to_string(),
        }];
        let report = CrossTeamReporter::default().build(
            &global_baseline(),
            &[ux_team(), backend_team()],
            &log,
        );
        let md = to_markdown(&report);

        assert!(md.starts_with("# Cross-Team Baseline Report"));
        assert!(md.contains("## Trend Analysis"));
        assert!(md.contains("## Team Contributions"));
        assert!(md.contains("| team-ux |"));
        assert!(md.contains("| team-backend |"));
        assert!(md.contains("### HIGH Severity"));
        assert!(md.contains("| Rejected |"));
        assert!(md.contains("## Recommendations"));
        assert!(!md.contains("## Drift Alerts"));
    }
}
