use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::SecondsFormat;
use tracing::info;

use crate::output::json::write_json_file;
use crate::report::{to_markdown, CrossTeamReport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedReport {
    pub json_path: PathBuf,
    pub markdown_path: PathBuf,
}

/// Writes `cross-team-report-<timestamp>.{json,md}` into `dir`, creating it if needed.
pub fn save_report(report: &CrossTeamReport, dir: &Path) -> Result<SavedReport> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed creating report directory: {}", dir.display()))?;

    let stamp = report
        .timestamp
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace(':', "-");
    let json_path = dir.join(format!("cross-team-report-{stamp}.json"));
    let markdown_path = dir.join(format!("cross-team-report-{stamp}.md"));

    write_json_file(&json_path, report)?;
    std::fs::write(&markdown_path, to_markdown(report))
        .with_context(|| format!("failed writing report: {}", markdown_path.display()))?;

    info!(json = %json_path.display(), markdown = %markdown_path.display(), "report saved");
    Ok(SavedReport {
        json_path,
        markdown_path,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    use super::*;
    use crate::baseline::fixtures::global_baseline;
    use crate::report::CrossTeamReporter;

    #[test]
    fn writes_json_and_markdown_side_by_side() {
        let dir = tempdir().expect("tempdir");
        let mut report = CrossTeamReporter::default().build(&global_baseline(), &[], &[]);
        report.timestamp = Utc.with_ymd_and_hms(2025, 10, 3, 14, 5, 9).unwrap();

        let saved = save_report(&report, &dir.path().join("reports")).expect("save");

        assert_eq!(
            saved.json_path.file_name().and_then(|n| n.to_str()),
            Some("cross-team-report-2025-10-03T14-05-09.000Z.json")
        );
        let parsed: CrossTeamReport =
            serde_json::from_str(&std::fs::read_to_string(&saved.json_path).expect("read json"))
                .expect("parse json");
        assert_eq!(parsed, report);
        let md = std::fs::read_to_string(&saved.markdown_path).expect("read md");
        assert!(md.starts_with("# Cross-Team Baseline Report"));
    }
}
