use anyhow::Result;

use crate::baseline::BaselineSnapshot;
use crate::drift::ThresholdRow;
use crate::report::TeamContribution;

pub fn history_to_csv(history: &[BaselineSnapshot]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(["timestamp", "shm", "team_id", "commit_hash", "commits_since_update"])?;
    for entry in history {
        writer.write_record([
            entry.timestamp.to_rfc3339(),
            format!("{:.4}", entry.shm),
            entry.team_id.clone().unwrap_or_default(),
            entry.commit_hash.clone().unwrap_or_default(),
            entry
                .commits_since_update
                .map(|c| c.to_string())
                .unwrap_or_default(),
        ])?;
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}

pub fn thresholds_to_csv(rows: &[ThresholdRow]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(["commits", "williams", "auto_approve_pct"])?;
    for row in rows {
        writer.write_record([
            row.commits.to_string(),
            format!("{:.4}", row.williams),
            format!("{:.4}", row.auto_approve),
        ])?;
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}

pub fn contributions_to_csv(items: &[TeamContribution]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(["team_id", "shm", "contribution_pct", "regime", "last_update"])?;
    for item in items {
        writer.write_record([
            item.team_id.clone(),
            format!("{:.4}", item.current_shm),
            format!("{:.1}", item.contribution),
            item.regime.to_string(),
            item.last_update.to_rfc3339(),
        ])?;
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drift::DriftPolicy;

    #[test]
    fn threshold_csv_has_header_and_rows() {
        let out = thresholds_to_csv(&DriftPolicy::default().threshold_table()).expect("csv");
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines[0], "commits,williams,auto_approve_pct");
        assert_eq!(lines.len(), 10);
        assert_eq!(lines[5], "16,16.0000,0.8000");
    }
}
