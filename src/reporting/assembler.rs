use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::ReportFormat;
use crate::errors::ApiProbeError;
use crate::models::RunReport;
use super::formatter::format_report_markdown;

pub const JSON_REPORT: &str = "report.json";
pub const MARKDOWN_REPORT: &str = "report.md";

/// Atomic file write: write to temp, then rename
pub async fn atomic_write(path: &Path, content: &str) -> Result<(), ApiProbeError> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, content).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Write the report in the requested format(s) under `dir`, creating it if needed.
/// Returns the written paths.
pub async fn write_report(report: &RunReport, dir: &Path, format: ReportFormat) -> Result<Vec<PathBuf>, ApiProbeError> {
    tokio::fs::create_dir_all(dir).await?;
    let mut written = Vec::new();

    if matches!(format, ReportFormat::Json | ReportFormat::Both) {
        let path = dir.join(JSON_REPORT);
        atomic_write(&path, &serde_json::to_string_pretty(report)?).await?;
        written.push(path);
    }
    if matches!(format, ReportFormat::Markdown | ReportFormat::Both) {
        let path = dir.join(MARKDOWN_REPORT);
        atomic_write(&path, &format_report_markdown(report)).await?;
        written.push(path);
    }

    for path in &written {
        info!(path = %path.display(), "Report written");
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::{ProbeStats, RunMetadata};

    fn empty_report() -> RunReport {
        RunReport {
            metadata: RunMetadata {
                run_id: "run-2".into(),
                target: None,
                started_at: Utc::now(),
                finished_at: Utc::now(),
                tool_version: "0.1.0".into(),
                build: None,
                cancelled: false,
            },
            sources: vec![],
            ingestion_failures: vec![],
            warnings: vec![],
            endpoint_count: 0,
            documentation: vec![],
            probes: ProbeStats::default(),
            findings: vec![],
        }
    }

    #[tokio::test]
    async fn test_write_both_formats() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested/out");
        let written = write_report(&empty_report(), &out, ReportFormat::Both).await.unwrap();
        assert_eq!(written, vec![out.join(JSON_REPORT), out.join(MARKDOWN_REPORT)]);

        let text = std::fs::read_to_string(out.join(JSON_REPORT)).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["metadata"]["run_id"], "run-2");
        let markdown = std::fs::read_to_string(out.join(MARKDOWN_REPORT)).unwrap();
        assert!(markdown.contains("No vulnerabilities were detected."));
        assert!(!out.join("report.tmp").exists());
    }

    #[tokio::test]
    async fn test_json_only() {
        let dir = tempfile::tempdir().unwrap();
        let written = write_report(&empty_report(), dir.path(), ReportFormat::Json).await.unwrap();
        assert_eq!(written.len(), 1);
        assert!(!dir.path().join(MARKDOWN_REPORT).exists());
    }
}
