use std::fmt::Write;

use console::style;

use crate::models::{Finding, RunReport, Severity, SignatureKind};
use super::progress::severity_badge;

const SEVERITIES: [Severity; 5] = [Severity::Critical, Severity::High, Severity::Medium, Severity::Low, Severity::Info];

pub fn format_finding_markdown(finding: &Finding) -> String {
    let signatures: Vec<&str> = finding.signatures.iter().map(SignatureKind::as_str).collect();
    format!(
        "#### {}\n\n**Severity:** {}\n**Class:** {} ({})\n**Confidence:** {:.2}\n**Signals:** {}\n**Payload:** `{}` ({})\n**Probe:** #{} ({})\n\n**Evidence:**\n```\n{}\n```\n",
        finding.title(),
        finding.severity.as_str(),
        finding.class,
        finding.class.cwe_id(),
        finding.confidence,
        signatures.join(", "),
        finding.payload.value.replace('`', "'"),
        finding.payload.template,
        finding.probe_id,
        finding.probe_state,
        finding.evidence,
    )
}

pub fn format_executive_summary(report: &RunReport) -> String {
    let counts = report.finding_counts();
    let mut out = String::from("## Executive Summary\n\n| Severity | Count |\n|---|---|\n");
    for severity in SEVERITIES {
        let label = severity.as_str();
        let mut chars = label.chars();
        let title: String = chars.next().map(|c| c.to_ascii_uppercase()).into_iter().chain(chars).collect();
        let _ = writeln!(out, "| {} | {} |", title, counts.get(&severity).copied().unwrap_or(0));
    }
    let _ = writeln!(out, "| **Total** | **{}** |", report.total_findings());
    out
}

/// Full Markdown report: metadata, summary, coverage, then findings by endpoint and class.
pub fn format_report_markdown(report: &RunReport) -> String {
    let meta = &report.metadata;
    let mut out = String::from("# API Security Assessment Report\n\n");
    let _ = writeln!(out, "- Run: `{}`", meta.run_id);
    let _ = writeln!(out, "- Target: {}", meta.target.as_deref().unwrap_or("(not probed)"));
    let _ = writeln!(out, "- Started: {}", meta.started_at.to_rfc3339());
    let _ = writeln!(out, "- Finished: {}", meta.finished_at.to_rfc3339());
    let _ = writeln!(
        out,
        "- Tool: apiprobe {}{}",
        meta.tool_version,
        meta.build.as_deref().map(|b| format!(" ({})", b)).unwrap_or_default()
    );
    if meta.cancelled {
        out.push_str("- **Run was cancelled; results are partial.**\n");
    }
    out.push('\n');

    out.push_str(&format_executive_summary(report));

    out.push_str("\n## Sources\n\n");
    if report.sources.is_empty() {
        out.push_str("No source was ingested.\n");
    } else {
        out.push_str("| Source | Ingestor | Endpoints |\n|---|---|---|\n");
        for s in &report.sources {
            let _ = writeln!(out, "| {} | {} | {} |", s.identifier, s.ingestor, s.endpoints);
        }
    }
    if !report.ingestion_failures.is_empty() {
        out.push_str("\n**Ingestion failures:**\n\n");
        for f in &report.ingestion_failures {
            let _ = writeln!(out, "- {} ({}): {}", f.identifier, f.error_type, f.message);
        }
    }

    let _ = write!(
        out,
        "\n## Coverage\n\n- Endpoints: {}\n- Documented: {}\n- Probes: {} submitted, {} completed, {} failed, {} timed out, {} dropped (peak in flight {})\n",
        report.endpoint_count,
        report.documented_count(),
        report.probes.submitted,
        report.probes.completed,
        report.probes.failed,
        report.probes.timed_out,
        report.probes.dropped,
        report.probes.peak_in_flight,
    );

    if !report.warnings.is_empty() {
        out.push_str("\n## Warnings\n\n");
        for w in &report.warnings {
            let _ = writeln!(out, "- {}", w);
        }
    }

    out.push_str("\n## Findings\n\n");
    if report.findings.is_empty() {
        out.push_str("No vulnerabilities were detected.\n");
    }
    for endpoint in &report.findings {
        let _ = writeln!(
            out,
            "### {}{}\n",
            endpoint.endpoint,
            if endpoint.documented { "" } else { " (undocumented)" }
        );
        for class in &endpoint.classes {
            for finding in &class.findings {
                out.push_str(&format_finding_markdown(finding));
                out.push('\n');
            }
        }
    }
    out
}

/// Short colored summary for the terminal.
pub fn format_terminal_summary(report: &RunReport) -> String {
    let counts = report.finding_counts();
    let mut out = String::new();
    let _ = writeln!(
        out,
        "\n  {} {} endpoints ({} documented), {} findings",
        style("Summary:").bold(),
        report.endpoint_count,
        report.documented_count(),
        report.total_findings(),
    );
    for severity in SEVERITIES {
        if let Some(n) = counts.get(&severity).filter(|n| **n > 0) {
            let _ = writeln!(out, "    {:<10} {}", severity_badge(severity).to_string(), n);
        }
    }
    if !report.ingestion_failures.is_empty() {
        let failed = report.ingestion_failures.len();
        let _ = writeln!(out, "  {} {} source(s) failed to ingest", style("!").yellow(), failed);
    }
    if report.metadata.cancelled {
        let _ = writeln!(out, "  {} run cancelled, {} probes dropped", style("!").yellow(), report.probes.dropped);
    }
    out
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::{
        group_findings, EndpointKey, HttpMethod, ParamLocation, Payload, ProbeState, ProbeStats, RunMetadata,
        SourceFormat, VulnClass,
    };

    fn report() -> RunReport {
        let key = EndpointKey::new(HttpMethod::Get, "/search", SourceFormat::OpenApi);
        let finding = Finding {
            endpoint: key.clone(),
            payload: Payload {
                class: VulnClass::Injection,
                parameter: "q".into(),
                location: ParamLocation::Query,
                value: "'; DROP TABLE users; --".into(),
                reflection_signatures: vec![],
                expected_delay_ms: None,
                template: "sqli.drop-table".into(),
            },
            class: VulnClass::Injection,
            severity: Severity::Critical,
            evidence: "query: '; DROP TABLE users; --".into(),
            confidence: 0.9,
            signatures: vec![SignatureKind::Reflection],
            probe_id: 3,
            probe_state: ProbeState::Completed,
            possible: false,
        };
        RunReport {
            metadata: RunMetadata {
                run_id: "run-1".into(),
                target: Some("http://localhost:8080".into()),
                started_at: Utc::now(),
                finished_at: Utc::now(),
                tool_version: "0.1.0".into(),
                build: None,
                cancelled: false,
            },
            sources: vec![],
            ingestion_failures: vec![],
            warnings: vec!["documentation source x failed to load".into()],
            endpoint_count: 1,
            documentation: vec![],
            probes: ProbeStats::default(),
            findings: group_findings(vec![finding], &[(key, false)]),
        }
    }

    #[test]
    fn test_executive_summary_counts() {
        let summary = format_executive_summary(&report());
        assert!(summary.contains("| Critical | 1 |"));
        assert!(summary.contains("| High | 0 |"));
        assert!(summary.contains("| **Total** | **1** |"));
    }

    #[test]
    fn test_report_markdown_sections() {
        let md = format_report_markdown(&report());
        assert!(md.starts_with("# API Security Assessment Report"));
        assert!(md.contains("### GET /search [openapi] (undocumented)"));
        assert!(md.contains("injection via query parameter 'q' on GET /search"));
        assert!(md.contains("**Confidence:** 0.90"));
        assert!(md.contains("## Warnings"));
    }
}
