use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ApiProbeError;
use super::endpoint::{EndpointKey, SourceFormat};
use super::finding::{Finding, Severity};
use super::payload::VulnClass;

/// A source that produced endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSuccess {
    pub identifier: String,
    pub ingestor: String,
    pub format: SourceFormat,
    pub endpoints: usize,
}

/// A source that could not be ingested. Fatal for that source only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFailure {
    pub identifier: String,
    pub error_type: String,
    pub message: String,
}

impl SourceFailure {
    pub fn from_error(identifier: impl Into<String>, error: &ApiProbeError) -> Self {
        Self {
            identifier: identifier.into(),
            error_type: error.classify().error_type.to_string(),
            message: error.to_string(),
        }
    }
}

/// Counts of terminal probe states for the run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeStats {
    pub submitted: usize,
    pub completed: usize,
    pub failed: usize,
    pub timed_out: usize,
    /// Pending probes discarded by cancellation, never started.
    pub dropped: usize,
    pub baselines: usize,
    pub peak_in_flight: usize,
}

/// Findings for one vulnerability class on one endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassFindings {
    pub class: VulnClass,
    pub findings: Vec<Finding>,
}

/// Findings for one endpoint, grouped by class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointFindings {
    pub endpoint: EndpointKey,
    pub documented: bool,
    pub classes: Vec<ClassFindings>,
}

/// Documentation coverage summary for one endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentationSummary {
    pub endpoint: EndpointKey,
    pub documented: bool,
    pub best_similarity: Option<f32>,
    pub confidence: Option<f32>,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: String,
    pub target: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub tool_version: String,
    pub build: Option<String>,
    pub cancelled: bool,
}

/// The full result of a scan run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub metadata: RunMetadata,
    pub sources: Vec<SourceSuccess>,
    pub ingestion_failures: Vec<SourceFailure>,
    pub warnings: Vec<String>,
    pub endpoint_count: usize,
    pub documentation: Vec<DocumentationSummary>,
    pub probes: ProbeStats,
    pub findings: Vec<EndpointFindings>,
}

impl RunReport {
    pub fn all_findings(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter()
            .flat_map(|e| e.classes.iter())
            .flat_map(|c| c.findings.iter())
    }

    pub fn total_findings(&self) -> usize {
        self.all_findings().count()
    }

    /// Returns a map of severity level to the count of findings at that severity.
    pub fn finding_counts(&self) -> HashMap<Severity, usize> {
        let mut counts = HashMap::new();
        for finding in self.all_findings() {
            *counts.entry(finding.severity).or_insert(0) += 1;
        }
        counts
    }

    pub fn documented_count(&self) -> usize {
        self.documentation.iter().filter(|d| d.documented).count()
    }
}

/// Group findings by endpoint, then by vulnerability class.
///
/// Endpoints appear in `endpoint_order`; classes in their declared order;
/// findings within a class by probe id. The output is independent of the
/// order in which probes completed.
pub fn group_findings(
    findings: Vec<Finding>,
    endpoint_order: &[(EndpointKey, bool)],
) -> Vec<EndpointFindings> {
    let mut by_endpoint: HashMap<EndpointKey, BTreeMap<VulnClass, Vec<Finding>>> = HashMap::new();
    for finding in findings {
        by_endpoint
            .entry(finding.endpoint.clone())
            .or_default()
            .entry(finding.class)
            .or_default()
            .push(finding);
    }

    let mut grouped = Vec::new();
    for (key, documented) in endpoint_order {
        let Some(classes) = by_endpoint.remove(key) else { continue };
        let classes = classes
            .into_iter()
            .map(|(class, mut findings)| {
                findings.sort_by_key(|f| f.probe_id);
                ClassFindings { class, findings }
            })
            .collect();
        grouped.push(EndpointFindings {
            endpoint: key.clone(),
            documented: *documented,
            classes,
        });
    }
    grouped
}
