use crate::models::{ProbeState, Severity, VulnClass};
use super::phase::ScanPhase;

/// Progress notifications streamed from a running scan.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    ScanStarted {
        run_id: String,
        target: Option<String>,
    },
    PhaseStarted {
        phase: ScanPhase,
        display_name: String,
    },
    PhaseCompleted {
        phase: ScanPhase,
        display_name: String,
    },
    SourceIngested {
        identifier: String,
        ingestor: String,
        endpoints: usize,
    },
    SourceFailed {
        identifier: String,
        error: String,
    },
    /// A batch of probes was queued for the current phase.
    ProbesScheduled {
        phase: ScanPhase,
        count: usize,
    },
    ProbeFinished {
        probe_id: usize,
        state: ProbeState,
    },
    FindingDiscovered {
        title: String,
        severity: Severity,
        class: VulnClass,
    },
    Warning {
        message: String,
    },
    ScanCompleted {
        total_findings: usize,
        total_duration_ms: u64,
        cancelled: bool,
    },
    ScanFailed {
        error: String,
    },
}
