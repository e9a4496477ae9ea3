use serde::{Deserialize, Serialize};
use super::endpoint::EndpointKey;
use super::payload::{Payload, VulnClass};
use super::probe::ProbeState;

/// Severity level for a security finding, ordered from most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    /// Returns a numeric rank where lower values indicate higher severity.
    /// Critical = 0, High = 1, Medium = 2, Low = 3, Info = 4.
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Critical => 0,
            Severity::High => 1,
            Severity::Medium => 2,
            Severity::Low => 3,
            Severity::Info => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }

    /// One step less severe; used to down-grade unconfirmed findings.
    pub fn lowered(&self) -> Severity {
        match self {
            Severity::Critical => Severity::High,
            Severity::High => Severity::Medium,
            Severity::Medium => Severity::Low,
            Severity::Low | Severity::Info => Severity::Info,
        }
    }
}

/// Which heuristic matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureKind {
    /// Attack string or its signature echoed verbatim in the response body.
    Reflection,
    /// Known error-message text (e.g. a database driver error).
    ErrorFingerprint,
    /// 5xx under attack where the benign request did not fail.
    StatusAnomaly,
    /// Response time grew by roughly the payload's expected delay.
    LatencyAnomaly,
    /// Response body diverged sharply from the baseline together with a status change.
    BodyDivergence,
    /// Blocking payload left the endpoint unresponsive.
    Timeout,
}

impl SignatureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reflection => "reflection",
            Self::ErrorFingerprint => "error_fingerprint",
            Self::StatusAnomaly => "status_anomaly",
            Self::LatencyAnomaly => "latency_anomaly",
            Self::BodyDivergence => "body_divergence",
            Self::Timeout => "timeout",
        }
    }
}

/// An evidence-backed suspected vulnerability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub endpoint: EndpointKey,
    pub payload: Payload,
    pub class: VulnClass,
    pub severity: Severity,
    /// Response excerpt around the strongest match.
    pub evidence: String,
    pub confidence: f32,
    pub signatures: Vec<SignatureKind>,
    pub probe_id: usize,
    pub probe_state: ProbeState,
    /// Set when the signal is suggestive but unconfirmed (e.g. a timeout).
    pub possible: bool,
}

impl Finding {
    pub fn title(&self) -> String {
        let prefix = if self.possible { "Possible " } else { "" };
        format!(
            "{}{} via {} parameter '{}' on {} {}",
            prefix,
            self.class,
            self.payload.location.as_str(),
            self.payload.parameter,
            self.endpoint.method(),
            self.endpoint.path(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_rank_ordering() {
        assert!(Severity::Critical.rank() < Severity::High.rank());
        assert!(Severity::Low.rank() < Severity::Info.rank());
    }

    #[test]
    fn test_severity_lowered() {
        assert_eq!(Severity::Critical.lowered(), Severity::High);
        assert_eq!(Severity::Info.lowered(), Severity::Info);
    }

    #[test]
    fn test_severity_deserialize() {
        let parsed: Severity = serde_json::from_str("\"high\"").unwrap();
        assert_eq!(parsed, Severity::High);
    }
}
