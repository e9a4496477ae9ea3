use std::fmt;

use serde::{Deserialize, Serialize};
use super::endpoint::ParamLocation;

/// Vulnerability class a payload targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VulnClass {
    Injection,
    BlindInjection,
    CommandInjection,
    Xss,
    PathTraversal,
    Ssti,
    TypeConfusion,
}

impl VulnClass {
    pub const ALL: [VulnClass; 7] = [
        VulnClass::Injection,
        VulnClass::BlindInjection,
        VulnClass::CommandInjection,
        VulnClass::Xss,
        VulnClass::PathTraversal,
        VulnClass::Ssti,
        VulnClass::TypeConfusion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Injection => "injection",
            Self::BlindInjection => "blind_injection",
            Self::CommandInjection => "command_injection",
            Self::Xss => "xss",
            Self::PathTraversal => "path_traversal",
            Self::Ssti => "ssti",
            Self::TypeConfusion => "type_confusion",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s.trim())
    }

    /// Classes whose payloads try to stall the server (time-based checks).
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::BlindInjection)
    }

    pub fn cwe_id(&self) -> &'static str {
        match self {
            Self::Injection | Self::BlindInjection => "CWE-89",
            Self::CommandInjection => "CWE-78",
            Self::Xss => "CWE-79",
            Self::PathTraversal => "CWE-22",
            Self::Ssti => "CWE-1336",
            Self::TypeConfusion => "CWE-843",
        }
    }
}

impl fmt::Display for VulnClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single crafted attack input for one parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub class: VulnClass,
    pub parameter: String,
    pub location: ParamLocation,
    /// The literal attack string sent in place of the parameter value.
    pub value: String,
    /// Substrings whose verbatim presence in a response indicates reflection.
    pub reflection_signatures: Vec<String>,
    /// Expected server-side stall for blocking payloads, in milliseconds.
    pub expected_delay_ms: Option<u64>,
    /// Template identifier, stable across runs.
    pub template: String,
}

impl Payload {
    pub fn is_blocking(&self) -> bool {
        self.expected_delay_ms.is_some()
    }
}
