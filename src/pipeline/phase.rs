use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ScanPhase {
    Ingestion,
    Enrichment,
    DocumentationMatching,
    Baseline,
    Probing,
}

pub struct PhaseDefinition {
    pub name: ScanPhase,
    pub display_name: &'static str,
    pub description: &'static str,
}

pub static PHASES: &[PhaseDefinition] = &[
    PhaseDefinition {
        name: ScanPhase::Ingestion,
        display_name: "Ingestion",
        description: "Normalize API descriptions into endpoints",
    },
    PhaseDefinition {
        name: ScanPhase::Enrichment,
        display_name: "Enrichment",
        description: "Source maps, type definitions, semantic tags and code discovery",
    },
    PhaseDefinition {
        name: ScanPhase::DocumentationMatching,
        display_name: "Documentation Matching",
        description: "Embed documentation and attach confidence-scored matches",
    },
    PhaseDefinition {
        name: ScanPhase::Baseline,
        display_name: "Baseline Probes",
        description: "One benign request per endpoint",
    },
    PhaseDefinition {
        name: ScanPhase::Probing,
        display_name: "Attack Probes",
        description: "Adversarial payloads and response classification",
    },
];

impl ScanPhase {
    pub fn display_name(&self) -> &'static str {
        PHASES.iter()
            .find(|p| p.name == *self)
            .map(|p| p.display_name)
            .unwrap_or("Unknown")
    }
}
