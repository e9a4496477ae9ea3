use async_trait::async_trait;
use serde_json::json;

use crate::config::EnrichmentConfig;
use crate::models::{Endpoint, HttpMethod, ParamLocation};
use super::{EnrichmentPass, EnrichmentWarning, Workspace};

const SENSITIVITY_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "auth",
        &[
            "login", "logout", "auth", "token", "password", "session", "oauth", "signin", "signup", "register", "mfa",
            "otp",
        ],
    ),
    ("admin", &["admin", "internal", "manage", "root", "sudo", "superuser"]),
    ("payment", &["pay", "payment", "card", "invoice", "billing", "checkout", "charge", "refund", "wallet"]),
    ("file", &["file", "upload", "download", "attachment", "document", "image", "export", "import"]),
    ("pii", &["user", "profile", "email", "phone", "address", "ssn", "birth", "account", "customer", "person"]),
];

/// Derives resource, action and sensitivity tags from the endpoint itself.
/// Needs no workspace.
pub struct SemanticPass;

#[async_trait]
impl EnrichmentPass for SemanticPass {
    fn name(&self) -> &'static str {
        "semantic_analysis"
    }

    fn enabled(&self, config: &EnrichmentConfig) -> bool {
        config.semantic_analysis
    }

    async fn run(&self, endpoints: &mut [Endpoint], _workspace: &Workspace) -> Vec<EnrichmentWarning> {
        for endpoint in endpoints.iter_mut() {
            let analysis = analyze(endpoint);
            endpoint.annotate(self.name(), "resource", json!(analysis.resource));
            endpoint.annotate(self.name(), "action", json!(analysis.action));
            endpoint.annotate(self.name(), "sensitivity", json!(analysis.sensitivity));
            endpoint.annotate(self.name(), "id_params", json!(analysis.id_params));
            endpoint.annotate(self.name(), "state_changing", json!(analysis.state_changing));
        }
        Vec::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SemanticAnalysis {
    pub resource: String,
    pub action: &'static str,
    pub sensitivity: Vec<&'static str>,
    pub id_params: Vec<String>,
    pub state_changing: bool,
}

pub fn analyze(endpoint: &Endpoint) -> SemanticAnalysis {
    let segments: Vec<&str> = endpoint.request_path().split('/').filter(|s| !s.is_empty()).collect();
    let ends_with_placeholder = segments.last().is_some_and(|s| is_placeholder(s));

    let (resource, action, state_changing) = match &endpoint.graphql {
        Some(op) => {
            let mutation = op.operation_type == "mutation";
            let action = if mutation { mutation_action(&op.field) } else { "read" };
            (op.field.clone(), action, mutation)
        }
        None => {
            let resource = segments.iter().rev()
                .find(|s| !is_placeholder(s) && !is_version(s))
                .map(|s| s.to_string())
                .unwrap_or_else(|| "root".to_string());
            let action = match endpoint.method() {
                HttpMethod::Get | HttpMethod::Head if ends_with_placeholder => "read",
                HttpMethod::Get | HttpMethod::Head => "list",
                HttpMethod::Post => "create",
                HttpMethod::Put | HttpMethod::Patch => "update",
                HttpMethod::Delete => "delete",
                HttpMethod::Options | HttpMethod::Trace => "other",
            };
            (resource, action, endpoint.method().is_state_changing())
        }
    };

    let haystack: Vec<String> = std::iter::once(endpoint.path().to_ascii_lowercase())
        .chain(endpoint.parameters.iter().map(|p| p.name.to_ascii_lowercase()))
        .collect();
    let sensitivity = SENSITIVITY_KEYWORDS.iter()
        .filter(|(_, words)| haystack.iter().any(|h| words.iter().any(|w| h.contains(w))))
        .map(|(tag, _)| *tag)
        .collect();

    let id_params = endpoint.parameters.iter()
        .filter(|p| p.location == ParamLocation::Path || is_id_name(&p.name))
        .map(|p| p.name.clone())
        .collect();

    SemanticAnalysis { resource, action, sensitivity, id_params, state_changing }
}

fn is_placeholder(segment: &str) -> bool {
    segment.starts_with('{') && segment.ends_with('}')
}

fn is_version(segment: &str) -> bool {
    let s = segment.to_ascii_lowercase();
    s == "api" || (s.starts_with('v') && s.len() > 1 && s[1..].chars().all(|c| c.is_ascii_digit() || c == '.'))
}

fn is_id_name(name: &str) -> bool {
    name == "id" || name.ends_with("_id") || name.ends_with("Id") || name.ends_with("ID") || name == "uuid"
}

fn mutation_action(field: &str) -> &'static str {
    let lower = field.to_ascii_lowercase();
    if lower.starts_with("create") || lower.starts_with("add") {
        "create"
    } else if lower.starts_with("update") || lower.starts_with("set") || lower.starts_with("edit") {
        "update"
    } else if lower.starts_with("delete") || lower.starts_with("remove") {
        "delete"
    } else {
        "mutate"
    }
}
