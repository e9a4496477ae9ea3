use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;
use tracing::debug;

use crate::config::EnrichmentConfig;
use crate::models::{Endpoint, ParamLocation};
use super::{EnrichmentPass, EnrichmentWarning, Workspace};

static DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^\s*(?:export\s+)?(?:declare\s+)?(?:interface\s+(\w+)(?:<[^>{]*>)?(?:\s+extends\s+[^{]+)?|type\s+(\w+)(?:<[^>=]*>)?\s*=)\s*\{([^{}]*)\}",
    )
    .unwrap()
});

static FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*(?:readonly\s+)?["']?([A-Za-z_$][\w$]*)["']?(\?)?\s*:\s*(.+?)\s*$"#).unwrap()
});

/// A flat interface or object type alias from a `.d.ts` file.
#[derive(Debug, Clone, PartialEq)]
pub struct TsDeclaration {
    pub name: String,
    pub file: String,
    /// Field name to type text, in declared order.
    pub fields: Vec<(String, String)>,
}

/// Attaches the best-matching TypeScript request type to endpoints with body parameters.
pub struct TypeScriptPass;

#[async_trait]
impl EnrichmentPass for TypeScriptPass {
    fn name(&self) -> &'static str {
        "typescript_definitions"
    }

    fn enabled(&self, config: &EnrichmentConfig) -> bool {
        config.typescript_definitions
    }

    async fn run(&self, endpoints: &mut [Endpoint], workspace: &Workspace) -> Vec<EnrichmentWarning> {
        let mut warnings = Vec::new();
        if workspace.root().is_none() {
            warnings.push(EnrichmentWarning::new(self.name(), "no workspace configured"));
            return warnings;
        }

        let mut declarations = Vec::new();
        for path in workspace.type_definitions().await {
            match tokio::fs::read_to_string(path).await {
                Ok(content) => declarations.extend(parse_declarations(&content, &display_name(path, workspace))),
                Err(e) => warnings.push(EnrichmentWarning::new(self.name(), format!("{}: {}", path.display(), e))),
            }
        }
        debug!(declarations = declarations.len(), "Parsed TypeScript declarations");

        for endpoint in endpoints.iter_mut() {
            let body: Vec<&str> = endpoint.parameters_in(ParamLocation::Body).map(|p| p.name.as_str()).collect();
            let Some(best) = best_match(&declarations, &body) else { continue };
            let fields: BTreeMap<&str, &str> = best.fields.iter().map(|(n, t)| (n.as_str(), t.as_str())).collect();
            let (name, file, fields) = (json!(best.name), json!(best.file), json!(fields));
            endpoint.annotate(self.name(), "type", name);
            endpoint.annotate(self.name(), "file", file);
            endpoint.annotate(self.name(), "fields", fields);
        }
        warnings
    }
}

fn display_name(path: &Path, workspace: &Workspace) -> String {
    workspace.root()
        .and_then(|root| path.strip_prefix(root).ok())
        .unwrap_or(path)
        .display()
        .to_string()
}

pub fn parse_declarations(content: &str, file: &str) -> Vec<TsDeclaration> {
    DECLARATION.captures_iter(content)
        .filter_map(|caps| {
            let name = caps.get(1).or_else(|| caps.get(2))?.as_str().to_string();
            let fields = caps[3]
                .split([';', '\n', ','])
                .filter_map(|line| {
                    let line = line.split("//").next().unwrap_or("");
                    let field = FIELD.captures(line)?;
                    Some((field[1].to_string(), field[3].to_string()))
                })
                .collect::<Vec<_>>();
            (!fields.is_empty()).then(|| TsDeclaration { name, file: file.to_string(), fields })
        })
        .collect()
}

/// Declaration sharing the most field names with `body`; the earliest wins ties.
fn best_match<'a>(declarations: &'a [TsDeclaration], body: &[&str]) -> Option<&'a TsDeclaration> {
    if body.is_empty() {
        return None;
    }
    let mut best: Option<(&TsDeclaration, usize)> = None;
    for decl in declarations {
        let overlap = decl.fields.iter().filter(|(name, _)| body.contains(&name.as_str())).count();
        if overlap > 0 && best.map_or(true, |(_, score)| overlap > score) {
            best = Some((decl, overlap));
        }
    }
    best.map(|(decl, _)| decl)
}
