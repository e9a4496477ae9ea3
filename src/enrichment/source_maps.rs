use std::collections::BTreeSet;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::EnrichmentConfig;
use crate::models::Endpoint;
use super::{EnrichmentPass, EnrichmentWarning, Workspace};

/// Links endpoints to the original frontend sources that reference their path.
pub struct SourceMapPass;

#[derive(Debug, Deserialize)]
struct SourceMap {
    #[serde(default)]
    sources: Vec<String>,
    #[serde(default, rename = "sourcesContent")]
    sources_content: Vec<Option<String>>,
}

#[async_trait]
impl EnrichmentPass for SourceMapPass {
    fn name(&self) -> &'static str {
        "source_maps"
    }

    fn enabled(&self, config: &EnrichmentConfig) -> bool {
        config.source_maps
    }

    async fn run(&self, endpoints: &mut [Endpoint], workspace: &Workspace) -> Vec<EnrichmentWarning> {
        let mut warnings = Vec::new();
        if workspace.root().is_none() {
            warnings.push(EnrichmentWarning::new(self.name(), "no workspace configured"));
            return warnings;
        }

        let mut sources: Vec<(String, String)> = Vec::new();
        for path in workspace.source_maps().await {
            let content = match tokio::fs::read_to_string(path).await {
                Ok(c) => c,
                Err(e) => {
                    warnings.push(EnrichmentWarning::new(self.name(), format!("{}: {}", path.display(), e)));
                    continue;
                }
            };
            match serde_json::from_str::<SourceMap>(&content) {
                Ok(map) => {
                    for (name, body) in map.sources.into_iter().zip(map.sources_content) {
                        if let Some(body) = body {
                            sources.push((name, body));
                        }
                    }
                }
                Err(e) => warnings.push(EnrichmentWarning::new(
                    self.name(),
                    format!("unparseable source map {}: {}", path.display(), e),
                )),
            }
        }
        debug!(sources = sources.len(), "Loaded original sources from maps");

        for endpoint in endpoints.iter_mut() {
            let Some(pattern) = path_literal_pattern(endpoint.request_path()) else { continue };
            let files: BTreeSet<&str> = sources.iter()
                .filter(|(_, body)| pattern.is_match(body))
                .map(|(name, _)| name.as_str())
                .collect();
            if !files.is_empty() {
                endpoint.annotate(self.name(), "files", json!(files));
            }
        }
        warnings
    }
}

/// Regex matching a path template as written in client code. `{id}` segments
/// also match `:id`, `${expr}` and `{id}` forms.
fn path_literal_pattern(path: &str) -> Option<Regex> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.len() < 2 {
        return None;
    }

    let mut pattern = String::new();
    let mut rest = trimmed;
    while let Some(start) = rest.find('{') {
        pattern.push_str(&regex::escape(&rest[..start]));
        let Some(end) = rest[start..].find('}') else { break };
        pattern.push_str(r"(?:\{[^}/]+\}|:[A-Za-z_]\w*|\$\{[^}]+\})");
        rest = &rest[start + end + 1..];
    }
    pattern.push_str(&regex::escape(rest));
    pattern.push_str(r"(?:[^A-Za-z0-9_\-/]|/?$)");
    Regex::new(&pattern).ok()
}
