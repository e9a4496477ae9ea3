use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::config::{CodeDiscoveryConfig, EnrichmentConfig};
use crate::models::Endpoint;
use super::{EnrichmentPass, EnrichmentWarning, Workspace};

const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(120);

/// A route handler reported by the external discovery tool.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DiscoveredHandler {
    pub method: String,
    pub path: String,
    pub file: String,
    #[serde(default)]
    pub line: Option<u64>,
}

/// Runs the external code-discovery binary over the workspace and records
/// handler locations on matching endpoints.
pub struct CodeDiscoveryPass {
    config: CodeDiscoveryConfig,
}

impl CodeDiscoveryPass {
    pub fn new(config: CodeDiscoveryConfig) -> Self {
        Self { config }
    }

    async fn discover(&self, workspace: &Workspace) -> Result<Vec<DiscoveredHandler>, String> {
        let root = workspace.root().ok_or("no workspace configured")?;
        // The command may carry leading arguments, e.g. `node tools/discover.js`.
        let mut words = self.config.command.split_whitespace();
        let program = words.next().ok_or("empty discovery command")?;

        let mut command = tokio::process::Command::new(program);
        command.args(words)
            .arg("--workspace")
            .arg(root)
            .args(["--format", "json"])
            .kill_on_drop(true);
        if self.config.safe_mode {
            command.arg("--safe-mode");
        }

        debug!(program, safe_mode = self.config.safe_mode, "Running code discovery");
        let output = tokio::time::timeout(DISCOVERY_TIMEOUT, command.output())
            .await
            .map_err(|_| format!("'{}' timed out after {}s", program, DISCOVERY_TIMEOUT.as_secs()))?
            .map_err(|e| format!("failed to run '{}': {}", program, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "'{}' exited with code {}: {}",
                program,
                output.status.code().unwrap_or(-1),
                stderr.trim()
            ));
        }

        serde_json::from_slice(&output.stdout).map_err(|e| format!("invalid discovery output: {}", e))
    }
}

#[async_trait]
impl EnrichmentPass for CodeDiscoveryPass {
    fn name(&self) -> &'static str {
        "code_discovery"
    }

    fn enabled(&self, config: &EnrichmentConfig) -> bool {
        config.code_discovery.enabled
    }

    async fn run(&self, endpoints: &mut [Endpoint], workspace: &Workspace) -> Vec<EnrichmentWarning> {
        let handlers = match self.discover(workspace).await {
            Ok(h) => h,
            Err(message) => return vec![EnrichmentWarning::new(self.name(), message)],
        };
        info!(handlers = handlers.len(), "Code discovery finished");

        for endpoint in endpoints.iter_mut() {
            let template = normalize_template(endpoint.request_path());
            let matched = handlers.iter().find(|h| {
                h.method.eq_ignore_ascii_case(endpoint.method().as_str()) && normalize_template(&h.path) == template
            });
            if let Some(handler) = matched {
                endpoint.annotate(self.name(), "handler", json!({ "file": handler.file, "line": handler.line }));
            }
        }
        Vec::new()
    }
}

/// Collapse `{id}` and `:id` segments so templates compare by shape.
fn normalize_template(path: &str) -> String {
    path.trim_end_matches('/')
        .split('/')
        .map(|segment| {
            if segment.starts_with(':') || (segment.starts_with('{') && segment.ends_with('}')) {
                "{}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}
