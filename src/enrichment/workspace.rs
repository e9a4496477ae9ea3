use std::path::{Path, PathBuf};

use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Shared, lazily indexed view of the enrichment workspace directory.
#[derive(Debug, Default)]
pub struct Workspace {
    root: Option<PathBuf>,
    source_maps: OnceCell<Vec<PathBuf>>,
    type_definitions: OnceCell<Vec<PathBuf>>,
}

impl Workspace {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root, ..Default::default() }
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// `*.map` files under the workspace, sorted.
    pub async fn source_maps(&self) -> &[PathBuf] {
        self.source_maps
            .get_or_init(|| async { self.index("**/*.map") })
            .await
    }

    /// `*.d.ts` files under the workspace, sorted.
    pub async fn type_definitions(&self) -> &[PathBuf] {
        self.type_definitions
            .get_or_init(|| async { self.index("**/*.d.ts") })
            .await
    }

    fn index(&self, pattern: &str) -> Vec<PathBuf> {
        let Some(root) = &self.root else { return Vec::new() };
        if !root.is_dir() {
            warn!(root = %root.display(), "Enrichment workspace is not a directory");
            return Vec::new();
        }

        let pattern = root.join(pattern);
        let pattern_str = pattern.to_string_lossy();
        let entries = match glob::glob(&pattern_str) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Invalid workspace glob pattern");
                return Vec::new();
            }
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| match entry {
                Ok(path) => Some(path),
                Err(e) => {
                    debug!(error = %e, "Skipping unreadable workspace entry");
                    None
                }
            })
            .filter(|path| !path.components().any(|c| c.as_os_str() == "node_modules"))
            .filter(|path| path.is_file())
            .collect();
        files.sort();
        debug!(pattern = %pattern_str, files = files.len(), "Indexed workspace");
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_indexes_maps_and_definitions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("dist/js")).unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules/lib")).unwrap();
        std::fs::write(dir.path().join("dist/js/app.js.map"), "{}").unwrap();
        std::fs::write(dir.path().join("dist/types.d.ts"), "").unwrap();
        std::fs::write(dir.path().join("node_modules/lib/index.d.ts"), "").unwrap();

        let workspace = Workspace::new(Some(dir.path().to_path_buf()));
        assert_eq!(workspace.source_maps().await.len(), 1);
        let defs = workspace.type_definitions().await;
        assert_eq!(defs.len(), 1);
        assert!(defs[0].ends_with("dist/types.d.ts"));
    }

    #[tokio::test]
    async fn test_no_root_is_empty() {
        let workspace = Workspace::new(None);
        assert!(workspace.source_maps().await.is_empty());
        assert!(workspace.root().is_none());
    }
}
