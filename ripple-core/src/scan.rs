//! Entry-point discovery for RTA configuration.

use std::path::Path;

use ripple_graphs::loader::load_program;
use tracing::info;

use crate::error::{Result, RippleError};
use crate::types::EntryCandidate;

#[async_trait::async_trait]
pub trait EntryPointScanner: Send + Sync {
    /// Candidate `file:function` entries for the module under `root`.
    async fn scan(&self, root: &Path) -> Result<Vec<EntryCandidate>>;
}

/// Finds `func main` in `package main` (recommended) and every `init`
/// (optional; it runs whenever its package is imported).
#[derive(Debug, Clone, Default)]
pub struct MainScanner {
    exclude: Vec<String>,
}

impl MainScanner {
    pub fn new(exclude: Vec<String>) -> Self {
        Self { exclude }
    }
}

#[async_trait::async_trait]
impl EntryPointScanner for MainScanner {
    async fn scan(&self, root: &Path) -> Result<Vec<EntryCandidate>> {
        let root = root.to_path_buf();
        let exclude = self.exclude.clone();
        let program = tokio::task::spawn_blocking(move || load_program(&root, &exclude))
            .await
            .map_err(|e| RippleError::Internal(format!("scan task failed: {e}")))??;

        let mut candidates: Vec<EntryCandidate> = program
            .functions
            .iter()
            .filter(|f| f.receiver.is_none())
            .filter_map(|f| {
                let (recommended, reason) = match f.name.as_str() {
                    "main" if f.package_name == "main" => (true, "program entry point"),
                    "init" => (false, "package initializer, runs on import"),
                    _ => return None,
                };
                Some(EntryCandidate {
                    file: f.file.clone(),
                    function: f.name.clone(),
                    package: f.package.clone(),
                    recommended,
                    reason: reason.to_string(),
                })
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.recommended
                .cmp(&a.recommended)
                .then_with(|| a.file.cmp(&b.file))
                .then_with(|| a.function.cmp(&b.function))
        });
        info!(
            module = %program.module_path,
            candidates = candidates.len(),
            "Scanned for entry points"
        );
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[tokio::test]
    async fn recommends_main_before_init() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "go.mod", "module example.com/tool\n");
        write(dir.path(), "cmd/tool/main.go", "package main\n\nfunc init() {}\n\nfunc main() {}\n");
        write(dir.path(), "lib/lib.go", "package lib\n\nfunc init() {}\n\nfunc main() {}\n");
        write(dir.path(), "lib/lib_test.go", "package lib\n\nfunc init() {}\n");

        let found = MainScanner::default().scan(dir.path()).await.unwrap();
        let summary: Vec<(&str, &str, bool)> = found
            .iter()
            .map(|c| (c.file.as_str(), c.function.as_str(), c.recommended))
            .collect();
        assert_eq!(
            summary,
            [
                ("cmd/tool/main.go", "main", true),
                ("cmd/tool/main.go", "init", false),
                ("lib/lib.go", "init", false),
            ]
        );
        assert_eq!(found[0].package, "example.com/tool/cmd/tool");
    }

    #[tokio::test]
    async fn library_has_no_candidates() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "go.mod", "module example.com/lib\n");
        write(dir.path(), "lib.go", "package lib\n\nfunc Do() {}\n");
        assert!(MainScanner::default().scan(dir.path()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_module_is_invalid_input() {
        let dir = tempfile::tempdir().unwrap();
        let err = MainScanner::default().scan(dir.path()).await.unwrap_err();
        assert_eq!(err.code(), "INPUT_INVALID");
    }
}
