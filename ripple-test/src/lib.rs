// Integration test utilities and Go fixture repositories for Ripple.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use ripple_core::config::RippleConfig;
use ripple_core::registry::FileProjectRegistry;
use ripple_core::service::AnalysisService;

pub const SHOP_MODULE: &str = "example.com/shop";

/// A test fixture with a temporary git repository.
#[derive(Debug)]
pub struct TestRepo {
    pub dir: tempfile::TempDir,
}

impl TestRepo {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// A small Go service with two commits.
    ///
    /// Call chain: `main.main -> core.Run -> core.Process -> core.validate`,
    /// plus `core.Audit -> core.Process`. The second commit adds
    /// `core.Audit`.
    pub fn go_service() -> Self {
        let dir = tempfile::tempdir().expect("create tempdir");
        let root = dir.path();
        init(root);

        write_file(root, "go.mod", "module example.com/shop\n\ngo 1.22\n");
        write_file(
            root,
            "main.go",
            "package main\n\nimport \"example.com/shop/core\"\n\nfunc main() {\n\tcore.Run()\n}\n",
        );
        write_file(
            root,
            "core/core.go",
            "package core\n\nfunc Run() {\n\tProcess()\n}\n\nfunc Process() {\n\tvalidate()\n}\n\nfunc validate() {}\n",
        );
        write_file(
            root,
            "core/core_test.go",
            "package core\n\nimport \"testing\"\n\nfunc TestRun(t *testing.T) {\n\tRun()\n}\n",
        );
        git(root, &["add", "."]);
        git(root, &["commit", "-m", "Initial service"]);

        write_file(
            root,
            "core/audit.go",
            "package core\n\nfunc Audit() {\n\tProcess()\n}\n",
        );
        git(root, &["add", "."]);
        git(root, &["commit", "-m", "Add audit"]);

        Self { dir }
    }

    /// A Go library without `main` or `init`.
    pub fn go_library() -> Self {
        let dir = tempfile::tempdir().expect("create tempdir");
        let root = dir.path();
        init(root);

        write_file(root, "go.mod", "module example.com/lib\n");
        write_file(
            root,
            "lib.go",
            "package lib\n\nfunc Parse(s string) int {\n\treturn count(s)\n}\n\nfunc count(s string) int {\n\treturn len(s)\n}\n",
        );
        git(root, &["add", "."]);
        git(root, &["commit", "-m", "Initial library"]);

        Self { dir }
    }

    pub fn write(&self, rel: &str, contents: &str) {
        write_file(self.path(), rel, contents);
    }

    pub fn commit_all(&self, message: &str) -> String {
        git(self.path(), &["add", "-A"]);
        git(self.path(), &["commit", "-m", message]);
        self.rev_parse("HEAD")
    }

    pub fn rev_parse(&self, reference: &str) -> String {
        git_output(self.path(), &["rev-parse", reference])
    }
}

/// Service wiring for tests: storage and worktrees live under `data_dir`,
/// dependency download is off.
pub fn service(data_dir: &Path) -> Arc<AnalysisService> {
    let mut config = RippleConfig::default();
    config.storage.data_dir = data_dir.to_path_buf();
    config.worktree.materialize_deps = false;
    config.worktree.temp_prefix = "ripple-test".into();
    let registry = FileProjectRegistry::load(&config.registry_path()).expect("load registry");
    Arc::new(
        AnalysisService::new(config, Arc::new(registry)).with_worktree_root(data_dir.to_path_buf()),
    )
}

/// Worktree directories currently under `dir`.
pub fn worktree_dirs(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|e| e.path())
                .filter(|p| {
                    p.file_name()
                        .is_some_and(|n| n.to_string_lossy().contains("-worktree-"))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn init(root: &Path) {
    git(root, &["init", "--initial-branch=main"]);
    git(root, &["config", "user.email", "test@ripple.dev"]);
    git(root, &["config", "user.name", "Test"]);
}

fn git(dir: &Path, args: &[&str]) {
    git_output(dir, args);
}

fn git_output(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_DATE", "2025-01-15T10:00:00+00:00")
        .env("GIT_COMMITTER_DATE", "2025-01-15T10:00:00+00:00")
        .output()
        .unwrap_or_else(|e| panic!("git {}: {e}", args.join(" ")));
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!("git {} failed: {stderr}", args.join(" "));
    }
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn write_file(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}
