//! Map a `git diff` to the Go functions it touches.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use ripple_graphs::loader::{is_analyzable_source, module_path, package_path};
use ripple_graphs::spans::{FunctionSpan, function_spans};
use ripple_graphs::syntax::{first_error_line, parse_go};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, RippleError};
use crate::types::{ChangeType, ChangedFunction, DiffAnalysisResult, DiffSummary};
use crate::vcs::GitClient;

/// One `@@` hunk of a zero-context diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffHunk {
    pub file: String,
    pub old_start: u32,
    pub old_count: u32,
    pub new_start: u32,
    pub new_count: u32,
    /// The whole file was deleted.
    pub is_deleted: bool,
    /// The whole file is new.
    pub is_added: bool,
}

impl DiffHunk {
    /// Inclusive line range this hunk affects. Old-side for deletions and
    /// zero-new-line hunks, new-side otherwise.
    pub fn affected_lines(&self) -> (u32, u32) {
        let (start, count) = if self.is_deleted || self.new_count == 0 {
            (self.old_start, self.old_count)
        } else {
            (self.new_start, self.new_count)
        };
        (start, start.saturating_add(count.saturating_sub(1)))
    }
}

// ── Parsing ────────────────────────────────────────────────────────

/// `-12,3` / `+7` -> (start, count); an omitted count means 1.
fn parse_range(token: &str, sign: char) -> Option<(u32, u32)> {
    let range = token.strip_prefix(sign)?;
    match range.split_once(',') {
        Some((start, count)) => Some((start.parse().ok()?, count.parse().ok()?)),
        None => Some((range.parse().ok()?, 1)),
    }
}

fn parse_hunk_header(line: &str) -> Option<((u32, u32), (u32, u32))> {
    let rest = line.strip_prefix("@@ ")?;
    let (ranges, _) = rest.split_once(" @@")?;
    let mut parts = ranges.split_whitespace();
    let old = parse_range(parts.next()?, '-')?;
    let new = parse_range(parts.next()?, '+')?;
    Some((old, new))
}

/// `diff --git a/X b/Y` -> `Y`.
fn parse_file_header(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("diff --git ")?;
    let idx = rest.rfind(" b/")?;
    Some(&rest[idx + 3..])
}

/// Parse unified diff text into hunks, in order of appearance.
pub fn parse_unified_diff(text: &str) -> Vec<DiffHunk> {
    let mut hunks = Vec::new();
    let mut file: Option<String> = None;
    let mut is_deleted = false;
    let mut is_added = false;

    for line in text.lines() {
        if let Some(path) = parse_file_header(line) {
            file = Some(path.to_string());
            is_deleted = false;
            is_added = false;
        } else if line.starts_with("deleted file mode") {
            is_deleted = true;
        } else if line.starts_with("new file mode") {
            is_added = true;
        } else if let Some(((old_start, old_count), (new_start, new_count))) = parse_hunk_header(line) {
            let Some(file) = &file else {
                continue;
            };
            hunks.push(DiffHunk {
                file: file.clone(),
                old_start,
                old_count,
                new_start,
                new_count,
                is_deleted,
                is_added,
            });
        }
    }
    hunks
}

/// Empty and `working` select uncommitted changes against HEAD. Anything
/// else must be one ref, `a..b` or `a...b`, and is handed to git as a
/// single argument.
pub fn normalize_range(range: &str) -> Result<Option<String>> {
    let range = range.trim();
    if range.is_empty() || range == "working" {
        return Ok(None);
    }
    let refs: Vec<&str> = match range.split_once("...").or_else(|| range.split_once("..")) {
        Some((from, to)) => vec![from, to],
        None => vec![range],
    };
    let malformed = range.chars().any(|c| c.is_whitespace() || c.is_control())
        || refs.iter().any(|r| r.starts_with('-') || r.contains(".."))
        || refs.iter().all(|r| r.is_empty());
    if malformed {
        return Err(RippleError::InputInvalid(format!("malformed commit range '{range}'")));
    }
    Ok(Some(range.to_string()))
}

// ── Function mapping ───────────────────────────────────────────────

/// Package import path of `file` (relative to `repo`), from the nearest
/// enclosing go.mod at or below `repo`.
fn package_of(repo: &Path, file: &str) -> Option<String> {
    let abs = repo.join(file);
    let mut dir: PathBuf = abs.parent()?.to_path_buf();
    loop {
        let go_mod = dir.join("go.mod");
        if go_mod.is_file() {
            let module = module_path(&std::fs::read_to_string(&go_mod).ok()?)?;
            let rel_dir = abs
                .parent()?
                .strip_prefix(&dir)
                .ok()?
                .to_string_lossy()
                .replace('\\', "/");
            return Some(package_path(&module, &rel_dir));
        }
        if dir == repo || !dir.pop() || !dir.starts_with(repo) {
            return None;
        }
    }
}

fn placeholders(file: &str, hunks: &[DiffHunk]) -> Vec<ChangedFunction> {
    hunks
        .iter()
        .map(|h| {
            let (start, end) = h.affected_lines();
            ChangedFunction {
                name: "unknown".to_string(),
                full_name: String::new(),
                package: String::new(),
                file: file.to_string(),
                line_start: start,
                line_end: end,
                change_type: ChangeType::Deleted,
                lines_added: h.new_count,
                lines_removed: h.old_count,
            }
        })
        .collect()
}

fn display_func_name(span: &FunctionSpan) -> String {
    match &span.receiver {
        Some(recv) => format!("{recv}.{}", span.name),
        None => span.name.clone(),
    }
}

/// Functions in `spans` overlapped by any hunk, in declaration order.
/// Line counts add up over every overlapping hunk; the change type comes
/// from the first.
pub fn touched_functions(
    file: &str,
    package: &str,
    spans: &[FunctionSpan],
    hunks: &[DiffHunk],
) -> Vec<ChangedFunction> {
    let mut out = Vec::new();
    for span in spans {
        let mut touching = hunks.iter().filter(|h| {
            let (start, end) = h.affected_lines();
            span.overlaps(start, end)
        });
        let Some(first) = touching.next() else {
            continue;
        };
        let change_type = if first.is_added {
            ChangeType::Added
        } else if first.is_deleted {
            ChangeType::Deleted
        } else {
            ChangeType::Modified
        };
        let (added, removed) = touching.fold((first.new_count, first.old_count), |(a, r), h| {
            (a.saturating_add(h.new_count), r.saturating_add(h.old_count))
        });
        out.push(ChangedFunction {
            name: display_func_name(span),
            full_name: span.qualified_name.clone(),
            package: package.to_string(),
            file: file.to_string(),
            line_start: span.start_line,
            line_end: span.end_line,
            change_type,
            lines_added: added,
            lines_removed: removed,
        });
    }
    out
}

/// Changed functions of one file. Files gone from disk yield one
/// placeholder per hunk.
pub fn changed_functions_in_file(repo: &Path, file: &str, hunks: &[DiffHunk]) -> Result<Vec<ChangedFunction>> {
    let abs = repo.join(file);
    if hunks.iter().any(|h| h.is_deleted) || !abs.is_file() {
        return Ok(placeholders(file, hunks));
    }
    let source = std::fs::read_to_string(&abs)
        .map_err(|e| RippleError::InputInvalid(format!("{file}: {e}")))?;
    let tree = parse_go(&source, file)?;
    if let Some(line) = first_error_line(&tree) {
        return Err(RippleError::InputInvalid(format!("{file}:{line}: syntax error")));
    }
    let package = package_of(repo, file).unwrap_or_default();
    let spans = function_spans(&tree, &source, &package);
    Ok(touched_functions(file, &package, &spans, hunks))
}

/// Drop repeats by qualified name; unnamed entries fall back to file and
/// name, so a deleted file reports one placeholder.
pub fn dedup(functions: Vec<ChangedFunction>) -> Vec<ChangedFunction> {
    let mut seen = HashSet::new();
    functions
        .into_iter()
        .filter(|f| {
            let key = if f.full_name.is_empty() {
                format!("{}:{}", f.file, f.name)
            } else {
                f.full_name.clone()
            };
            seen.insert(key)
        })
        .collect()
}

/// Group analyzable hunks by file, keeping first-seen file order.
fn group_by_file(hunks: Vec<DiffHunk>) -> Vec<(String, Vec<DiffHunk>)> {
    let mut groups: Vec<(String, Vec<DiffHunk>)> = Vec::new();
    for hunk in hunks.into_iter().filter(|h| is_analyzable_source(&h.file)) {
        match groups.iter_mut().find(|(f, _)| *f == hunk.file) {
            Some((_, list)) => list.push(hunk),
            None => groups.push((hunk.file.clone(), vec![hunk])),
        }
    }
    groups
}

fn resolve(repo: &Path, commit_range: String, hunks: Vec<DiffHunk>) -> DiffAnalysisResult {
    let groups = group_by_file(hunks);
    let changed_files: Vec<String> = groups.iter().map(|(f, _)| f.clone()).collect();
    let mut functions = Vec::new();
    for (file, hunks) in &groups {
        match changed_functions_in_file(repo, file, hunks) {
            Ok(found) => functions.extend(found),
            Err(e) => warn!(file = %file, error = %e, "Skipping file in diff analysis"),
        }
    }
    let changed_functions = dedup(functions);
    let summary = DiffSummary::from_changes(&changed_files, &changed_functions);
    DiffAnalysisResult {
        commit_range,
        changed_files,
        changed_functions,
        summary,
    }
}

#[derive(Debug, Clone, Default)]
pub struct DiffResolver {
    git: GitClient,
}

impl DiffResolver {
    pub fn new(git: GitClient) -> Self {
        Self { git }
    }

    /// Changed Go functions for `commit_range` (empty or `working` for
    /// uncommitted changes). A git failure aborts; a file that cannot be
    /// parsed is logged and skipped.
    pub async fn analyze(&self, repo: &Path, commit_range: &str) -> Result<DiffAnalysisResult> {
        if !repo.is_dir() {
            return Err(RippleError::InputInvalid(format!(
                "{} is not a directory",
                repo.display()
            )));
        }
        let range = normalize_range(commit_range)?;
        let text = self.git.diff(repo, range.as_deref()).await?;
        let hunks = parse_unified_diff(&text);
        debug!(hunks = hunks.len(), "Parsed diff");

        let label = range.unwrap_or_else(|| "working".to_string());
        let repo = repo.to_path_buf();
        let result = tokio::task::spawn_blocking(move || resolve(&repo, label, hunks))
            .await
            .map_err(|e| RippleError::Internal(format!("diff task failed: {e}")))?;

        info!(
            range = %result.commit_range,
            changed_files = result.changed_files.len(),
            changed_functions = result.changed_functions.len(),
            "Diff analysis completed"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::process::Command;

    use proptest::prelude::*;

    use super::*;

    const SAMPLE: &str = "\
diff --git a/svc/server.go b/svc/server.go
index 1111111..2222222 100644
--- a/svc/server.go
+++ b/svc/server.go
@@ -10,2 +10,3 @@ func (s *Server) Start() error {
-\told()
+\tnew()
+\tmore()
@@ -20 +21 @@ func helper() {
-x
+y
diff --git a/svc/gone.go b/svc/gone.go
deleted file mode 100644
index 3333333..0000000
--- a/svc/gone.go
+++ /dev/null
@@ -1,5 +0,0 @@
-package svc
diff --git a/svc/fresh.go b/svc/fresh.go
new file mode 100644
--- /dev/null
+++ b/svc/fresh.go
@@ -0,0 +1,4 @@
+package svc
";

    #[test]
    fn parses_hunks_and_file_flags() {
        let hunks = parse_unified_diff(SAMPLE);
        assert_eq!(hunks.len(), 4);
        assert_eq!(
            hunks[0],
            DiffHunk {
                file: "svc/server.go".into(),
                old_start: 10,
                old_count: 2,
                new_start: 10,
                new_count: 3,
                is_deleted: false,
                is_added: false,
            }
        );
        assert_eq!((hunks[1].old_count, hunks[1].new_start, hunks[1].new_count), (1, 21, 1));
        assert!(hunks[2].is_deleted && !hunks[2].is_added);
        assert_eq!(hunks[2].affected_lines(), (1, 5));
        assert!(hunks[3].is_added && !hunks[3].is_deleted);
        assert_eq!(hunks[3].affected_lines(), (1, 4));
    }

    #[test]
    fn zero_new_lines_use_old_side() {
        let hunk = DiffHunk {
            file: "a.go".into(),
            old_start: 7,
            old_count: 3,
            new_start: 6,
            new_count: 0,
            is_deleted: false,
            is_added: false,
        };
        assert_eq!(hunk.affected_lines(), (7, 9));
    }

    #[test]
    fn ranges() {
        assert_eq!(normalize_range("").unwrap(), None);
        assert_eq!(normalize_range(" working ").unwrap(), None);
        assert_eq!(normalize_range("HEAD~1..HEAD").unwrap().as_deref(), Some("HEAD~1..HEAD"));
        assert_eq!(normalize_range("main...topic").unwrap().as_deref(), Some("main...topic"));
        assert_eq!(normalize_range("v1.2.0").unwrap().as_deref(), Some("v1.2.0"));
        assert_eq!(normalize_range("HEAD~2..").unwrap().as_deref(), Some("HEAD~2.."));
        for bad in [
            "--output=x",
            "HEAD~1 --output=x",
            "HEAD~1..--output=x",
            "HEAD~1...-p",
            "a..b..c",
            "..",
            "HEAD\tHEAD~1",
        ] {
            assert_eq!(normalize_range(bad).unwrap_err().code(), "INPUT_INVALID", "{bad}");
        }
    }

    #[test]
    fn malformed_header_counts_saturate() {
        let hunk = DiffHunk {
            file: "a.go".into(),
            old_start: 0,
            old_count: 0,
            new_start: u32::MAX,
            new_count: 5,
            is_deleted: false,
            is_added: false,
        };
        assert_eq!(hunk.affected_lines(), (u32::MAX, u32::MAX));
        let parsed = parse_unified_diff("diff --git a/a.go b/a.go\n@@ -1 +4294967295,4294967295 @@\n");
        assert_eq!(parsed[0].affected_lines(), (u32::MAX, u32::MAX));
    }

    const SOURCE: &str = "package svc

type Server struct{}

func (s *Server) Start() error {
\ta := 1
\tb := 2
\t_ = a + b
\treturn nil
}

func helper() {
\tprintln()
}
";

    fn hunk(new_start: u32, new_count: u32) -> DiffHunk {
        DiffHunk {
            file: "svc/server.go".into(),
            old_start: new_start,
            old_count: 1,
            new_start,
            new_count,
            is_deleted: false,
            is_added: false,
        }
    }

    #[test]
    fn overlapping_hunks_yield_one_function() {
        let tree = parse_go(SOURCE, "svc/server.go").unwrap();
        let spans = function_spans(&tree, SOURCE, "example.com/app/svc");
        let found = touched_functions(
            "svc/server.go",
            "example.com/app/svc",
            &spans,
            &[hunk(6, 1), hunk(8, 2)],
        );
        assert_eq!(found.len(), 1);
        let f = &found[0];
        assert_eq!(f.full_name, "example.com/app/svc.Server.Start");
        assert_eq!(f.name, "Server.Start");
        assert_eq!((f.line_start, f.line_end), (5, 10));
        assert_eq!((f.lines_added, f.lines_removed), (3, 2));
        assert_eq!(f.change_type, ChangeType::Modified);

        // Line 11 is the blank line between the two functions.
        assert!(touched_functions("svc/server.go", "p", &spans, &[hunk(11, 1)]).is_empty());
    }

    #[test]
    fn dedup_keeps_one_placeholder_per_file() {
        let hunks = parse_unified_diff(SAMPLE);
        let gone: Vec<DiffHunk> = hunks.iter().filter(|h| h.is_deleted).cloned().collect();
        let mut all = placeholders("svc/gone.go", &gone);
        all.extend(placeholders("svc/gone.go", &[hunk(30, 1)]));
        all.extend(placeholders("svc/other.go", &[hunk(3, 1)]));
        assert_eq!(all.len(), 3);

        let unique = dedup(all);
        let files: Vec<&str> = unique.iter().map(|f| f.file.as_str()).collect();
        assert_eq!(files, ["svc/gone.go", "svc/other.go"]);
        assert!(unique.iter().all(|f| f.name == "unknown" && f.change_type == ChangeType::Deleted));
        // First placeholder wins.
        assert_eq!((unique[0].line_start, unique[0].line_end), (1, 5));
    }

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(dir)
            .env("GIT_AUTHOR_NAME", "Test")
            .env("GIT_AUTHOR_EMAIL", "test@example.com")
            .env("GIT_COMMITTER_NAME", "Test")
            .env("GIT_COMMITTER_EMAIL", "test@example.com")
            .status()
            .expect("git command failed");
        assert!(status.success());
    }

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    fn repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        git(dir.path(), &["init", "--initial-branch=main"]);
        write(dir.path(), "go.mod", "module example.com/app\n");
        write(dir.path(), "svc/server.go", SOURCE);
        write(dir.path(), "svc/server_test.go", "package svc\n\nfunc TestX() {}\n");
        write(dir.path(), "svc/old.go", "package svc\n\nfunc Old() {}\n");
        git(dir.path(), &["add", "."]);
        git(dir.path(), &["commit", "-m", "init"]);
        dir
    }

    #[tokio::test]
    async fn working_tree_changes() {
        let dir = repo();
        let edited = SOURCE.replace("\ta := 1", "\ta := 10").replace("\tprintln()", "\tprintln(1)");
        write(dir.path(), "svc/server.go", &edited);
        std::fs::remove_file(dir.path().join("svc/old.go")).unwrap();

        let resolver = DiffResolver::default();
        let result = resolver.analyze(dir.path(), "").await.unwrap();
        assert_eq!(result.commit_range, "working");
        assert_eq!(result.changed_files, ["svc/old.go", "svc/server.go"]);
        let names: Vec<&str> = result.changed_functions.iter().map(|f| f.full_name.as_str()).collect();
        assert_eq!(
            names,
            ["", "example.com/app/svc.Server.Start", "example.com/app/svc.helper"]
        );
        assert_eq!(result.summary.functions_deleted, 1);
        assert_eq!(result.summary.functions_modified, 2);

        let again = resolver.analyze(dir.path(), "working").await.unwrap();
        assert_eq!(again.changed_functions, result.changed_functions);
    }

    #[tokio::test]
    async fn test_only_changes_are_ignored() {
        let dir = repo();
        write(dir.path(), "svc/server_test.go", "package svc\n\nfunc TestY() {}\n");
        write(dir.path(), "README.md", "docs\n");
        let result = DiffResolver::default().analyze(dir.path(), "working").await.unwrap();
        assert!(result.changed_files.is_empty());
        assert!(result.changed_functions.is_empty());
    }

    #[tokio::test]
    async fn committed_range_marks_added_files() {
        let dir = repo();
        write(dir.path(), "svc/api/api.go", "package api\n\nfunc Serve() {}\n");
        git(dir.path(), &["add", "."]);
        git(dir.path(), &["commit", "-m", "api"]);

        let result = DiffResolver::default().analyze(dir.path(), "HEAD~1..HEAD").await.unwrap();
        assert_eq!(result.changed_functions.len(), 1);
        let f = &result.changed_functions[0];
        assert_eq!(f.full_name, "example.com/app/svc/api.Serve");
        assert_eq!(f.package, "example.com/app/svc/api");
        assert_eq!(f.change_type, ChangeType::Added);
    }

    #[tokio::test]
    async fn range_cannot_carry_git_options() {
        let dir = repo();
        write(dir.path(), "svc/old.go", "package svc\n\nfunc Old() { _ = 1 }\n");
        git(dir.path(), &["commit", "-am", "edit"]);
        let out = tempfile::tempdir().unwrap();
        let target = out.path().join("written.txt");

        for range in [
            format!("HEAD~1 --output={}", target.display()),
            format!("HEAD~1..HEAD --output={}", target.display()),
            format!("HEAD~1..--output={}", target.display()),
        ] {
            let err = DiffResolver::default()
                .analyze(dir.path(), &range)
                .await
                .unwrap_err();
            assert_eq!(err.code(), "INPUT_INVALID", "{range}");
        }
        assert!(!target.exists());

        let ok = DiffResolver::default().analyze(dir.path(), "HEAD~1..HEAD").await.unwrap();
        assert_eq!(ok.changed_files, ["svc/old.go"]);
    }

    #[tokio::test]
    async fn unknown_revision_aborts() {
        let dir = repo();
        let err = DiffResolver::default()
            .analyze(dir.path(), "nope..HEAD")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "EXTERNAL_TOOL_FAILED");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn hunk_headers_default_count_to_one(
            old_start in 0u32..5000,
            old_count in proptest::option::of(0u32..500),
            new_start in 0u32..5000,
            new_count in proptest::option::of(0u32..500),
        ) {
            let fmt = |start: u32, count: Option<u32>| match count {
                Some(c) => format!("{start},{c}"),
                None => start.to_string(),
            };
            let text = format!(
                "diff --git a/p/x.go b/p/x.go\n@@ -{} +{} @@ func f() {{\n",
                fmt(old_start, old_count),
                fmt(new_start, new_count)
            );
            let hunks = parse_unified_diff(&text);
            prop_assert_eq!(hunks.len(), 1);
            prop_assert_eq!(hunks[0].old_count, old_count.unwrap_or(1));
            prop_assert_eq!(hunks[0].new_count, new_count.unwrap_or(1));
            prop_assert_eq!(hunks[0].old_start, old_start);
            prop_assert_eq!(hunks[0].new_start, new_start);
        }

        #[test]
        fn arbitrary_text_never_panics(text in "(diff --git a/x b/y|@@ -[0-9,]{0,6} \\+[0-9,]{0,6} @@|[ -~]{0,20}|\n){0,20}") {
            let _ = parse_unified_diff(&text);
        }
    }
}
