//! Go module discovery and parallel source loading.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::extract::{FileFacts, extract_file};
use crate::program::Program;
use crate::syntax::{first_error_line, parse_go};
use crate::{GraphError, Result};

/// How deep below the source root to look for `go.mod`.
const MODULE_SEARCH_DEPTH: usize = 2;

/// Locate the directory holding `go.mod`: the root itself, or the first
/// match (sorted) up to two directory levels down.
pub fn find_module_root(root: &Path) -> Result<PathBuf> {
    let mut frontier = vec![root.to_path_buf()];
    for _ in 0..=MODULE_SEARCH_DEPTH {
        let mut next = Vec::new();
        for dir in &frontier {
            if dir.join("go.mod").is_file() {
                return Ok(dir.clone());
            }
            next.extend(subdirectories(dir)?);
        }
        frontier = next;
    }
    Err(GraphError::MissingModule(root.display().to_string()))
}

fn subdirectories(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
        .filter(|e| !skip_dir(&e.file_name().to_string_lossy()))
        .map(|e| e.path())
        .collect();
    dirs.sort();
    Ok(dirs)
}

/// Directories the go tool never treats as package sources.
fn skip_dir(name: &str) -> bool {
    name.starts_with('.') || name.starts_with('_') || name == "vendor" || name == "testdata"
}

/// Module path from the `module` directive of a go.mod file.
pub fn module_path(go_mod: &str) -> Option<String> {
    go_mod.lines().find_map(|line| {
        let rest = line.trim().strip_prefix("module")?;
        if !rest.starts_with(char::is_whitespace) {
            return None;
        }
        let rest = rest.split("//").next().unwrap_or(rest);
        let path = rest.trim().trim_matches('"');
        (!path.is_empty()).then(|| path.to_string())
    })
}

pub fn read_module_path(module_root: &Path) -> Result<String> {
    let go_mod = module_root.join("go.mod");
    let contents = std::fs::read_to_string(&go_mod)?;
    module_path(&contents).ok_or_else(|| GraphError::Parse {
        path: go_mod.display().to_string(),
        message: "no module directive".to_string(),
    })
}

/// Import path of the package in `rel_dir` (relative to the module root).
pub fn package_path(module: &str, rel_dir: &str) -> String {
    let rel_dir = rel_dir.trim_matches('/');
    if rel_dir.is_empty() || rel_dir == "." {
        module.to_string()
    } else {
        format!("{module}/{rel_dir}")
    }
}

/// Non-test, non-vendored, hand-written Go source.
pub fn is_analyzable_source(rel_path: &str) -> bool {
    let rel_path = rel_path.replace('\\', "/");
    let vendored = rel_path.starts_with("vendor/") || rel_path.contains("/vendor/");
    rel_path.ends_with(".go")
        && !rel_path.ends_with("_test.go")
        && !rel_path.ends_with(".pb.go")
        && !rel_path.ends_with("_gen.go")
        && !vendored
}

/// User exclude patterns. `dir/` excludes a directory anywhere in the
/// tree; anything else is a glob matched against the relative path and
/// the file name.
#[derive(Debug, Default, Clone)]
pub struct Exclusions {
    dirs: Vec<String>,
    globs: Vec<glob::Pattern>,
}

impl Exclusions {
    pub fn new(patterns: &[String]) -> Self {
        let mut out = Self::default();
        for pattern in patterns {
            let pattern = pattern.trim();
            if pattern.is_empty() {
                continue;
            }
            if let Some(dir) = pattern.strip_suffix('/') {
                out.dirs.push(dir.trim_matches('/').to_string());
                continue;
            }
            match glob::Pattern::new(pattern) {
                Ok(p) => out.globs.push(p),
                Err(e) => warn!(pattern = %pattern, error = %e, "Invalid exclude pattern"),
            }
        }
        out
    }

    pub fn matches(&self, rel_path: &str) -> bool {
        let file_name = rel_path.rsplit('/').next().unwrap_or(rel_path);
        let in_dir = self.dirs.iter().any(|d| {
            rel_path.starts_with(&format!("{d}/")) || rel_path.contains(&format!("/{d}/"))
        });
        in_dir
            || self
                .globs
                .iter()
                .any(|g| g.matches(rel_path) || g.matches(file_name))
    }
}

fn relative(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Source files of the module rooted at `module_root`, as paths relative
/// to `source_root`. Nested modules are skipped.
pub fn collect_sources(
    source_root: &Path,
    module_root: &Path,
    exclusions: &Exclusions,
) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![module_root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        if dir != module_root && dir.join("go.mod").is_file() {
            debug!(dir = %dir.display(), "Skipping nested module");
            continue;
        }
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                if !skip_dir(&entry.file_name().to_string_lossy()) {
                    stack.push(path);
                }
            } else if file_type.is_file() {
                let rel = relative(&path, source_root);
                if is_analyzable_source(&rel) && !exclusions.matches(&rel) {
                    files.push(path);
                }
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Load and parse every package of the module under `root`.
///
/// Files are parsed in parallel. A file that cannot be read is logged and
/// skipped; syntax errors keep the recovered tree.
pub fn load_program(root: &Path, exclude: &[String]) -> Result<Program> {
    if !root.is_dir() {
        return Err(GraphError::InvalidRoot(root.display().to_string()));
    }
    let module_root = find_module_root(root)?;
    let module = read_module_path(&module_root)?;
    let exclusions = Exclusions::new(exclude);
    let files = collect_sources(root, &module_root, &exclusions)?;

    let facts: Vec<FileFacts> = files
        .par_iter()
        .filter_map(|path| match load_file(root, &module_root, &module, path) {
            Ok(facts) => Some(facts),
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Skipping unreadable source file");
                None
            }
        })
        .collect();

    info!(
        module = %module,
        files = facts.len(),
        "Loaded Go module"
    );
    Ok(Program::from_files(root.to_path_buf(), module, facts))
}

fn load_file(root: &Path, module_root: &Path, module: &str, path: &Path) -> Result<FileFacts> {
    let source = std::fs::read_to_string(path)?;
    let rel = relative(path, root);
    let rel_dir = path
        .parent()
        .map(|dir| relative(dir, module_root))
        .unwrap_or_default();
    let package = package_path(module, &rel_dir);

    let tree = parse_go(&source, &rel)?;
    if let Some(line) = first_error_line(&tree) {
        debug!(file = %rel, line, "Syntax errors, using recovered tree");
    }
    Ok(extract_file(&tree, &source, &rel, &package))
}
