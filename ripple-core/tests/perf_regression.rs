use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ripple_core::builder::{BuildOverrides, CallGraphBuilder};
use ripple_core::diff::DiffResolver;
use ripple_core::impact::ImpactEngine;
use ripple_core::progress::NoopReporter;
use ripple_core::store::{CallGraphStore, NewSnapshot, SnapshotDb};
use ripple_core::types::{ProjectIdentity, RetentionPolicy};

const PACKAGES: usize = 120;

fn threshold_ms(var: &str, default_ms: u64) -> Duration {
    let ms = std::env::var(var)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default_ms);
    Duration::from_millis(ms)
}

fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_DATE", "2025-01-15T10:00:00+00:00")
        .env("GIT_COMMITTER_DATE", "2025-01-15T10:00:00+00:00")
        .output()
        .unwrap_or_else(|e| panic!("git {}: {e}", args.join(" ")));
    assert!(
        output.status.success(),
        "git {} failed: {}",
        args.join(" "),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn package_source(i: usize, count: usize) -> String {
    if i + 1 == count {
        format!(
            "package p{i}\n\nfunc F{i}(x int) int {{\n\treturn helper{i}(x)\n}}\n\nfunc helper{i}(x int) int {{\n\treturn x + {i}\n}}\n"
        )
    } else {
        let next = i + 1;
        format!(
            "package p{i}\n\nimport \"example.com/perf/p{next}\"\n\nfunc F{i}(x int) int {{\n\treturn helper{i}(x) + p{next}.F{next}(x)\n}}\n\nfunc helper{i}(x int) int {{\n\treturn x + {i}\n}}\n"
        )
    }
}

/// A module whose packages form one long call chain from `main`.
fn synthetic_module(count: usize) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    git(root, &["init"]);
    git(root, &["config", "user.email", "test@ripple.dev"]);
    git(root, &["config", "user.name", "Test"]);

    std::fs::write(root.join("go.mod"), "module example.com/perf\n\ngo 1.22\n").unwrap();
    std::fs::write(
        root.join("main.go"),
        "package main\n\nimport \"example.com/perf/p0\"\n\nfunc main() {\n\tp0.F0(1)\n}\n",
    )
    .unwrap();
    for i in 0..count {
        let pkg = root.join(format!("p{i}"));
        std::fs::create_dir_all(&pkg).unwrap();
        std::fs::write(pkg.join(format!("p{i}.go")), package_source(i, count)).unwrap();
    }

    git(root, &["add", "."]);
    git(root, &["commit", "-m", "Initial fixture"]);
    dir
}

#[tokio::test]
#[ignore = "performance gate; run explicitly in CI/dev workflows"]
async fn perf_build_under_threshold() {
    let repo = synthetic_module(PACKAGES);
    let builder = CallGraphBuilder::default();

    let t0 = Instant::now();
    let out = builder
        .build(
            repo.path(),
            builder.options(BuildOverrides::default()),
            Arc::new(NoopReporter),
            (0, 100),
        )
        .await
        .unwrap();
    let elapsed = t0.elapsed();

    assert_eq!(out.nodes.len(), 2 * PACKAGES + 1);
    assert!(
        elapsed <= threshold_ms("RIPPLE_PERF_BUILD_MS", 10000),
        "call graph construction exceeded threshold: {elapsed:?}"
    );
}

#[tokio::test]
#[ignore = "performance gate; run explicitly in CI/dev workflows"]
async fn perf_store_and_impact_under_threshold() {
    let repo = synthetic_module(PACKAGES);
    let data = tempfile::tempdir().unwrap();
    let builder = CallGraphBuilder::default();
    let out = builder
        .build(
            repo.path(),
            builder.options(BuildOverrides::default()),
            Arc::new(NoopReporter),
            (0, 100),
        )
        .await
        .unwrap();

    let store = CallGraphStore::new(data.path().to_path_buf(), RetentionPolicy::default());
    let identity = ProjectIdentity {
        id: "perf".into(),
        name: "perf".into(),
        remote_url: None,
    };
    let t0 = Instant::now();
    let graph = store
        .save(
            &identity,
            NewSnapshot {
                commit: "0123456789abcdef0123456789abcdef01234567",
                branch: None,
                output: &out,
                generation_time_ms: 0,
            },
            &NoopReporter,
        )
        .await
        .unwrap();
    let save_elapsed = t0.elapsed();

    let db = SnapshotDb::open_existing(&graph.data_path).unwrap();
    let deepest = format!("example.com/perf/p{0}.helper{0}", PACKAGES - 1);
    let t1 = Instant::now();
    let report = ImpactEngine
        .query(&db, &[deepest], i32::try_from(PACKAGES + 1).unwrap())
        .await
        .unwrap();
    let impact_elapsed = t1.elapsed();

    // Every F plus main.
    assert_eq!(report.impacts[0].total_callers, PACKAGES + 1);
    assert!(
        save_elapsed <= threshold_ms("RIPPLE_PERF_STORE_MS", 5000),
        "snapshot save exceeded threshold: {save_elapsed:?}"
    );
    assert!(
        impact_elapsed <= threshold_ms("RIPPLE_PERF_IMPACT_MS", 2000),
        "impact query exceeded threshold: {impact_elapsed:?}"
    );
}

#[tokio::test]
#[ignore = "performance gate; run explicitly in CI/dev workflows"]
async fn perf_diff_under_threshold() {
    let repo = synthetic_module(PACKAGES);
    for i in 0..PACKAGES {
        let path = repo.path().join(format!("p{i}/p{i}.go"));
        let source = package_source(i, PACKAGES).replace(&format!("x + {i}"), &format!("x - {i}"));
        std::fs::write(path, source).unwrap();
    }

    let t0 = Instant::now();
    let result = DiffResolver::default().analyze(repo.path(), "").await.unwrap();
    let elapsed = t0.elapsed();

    assert_eq!(result.changed_files.len(), PACKAGES);
    assert_eq!(result.summary.functions_modified, PACKAGES);
    assert!(
        elapsed <= threshold_ms("RIPPLE_PERF_DIFF_MS", 5000),
        "diff analysis exceeded threshold: {elapsed:?}"
    );
}
