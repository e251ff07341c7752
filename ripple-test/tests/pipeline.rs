use std::sync::Arc;
use std::time::Duration;

use ripple_core::progress::{NoopReporter, RecordingReporter};
use ripple_core::service::GenerateRequest;
use ripple_core::store::CallGraphQueries;
use ripple_core::types::{ChangeType, TaskStatus};
use ripple_graphs::Algorithm;
use ripple_test::{TestRepo, service, worktree_dirs};

fn request(repo: &TestRepo) -> GenerateRequest {
    GenerateRequest {
        path: repo.path().to_path_buf(),
        ..GenerateRequest::default()
    }
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}

const PROCESS_TWO_EDITS_BEFORE: &str = "package core\n\nfunc Run() {\n\tProcess()\n}\n\nfunc Process() {\n\ta := 1\n\tvalidate()\n\tb := 2\n\t_ = a + b\n}\n\nfunc validate() {}\n";
const PROCESS_TWO_EDITS_AFTER: &str = "package core\n\nfunc Run() {\n\tProcess()\n}\n\nfunc Process() {\n\ta := 10\n\tvalidate()\n\tb := 2\n\t_ = a * b\n}\n\nfunc validate() {}\n";

// ── Status ───────────────────────────────────────────────────────

#[tokio::test]
async fn never_analyzed_project_has_no_graph() {
    let repo = TestRepo::go_service();
    let data = tempfile::tempdir().unwrap();
    let svc = service(data.path());

    let status = svc.check_status(repo.path(), None).await.unwrap();
    assert!(!status.exists);
    assert!(!status.up_to_date);
    assert_eq!(status.head_commit.as_deref(), Some(repo.rev_parse("HEAD").as_str()));
    assert!(svc.history(repo.path()).await.unwrap().is_empty());
}

// ── Generation ───────────────────────────────────────────────────

#[tokio::test]
async fn generate_round_trips_through_history() {
    let repo = TestRepo::go_service();
    let data = tempfile::tempdir().unwrap();
    let svc = service(data.path());

    let progress = Arc::new(RecordingReporter::default());
    let outcome = svc.generate_now(request(&repo), progress.clone()).await.unwrap();
    assert_eq!(outcome.module_path, "example.com/shop");
    assert_eq!(outcome.actual, Algorithm::Rta);
    assert!(!outcome.fallback);
    // main, Run, Process, validate; Audit is unreachable from main.
    assert_eq!(outcome.graph.func_count, 4);
    assert_eq!(outcome.graph.edge_count, 3);

    let history = svc.history(repo.path()).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(
        (history[0].commit.as_str(), history[0].func_count, history[0].edge_count),
        (repo.rev_parse("HEAD").as_str(), 4, 3)
    );

    let percents: Vec<u8> = progress.updates().iter().map(|(p, _)| *p).collect();
    assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{percents:?}");
    assert_eq!(percents.last(), Some(&100));

    let status = svc.check_status(repo.path(), None).await.unwrap();
    assert!(status.exists && status.up_to_date);
    assert_eq!(status.func_count, Some(4));
}

#[tokio::test]
async fn older_commit_is_one_commit_behind() {
    let repo = TestRepo::go_service();
    let data = tempfile::tempdir().unwrap();
    let svc = service(data.path());
    let first = repo.rev_parse("HEAD~1");

    let outcome = svc
        .generate_now(
            GenerateRequest {
                commit: Some(first[..7].to_string()),
                algorithm: Some(Algorithm::Cha),
                ..request(&repo)
            },
            Arc::new(NoopReporter),
        )
        .await
        .unwrap();
    assert_eq!(outcome.graph.commit, first);
    assert!(worktree_dirs(data.path()).is_empty());

    let status = svc.check_status(repo.path(), Some(&first)).await.unwrap();
    assert!(status.exists);
    assert!(!status.up_to_date);
    assert_eq!(status.commits_behind, 1);
}

#[tokio::test]
async fn rta_on_library_is_an_algorithm_failure() {
    let repo = TestRepo::go_library();
    let data = tempfile::tempdir().unwrap();
    let svc = service(data.path());

    let err = svc
        .generate_now(request(&repo), Arc::new(NoopReporter))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "ALGORITHM_FAILED");
    assert!(err.to_string().contains("no entry point"), "{err}");
    assert!(err.suggestion().is_some());
    assert!(svc.history(repo.path()).await.unwrap().is_empty());

    let outcome = svc
        .generate_now(
            GenerateRequest {
                allow_fallback: Some(true),
                ..request(&repo)
            },
            Arc::new(NoopReporter),
        )
        .await
        .unwrap();
    assert!(outcome.fallback);
    assert_eq!(outcome.requested, Algorithm::Rta);
    assert_ne!(outcome.actual, Algorithm::Rta);
}

#[tokio::test]
async fn failed_build_in_worktree_leaves_nothing_behind() {
    let repo = TestRepo::go_library();
    let library = repo.rev_parse("HEAD");
    repo.write("cmd/tool/main.go", "package main\n\nfunc main() {}\n");
    repo.commit_all("Add tool");

    let data = tempfile::tempdir().unwrap();
    let svc = service(data.path());
    let err = svc
        .generate_now(
            GenerateRequest {
                commit: Some(library),
                ..request(&repo)
            },
            Arc::new(NoopReporter),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "ALGORITHM_FAILED");
    assert!(worktree_dirs(data.path()).is_empty());
}

#[tokio::test]
async fn background_generation_reports_completion() {
    let repo = TestRepo::go_service();
    let data = tempfile::tempdir().unwrap();
    let svc = service(data.path());

    let id = svc.generate(request(&repo)).unwrap();
    let mut task = svc.task(id).unwrap();
    for _ in 0..200 {
        if matches!(task.status, TaskStatus::Completed | TaskStatus::Failed) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        task = svc.task(id).unwrap();
    }
    assert_eq!(task.status, TaskStatus::Completed, "{:?}", task.error);
    assert_eq!(task.progress, 100);
    assert_eq!(task.result.unwrap().graph.func_count, 4);
}

// ── Impact ───────────────────────────────────────────────────────

#[tokio::test]
async fn impact_depth_bounds_callers() {
    let repo = TestRepo::go_service();
    let data = tempfile::tempdir().unwrap();
    let svc = service(data.path());
    svc.generate_now(request(&repo), Arc::new(NoopReporter))
        .await
        .unwrap();

    let shallow = svc
        .query_impact(repo.path(), None, &names(&["example.com/shop/core.validate"]), 1)
        .await
        .unwrap();
    let callers: Vec<(&str, u32)> = shallow.impacts[0]
        .callers
        .iter()
        .map(|c| (c.display_name.as_str(), c.depth))
        .collect();
    assert_eq!(callers, [("core.Process", 1)]);

    let deep = svc
        .query_impact(repo.path(), None, &names(&["example.com/shop/core.validate"]), 0)
        .await
        .unwrap();
    let callers: Vec<(&str, u32)> = deep.impacts[0]
        .callers
        .iter()
        .map(|c| (c.display_name.as_str(), c.depth))
        .collect();
    assert_eq!(
        callers,
        [("core.Process", 1), ("core.Run", 2), ("shop.main", 3)]
    );
    assert_eq!(deep.summary.affected_files, ["core/core.go", "main.go"]);
}

#[tokio::test]
async fn snapshot_queries_work_on_generated_graph() {
    let repo = TestRepo::go_service();
    let data = tempfile::tempdir().unwrap();
    let svc = service(data.path());
    svc.generate_now(request(&repo), Arc::new(NoopReporter))
        .await
        .unwrap();

    let (graph, db) = svc.open_snapshot(repo.path(), None).await.unwrap();
    assert_eq!(db.func_count().await.unwrap(), graph.func_count);
    assert_eq!(db.edge_count().await.unwrap(), graph.edge_count);

    let hits = db.search_functions("core/core.go:8", 0).await.unwrap();
    assert_eq!(hits[0].full_name, "example.com/shop/core.Process");

    let main = db
        .nodes_by_names(&names(&["example.com/shop.main"]))
        .await
        .unwrap();
    let callees = db.callees_with_depth(main[0].id, 5).await.unwrap();
    let reached: Vec<&str> = callees.iter().map(|r| r.node.func_name.as_str()).collect();
    assert_eq!(reached, ["Run", "Process", "validate"]);
}

// ── Diff ─────────────────────────────────────────────────────────

#[tokio::test]
async fn two_hunks_in_one_function_yield_one_change() {
    let repo = TestRepo::go_service();
    repo.write("core/core.go", PROCESS_TWO_EDITS_BEFORE);
    repo.commit_all("Longer process");
    repo.write("core/core.go", PROCESS_TWO_EDITS_AFTER);

    let data = tempfile::tempdir().unwrap();
    let svc = service(data.path());
    let first = svc.analyze_diff(repo.path(), "").await.unwrap();
    assert_eq!(first.commit_range, "working");
    assert_eq!(first.changed_files, ["core/core.go"]);
    assert_eq!(first.changed_functions.len(), 1);
    let process = &first.changed_functions[0];
    assert_eq!(process.name, "Process");
    assert_eq!(process.full_name, "example.com/shop/core.Process");
    assert_eq!(process.change_type, ChangeType::Modified);
    assert_eq!((process.lines_added, process.lines_removed), (2, 2));

    let second = svc.analyze_diff(repo.path(), "working").await.unwrap();
    assert_eq!(first.changed_functions, second.changed_functions);
}

#[tokio::test]
async fn test_file_changes_are_ignored() {
    let repo = TestRepo::go_service();
    repo.write(
        "core/core_test.go",
        "package core\n\nimport \"testing\"\n\nfunc TestRun(t *testing.T) {\n\tRun()\n\tRun()\n}\n",
    );

    let data = tempfile::tempdir().unwrap();
    let svc = service(data.path());
    let result = svc.analyze_diff(repo.path(), "").await.unwrap();
    assert!(result.changed_files.is_empty());
    assert!(result.changed_functions.is_empty());
    assert_eq!(result.summary.files_changed, 0);
}

#[tokio::test]
async fn commit_range_diff_sees_added_function() {
    let repo = TestRepo::go_service();
    let data = tempfile::tempdir().unwrap();
    let svc = service(data.path());

    let result = svc.analyze_diff(repo.path(), "HEAD~1..HEAD").await.unwrap();
    assert_eq!(result.changed_files, ["core/audit.go"]);
    assert_eq!(result.changed_functions.len(), 1);
    assert_eq!(result.changed_functions[0].name, "Audit");
    assert_eq!(result.summary.functions_changed, 1);

    let written = data.path().join("diff.txt");
    for range in [
        "--output=x".to_string(),
        format!("HEAD~1 --output={}", written.display()),
    ] {
        let err = svc.analyze_diff(repo.path(), &range).await.unwrap_err();
        assert_eq!(err.code(), "INPUT_INVALID", "{range}");
    }
    assert!(!written.exists());
}

#[tokio::test]
async fn full_analysis_chains_diff_into_impact() {
    let repo = TestRepo::go_service();
    let data = tempfile::tempdir().unwrap();
    let svc = service(data.path());
    svc.generate_now(request(&repo), Arc::new(NoopReporter))
        .await
        .unwrap();

    repo.write(
        "core/core.go",
        "package core\n\nfunc Run() {\n\tProcess()\n}\n\nfunc Process() {\n\tvalidate()\n}\n\nfunc validate() { _ = 1 }\n",
    );
    let analysis = svc.full_analysis(repo.path(), "", 2).await.unwrap();
    assert_eq!(analysis.diff.changed_functions.len(), 1);
    assert_eq!(analysis.impact.impacts.len(), 1);
    let callers: Vec<&str> = analysis.impact.impacts[0]
        .callers
        .iter()
        .map(|c| c.display_name.as_str())
        .collect();
    assert_eq!(callers, ["core.Process", "core.Run"]);
}

// ── History ──────────────────────────────────────────────────────

#[tokio::test]
async fn history_set_latest_and_delete() {
    let repo = TestRepo::go_service();
    let data = tempfile::tempdir().unwrap();
    let svc = service(data.path());
    let first = repo.rev_parse("HEAD~1");
    let head = repo.rev_parse("HEAD");

    svc.generate_now(
        GenerateRequest {
            commit: Some(first.clone()),
            ..request(&repo)
        },
        Arc::new(NoopReporter),
    )
    .await
    .unwrap();
    svc.generate_now(request(&repo), Arc::new(NoopReporter))
        .await
        .unwrap();
    assert_eq!(svc.history(repo.path()).await.unwrap().len(), 2);

    let (latest, _) = svc.open_snapshot(repo.path(), None).await.unwrap();
    assert_eq!(latest.commit, head);

    svc.set_latest(repo.path(), &first[..8]).await.unwrap();
    let report = svc
        .query_impact(repo.path(), None, &names(&["example.com/shop/core.Process"]), 3)
        .await
        .unwrap();
    assert_eq!(report.analysis_commit, first);

    let missing = svc.set_latest(repo.path(), "ffffffff").await.unwrap_err();
    assert!(missing.is_not_found());
    let (latest, _) = svc.open_snapshot(repo.path(), None).await.unwrap();
    assert_eq!(latest.commit, first);

    let deleted = svc.delete_graph(repo.path(), &first).await.unwrap();
    assert!(!deleted.data_path.exists());
    let (latest, _) = svc.open_snapshot(repo.path(), None).await.unwrap();
    assert_eq!(latest.commit, head);

    let removed = svc.clean_history(repo.path(), Some(0), None).await.unwrap();
    assert_eq!(removed.len(), 1);
    assert!(svc.history(repo.path()).await.unwrap().is_empty());
}
