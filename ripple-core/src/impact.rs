//! Reverse reachability over a stored call graph.

use std::collections::{BTreeSet, HashSet};

use ripple_graphs::names::display_name;
use tracing::{debug, info};

use crate::error::Result;
use crate::store::CallGraphQueries;
use crate::store::schema::META_COMMIT;
use crate::types::{CallerInfo, FunctionImpact, ImpactReport, ImpactSummary};

/// Caller depth used when the requested depth is not positive.
pub const DEFAULT_DEPTH: u32 = 3;

pub fn effective_depth(depth: i32) -> u32 {
    u32::try_from(depth).ok().filter(|d| *d > 0).unwrap_or(DEFAULT_DEPTH)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImpactEngine;

impl ImpactEngine {
    /// Bounded transitive callers of every function in `functions`.
    ///
    /// Names match a node's full or canonical name. Unmatched names are
    /// not an error; they are listed in `summary.unmatched`.
    pub async fn query(
        &self,
        graph: &dyn CallGraphQueries,
        functions: &[String],
        depth: i32,
    ) -> Result<ImpactReport> {
        let depth = effective_depth(depth);
        let analysis_commit = graph.metadata(META_COMMIT).await?.unwrap_or_default();
        let targets = graph.nodes_by_names(functions).await?;
        let mut unmatched: Vec<String> = Vec::new();
        for name in functions {
            let hit = targets
                .iter()
                .any(|t| t.full_name == *name || t.canonical_name == *name);
            if !hit && !unmatched.contains(name) {
                unmatched.push(name.clone());
            }
        }
        debug!(
            requested = functions.len(),
            matched = targets.len(),
            unmatched = unmatched.len(),
            depth,
            "Resolved impact targets"
        );

        let mut impacts = Vec::with_capacity(targets.len());
        let mut affected: HashSet<i64> = HashSet::new();
        let mut affected_files: BTreeSet<String> = BTreeSet::new();

        for target in &targets {
            let reached = graph.callers_with_depth(target.id, depth).await?;
            let callers: Vec<CallerInfo> = reached
                .into_iter()
                .map(|r| {
                    affected.insert(r.node.id);
                    affected_files.insert(r.call_site_file.clone());
                    CallerInfo {
                        display_name: display_name(&r.node.package, &r.node.func_name),
                        function: r.node.full_name,
                        package: r.node.package,
                        file: r.call_site_file,
                        line: r.call_site_line,
                        depth: r.depth,
                    }
                })
                .collect();
            impacts.push(FunctionImpact {
                function: target.full_name.clone(),
                display_name: display_name(&target.package, &target.func_name),
                file: target.file_path.clone(),
                total_callers: callers.len(),
                max_depth_reached: callers.iter().map(|c| c.depth).max().unwrap_or(0),
                callers,
            });
        }

        let report = ImpactReport {
            analysis_commit,
            impacts,
            summary: ImpactSummary {
                functions_analyzed: functions.len(),
                unmatched,
                total_affected: affected.len(),
                affected_files: affected_files.into_iter().collect(),
            },
        };
        info!(
            commit = %report.analysis_commit,
            targets = report.impacts.len(),
            affected = report.summary.total_affected,
            "Impact analysis completed"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::snapshot::tests::chain;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn depth_defaults() {
        assert_eq!(effective_depth(0), 3);
        assert_eq!(effective_depth(-4), 3);
        assert_eq!(effective_depth(1), 1);
        assert_eq!(effective_depth(7), 7);
    }

    #[tokio::test]
    async fn depth_bounds_callers() {
        let db = chain();
        db.set_metadata(META_COMMIT, "abc1234").unwrap();
        let report = ImpactEngine
            .query(&db, &names(&["example.com/app/core.Foo"]), 1)
            .await
            .unwrap();

        assert_eq!(report.analysis_commit, "abc1234");
        assert_eq!(report.impacts.len(), 1);
        let impact = &report.impacts[0];
        assert_eq!(impact.display_name, "core.Foo");
        let callers: Vec<(&str, u32)> = impact
            .callers
            .iter()
            .map(|c| (c.display_name.as_str(), c.depth))
            .collect();
        assert!(callers.contains(&("core.Bar", 1)));
        assert!(!callers.iter().any(|(name, _)| *name == "app.Baz"));
        assert_eq!(impact.max_depth_reached, 1);

        let deep = ImpactEngine
            .query(&db, &names(&["example.com/app/core.Foo"]), 0)
            .await
            .unwrap();
        let baz = deep.impacts[0]
            .callers
            .iter()
            .find(|c| c.display_name == "app.Baz")
            .unwrap();
        assert_eq!((baz.depth, baz.file.as_str(), baz.line), (2, "main.go", 6));
        assert_eq!(deep.impacts[0].max_depth_reached, 2);
    }

    #[tokio::test]
    async fn per_target_impacts_and_summary() {
        let db = chain();
        let report = ImpactEngine
            .query(
                &db,
                &names(&[
                    "example.com/app/core.Foo",
                    "example.com/app.Baz",
                    "example.com/app/store.Repo.Save",
                    "example.com/app.Missing",
                ]),
                3,
            )
            .await
            .unwrap();

        assert_eq!(report.summary.functions_analyzed, 4);
        assert_eq!(report.impacts.len(), 3);
        assert_eq!(report.summary.unmatched, ["example.com/app.Missing"]);
        let by_name = |n: &str| report.impacts.iter().find(|i| i.function == n).unwrap();

        let baz = by_name("example.com/app.Baz");
        assert!(baz.callers.is_empty());
        assert_eq!(baz.max_depth_reached, 0);

        // Save <- Foo <- {Bar, qux} <- Baz
        let save = by_name("(*example.com/app/store.Repo).Save");
        assert_eq!(save.total_callers, 4);
        assert_eq!(save.display_name, "store.Repo.Save");

        // Foo, Bar, qux, Baz
        assert_eq!(report.summary.total_affected, 4);
        assert_eq!(report.summary.affected_files, ["core/bar.go", "core/foo.go", "main.go"]);
    }

    #[tokio::test]
    async fn full_and_canonical_names_share_one_target() {
        let db = chain();
        let report = ImpactEngine
            .query(
                &db,
                &names(&[
                    "(*example.com/app/store.Repo).Save",
                    "example.com/app/store.Repo.Save",
                    "example.com/app.Gone",
                    "example.com/app.Gone",
                ]),
                1,
            )
            .await
            .unwrap();
        assert_eq!(report.impacts.len(), 1);
        assert_eq!(report.summary.functions_analyzed, 4);
        assert_eq!(report.summary.unmatched, ["example.com/app.Gone"]);
    }

    #[tokio::test]
    async fn no_matches_is_an_empty_report() {
        let db = chain();
        let report = ImpactEngine
            .query(&db, &names(&["example.com/nowhere.F"]), 2)
            .await
            .unwrap();
        assert!(report.impacts.is_empty());
        assert_eq!(report.summary.functions_analyzed, 1);
        assert_eq!(report.summary.unmatched, ["example.com/nowhere.F"]);
        assert_eq!(report.summary.total_affected, 0);
    }
}
