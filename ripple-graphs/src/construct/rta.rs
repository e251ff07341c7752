use std::collections::{BTreeSet, HashSet, VecDeque};

use tracing::debug;

use crate::algorithm::{Algorithm, AlgorithmFailure, Budget};
use crate::extract::TypeRef;
use crate::program::{Dispatch, FuncId, Program};

use super::{Resolution, ResolvedEdge, admits, dispatch_method, dispatch_table};

/// Rapid type analysis.
///
/// Starting from `entries`, alternate between discovering reachable
/// functions and the types they instantiate until neither set grows.
/// Dynamic calls only resolve to methods of types instantiated somewhere
/// in reachable code.
pub(super) fn build(
    program: &Program,
    entries: &[FuncId],
    budget: &mut Budget,
) -> Result<Resolution, AlgorithmFailure> {
    if entries.is_empty() {
        return Err(AlgorithmFailure::no_entry_point(Algorithm::Rta));
    }

    let table = dispatch_table(program);
    let mut reachable = BTreeSet::new();
    let mut live: BTreeSet<TypeRef> = BTreeSet::new();
    let mut pending: Vec<(FuncId, usize)> = Vec::new();
    let mut seen_edges: HashSet<ResolvedEdge> = HashSet::new();
    let mut edges = Vec::new();
    let mut worklist: VecDeque<FuncId> = VecDeque::new();

    for &entry in entries {
        if reachable.insert(entry) {
            worklist.push_back(entry);
        }
    }

    let mut rounds = 0usize;
    loop {
        rounds += 1;
        while let Some(func) = worklist.pop_front() {
            budget.tick()?;
            let body = &program.function(func).body;
            live.extend(body.allocs.iter().cloned());
            live.extend(body.declared.iter().map(|(_, ty)| ty.clone()));

            for (site, dispatch) in table[func].iter().enumerate() {
                match dispatch {
                    Dispatch::Static(callee) => {
                        let edge = ResolvedEdge {
                            caller: func,
                            site,
                            callee: *callee,
                        };
                        if seen_edges.insert(edge) {
                            edges.push(edge);
                        }
                        if reachable.insert(*callee) {
                            worklist.push_back(*callee);
                        }
                    }
                    Dispatch::Interface { .. } | Dispatch::Dynamic { .. } => {
                        pending.push((func, site));
                    }
                    Dispatch::External => {}
                }
            }
        }

        let mut grew = false;
        for &(func, site) in &pending {
            let dispatch = &table[func][site];
            let Some(method) = dispatch_method(dispatch) else {
                continue;
            };
            for ty in &live {
                budget.tick()?;
                if !admits(program, dispatch, ty) {
                    continue;
                }
                let Some(callee) = program.lookup_method(ty, method) else {
                    continue;
                };
                let edge = ResolvedEdge {
                    caller: func,
                    site,
                    callee,
                };
                if seen_edges.insert(edge) {
                    edges.push(edge);
                    grew = true;
                }
                if reachable.insert(callee) {
                    worklist.push_back(callee);
                    grew = true;
                }
            }
        }

        if !grew && worklist.is_empty() {
            break;
        }
    }

    debug!(
        rounds,
        reachable = reachable.len(),
        live_types = live.len(),
        "RTA reached fixpoint"
    );
    edges.sort();
    Ok(Resolution {
        edges,
        reachable: Some(reachable),
    })
}
