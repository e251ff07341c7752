use crate::algorithm::{AlgorithmFailure, Budget};
use crate::program::Program;

use super::{Hierarchy, Resolution, ResolvedEdge, dispatch_table};

/// Every interface or unknown-receiver call fans out to all candidate methods.
pub(super) fn build(program: &Program, budget: &mut Budget) -> Result<Resolution, AlgorithmFailure> {
    let mut hierarchy = Hierarchy::default();
    let mut edges = Vec::new();
    for (caller, sites) in dispatch_table(program).iter().enumerate() {
        for (site, dispatch) in sites.iter().enumerate() {
            budget.tick()?;
            for callee in hierarchy.targets(program, dispatch) {
                edges.push(ResolvedEdge {
                    caller,
                    site,
                    callee,
                });
            }
        }
    }
    Ok(Resolution {
        edges,
        reachable: None,
    })
}
