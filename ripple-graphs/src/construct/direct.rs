use crate::algorithm::{AlgorithmFailure, Budget};
use crate::program::{Dispatch, Program};

use super::{Resolution, ResolvedEdge, dispatch_table};

/// Direct calls only: package functions and methods on concrete receivers.
pub(super) fn build(program: &Program, budget: &mut Budget) -> Result<Resolution, AlgorithmFailure> {
    let mut edges = Vec::new();
    for (caller, sites) in dispatch_table(program).into_iter().enumerate() {
        budget.tick()?;
        for (site, dispatch) in sites.into_iter().enumerate() {
            if let Dispatch::Static(callee) = dispatch {
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
