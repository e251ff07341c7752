use std::collections::{BTreeSet, HashMap, VecDeque};

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::debug;

use crate::algorithm::{AlgorithmFailure, Budget};
use crate::extract::{Callee, Expr, TypeRef};
use crate::program::{Dispatch, FuncId, Program, Ty};

use super::{Hierarchy, Resolution, ResolvedEdge, admits, dispatch_method, dispatch_table};

/// A storage location types can flow through.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Slot {
    Local(FuncId, String),
    Return(FuncId),
    Field(TypeRef, String),
}

/// Where an expression's value comes from.
#[derive(Debug, Default)]
struct Sources {
    slots: Vec<Slot>,
    types: Vec<TypeRef>,
    /// Part of the value is not modeled.
    opaque: bool,
}

/// Type-flow graph over every function body.
struct FlowGraph<'p> {
    program: &'p Program,
    cha: &'p [Vec<Vec<FuncId>>],
    graph: DiGraph<Slot, ()>,
    index: HashMap<Slot, NodeIndex>,
    seeds: Vec<(NodeIndex, TypeRef)>,
}

impl<'p> FlowGraph<'p> {
    fn new(program: &'p Program, cha: &'p [Vec<Vec<FuncId>>]) -> Self {
        Self {
            program,
            cha,
            graph: DiGraph::new(),
            index: HashMap::new(),
            seeds: Vec::new(),
        }
    }

    fn node(&mut self, slot: Slot) -> NodeIndex {
        if let Some(idx) = self.index.get(&slot) {
            return *idx;
        }
        let idx = self.graph.add_node(slot.clone());
        self.index.insert(slot, idx);
        idx
    }

    fn sources(&self, func: FuncId, expr: &Expr) -> Sources {
        let mut out = Sources::default();
        self.collect_sources(func, expr, &mut out);
        out
    }

    fn collect_sources(&self, func: FuncId, expr: &Expr, out: &mut Sources) {
        match expr {
            Expr::Var(name) => out.slots.push(Slot::Local(func, name.clone())),
            Expr::Field(base, field) => match self.program.static_type(func, base) {
                Ty::Named(owner) => {
                    let owner = self.program.field_owner(&owner, field).unwrap_or(owner);
                    out.slots.push(Slot::Field(owner, field.clone()));
                }
                Ty::Foreign | Ty::Unknown => out.opaque = true,
            },
            Expr::Alloc(ty) => out.types.push(ty.clone()),
            Expr::Result(site) => {
                let targets = &self.cha[func][*site];
                if targets.is_empty() {
                    out.opaque = true;
                }
                out.slots.extend(targets.iter().map(|g| Slot::Return(*g)));
            }
            Expr::Assert(inner, _) => self.collect_sources(func, inner, out),
            Expr::Unknown => out.opaque = true,
        }
    }

    fn flow(&mut self, func: FuncId, expr: &Expr, target: Slot) {
        let sources = self.sources(func, expr);
        if sources.slots.is_empty() && sources.types.is_empty() {
            return;
        }
        let to = self.node(target);
        for slot in sources.slots {
            let from = self.node(slot);
            self.graph.update_edge(from, to, ());
        }
        for ty in sources.types {
            self.seeds.push((to, ty));
        }
    }

    fn add_function(&mut self, func: FuncId) {
        let program = self.program;
        let cha = self.cha;
        let f = program.function(func);

        for (name, value) in &f.body.assigns {
            self.flow(func, value, Slot::Local(func, name.clone()));
        }
        for (name, ty) in &f.body.declared {
            // `var x T` with a concrete T holds a T value.
            if !program.is_interface(ty) {
                let node = self.node(Slot::Local(func, name.clone()));
                self.seeds.push((node, ty.clone()));
            }
        }
        for store in &f.body.field_stores {
            if let Ty::Named(owner) = program.static_type(func, &store.base) {
                let owner = program.field_owner(&owner, &store.field).unwrap_or(owner);
                self.flow(func, &store.value, Slot::Field(owner, store.field.clone()));
            }
        }
        for (ty, field, value) in &f.body.field_inits {
            let owner = program.field_owner(ty, field).unwrap_or_else(|| ty.clone());
            self.flow(func, value, Slot::Field(owner, field.clone()));
        }
        for value in &f.body.returns {
            self.flow(func, value, Slot::Return(func));
        }

        for (site, call) in f.body.calls.iter().enumerate() {
            for &callee in &cha[func][site] {
                let g = program.function(callee);
                for (param, arg) in g.params.iter().zip(&call.args) {
                    if let Some(name) = &param.name {
                        self.flow(func, arg, Slot::Local(callee, name.clone()));
                    }
                }
                if let (Callee::Method { receiver, .. }, Some(recv)) = (&call.callee, &g.receiver) {
                    if let Some(var) = &recv.var {
                        self.flow(func, receiver, Slot::Local(callee, var.clone()));
                    }
                }
            }
        }
    }

    /// Push every seed type forward along flow edges.
    fn propagate(&self, budget: &mut Budget) -> Result<HashMap<NodeIndex, BTreeSet<TypeRef>>, AlgorithmFailure> {
        let mut points_to: HashMap<NodeIndex, BTreeSet<TypeRef>> = HashMap::new();
        for (start, ty) in &self.seeds {
            let mut queue = VecDeque::from([*start]);
            while let Some(node) = queue.pop_front() {
                budget.tick()?;
                if !points_to.entry(node).or_default().insert(ty.clone()) {
                    continue;
                }
                queue.extend(self.graph.neighbors_directed(node, Direction::Outgoing));
            }
        }
        Ok(points_to)
    }
}

/// Variable type analysis.
///
/// Builds a CHA graph, then propagates concrete types from allocation
/// sites through assignments, parameters, returns and struct fields.
/// Dynamic call sites keep only the targets whose receiver type can
/// actually reach them; receivers the flow graph cannot model keep their
/// CHA targets.
pub(super) fn build(program: &Program, budget: &mut Budget) -> Result<Resolution, AlgorithmFailure> {
    let table = dispatch_table(program);
    let mut hierarchy = Hierarchy::default();
    let cha: Vec<Vec<Vec<FuncId>>> = table
        .iter()
        .map(|sites| sites.iter().map(|d| hierarchy.targets(program, d)).collect())
        .collect();

    let mut flows = FlowGraph::new(program, &cha);
    for func in 0..program.len() {
        budget.tick()?;
        flows.add_function(func);
    }
    let points_to = flows.propagate(budget)?;
    debug!(
        slots = flows.graph.node_count(),
        flows = flows.graph.edge_count(),
        seeds = flows.seeds.len(),
        "VTA type propagation complete"
    );

    let mut edges = Vec::new();
    for (caller, sites) in table.iter().enumerate() {
        for (site, dispatch) in sites.iter().enumerate() {
            let callees = match dispatch {
                Dispatch::Static(callee) => vec![*callee],
                Dispatch::External => Vec::new(),
                Dispatch::Interface { .. } | Dispatch::Dynamic { .. } => {
                    let Callee::Method { receiver, .. } = &program.function(caller).body.calls[site].callee
                    else {
                        continue;
                    };
                    let sources = flows.sources(caller, receiver);
                    if sources.opaque && sources.slots.is_empty() && sources.types.is_empty() {
                        cha[caller][site].clone()
                    } else {
                        refine(program, dispatch, &sources, &flows, &points_to)
                    }
                }
            };
            edges.extend(callees.into_iter().map(|callee| ResolvedEdge {
                caller,
                site,
                callee,
            }));
        }
    }

    Ok(Resolution {
        edges,
        reachable: None,
    })
}

fn refine(
    program: &Program,
    dispatch: &Dispatch,
    sources: &Sources,
    flows: &FlowGraph<'_>,
    points_to: &HashMap<NodeIndex, BTreeSet<TypeRef>>,
) -> Vec<FuncId> {
    let Some(method) = dispatch_method(dispatch) else {
        return Vec::new();
    };
    let mut types: BTreeSet<&TypeRef> = sources.types.iter().collect();
    for slot in &sources.slots {
        if let Some(set) = flows.index.get(slot).and_then(|idx| points_to.get(idx)) {
            types.extend(set.iter());
        }
    }
    let callees: BTreeSet<FuncId> = types
        .into_iter()
        .filter(|ty| admits(program, dispatch, ty))
        .filter_map(|ty| program.lookup_method(ty, method))
        .collect();
    callees.into_iter().collect()
}
