//! Call graph construction, one handler per [`Algorithm`].

mod cha;
mod direct;
mod rta;
mod vta;

use std::collections::{BTreeSet, HashMap};

use crate::algorithm::{Algorithm, AlgorithmFailure, Budget};
use crate::extract::TypeRef;
use crate::program::{Dispatch, FuncId, Program};

/// One resolved call: the call site at `site` in `caller` may invoke `callee`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResolvedEdge {
    pub caller: FuncId,
    pub site: usize,
    pub callee: FuncId,
}

#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub edges: Vec<ResolvedEdge>,
    /// Functions the graph covers. `None` means every loaded function.
    pub reachable: Option<BTreeSet<FuncId>>,
}

/// Run `algorithm` over `program`. `entries` only matter for RTA.
pub fn construct(
    program: &Program,
    algorithm: Algorithm,
    entries: &[FuncId],
    max_steps: usize,
) -> Result<Resolution, AlgorithmFailure> {
    let mut budget = Budget::new(algorithm, max_steps);
    match algorithm {
        Algorithm::Static => direct::build(program, &mut budget),
        Algorithm::Cha => cha::build(program, &mut budget),
        Algorithm::Rta => rta::build(program, entries, &mut budget),
        Algorithm::Vta => vta::build(program, &mut budget),
    }
}

/// Per-site dispatch for every function, computed once per build.
fn dispatch_table(program: &Program) -> Vec<Vec<Dispatch>> {
    program
        .functions
        .iter()
        .enumerate()
        .map(|(id, f)| (0..f.body.calls.len()).map(|idx| program.dispatch(id, idx)).collect())
        .collect()
}

/// Class hierarchy lookups, memoized per (interface, method) and per method name.
#[derive(Debug, Default)]
struct Hierarchy {
    by_interface: HashMap<(TypeRef, String), Vec<FuncId>>,
    by_method: HashMap<String, Vec<FuncId>>,
}

impl Hierarchy {
    /// Every callee CHA allows for `dispatch`, sorted and deduplicated.
    fn targets(&mut self, program: &Program, dispatch: &Dispatch) -> Vec<FuncId> {
        match dispatch {
            Dispatch::Static(id) => vec![*id],
            Dispatch::Interface { iface, method } => self
                .by_interface
                .entry((iface.clone(), method.clone()))
                .or_insert_with(|| {
                    let types = program
                        .concrete_types()
                        .iter()
                        .filter(|t| program.implements(t, iface));
                    methods_of(program, types, method)
                })
                .clone(),
            Dispatch::Dynamic { method } => self
                .by_method
                .entry(method.clone())
                .or_insert_with(|| {
                    let types = program
                        .concrete_types()
                        .iter()
                        .filter(|t| program.has_method(t, method));
                    methods_of(program, types, method)
                })
                .clone(),
            Dispatch::External => Vec::new(),
        }
    }
}

/// Whether a value of concrete type `ty` can answer `dispatch`.
fn admits(program: &Program, dispatch: &Dispatch, ty: &TypeRef) -> bool {
    match dispatch {
        Dispatch::Interface { iface, .. } => program.implements(ty, iface),
        Dispatch::Dynamic { method } => program.has_method(ty, method),
        Dispatch::Static(_) | Dispatch::External => false,
    }
}

fn dispatch_method(dispatch: &Dispatch) -> Option<&str> {
    match dispatch {
        Dispatch::Interface { method, .. } | Dispatch::Dynamic { method } => Some(method),
        Dispatch::Static(_) | Dispatch::External => None,
    }
}

fn methods_of<'a>(
    program: &Program,
    types: impl Iterator<Item = &'a TypeRef>,
    method: &str,
) -> Vec<FuncId> {
    let ids: BTreeSet<FuncId> = types
        .filter_map(|t| program.lookup_method(t, method))
        .collect();
    ids.into_iter().collect()
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::path::PathBuf;

    use crate::extract::extract_file;
    use crate::program::{FuncId, Program};
    use crate::syntax::parse_go;

    use super::Resolution;

    /// Two stores behind one interface, only one of which `main` creates.
    pub const SHOP: &[(&str, &str, &str)] = &[
        (
            "main.go",
            "example.com/shop",
            "package main

import (
\t\"example.com/shop/store\"
\t\"example.com/shop/svc\"
)

func main() {
\trepo := &store.Memory{}
\ts := svc.New(repo)
\ts.Put(\"a\")
}
",
        ),
        (
            "store/store.go",
            "example.com/shop/store",
            "package store

type Repo interface {
\tSave(id string) error
}

type Memory struct{}

func (m *Memory) Save(id string) error { return nil }

type Disk struct{}

func (d *Disk) Save(id string) error { return d.flush() }

func (d *Disk) flush() error { return nil }
",
        ),
        (
            "svc/svc.go",
            "example.com/shop/svc",
            "package svc

import \"example.com/shop/store\"

type Service struct {
\trepo store.Repo
}

func New(r store.Repo) *Service {
\treturn &Service{repo: r}
}

func (s *Service) Put(id string) error {
\treturn s.repo.Save(id)
}
",
        ),
    ];

    pub fn program(files: &[(&str, &str, &str)]) -> Program {
        let facts = files
            .iter()
            .map(|(path, pkg, src)| {
                let tree = parse_go(src, path).unwrap();
                extract_file(&tree, src, path, pkg)
            })
            .collect();
        Program::from_files(PathBuf::from("/tmp/shop"), "example.com/shop".into(), facts)
    }

    pub fn id(p: &Program, func_name: &str) -> FuncId {
        p.functions
            .iter()
            .position(|f| f.func_name() == func_name)
            .unwrap_or_else(|| panic!("no function {func_name}"))
    }

    /// `(caller, callee)` pairs by `func_name`, sorted.
    pub fn pairs(p: &Program, r: &Resolution) -> Vec<(String, String)> {
        let mut out: Vec<_> = r
            .edges
            .iter()
            .map(|e| (p.function(e.caller).func_name(), p.function(e.callee).func_name()))
            .collect();
        out.sort();
        out
    }

    pub fn pair(a: &str, b: &str) -> (String, String) {
        (a.to_string(), b.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{SHOP, pair, pairs, program};
    use super::*;

    #[test]
    fn algorithms_order_by_precision() {
        let p = program(SHOP);
        let entries = p.default_entries();

        let stat = pairs(&p, &construct(&p, Algorithm::Static, &entries, 10_000).unwrap());
        let cha = pairs(&p, &construct(&p, Algorithm::Cha, &entries, 10_000).unwrap());
        let rta = pairs(&p, &construct(&p, Algorithm::Rta, &entries, 10_000).unwrap());
        let vta = pairs(&p, &construct(&p, Algorithm::Vta, &entries, 10_000).unwrap());

        let interface_edges = [pair("Service.Put", "Memory.Save"), pair("Service.Put", "Disk.Save")];
        assert!(!stat.contains(&interface_edges[0]));
        assert!(cha.contains(&interface_edges[0]) && cha.contains(&interface_edges[1]));
        assert!(rta.contains(&interface_edges[0]) && !rta.contains(&interface_edges[1]));
        assert!(vta.contains(&interface_edges[0]) && !vta.contains(&interface_edges[1]));

        assert_eq!(
            stat,
            [
                pair("Disk.Save", "Disk.flush"),
                pair("main", "New"),
                pair("main", "Service.Put"),
            ]
        );
        for e in &stat {
            assert!(cha.contains(e) && vta.contains(e), "{e:?} missing");
        }
        // Disk is never instantiated, so RTA never reaches its methods.
        assert!(!rta.contains(&pair("Disk.Save", "Disk.flush")));
        assert!(rta.contains(&pair("main", "New")));
    }

    #[test]
    fn exhausted_budget_fails_structurally() {
        let p = program(SHOP);
        let err = construct(&p, Algorithm::Rta, &p.default_entries(), 1).unwrap_err();
        assert_eq!(err.algorithm, Algorithm::Rta);
        assert!(err.reason.contains("budget"));
    }
}
