//! Whole-module program model.
//!
//! Joins per-file facts into one view: functions indexed by id, declared
//! types with their method sets, and a static resolver that classifies
//! every call site as direct, interface dispatch, or unknown-receiver
//! dispatch.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::PathBuf;

use crate::extract::{
    BodyFacts, CallSite, Callee, Expr, FileFacts, Param, Receiver, TypeRef, TypeShape,
};
use crate::names;

pub type FuncId = usize;

/// Depth limit when chasing local variable assignments.
const MAX_TYPE_DEPTH: usize = 8;

#[derive(Debug, Clone)]
pub struct Function {
    pub package: String,
    pub package_name: String,
    pub name: String,
    pub receiver: Option<Receiver>,
    pub file: String,
    pub line_start: u32,
    pub line_end: u32,
    pub params: Vec<Param>,
    pub result: Option<TypeRef>,
    pub body: BodyFacts,
}

impl Function {
    pub fn receiver_type(&self) -> Option<TypeRef> {
        self.receiver
            .as_ref()
            .map(|r| TypeRef::new(self.package.as_str(), r.type_name.as_str()))
    }

    pub fn full_name(&self) -> String {
        let recv = self
            .receiver
            .as_ref()
            .map(|r| (r.type_name.as_str(), r.pointer));
        names::full_name(&self.package, recv, &self.name)
    }

    /// `F` or `T.M`.
    pub fn func_name(&self) -> String {
        match &self.receiver {
            Some(r) => format!("{}.{}", r.type_name, self.name),
            None => self.name.clone(),
        }
    }
}

/// Static type of an expression as far as the module source can tell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ty {
    /// A type declared in this module.
    Named(TypeRef),
    /// Builtin, stdlib or third-party type.
    Foreign,
    Unknown,
}

/// How a call site selects its callee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Static(FuncId),
    /// Receiver statically typed as a module interface.
    Interface { iface: TypeRef, method: String },
    /// Receiver type could not be determined.
    Dynamic { method: String },
    /// Callee outside the module, a builtin, or a function value.
    External,
}

#[derive(Debug)]
pub struct Program {
    pub root: PathBuf,
    pub module_path: String,
    pub functions: Vec<Function>,
    types: HashMap<TypeRef, TypeShape>,
    methods: HashMap<TypeRef, HashMap<String, FuncId>>,
    package_funcs: HashMap<(String, String), FuncId>,
    method_sets: HashMap<TypeRef, BTreeSet<String>>,
    concrete: Vec<TypeRef>,
}

impl Program {
    /// Assemble a program from extracted files. Function ids follow
    /// `(file, declaration order)`.
    pub fn from_files(root: PathBuf, module_path: String, mut files: Vec<FileFacts>) -> Self {
        files.sort_by(|a, b| a.path.cmp(&b.path));

        let mut functions = Vec::new();
        let mut types = HashMap::new();
        for file in files {
            for ty in file.types {
                types.insert(TypeRef::new(file.package_path.as_str(), ty.name), ty.shape);
            }
            for decl in file.functions {
                functions.push(Function {
                    package: file.package_path.clone(),
                    package_name: file.package_name.clone(),
                    name: decl.name,
                    receiver: decl.receiver,
                    file: file.path.clone(),
                    line_start: decl.line_start,
                    line_end: decl.line_end,
                    params: decl.params,
                    result: decl.result,
                    body: decl.body,
                });
            }
        }

        let mut methods: HashMap<TypeRef, HashMap<String, FuncId>> = HashMap::new();
        let mut package_funcs = HashMap::new();
        for (id, func) in functions.iter().enumerate() {
            match func.receiver_type() {
                Some(recv) => {
                    methods.entry(recv).or_default().insert(func.name.clone(), id);
                }
                None => {
                    package_funcs
                        .entry((func.package.clone(), func.name.clone()))
                        .or_insert(id);
                }
            }
        }

        let mut program = Self {
            root,
            module_path,
            functions,
            types,
            methods,
            package_funcs,
            method_sets: HashMap::new(),
            concrete: Vec::new(),
        };

        let mut concrete: Vec<TypeRef> = program
            .types
            .iter()
            .filter(|(_, shape)| !matches!(shape, TypeShape::Interface { .. }))
            .map(|(ty, _)| ty.clone())
            .collect();
        concrete.sort();
        let method_sets = concrete
            .iter()
            .map(|ty| (ty.clone(), program.collect_method_set(ty, &mut HashSet::new())))
            .collect();
        program.method_sets = method_sets;
        program.concrete = concrete;
        program
    }

    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id]
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Declared non-interface types, sorted.
    pub fn concrete_types(&self) -> &[TypeRef] {
        &self.concrete
    }

    pub fn is_interface(&self, ty: &TypeRef) -> bool {
        matches!(self.types.get(ty), Some(TypeShape::Interface { .. }))
    }

    fn classify(&self, ty: &TypeRef) -> Ty {
        if self.types.contains_key(ty) {
            Ty::Named(ty.clone())
        } else {
            Ty::Foreign
        }
    }

    // ── Method sets ──────────────────────────────────────────────

    /// Method declared on `ty` or promoted from an embedded type.
    pub fn lookup_method(&self, ty: &TypeRef, method: &str) -> Option<FuncId> {
        self.lookup_method_inner(ty, method, &mut HashSet::new())
    }

    fn lookup_method_inner(
        &self,
        ty: &TypeRef,
        method: &str,
        seen: &mut HashSet<TypeRef>,
    ) -> Option<FuncId> {
        if !seen.insert(ty.clone()) {
            return None;
        }
        if let Some(id) = self.methods.get(ty).and_then(|m| m.get(method)) {
            return Some(*id);
        }
        let Some(TypeShape::Struct { embedded, .. }) = self.types.get(ty) else {
            return None;
        };
        embedded
            .iter()
            .find_map(|e| self.lookup_method_inner(e, method, seen))
    }

    fn collect_method_set(&self, ty: &TypeRef, seen: &mut HashSet<TypeRef>) -> BTreeSet<String> {
        let mut set = BTreeSet::new();
        if !seen.insert(ty.clone()) {
            return set;
        }
        if let Some(declared) = self.methods.get(ty) {
            set.extend(declared.keys().cloned());
        }
        if let Some(TypeShape::Struct { embedded, .. }) = self.types.get(ty) {
            for e in embedded {
                set.extend(self.collect_method_set(e, seen));
            }
        }
        set
    }

    /// Method names required by a module interface, embedded interfaces included.
    pub fn interface_methods(&self, iface: &TypeRef) -> BTreeSet<String> {
        let mut set = BTreeSet::new();
        let mut stack = vec![iface.clone()];
        let mut seen = HashSet::new();
        while let Some(ty) = stack.pop() {
            if !seen.insert(ty.clone()) {
                continue;
            }
            if let Some(TypeShape::Interface { methods, embedded }) = self.types.get(&ty) {
                set.extend(methods.iter().cloned());
                stack.extend(embedded.iter().cloned());
            }
        }
        set
    }

    pub fn implements(&self, ty: &TypeRef, iface: &TypeRef) -> bool {
        let required = self.interface_methods(iface);
        if required.is_empty() {
            return false;
        }
        self.method_sets
            .get(ty)
            .is_some_and(|have| required.is_subset(have))
    }

    /// Concrete types whose method set includes `method`.
    pub fn has_method(&self, ty: &TypeRef, method: &str) -> bool {
        self.method_sets.get(ty).is_some_and(|set| set.contains(method))
    }

    fn field_type(&self, ty: &TypeRef, field: &str, seen: &mut HashSet<TypeRef>) -> Option<TypeRef> {
        if !seen.insert(ty.clone()) {
            return None;
        }
        let Some(TypeShape::Struct { fields, embedded }) = self.types.get(ty) else {
            return None;
        };
        if let Some((_, t)) = fields.iter().find(|(name, _)| name == field) {
            return Some(t.clone());
        }
        if let Some(e) = embedded.iter().find(|e| e.name == field) {
            return Some(e.clone());
        }
        embedded
            .iter()
            .find_map(|e| self.field_type(e, field, seen))
    }

    /// Struct that actually declares `field` on `ty`, following embedding.
    pub fn field_owner(&self, ty: &TypeRef, field: &str) -> Option<TypeRef> {
        let mut stack = vec![ty.clone()];
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(TypeShape::Struct { fields, embedded }) = self.types.get(&current) {
                if fields.iter().any(|(name, _)| name == field) {
                    return Some(current);
                }
                stack.extend(embedded.iter().rev().cloned());
            }
        }
        None
    }

    // ── Static typing ────────────────────────────────────────────

    pub fn static_type(&self, func: FuncId, expr: &Expr) -> Ty {
        self.type_of(func, expr, 0)
    }

    fn type_of(&self, func: FuncId, expr: &Expr, depth: usize) -> Ty {
        if depth > MAX_TYPE_DEPTH {
            return Ty::Unknown;
        }
        match expr {
            Expr::Var(name) => self.local_type(func, name, depth + 1),
            Expr::Field(base, field) => match self.type_of(func, base, depth + 1) {
                Ty::Named(owner) => self
                    .field_type(&owner, field, &mut HashSet::new())
                    .map_or(Ty::Unknown, |t| self.classify(&t)),
                other => other,
            },
            Expr::Alloc(ty) | Expr::Assert(_, ty) => self.classify(ty),
            Expr::Result(idx) => self.result_type(func, *idx, depth + 1),
            Expr::Unknown => Ty::Unknown,
        }
    }

    fn local_type(&self, func: FuncId, name: &str, depth: usize) -> Ty {
        let f = &self.functions[func];
        if let Some(recv) = &f.receiver {
            if recv.var.as_deref() == Some(name) {
                return Ty::Named(TypeRef::new(f.package.as_str(), recv.type_name.as_str()));
            }
        }
        if let Some(param) = f.params.iter().find(|p| p.name.as_deref() == Some(name)) {
            return param.ty.as_ref().map_or(Ty::Unknown, |t| self.classify(t));
        }
        if let Some((_, ty)) = f.body.declared.iter().find(|(n, _)| n == name) {
            return self.classify(ty);
        }
        f.body
            .assigns
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, e)| self.type_of(func, e, depth))
            .find(|t| *t != Ty::Unknown)
            .unwrap_or(Ty::Unknown)
    }

    fn result_type(&self, func: FuncId, idx: usize, depth: usize) -> Ty {
        let Some(site) = self.functions[func].body.calls.get(idx) else {
            return Ty::Unknown;
        };
        let package = &self.functions[func].package;
        let (pkg, name) = match &site.callee {
            Callee::Ident(name) => (package.as_str(), name.as_str()),
            Callee::Qualified { package, name } => (package.as_str(), name.as_str()),
            Callee::Method { .. } => {
                return match self.classify_site(func, site, depth) {
                    Dispatch::Static(id) => self.declared_result(id),
                    Dispatch::External => Ty::Foreign,
                    Dispatch::Interface { .. } | Dispatch::Dynamic { .. } => Ty::Unknown,
                };
            }
            Callee::Opaque => return Ty::Unknown,
        };
        if let Some(&id) = self.package_funcs.get(&(pkg.to_string(), name.to_string())) {
            return self.declared_result(id);
        }
        // Conversion `T(x)` to a module type.
        let conversion = TypeRef::new(pkg, name);
        if self.types.contains_key(&conversion) {
            return Ty::Named(conversion);
        }
        Ty::Foreign
    }

    fn declared_result(&self, id: FuncId) -> Ty {
        self.functions[id]
            .result
            .as_ref()
            .map_or(Ty::Unknown, |t| self.classify(t))
    }

    // ── Dispatch ─────────────────────────────────────────────────

    /// Classify the call site at `idx` in function `func`.
    pub fn dispatch(&self, func: FuncId, idx: usize) -> Dispatch {
        match self.functions[func].body.calls.get(idx) {
            Some(site) => self.classify_site(func, site, 0),
            None => Dispatch::External,
        }
    }

    fn classify_site(&self, func: FuncId, site: &CallSite, depth: usize) -> Dispatch {
        let package = &self.functions[func].package;
        match &site.callee {
            Callee::Ident(name) => self
                .package_funcs
                .get(&(package.clone(), name.clone()))
                .map_or(Dispatch::External, |id| Dispatch::Static(*id)),
            Callee::Qualified { package, name } => self
                .package_funcs
                .get(&(package.clone(), name.clone()))
                .map_or(Dispatch::External, |id| Dispatch::Static(*id)),
            Callee::Method { receiver, method } => {
                match self.type_of(func, receiver, depth + 1) {
                    Ty::Named(ty) if self.is_interface(&ty) => Dispatch::Interface {
                        iface: ty,
                        method: method.clone(),
                    },
                    Ty::Named(ty) => self
                        .lookup_method(&ty, method)
                        .map_or(Dispatch::External, Dispatch::Static),
                    Ty::Foreign => Dispatch::External,
                    Ty::Unknown => Dispatch::Dynamic {
                        method: method.clone(),
                    },
                }
            }
            Callee::Opaque => Dispatch::External,
        }
    }

    // ── Entry points ─────────────────────────────────────────────

    /// `main` of every `package main`, plus every `init`.
    pub fn default_entries(&self) -> Vec<FuncId> {
        self.functions
            .iter()
            .enumerate()
            .filter(|(_, f)| {
                f.receiver.is_none()
                    && ((f.name == "main" && f.package_name == "main") || f.name == "init")
            })
            .map(|(id, _)| id)
            .collect()
    }

    /// Find a function by optional file and `F` / `T.M` name.
    pub fn resolve_entry(&self, file: Option<&str>, function: &str) -> Option<FuncId> {
        let file = file.map(|f| f.trim_start_matches("./").replace('\\', "/"));
        self.functions
            .iter()
            .position(|f| {
                let name_matches = f.func_name() == function || f.full_name() == function;
                let file_matches = file.as_deref().is_none_or(|want| {
                    f.file == want || f.file.ends_with(&format!("/{want}")) || want.ends_with(&format!("/{}", f.file))
                });
                name_matches && file_matches
            })
    }
}
