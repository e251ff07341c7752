//! Per-file fact extraction from Go syntax trees.
//!
//! Each file is reduced to declarations (functions, methods, types) and,
//! for every function body, the call sites and value flows the
//! construction algorithms need. Nothing here crosses file boundaries;
//! cross-file resolution happens in [`crate::program`].

use std::collections::{HashMap, HashSet};

use tree_sitter::{Node, Tree};

use crate::syntax::{
    child_by_field, children_by_field, end_line, method_receiver, named_children, node_text,
    package_name, start_line,
};

/// A named type, identified by package import path and type name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeRef {
    pub package: String,
    pub name: String,
}

impl TypeRef {
    pub fn new(package: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileFacts {
    /// Path relative to the module root, `/`-separated.
    pub path: String,
    pub package_name: String,
    pub package_path: String,
    pub functions: Vec<FuncDecl>,
    pub types: Vec<TypeDecl>,
}

#[derive(Debug, Clone)]
pub struct TypeDecl {
    pub name: String,
    pub shape: TypeShape,
}

#[derive(Debug, Clone)]
pub enum TypeShape {
    Struct {
        fields: Vec<(String, TypeRef)>,
        embedded: Vec<TypeRef>,
    },
    Interface {
        methods: Vec<String>,
        embedded: Vec<TypeRef>,
    },
    /// Any other defined type (`type IDs []int`, `type H func()`).
    Other,
}

#[derive(Debug, Clone)]
pub struct Receiver {
    pub var: Option<String>,
    pub type_name: String,
    pub pointer: bool,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: Option<String>,
    pub ty: Option<TypeRef>,
}

#[derive(Debug, Clone)]
pub struct FuncDecl {
    pub name: String,
    pub receiver: Option<Receiver>,
    pub line_start: u32,
    pub line_end: u32,
    pub params: Vec<Param>,
    /// First declared result type.
    pub result: Option<TypeRef>,
    pub body: BodyFacts,
}

/// Flow facts for one function body, closures included.
#[derive(Debug, Clone, Default)]
pub struct BodyFacts {
    pub calls: Vec<CallSite>,
    /// `name = expr`, `name := expr`, `var name = expr`.
    pub assigns: Vec<(String, Expr)>,
    /// `var name T`.
    pub declared: Vec<(String, TypeRef)>,
    /// `base.field = value`.
    pub field_stores: Vec<FieldStore>,
    /// `T{field: value}`.
    pub field_inits: Vec<(TypeRef, String, Expr)>,
    /// First result of each `return`.
    pub returns: Vec<Expr>,
    /// Types instantiated by composite literals or `new(T)`.
    pub allocs: Vec<TypeRef>,
}

#[derive(Debug, Clone)]
pub struct FieldStore {
    pub base: Expr,
    pub field: String,
    pub value: Expr,
}

#[derive(Debug, Clone)]
pub struct CallSite {
    pub line: u32,
    pub callee: Callee,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone)]
pub enum Callee {
    /// `f(...)`: package-level function in the same package.
    Ident(String),
    /// `pkg.F(...)` through an import.
    Qualified { package: String, name: String },
    /// `x.M(...)` on a value.
    Method { receiver: Expr, method: String },
    /// Function values, closures, builtins reached indirectly.
    Opaque,
}

/// Symbolic value of an expression, resolved later against the program.
#[derive(Debug, Clone)]
pub enum Expr {
    Var(String),
    Field(Box<Expr>, String),
    Alloc(TypeRef),
    /// Result of the call site at this index in the same body.
    Result(usize),
    Assert(Box<Expr>, TypeRef),
    Unknown,
}

// ── File extraction ────────────────────────────────────────────────

/// Reduce one parsed file to its facts.
pub fn extract_file(tree: &Tree, source: &str, path: &str, package_path: &str) -> FileFacts {
    let root = tree.root_node();
    let ctx = FileContext {
        source,
        package_path,
        imports: collect_imports(root, source),
    };

    let mut functions = Vec::new();
    let mut types = Vec::new();
    for decl in named_children(root) {
        match decl.kind() {
            "function_declaration" | "method_declaration" => {
                if let Some(func) = ctx.function(decl) {
                    functions.push(func);
                }
            }
            "type_declaration" => {
                for spec in named_children(decl) {
                    if spec.kind() == "type_spec" {
                        if let Some(ty) = ctx.type_decl(spec) {
                            types.push(ty);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    FileFacts {
        path: path.to_string(),
        package_name: package_name(root, source).unwrap_or_default(),
        package_path: package_path.to_string(),
        functions,
        types,
    }
}

/// Map of local import name to import path. Dot and blank imports are skipped.
fn collect_imports(root: Node<'_>, source: &str) -> HashMap<String, String> {
    let mut imports = HashMap::new();
    let mut specs = Vec::new();
    for decl in named_children(root) {
        if decl.kind() != "import_declaration" {
            continue;
        }
        for child in named_children(decl) {
            match child.kind() {
                "import_spec" => specs.push(child),
                "import_spec_list" => specs.extend(
                    named_children(child)
                        .into_iter()
                        .filter(|n| n.kind() == "import_spec"),
                ),
                _ => {}
            }
        }
    }

    for spec in specs {
        let Some(path_node) = child_by_field(spec, "path") else {
            continue;
        };
        let path = node_text(path_node, source).trim_matches(|c| c == '"' || c == '`');
        let alias = match child_by_field(spec, "name") {
            Some(n) if n.kind() == "package_identifier" => node_text(n, source).to_string(),
            Some(_) => continue,
            None => default_import_name(path),
        };
        imports.insert(alias, path.to_string());
    }
    imports
}

/// Last path segment, skipping a trailing major-version suffix (`/v2`).
pub fn default_import_name(path: &str) -> String {
    let mut segments = path.rsplit('/');
    let last = segments.next().unwrap_or(path);
    let is_version = last.len() > 1
        && last.starts_with('v')
        && last[1..].chars().all(|c| c.is_ascii_digit());
    if is_version {
        if let Some(prev) = segments.next() {
            return prev.to_string();
        }
    }
    last.to_string()
}

struct FileContext<'s> {
    source: &'s str,
    package_path: &'s str,
    imports: HashMap<String, String>,
}

impl FileContext<'_> {
    fn text(&self, node: Node<'_>) -> &str {
        node_text(node, self.source)
    }

    fn type_ref(&self, node: Node<'_>) -> Option<TypeRef> {
        match node.kind() {
            "type_identifier" | "identifier" => {
                Some(TypeRef::new(self.package_path, self.text(node)))
            }
            "qualified_type" => {
                let pkg = self.text(child_by_field(node, "package")?);
                let name = self.text(child_by_field(node, "name")?);
                let path = self.imports.get(pkg)?;
                Some(TypeRef::new(path.as_str(), name))
            }
            "pointer_type" | "parenthesized_type" => {
                self.type_ref(named_children(node).into_iter().next()?)
            }
            "generic_type" => self.type_ref(child_by_field(node, "type")?),
            _ => None,
        }
    }

    fn function(&self, decl: Node<'_>) -> Option<FuncDecl> {
        let name = self.text(child_by_field(decl, "name")?).to_string();
        let receiver = if decl.kind() == "method_declaration" {
            let (var, type_name, pointer) = method_receiver(decl, self.source)?;
            Some(Receiver {
                var,
                type_name,
                pointer,
            })
        } else {
            None
        };

        let params = child_by_field(decl, "parameters")
            .map(|list| self.params(list))
            .unwrap_or_default();
        let result = child_by_field(decl, "result").and_then(|r| {
            if r.kind() == "parameter_list" {
                self.params(r).into_iter().next().and_then(|p| p.ty)
            } else {
                self.type_ref(r)
            }
        });

        let mut walker = BodyWalker::new(self);
        if let Some(recv) = &receiver {
            if let Some(var) = &recv.var {
                walker.locals.insert(var.clone());
            }
        }
        for param in &params {
            if let Some(name) = &param.name {
                walker.locals.insert(name.clone());
            }
        }
        if let Some(body) = child_by_field(decl, "body") {
            walker.visit(body);
        }

        Some(FuncDecl {
            name,
            receiver,
            line_start: start_line(decl),
            line_end: end_line(decl),
            params,
            result,
            body: walker.facts,
        })
    }

    fn params(&self, list: Node<'_>) -> Vec<Param> {
        let mut out = Vec::new();
        for decl in named_children(list) {
            if !matches!(
                decl.kind(),
                "parameter_declaration" | "variadic_parameter_declaration"
            ) {
                continue;
            }
            let ty = child_by_field(decl, "type").and_then(|t| self.type_ref(t));
            let names = children_by_field(decl, "name");
            if names.is_empty() {
                out.push(Param { name: None, ty });
            } else {
                for n in names {
                    let name = self.text(n);
                    out.push(Param {
                        name: (name != "_").then(|| name.to_string()),
                        ty: ty.clone(),
                    });
                }
            }
        }
        out
    }

    fn type_decl(&self, spec: Node<'_>) -> Option<TypeDecl> {
        let name = self.text(child_by_field(spec, "name")?).to_string();
        let ty = child_by_field(spec, "type")?;
        let shape = match ty.kind() {
            "struct_type" => {
                let mut fields = Vec::new();
                let mut embedded = Vec::new();
                let decls = named_children(ty)
                    .into_iter()
                    .filter(|n| n.kind() == "field_declaration_list")
                    .flat_map(named_children)
                    .filter(|n| n.kind() == "field_declaration");
                for field in decls {
                    let Some(field_ty) = child_by_field(field, "type").and_then(|t| self.type_ref(t))
                    else {
                        continue;
                    };
                    let names = children_by_field(field, "name");
                    if names.is_empty() {
                        embedded.push(field_ty);
                    } else {
                        for n in names {
                            fields.push((self.text(n).to_string(), field_ty.clone()));
                        }
                    }
                }
                TypeShape::Struct { fields, embedded }
            }
            "interface_type" => {
                let mut methods = Vec::new();
                let mut embedded = Vec::new();
                for elem in named_children(ty) {
                    match elem.kind() {
                        "method_elem" | "method_spec" => {
                            if let Some(n) = child_by_field(elem, "name") {
                                methods.push(self.text(n).to_string());
                            }
                        }
                        "type_elem" | "constraint_elem" => {
                            embedded.extend(
                                named_children(elem)
                                    .into_iter()
                                    .filter_map(|t| self.type_ref(t)),
                            );
                        }
                        _ => {}
                    }
                }
                TypeShape::Interface { methods, embedded }
            }
            _ => TypeShape::Other,
        };
        Some(TypeDecl { name, shape })
    }
}

// ── Body walking ───────────────────────────────────────────────────

struct BodyWalker<'c, 's> {
    ctx: &'c FileContext<'s>,
    facts: BodyFacts,
    /// Call nodes already recorded, by tree-sitter node id.
    recorded: HashMap<usize, usize>,
    /// Names bound in this body. Shadows import names.
    locals: HashSet<String>,
}

impl<'c, 's> BodyWalker<'c, 's> {
    fn new(ctx: &'c FileContext<'s>) -> Self {
        Self {
            ctx,
            facts: BodyFacts::default(),
            recorded: HashMap::new(),
            locals: HashSet::new(),
        }
    }

    fn visit(&mut self, node: Node<'_>) {
        match node.kind() {
            "call_expression" => {
                if let Some(ty) = self.new_type(node) {
                    self.facts.allocs.push(ty);
                } else {
                    self.call(node);
                }
            }
            "composite_literal" => self.composite(node),
            "short_var_declaration" => {
                let left = child_by_field(node, "left").map(named_children).unwrap_or_default();
                let right = child_by_field(node, "right").map(named_children).unwrap_or_default();
                self.bind(&left, &right);
            }
            "assignment_statement" => {
                let plain = child_by_field(node, "operator").is_some_and(|op| self.ctx.text(op) == "=");
                if plain {
                    let left = child_by_field(node, "left").map(named_children).unwrap_or_default();
                    let right = child_by_field(node, "right").map(named_children).unwrap_or_default();
                    self.bind(&left, &right);
                }
            }
            "var_spec" => self.var_spec(node),
            "return_statement" => {
                let first = named_children(node)
                    .into_iter()
                    .next()
                    .and_then(|list| named_children(list).into_iter().next());
                if let Some(value) = first {
                    let expr = self.expr(value);
                    self.facts.returns.push(expr);
                }
            }
            "func_literal" => {
                if let Some(list) = child_by_field(node, "parameters") {
                    for param in self.ctx.params(list) {
                        if let Some(name) = param.name {
                            if let Some(ty) = param.ty {
                                self.facts.declared.push((name.clone(), ty));
                            }
                            self.locals.insert(name);
                        }
                    }
                }
            }
            "range_clause" => {
                if let Some(left) = child_by_field(node, "left") {
                    for n in named_children(left) {
                        if n.kind() == "identifier" {
                            self.locals.insert(self.ctx.text(n).to_string());
                        }
                    }
                }
            }
            _ => {}
        }

        for child in named_children(node) {
            self.visit(child);
        }
    }

    fn var_spec(&mut self, node: Node<'_>) {
        let names = children_by_field(node, "name");
        if let Some(ty) = child_by_field(node, "type").and_then(|t| self.ctx.type_ref(t)) {
            for n in &names {
                self.facts
                    .declared
                    .push((self.ctx.text(*n).to_string(), ty.clone()));
            }
        }
        let values = child_by_field(node, "value").map(named_children).unwrap_or_default();
        self.bind(&names, &values);
        for n in names {
            self.locals.insert(self.ctx.text(n).to_string());
        }
    }

    fn bind(&mut self, left: &[Node<'_>], right: &[Node<'_>]) {
        let exprs: Vec<Expr> = if left.len() == right.len() {
            right.iter().map(|r| self.expr(*r)).collect()
        } else if let Some(first) = right.first() {
            // `a, err := f()`: only the first result carries a tracked type.
            let mut exprs = vec![self.expr(*first)];
            exprs.resize(left.len(), Expr::Unknown);
            exprs
        } else {
            vec![Expr::Unknown; left.len()]
        };

        for (target, value) in left.iter().zip(exprs) {
            match target.kind() {
                "identifier" => {
                    let name = self.ctx.text(*target);
                    if name == "_" {
                        continue;
                    }
                    self.locals.insert(name.to_string());
                    self.facts.assigns.push((name.to_string(), value));
                }
                "selector_expression" => {
                    let (Some(operand), Some(field)) = (
                        child_by_field(*target, "operand"),
                        child_by_field(*target, "field"),
                    ) else {
                        continue;
                    };
                    let base = self.expr(operand);
                    self.facts.field_stores.push(FieldStore {
                        base,
                        field: self.ctx.text(field).to_string(),
                        value,
                    });
                }
                _ => {}
            }
        }
    }

    fn composite(&mut self, node: Node<'_>) {
        let Some(ty) = child_by_field(node, "type").and_then(|t| self.ctx.type_ref(t)) else {
            return;
        };
        self.facts.allocs.push(ty.clone());

        let Some(body) = child_by_field(node, "body") else {
            return;
        };
        for element in named_children(body) {
            if element.kind() != "keyed_element" {
                continue;
            }
            let parts = named_children(element);
            let key = child_by_field(element, "key").or_else(|| parts.first().copied());
            let value = child_by_field(element, "value").or_else(|| parts.last().copied());
            let (Some(key), Some(value)) = (key.map(unwrap_element), value.map(unwrap_element))
            else {
                continue;
            };
            if !matches!(key.kind(), "identifier" | "field_identifier") {
                continue;
            }
            let expr = self.expr(value);
            self.facts
                .field_inits
                .push((ty.clone(), self.ctx.text(key).to_string(), expr));
        }
    }

    /// `new(T)` yields the allocated type.
    fn new_type(&self, call: Node<'_>) -> Option<TypeRef> {
        let func = child_by_field(call, "function")?;
        if func.kind() != "identifier" || self.ctx.text(func) != "new" {
            return None;
        }
        let arg = named_children(child_by_field(call, "arguments")?)
            .into_iter()
            .next()?;
        self.ctx.type_ref(arg)
    }

    fn call(&mut self, node: Node<'_>) -> usize {
        if let Some(&idx) = self.recorded.get(&node.id()) {
            return idx;
        }

        let callee = match child_by_field(node, "function") {
            Some(func) => self.callee(func),
            None => Callee::Opaque,
        };
        let args_node = child_by_field(node, "arguments");
        let args = args_node
            .map(named_children)
            .unwrap_or_default()
            .into_iter()
            .map(|a| self.expr(a))
            .collect();
        let line = args_node.map_or_else(|| start_line(node), start_line);

        let idx = self.facts.calls.len();
        self.facts.calls.push(CallSite { line, callee, args });
        self.recorded.insert(node.id(), idx);
        idx
    }

    fn callee(&mut self, func: Node<'_>) -> Callee {
        match func.kind() {
            "identifier" => {
                let name = self.ctx.text(func);
                if self.locals.contains(name) {
                    Callee::Opaque
                } else {
                    Callee::Ident(name.to_string())
                }
            }
            "selector_expression" => {
                let (Some(operand), Some(field)) =
                    (child_by_field(func, "operand"), child_by_field(func, "field"))
                else {
                    return Callee::Opaque;
                };
                let method = self.ctx.text(field).to_string();
                if let Some(package) = self.import_of(operand) {
                    return Callee::Qualified {
                        package,
                        name: method,
                    };
                }
                Callee::Method {
                    receiver: self.expr(operand),
                    method,
                }
            }
            "parenthesized_expression" => match named_children(func).into_iter().next() {
                Some(inner) => self.callee(inner),
                None => Callee::Opaque,
            },
            _ => Callee::Opaque,
        }
    }

    /// Import path when `node` is an unshadowed import name.
    fn import_of(&self, node: Node<'_>) -> Option<String> {
        if node.kind() != "identifier" {
            return None;
        }
        let name = self.ctx.text(node);
        if self.locals.contains(name) {
            return None;
        }
        self.ctx.imports.get(name).cloned()
    }

    fn expr(&mut self, node: Node<'_>) -> Expr {
        match node.kind() {
            "identifier" => Expr::Var(self.ctx.text(node).to_string()),
            "selector_expression" => {
                let (Some(operand), Some(field)) =
                    (child_by_field(node, "operand"), child_by_field(node, "field"))
                else {
                    return Expr::Unknown;
                };
                if self.import_of(operand).is_some() {
                    return Expr::Unknown;
                }
                let base = self.expr(operand);
                Expr::Field(Box::new(base), self.ctx.text(field).to_string())
            }
            "composite_literal" => child_by_field(node, "type")
                .and_then(|t| self.ctx.type_ref(t))
                .map_or(Expr::Unknown, Expr::Alloc),
            "unary_expression" => {
                let addr_or_deref = child_by_field(node, "operator")
                    .is_some_and(|o| matches!(self.ctx.text(o), "&" | "*"));
                match child_by_field(node, "operand") {
                    Some(operand) if addr_or_deref => self.expr(operand),
                    _ => Expr::Unknown,
                }
            }
            "parenthesized_expression" => match named_children(node).into_iter().next() {
                Some(inner) => self.expr(inner),
                None => Expr::Unknown,
            },
            "call_expression" => match self.new_type(node) {
                Some(ty) => Expr::Alloc(ty),
                None => Expr::Result(self.call(node)),
            },
            "type_assertion_expression" => {
                let operand = child_by_field(node, "operand").map(|o| self.expr(o));
                let ty = child_by_field(node, "type").and_then(|t| self.ctx.type_ref(t));
                match (operand, ty) {
                    (Some(operand), Some(ty)) => Expr::Assert(Box::new(operand), ty),
                    _ => Expr::Unknown,
                }
            }
            _ => Expr::Unknown,
        }
    }
}

/// Composite literal keys and values are wrapped in `literal_element`.
fn unwrap_element(node: Node<'_>) -> Node<'_> {
    if node.kind() == "literal_element" {
        if let Some(inner) = named_children(node).into_iter().next() {
            return inner;
        }
    }
    node
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::parse_go;

    fn facts(src: &str) -> FileFacts {
        let tree = parse_go(src, "x.go").unwrap();
        extract_file(&tree, src, "svc/x.go", "example.com/app/svc")
    }

    #[test]
    fn import_names() {
        assert_eq!(default_import_name("github.com/x/yaml/v3"), "yaml");
        assert_eq!(default_import_name("net/http"), "http");
        assert_eq!(default_import_name("fmt"), "fmt");
        assert_eq!(default_import_name("example.com/v2"), "example.com");
    }

    #[test]
    fn struct_and_interface_shapes() {
        let f = facts(
            "package svc

import \"example.com/app/store\"

type Repo interface {
\tSave(id string) error
\tstore.Closer
}

type Server struct {
\tBase
\trepo Repo
\tdb   *store.DB
}
",
        );
        assert_eq!(f.package_name, "svc");
        assert_eq!(f.types.len(), 2);

        let TypeShape::Interface { methods, embedded } = &f.types[0].shape else {
            panic!("expected interface");
        };
        assert_eq!(methods, &["Save"]);
        assert_eq!(embedded, &[TypeRef::new("example.com/app/store", "Closer")]);

        let TypeShape::Struct { fields, embedded } = &f.types[1].shape else {
            panic!("expected struct");
        };
        assert_eq!(embedded, &[TypeRef::new("example.com/app/svc", "Base")]);
        assert_eq!(
            fields,
            &[
                ("repo".to_string(), TypeRef::new("example.com/app/svc", "Repo")),
                ("db".to_string(), TypeRef::new("example.com/app/store", "DB")),
            ]
        );
    }

    #[test]
    fn call_sites_are_classified() {
        let f = facts(
            "package svc

import \"example.com/app/store\"

func (s *Server) Handle(r Repo) error {
\thelper()
\tdb := store.Open()
\tdb.Query()
\tr.Save(\"x\")
\ts.repo.Save(\"y\")
\treturn nil
}
",
        );
        let func = &f.functions[0];
        assert_eq!(func.name, "Handle");
        let recv = func.receiver.as_ref().unwrap();
        assert_eq!((recv.var.as_deref(), recv.type_name.as_str(), recv.pointer), (Some("s"), "Server", true));

        let calls = &func.body.calls;
        assert_eq!(calls.len(), 5);
        assert!(matches!(&calls[0].callee, Callee::Ident(n) if n == "helper"));
        assert!(matches!(
            &calls[1].callee,
            Callee::Qualified { package, name } if package == "example.com/app/store" && name == "Open"
        ));
        assert!(matches!(
            &calls[2].callee,
            Callee::Method { receiver: Expr::Var(v), method } if v == "db" && method == "Query"
        ));
        assert!(matches!(
            &calls[4].callee,
            Callee::Method { receiver: Expr::Field(base, field), .. }
                if field == "repo" && matches!(base.as_ref(), Expr::Var(v) if v == "s")
        ));
        assert_eq!(calls[0].line, 6);
        assert_eq!(calls[4].line, 10);

        let (name, value) = &func.body.assigns[0];
        assert_eq!(name, "db");
        assert!(matches!(value, Expr::Result(1)));
    }

    #[test]
    fn allocations_and_field_inits() {
        let f = facts(
            "package svc

func NewServer(r Repo) *Server {
\tcfg := new(Config)
\t_ = cfg
\treturn &Server{repo: r}
}
",
        );
        let body = &f.functions[0].body;
        assert_eq!(
            body.allocs,
            [
                TypeRef::new("example.com/app/svc", "Config"),
                TypeRef::new("example.com/app/svc", "Server"),
            ]
        );
        assert_eq!(body.field_inits.len(), 1);
        let (ty, field, value) = &body.field_inits[0];
        assert_eq!(ty.name, "Server");
        assert_eq!(field, "repo");
        assert!(matches!(value, Expr::Var(v) if v == "r"));
        assert!(matches!(&body.returns[0], Expr::Alloc(t) if t.name == "Server"));
        assert_eq!(f.functions[0].result, Some(TypeRef::new("example.com/app/svc", "Server")));
    }

    #[test]
    fn closures_attribute_calls_to_enclosing_function() {
        let f = facts(
            "package svc

func Run() {
\tgo func() {
\t\twork()
\t}()
}
",
        );
        assert_eq!(f.functions.len(), 1);
        let calls = &f.functions[0].body.calls;
        assert!(calls.iter().any(|c| matches!(&c.callee, Callee::Ident(n) if n == "work")));
    }

    #[test]
    fn local_shadowing_an_import_is_a_value() {
        let f = facts(
            "package svc

import \"example.com/app/store\"

func Use(store Repo) {
\tstore.Save(\"x\")
}
",
        );
        let call = &f.functions[0].body.calls[0];
        assert!(matches!(&call.callee, Callee::Method { method, .. } if method == "Save"));
    }
}
