//! Declared-function line spans for a single syntax tree.

use serde::{Deserialize, Serialize};
use tree_sitter::Tree;

use crate::syntax::{child_by_field, end_line, method_receiver, named_children, node_text, start_line};

/// A function or method declaration and the lines it covers (inclusive).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSpan {
    /// `package.Name` or `package.Recv.Name`, matching canonical node names.
    pub qualified_name: String,
    pub name: String,
    pub receiver: Option<String>,
    pub start_line: u32,
    pub end_line: u32,
}

impl FunctionSpan {
    pub fn overlaps(&self, start: u32, end: u32) -> bool {
        end >= self.start_line && start <= self.end_line
    }
}

/// Collect every top-level function and method declaration in `tree`.
///
/// Pure: no I/O, results depend only on the tree, the source text and the
/// package import path used as qualifier.
pub fn function_spans(tree: &Tree, source: &str, package_path: &str) -> Vec<FunctionSpan> {
    let mut spans = Vec::new();
    for decl in named_children(tree.root_node()) {
        let receiver = match decl.kind() {
            "function_declaration" => None,
            "method_declaration" => method_receiver(decl, source).map(|(_, ty, _)| ty),
            _ => continue,
        };
        let Some(name_node) = child_by_field(decl, "name") else {
            continue;
        };
        let name = node_text(name_node, source).to_string();
        let qualified_name = match &receiver {
            Some(recv) => format!("{package_path}.{recv}.{name}"),
            None => format!("{package_path}.{name}"),
        };
        spans.push(FunctionSpan {
            qualified_name,
            name,
            receiver,
            start_line: start_line(decl),
            end_line: end_line(decl),
        });
    }
    spans
}
