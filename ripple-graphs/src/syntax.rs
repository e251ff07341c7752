use tree_sitter::{Language, Node, Parser, Tree};

use crate::{GraphError, Result};

pub fn go_language() -> Language {
    tree_sitter_go::LANGUAGE.into()
}

/// Parse one Go source file. Recoverable syntax errors still yield a tree;
/// use [`first_error_line`] to reject those where precision matters.
pub fn parse_go(source: &str, path: &str) -> Result<Tree> {
    let mut parser = Parser::new();
    parser
        .set_language(&go_language())
        .map_err(|e| GraphError::TreeSitter(e.to_string()))?;
    parser.parse(source, None).ok_or_else(|| GraphError::Parse {
        path: path.to_string(),
        message: "parser returned no tree".to_string(),
    })
}

/// Line (1-based) of the first ERROR or MISSING node, if any.
pub fn first_error_line(tree: &Tree) -> Option<u32> {
    let root = tree.root_node();
    if !root.has_error() {
        return None;
    }
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            return Some(start_line(node));
        }
        if node.has_error() {
            let mut cursor = node.walk();
            let children: Vec<_> = node.children(&mut cursor).collect();
            stack.extend(children.into_iter().rev());
        }
    }
    Some(start_line(root))
}

/// Extract the source text for a tree-sitter node.
pub fn node_text<'a>(node: Node<'_>, source: &'a str) -> &'a str {
    &source[node.byte_range()]
}

/// Find a child by field name.
pub fn child_by_field<'a>(node: Node<'a>, field: &str) -> Option<Node<'a>> {
    node.child_by_field_name(field)
}

pub fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

/// All children stored under a repeated field (e.g. `name` in `a, b int`).
pub fn children_by_field<'a>(node: Node<'a>, field: &str) -> Vec<Node<'a>> {
    let mut cursor = node.walk();
    node.children_by_field_name(field, &mut cursor).collect()
}

pub fn start_line(node: Node<'_>) -> u32 {
    u32::try_from(node.start_position().row + 1).unwrap_or(u32::MAX)
}

pub fn end_line(node: Node<'_>) -> u32 {
    u32::try_from(node.end_position().row + 1).unwrap_or(u32::MAX)
}

/// Package name from the `package` clause.
pub fn package_name(root: Node<'_>, source: &str) -> Option<String> {
    named_children(root)
        .into_iter()
        .find(|n| n.kind() == "package_clause")
        .and_then(|clause| {
            named_children(clause)
                .into_iter()
                .find(|n| n.kind() == "package_identifier")
        })
        .map(|n| node_text(n, source).to_string())
}

/// Receiver type of a method declaration: `(name, type, pointer)`.
///
/// Type parameters on generic receivers (`*List[T]`) are dropped.
pub fn method_receiver(decl: Node<'_>, source: &str) -> Option<(Option<String>, String, bool)> {
    let params = child_by_field(decl, "receiver")?;
    let param = named_children(params)
        .into_iter()
        .find(|n| n.kind() == "parameter_declaration")?;
    let var = child_by_field(param, "name").map(|n| node_text(n, source).to_string());
    let mut ty = child_by_field(param, "type")?;
    let mut pointer = false;
    loop {
        match ty.kind() {
            "pointer_type" => {
                pointer = true;
                ty = named_children(ty).into_iter().next()?;
            }
            "parenthesized_type" => ty = named_children(ty).into_iter().next()?,
            "generic_type" => ty = child_by_field(ty, "type")?,
            _ => break,
        }
    }
    let name = node_text(ty, source).trim_start_matches('*').to_string();
    Some((var, name, pointer))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_package_and_receiver() {
        let src = "package store\n\nfunc (r *Repo) Save() {}\n";
        let tree = parse_go(src, "repo.go").unwrap();
        let root = tree.root_node();
        assert_eq!(package_name(root, src).as_deref(), Some("store"));

        let decl = named_children(root)
            .into_iter()
            .find(|n| n.kind() == "method_declaration")
            .unwrap();
        let (var, ty, pointer) = method_receiver(decl, src).unwrap();
        assert_eq!(var.as_deref(), Some("r"));
        assert_eq!(ty, "Repo");
        assert!(pointer);
    }

    #[test]
    fn generic_receiver_drops_type_params() {
        let src = "package list\n\nfunc (l List[T]) Len() int { return 0 }\n";
        let tree = parse_go(src, "list.go").unwrap();
        let decl = named_children(tree.root_node())
            .into_iter()
            .find(|n| n.kind() == "method_declaration")
            .unwrap();
        let (_, ty, pointer) = method_receiver(decl, src).unwrap();
        assert_eq!(ty, "List");
        assert!(!pointer);
    }

    #[test]
    fn reports_syntax_errors() {
        let clean = parse_go("package a\n\nfunc A() {}\n", "a.go").unwrap();
        assert_eq!(first_error_line(&clean), None);

        let broken = parse_go("package a\n\nfunc A( {\n", "a.go").unwrap();
        assert!(first_error_line(&broken).is_some());
    }
}
