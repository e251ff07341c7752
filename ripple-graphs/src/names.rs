//! Function naming: SSA-style full names and receiver-normalized forms.

/// `mod/pkg.F`, `(*mod/pkg.T).M` or `(mod/pkg.T).M`.
pub fn full_name(package: &str, receiver: Option<(&str, bool)>, name: &str) -> String {
    match receiver {
        Some((ty, true)) => format!("(*{package}.{ty}).{name}"),
        Some((ty, false)) => format!("({package}.{ty}).{name}"),
        None => format!("{package}.{name}"),
    }
}

/// Strip the receiver decoration: `(*pkg.T).M` and `(pkg.T).M` become
/// `pkg.T.M`. Anything else is returned unchanged.
pub fn canonical_name(full_name: &str) -> String {
    let Some(rest) = full_name.strip_prefix('(') else {
        return full_name.to_string();
    };
    let rest = rest.strip_prefix('*').unwrap_or(rest);
    match rest.split_once(").") {
        Some((recv, method)) => format!("{recv}.{method}"),
        None => full_name.to_string(),
    }
}

/// Go exports identifiers that start with an uppercase letter.
pub fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

/// Short, human-facing name: last package segment plus function name.
pub fn display_name(package: &str, func_name: &str) -> String {
    let short = package.rsplit('/').next().unwrap_or(package);
    format!("{short}.{func_name}")
}
