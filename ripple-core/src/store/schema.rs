/// Current snapshot schema version.
pub const SCHEMA_VERSION: &str = "1";

/// Schema of one per-commit call graph database.
pub const SCHEMA_SQL: &str = r"
-- Snapshot metadata: commit, algorithm, module_path, created_at
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Functions and methods; ids are local to this file
CREATE TABLE IF NOT EXISTS func_nodes (
    id INTEGER PRIMARY KEY,
    full_name TEXT NOT NULL,
    canonical_name TEXT NOT NULL,
    package TEXT NOT NULL,
    func_name TEXT NOT NULL,
    file_path TEXT NOT NULL,
    line_start INTEGER NOT NULL,
    line_end INTEGER NOT NULL,
    is_exported INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_func_nodes_package ON func_nodes(package);
CREATE INDEX IF NOT EXISTS idx_func_nodes_file ON func_nodes(file_path);
CREATE INDEX IF NOT EXISTS idx_func_nodes_full_name ON func_nodes(full_name);
CREATE INDEX IF NOT EXISTS idx_func_nodes_canonical ON func_nodes(canonical_name);
CREATE INDEX IF NOT EXISTS idx_func_nodes_func_name ON func_nodes(func_name);

-- One row per call site; repeated caller/callee pairs are kept
CREATE TABLE IF NOT EXISTS func_edges (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    caller_id INTEGER NOT NULL REFERENCES func_nodes(id),
    callee_id INTEGER NOT NULL REFERENCES func_nodes(id),
    call_site_file TEXT NOT NULL,
    call_site_line INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_func_edges_caller ON func_edges(caller_id);
CREATE INDEX IF NOT EXISTS idx_func_edges_callee ON func_edges(callee_id);
";

/// Metadata keys written with every snapshot.
pub const META_COMMIT: &str = "commit";
pub const META_ALGORITHM: &str = "algorithm";
pub const META_MODULE_PATH: &str = "module_path";
pub const META_CREATED_AT: &str = "created_at";
pub const META_SCHEMA_VERSION: &str = "schema_version";
