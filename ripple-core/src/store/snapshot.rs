use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ripple_graphs::{FuncEdge, FuncNode};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RippleError, StoreError};

use super::schema;

/// Default cap on `search_functions` results.
pub const DEFAULT_SEARCH_LIMIT: usize = 20;

const NODE_COLUMNS: &str = "n.id, n.full_name, n.canonical_name, n.package, n.func_name, \
                            n.file_path, n.line_start, n.line_end, n.is_exported";

/// A neighbouring function together with the call site linking it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    pub node: FuncNode,
    pub file: String,
    pub line: u32,
}

/// A function reached by a bounded traversal, at its minimum depth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reached {
    pub node: FuncNode,
    pub depth: u32,
    pub call_site_file: String,
    pub call_site_line: u32,
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Callers,
    Callees,
}

/// Point queries over one call graph snapshot.
///
/// Every method runs SQL against the snapshot file; nothing loads the
/// whole graph into memory.
#[async_trait::async_trait]
pub trait CallGraphQueries: Send + Sync {
    /// Read a metadata value (`commit`, `algorithm`, `module_path`, ...).
    async fn metadata(&self, key: &str) -> crate::error::Result<Option<String>>;

    async fn func_count(&self) -> crate::error::Result<usize>;

    async fn edge_count(&self) -> crate::error::Result<usize>;

    async fn node(&self, id: i64) -> crate::error::Result<Option<FuncNode>>;

    /// Nodes whose full or canonical name is in `names`, in id order.
    async fn nodes_by_names(&self, names: &[String]) -> crate::error::Result<Vec<FuncNode>>;

    /// Direct callers, one entry per call site.
    async fn callers_of(&self, id: i64) -> crate::error::Result<Vec<CallSite>>;

    /// Direct callees, one entry per call site.
    async fn callees_of(&self, id: i64) -> crate::error::Result<Vec<CallSite>>;

    /// Transitive callers up to `max_depth`, ordered by depth then name.
    async fn callers_with_depth(&self, id: i64, max_depth: u32) -> crate::error::Result<Vec<Reached>>;

    /// Transitive callees up to `max_depth`, ordered by depth then name.
    async fn callees_with_depth(&self, id: i64, max_depth: u32) -> crate::error::Result<Vec<Reached>>;

    /// Innermost function whose span covers `file:line`.
    async fn function_at(&self, file: &str, line: u32) -> crate::error::Result<Option<FuncNode>>;

    /// Look up functions by `file:line`, file path, exact name,
    /// `pkg.Func`, or a fuzzy name match, in that order.
    async fn search_functions(&self, query: &str, limit: usize) -> crate::error::Result<Vec<FuncNode>>;
}

/// One per-commit `SQLite` call graph file.
#[derive(Debug)]
pub struct SnapshotDb {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

fn sql<T>(result: rusqlite::Result<T>) -> crate::error::Result<T> {
    result.map_err(|e| StoreError::Sqlite(e).into())
}

fn row_to_node(row: &Row<'_>) -> rusqlite::Result<FuncNode> {
    Ok(FuncNode {
        id: row.get(0)?,
        full_name: row.get(1)?,
        canonical_name: row.get(2)?,
        package: row.get(3)?,
        func_name: row.get(4)?,
        file_path: row.get(5)?,
        line_start: row.get(6)?,
        line_end: row.get(7)?,
        is_exported: row.get(8)?,
    })
}

fn count(conn: &Connection, table: &str) -> rusqlite::Result<usize> {
    let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))?;
    Ok(usize::try_from(n).unwrap_or(0))
}

impl SnapshotDb {
    /// Open (or create) a snapshot file.
    pub fn open(path: &Path) -> crate::error::Result<Self> {
        let conn = Connection::open(path).map_err(StoreError::Sqlite)?;
        let db = Self {
            conn: Mutex::new(conn),
            db_path: Some(path.to_path_buf()),
        };
        db.initialize()?;
        Ok(db)
    }

    /// Open a snapshot that must already exist.
    pub fn open_existing(path: &Path) -> crate::error::Result<Self> {
        if !path.is_file() {
            return Err(RippleError::NotFound(format!(
                "call graph data file {}",
                path.display()
            )));
        }
        Self::open(path)
    }

    /// Create an in-memory snapshot (for testing).
    pub fn in_memory() -> crate::error::Result<Self> {
        let conn = Connection::open_in_memory().map_err(StoreError::Sqlite)?;
        let db = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };
        db.initialize()?;
        Ok(db)
    }

    fn initialize(&self) -> crate::error::Result<()> {
        let conn = self.conn.lock().expect("snapshot mutex poisoned");
        conn.execute_batch(
            "PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )
        .map_err(StoreError::Sqlite)?;
        // Silently ignored for in-memory databases.
        let _ = conn.execute_batch("PRAGMA journal_mode = WAL;");

        conn.execute_batch(schema::SCHEMA_SQL)
            .map_err(StoreError::Sqlite)?;
        conn.execute(
            "INSERT OR IGNORE INTO metadata (key, value) VALUES (?1, ?2)",
            params![schema::META_SCHEMA_VERSION, schema::SCHEMA_VERSION],
        )
        .map_err(StoreError::Sqlite)?;
        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    // ── Writes ─────────────────────────────────────────────────────

    /// Insert nodes in one transaction, keeping their ids.
    pub fn write_nodes(&self, nodes: &[FuncNode]) -> crate::error::Result<()> {
        let mut conn = self.conn.lock().expect("snapshot mutex poisoned");
        let tx = conn.transaction().map_err(StoreError::Sqlite)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO func_nodes (id, full_name, canonical_name, package, func_name,
                         file_path, line_start, line_end, is_exported)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                )
                .map_err(StoreError::Sqlite)?;
            for n in nodes {
                stmt.execute(params![
                    n.id,
                    n.full_name,
                    n.canonical_name,
                    n.package,
                    n.func_name,
                    n.file_path,
                    n.line_start,
                    n.line_end,
                    n.is_exported,
                ])
                .map_err(StoreError::Sqlite)?;
            }
        }
        tx.commit().map_err(StoreError::Sqlite)?;
        debug!(count = nodes.len(), "Wrote function nodes");
        Ok(())
    }

    /// Insert edges in one transaction. Repeated pairs stay separate rows.
    pub fn write_edges(&self, edges: &[FuncEdge]) -> crate::error::Result<()> {
        let mut conn = self.conn.lock().expect("snapshot mutex poisoned");
        let tx = conn.transaction().map_err(StoreError::Sqlite)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO func_edges (caller_id, callee_id, call_site_file, call_site_line)
                     VALUES (?1, ?2, ?3, ?4)",
                )
                .map_err(StoreError::Sqlite)?;
            for e in edges {
                stmt.execute(params![e.caller_id, e.callee_id, e.call_site_file, e.call_site_line])
                    .map_err(StoreError::Sqlite)?;
            }
        }
        tx.commit().map_err(StoreError::Sqlite)?;
        debug!(count = edges.len(), "Wrote call edges");
        Ok(())
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> crate::error::Result<()> {
        let conn = self.conn.lock().expect("snapshot mutex poisoned");
        conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
            params![key, value],
        )
        .map_err(StoreError::Sqlite)?;
        Ok(())
    }

    // ── Traversal ──────────────────────────────────────────────────

    fn neighbours(conn: &Connection, id: i64, dir: Direction) -> rusqlite::Result<Vec<CallSite>> {
        let join = match dir {
            Direction::Callers => "e.caller_id WHERE e.callee_id = ?1",
            Direction::Callees => "e.callee_id WHERE e.caller_id = ?1",
        };
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {NODE_COLUMNS}, e.call_site_file, e.call_site_line
             FROM func_edges e JOIN func_nodes n ON n.id = {join}
             ORDER BY e.id"
        ))?;
        let rows = stmt.query_map(params![id], |row| {
            Ok(CallSite {
                node: row_to_node(row)?,
                file: row.get(9)?,
                line: row.get(10)?,
            })
        })?;
        rows.collect()
    }

    /// Breadth-first expansion recording each function's first (minimum)
    /// depth and the call site it was reached through. The start node is
    /// never reported, even on recursive cycles.
    fn traverse(
        conn: &Connection,
        start: i64,
        max_depth: u32,
        dir: Direction,
    ) -> rusqlite::Result<Vec<Reached>> {
        let mut seen: HashSet<i64> = HashSet::from([start]);
        let mut reached = Vec::new();
        let mut queue = VecDeque::from([(start, 0u32)]);
        while let Some((id, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            for site in Self::neighbours(conn, id, dir)? {
                if !seen.insert(site.node.id) {
                    continue;
                }
                queue.push_back((site.node.id, depth + 1));
                reached.push(Reached {
                    node: site.node,
                    depth: depth + 1,
                    call_site_file: site.file,
                    call_site_line: site.line,
                });
            }
        }
        reached.sort_by(|a, b| {
            a.depth
                .cmp(&b.depth)
                .then_with(|| a.node.full_name.cmp(&b.node.full_name))
        });
        Ok(reached)
    }

    fn query_nodes(
        conn: &Connection,
        clause: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> rusqlite::Result<Vec<FuncNode>> {
        let mut stmt = conn.prepare(&format!("SELECT {NODE_COLUMNS} FROM func_nodes n {clause}"))?;
        let rows = stmt.query_map(args, row_to_node)?;
        rows.collect()
    }

    fn search(conn: &Connection, query: &str, limit: usize) -> rusqlite::Result<Vec<FuncNode>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        // Matches a stored relative path by exact value or path suffix.
        let file_match = "(n.file_path = ?1 OR n.file_path LIKE '%/' || ?1)";

        if let Some((file, line)) = query.rsplit_once(':') {
            if let Ok(line) = line.trim().parse::<u32>() {
                let hits = Self::query_nodes(
                    conn,
                    &format!(
                        "WHERE {file_match} AND n.line_start <= ?2 AND n.line_end >= ?2
                         ORDER BY n.line_start DESC LIMIT ?3"
                    ),
                    &[&file, &line, &limit],
                )?;
                if !hits.is_empty() {
                    return Ok(hits);
                }
            }
        }

        if query.ends_with(".go") {
            let hits = Self::query_nodes(
                conn,
                &format!("WHERE {file_match} ORDER BY n.file_path, n.line_start LIMIT ?2"),
                &[&query, &limit],
            )?;
            if !hits.is_empty() {
                return Ok(hits);
            }
        }

        let hits = Self::query_nodes(
            conn,
            "WHERE n.full_name = ?1 OR n.canonical_name = ?1 ORDER BY n.id LIMIT ?2",
            &[&query, &limit],
        )?;
        if !hits.is_empty() {
            return Ok(hits);
        }

        // `pkg.Func` or `pkg.Type.Method`; the package ends at the first
        // dot after the last slash.
        let last_segment = query.rfind('/').map_or(0, |i| i + 1);
        if let Some(dot) = query[last_segment..].find('.') {
            let (package, func) = (&query[..last_segment + dot], &query[last_segment + dot + 1..]);
            let hits = Self::query_nodes(
                conn,
                "WHERE (n.package = ?1 OR n.package LIKE '%/' || ?1) AND n.func_name = ?2
                 ORDER BY n.package, n.id LIMIT ?3",
                &[&package, &func, &limit],
            )?;
            if !hits.is_empty() {
                return Ok(hits);
            }
        }

        let pattern = format!("%{query}%");
        Self::query_nodes(
            conn,
            "WHERE n.func_name LIKE ?1 ORDER BY n.is_exported DESC, n.func_name, n.id LIMIT ?2",
            &[&pattern, &limit],
        )
    }
}

#[async_trait::async_trait]
impl CallGraphQueries for SnapshotDb {
    async fn metadata(&self, key: &str) -> crate::error::Result<Option<String>> {
        let conn = self.conn.lock().expect("snapshot mutex poisoned");
        sql(conn
            .query_row("SELECT value FROM metadata WHERE key = ?1", params![key], |r| r.get(0))
            .optional())
    }

    async fn func_count(&self) -> crate::error::Result<usize> {
        let conn = self.conn.lock().expect("snapshot mutex poisoned");
        sql(count(&conn, "func_nodes"))
    }

    async fn edge_count(&self) -> crate::error::Result<usize> {
        let conn = self.conn.lock().expect("snapshot mutex poisoned");
        sql(count(&conn, "func_edges"))
    }

    async fn node(&self, id: i64) -> crate::error::Result<Option<FuncNode>> {
        let conn = self.conn.lock().expect("snapshot mutex poisoned");
        let nodes = sql(Self::query_nodes(&conn, "WHERE n.id = ?1", &[&id]))?;
        Ok(nodes.into_iter().next())
    }

    async fn nodes_by_names(&self, names: &[String]) -> crate::error::Result<Vec<FuncNode>> {
        let conn = self.conn.lock().expect("snapshot mutex poisoned");
        let mut found: HashMap<i64, FuncNode> = HashMap::new();
        for name in names {
            let hits = sql(Self::query_nodes(
                &conn,
                "WHERE n.full_name = ?1 OR n.canonical_name = ?1",
                &[name],
            ))?;
            for node in hits {
                found.entry(node.id).or_insert(node);
            }
        }
        let mut nodes: Vec<FuncNode> = found.into_values().collect();
        nodes.sort_by_key(|n| n.id);
        Ok(nodes)
    }

    async fn callers_of(&self, id: i64) -> crate::error::Result<Vec<CallSite>> {
        let conn = self.conn.lock().expect("snapshot mutex poisoned");
        sql(Self::neighbours(&conn, id, Direction::Callers))
    }

    async fn callees_of(&self, id: i64) -> crate::error::Result<Vec<CallSite>> {
        let conn = self.conn.lock().expect("snapshot mutex poisoned");
        sql(Self::neighbours(&conn, id, Direction::Callees))
    }

    async fn callers_with_depth(&self, id: i64, max_depth: u32) -> crate::error::Result<Vec<Reached>> {
        let conn = self.conn.lock().expect("snapshot mutex poisoned");
        sql(Self::traverse(&conn, id, max_depth, Direction::Callers))
    }

    async fn callees_with_depth(&self, id: i64, max_depth: u32) -> crate::error::Result<Vec<Reached>> {
        let conn = self.conn.lock().expect("snapshot mutex poisoned");
        sql(Self::traverse(&conn, id, max_depth, Direction::Callees))
    }

    async fn function_at(&self, file: &str, line: u32) -> crate::error::Result<Option<FuncNode>> {
        let conn = self.conn.lock().expect("snapshot mutex poisoned");
        let nodes = sql(Self::query_nodes(
            &conn,
            "WHERE (n.file_path = ?1 OR n.file_path LIKE '%/' || ?1)
               AND n.line_start <= ?2 AND n.line_end >= ?2
             ORDER BY n.line_start DESC LIMIT 1",
            &[&file, &line],
        ))?;
        Ok(nodes.into_iter().next())
    }

    async fn search_functions(&self, query: &str, limit: usize) -> crate::error::Result<Vec<FuncNode>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let limit = if limit == 0 { DEFAULT_SEARCH_LIMIT } else { limit };
        let conn = self.conn.lock().expect("snapshot mutex poisoned");
        sql(Self::search(&conn, query, limit))
    }
}
