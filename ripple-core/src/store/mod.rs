//! Call graph persistence: per-project history plus one `SQLite` snapshot
//! per analyzed commit.

mod graph_store;
pub mod schema;
pub mod snapshot;

pub use graph_store::{
    CallGraphStore, HistoryEntry, LatestPointer, NewSnapshot, ProjectMeta, identify,
    normalize_remote_url, partition_retained, project_id,
};
pub use snapshot::{CallGraphQueries, CallSite, DEFAULT_SEARCH_LIMIT, Reached, SnapshotDb};
