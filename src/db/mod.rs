//! Database module: SQLite persistence for snapshots, cached responses and
//! published nodes.
//!
//! - `model`: row structs returned by repositories.
//! - `repo`: SQL-only functions.
//! - `store`: adapters implementing the reconcile and cache traits.

pub mod model;
pub mod repo;
pub mod store;

pub use model::StoredNode;
pub use repo::*;
pub use store::{SqliteGraphStore, SqliteResponseCache, SqliteSnapshotStore, NODE_GRAPH_KEY};
