//! Sources Notion databases and pages into a content graph.
//!
//! A sync pass fetches the configured databases and pages, renders page
//! content to markdown, normalizes everything into linked nodes and
//! reconciles them against the snapshot of the previous pass.

pub mod config;
pub mod db;
pub mod error;
pub mod graph;
pub mod markdown;
pub mod model;
pub mod node;
pub mod notion;
pub mod property;
pub mod reconcile;
pub mod sync;

pub use error::SyncError;
pub use reconcile::{NodeManager, SyncReport};
