//! Errors raised while turning Notion entities into graph nodes.
//!
//! These are programmer-level failures: data that the pipeline has no
//! mapping for. Transport and storage failures stay in `anyhow` with
//! context attached at the boundary.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("unknown parent type on {entity}")]
    UnknownParentKind { entity: String },
    #[error("unable to process {kind} entity {id}")]
    UnknownEntityKind { id: String, kind: String },
    #[error("unsupported property type {kind} on {id}")]
    UnsupportedProperty { id: String, kind: String },
    #[error("unknown file type on {id}")]
    UnknownFileKind { id: String },
    #[error("failed to encode {id}: {source}")]
    Encode {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}
