//! Row models returned by repositories.

/// A published node as stored in the `nodes` table.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct StoredNode {
    pub id: String,
    pub node_type: String,
    /// Node serialized as JSON.
    pub body: String,
    pub content_digest: String,
    pub touched_at: String,
}
