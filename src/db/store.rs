//! SQLite-backed implementations of the graph, snapshot and cache seams.
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use super::repo::{self, Pool};
use crate::node::{Node, NodeRef};
use crate::notion::ResponseCache;
use crate::reconcile::{GraphStore, Snapshot, SnapshotStore};

/// Key of the node graph snapshot.
pub const NODE_GRAPH_KEY: &str = "nodeGraph";

#[derive(Debug, Clone)]
pub struct SqliteSnapshotStore {
    pool: Pool,
    key: String,
}

impl SqliteSnapshotStore {
    pub fn new(pool: Pool) -> Self {
        Self::with_key(pool, NODE_GRAPH_KEY)
    }

    pub fn with_key(pool: Pool, key: impl Into<String>) -> Self {
        Self { pool, key: key.into() }
    }
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn load(&self) -> Result<Option<Snapshot>> {
        let Some(raw) = repo::get_snapshot(&self.pool, &self.key).await? else {
            return Ok(None);
        };
        let pairs: Vec<(String, Node)> =
            serde_json::from_str(&raw).context("invalid node graph snapshot")?;
        Ok(Some(pairs.into_iter().collect()))
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let pairs: Vec<(&String, &Node)> = snapshot.iter().collect();
        let raw = serde_json::to_string(&pairs).context("failed to encode node graph snapshot")?;
        repo::put_snapshot(&self.pool, &self.key, &raw).await
    }
}

/// Content graph kept in the `nodes` table.
#[derive(Debug, Clone)]
pub struct SqliteGraphStore {
    pool: Pool,
}

impl SqliteGraphStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    async fn create_or_update_node(&self, node: &Node) -> Result<()> {
        let body = serde_json::to_string(node).context("failed to encode node")?;
        repo::upsert_node(
            &self.pool,
            &node.id,
            node.internal.node_type.as_str(),
            &body,
            node.content_digest(),
        )
        .await
    }

    async fn delete_node(&self, node: &Node) -> Result<()> {
        if !repo::delete_node(&self.pool, &node.id).await? {
            debug!(node = %node.id, "delete of absent node");
        }
        Ok(())
    }

    async fn touch_node(&self, node: &NodeRef) -> Result<()> {
        if !repo::touch_node(&self.pool, &node.id).await? {
            debug!(node = %node.id, "touch of absent node");
        }
        Ok(())
    }

    async fn node_exists(&self, id: &str) -> Result<bool> {
        repo::node_exists(&self.pool, id).await
    }
}

/// Response cache in the `response_cache` table. A ttl of zero never expires.
#[derive(Debug, Clone)]
pub struct SqliteResponseCache {
    pool: Pool,
}

impl SqliteResponseCache {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResponseCache for SqliteResponseCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        repo::cache_get(&self.pool, key, Utc::now().timestamp()).await
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let expires_at = match ttl_secs {
            0 => None,
            ttl => Some(Utc::now().timestamp().saturating_add(ttl as i64)),
        };
        repo::cache_put(&self.pool, key, value, expires_at).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::fixtures::*;
    use crate::model::ParentRef;
    use crate::reconcile::compute_node_graph;

    async fn setup_pool() -> Pool {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        repo::run_migrations(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn snapshot_round_trips_as_pairs() {
        let pool = setup_pool().await;
        let store = SqliteSnapshotStore::new(pool.clone());
        assert_eq!(store.load().await.unwrap(), None);

        let snapshot = compute_node_graph(vec![
            collection("db", ParentRef::Workspace),
            document("p1", in_db("db")),
        ])
        .unwrap();
        store.save(&snapshot).await.unwrap();

        let raw = repo::get_snapshot(&pool, NODE_GRAPH_KEY).await.unwrap().unwrap();
        assert!(raw.starts_with("[[\"database:db\","));
        assert_eq!(store.load().await.unwrap(), Some(snapshot));
    }

    #[tokio::test]
    async fn corrupt_snapshot_is_an_error() {
        let pool = setup_pool().await;
        repo::put_snapshot(&pool, NODE_GRAPH_KEY, "not json").await.unwrap();
        let store = SqliteSnapshotStore::new(pool);
        assert!(store.load().await.is_err());
    }

    #[tokio::test]
    async fn graph_store_tracks_nodes() {
        let pool = setup_pool().await;
        let store = SqliteGraphStore::new(pool.clone());
        let snapshot = compute_node_graph(vec![document("p1", ParentRef::Workspace)]).unwrap();
        let node = &snapshot["page:p1"];

        assert!(!store.node_exists(&node.id).await.unwrap());
        store.create_or_update_node(node).await.unwrap();
        assert!(store.node_exists(&node.id).await.unwrap());
        store.touch_node(&node.touch_ref()).await.unwrap();

        let stored = repo::get_node(&pool, &node.id).await.unwrap().unwrap();
        assert_eq!(stored.node_type, "NotionPage");
        let decoded: Node = serde_json::from_str(&stored.body).unwrap();
        assert_eq!(&decoded, node);

        store.delete_node(node).await.unwrap();
        assert!(!store.node_exists(&node.id).await.unwrap());
    }

    #[tokio::test]
    async fn response_cache_ttl_zero_never_expires() {
        let pool = setup_pool().await;
        let cache = SqliteResponseCache::new(pool);
        cache.set("database:x", "{}", 0).await.unwrap();
        cache.set("page:y", "{}", 60).await.unwrap();
        assert_eq!(cache.get("database:x").await.unwrap().as_deref(), Some("{}"));
        assert_eq!(cache.get("page:y").await.unwrap().as_deref(), Some("{}"));
        assert_eq!(cache.get("missing").await.unwrap(), None);
    }
}
