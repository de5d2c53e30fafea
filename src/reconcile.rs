//! Diffing of node graphs between runs and application of the resulting
//! mutations to the content graph.
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::{stream, StreamExt};
use std::collections::BTreeMap;
use std::future::Future;
use tracing::{error, info, instrument, warn};

use crate::error::SyncError;
use crate::graph;
use crate::model::Entity;
use crate::node::{Node, NodeRef};

/// Nodes of one run keyed by `"{kind}:{id}"`.
pub type Snapshot = BTreeMap<String, Node>;

pub const DEFAULT_MUTATION_CONCURRENCY: usize = 8;

/// Mutations the reconciler issues against the content graph.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn create_or_update_node(&self, node: &Node) -> Result<()>;
    async fn delete_node(&self, node: &Node) -> Result<()>;
    async fn touch_node(&self, node: &NodeRef) -> Result<()>;
    async fn node_exists(&self, id: &str) -> Result<bool>;
}

/// Persistence for the node graph of the last successful run.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn load(&self) -> Result<Option<Snapshot>>;
    async fn save(&self, snapshot: &Snapshot) -> Result<()>;
}

/// Anything carrying a content digest can be diffed.
pub trait Fingerprinted {
    fn content_digest(&self) -> &str;
}

impl Fingerprinted for Node {
    fn content_digest(&self) -> &str {
        Node::content_digest(self)
    }
}

#[derive(Debug, PartialEq)]
pub struct ChangeSet<'a, T> {
    pub added: Vec<&'a T>,
    pub updated: Vec<&'a T>,
    pub removed: Vec<&'a T>,
    pub unchanged: Vec<&'a T>,
}

impl<T> ChangeSet<'_, T> {
    pub fn total(&self) -> usize {
        self.added.len() + self.updated.len() + self.removed.len() + self.unchanged.len()
    }
}

/// Classify every key of `previous` and `current`. Updated and unchanged
/// carry the current value, removed carries the previous one.
pub fn compute_changes<'a, T: Fingerprinted>(
    previous: &'a BTreeMap<String, T>,
    current: &'a BTreeMap<String, T>,
) -> ChangeSet<'a, T> {
    let mut changes = ChangeSet {
        added: Vec::new(),
        updated: Vec::new(),
        removed: Vec::new(),
        unchanged: Vec::new(),
    };
    for (key, node) in current {
        match previous.get(key) {
            None => changes.added.push(node),
            Some(old) if old.content_digest() != node.content_digest() => {
                changes.updated.push(node)
            }
            Some(_) => changes.unchanged.push(node),
        }
    }
    for (key, node) in previous {
        if !current.contains_key(key) {
            changes.removed.push(node);
        }
    }
    changes
}

/// Build the node graph for a set of entities.
pub fn compute_node_graph(entities: Vec<Entity>) -> Result<Snapshot, SyncError> {
    let normalized = graph::normalize(entities)?;
    normalized
        .iter()
        .map(|(key, entity)| Ok((key.clone(), Node::from_normalized(entity)?)))
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub unchanged: usize,
    pub recreated: usize,
}

enum Kept {
    Touched,
    Recreated,
}

pub struct NodeManager<'a> {
    graph: &'a dyn GraphStore,
    snapshots: &'a dyn SnapshotStore,
    concurrency: usize,
}

impl<'a> NodeManager<'a> {
    pub fn new(graph: &'a dyn GraphStore, snapshots: &'a dyn SnapshotStore) -> Self {
        Self {
            graph,
            snapshots,
            concurrency: DEFAULT_MUTATION_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Reconcile the content graph with `entities` and persist the new
    /// snapshot. The snapshot is only written once every mutation settled
    /// without error.
    #[instrument(skip_all, fields(entities = entities.len()))]
    pub async fn update(&self, entities: Vec<Entity>) -> Result<SyncReport> {
        let current = compute_node_graph(entities)?;
        let previous = self.load_previous().await;
        let changes = compute_changes(&previous, &current);

        let report = self.apply(&changes).await?;

        self.snapshots
            .save(&current)
            .await
            .context("failed to persist node graph snapshot")?;
        Ok(report)
    }

    async fn load_previous(&self) -> Snapshot {
        match self.snapshots.load().await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => Snapshot::new(),
            Err(err) => {
                warn!(?err, "node graph snapshot unavailable, starting from empty");
                Snapshot::new()
            }
        }
    }

    async fn apply(&self, changes: &ChangeSet<'_, Node>) -> Result<SyncReport> {
        let graph = self.graph;
        let mut failures = Vec::new();

        let (created, errs) = self
            .settle(&changes.added, |n| graph.create_or_update_node(n))
            .await;
        failures.extend(errs);
        if created > 0 {
            info!(count = created, "added {} nodes", created);
        }

        let (updated, errs) = self
            .settle(&changes.updated, |n| graph.create_or_update_node(n))
            .await;
        failures.extend(errs);
        if updated > 0 {
            info!(count = updated, "updated {} nodes", updated);
        }

        let (removed, errs) = self.settle(&changes.removed, |n| graph.delete_node(n)).await;
        failures.extend(errs);
        if removed > 0 {
            info!(count = removed, "removed {} nodes", removed);
        }

        let mut recreated = 0;
        let mut kept = 0;
        let outcomes: Vec<Result<Kept>> = stream::iter(changes.unchanged.iter().copied())
            .map(|node| keep(graph, node))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        for outcome in outcomes {
            match outcome {
                Ok(Kept::Touched) => kept += 1,
                Ok(Kept::Recreated) => {
                    kept += 1;
                    recreated += 1;
                }
                Err(err) => failures.push(err),
            }
        }
        info!(count = kept, "keeping {} nodes", kept);
        if recreated > 0 {
            warn!(count = recreated, "recreated {} evicted nodes", recreated);
        }

        if let Some(first) = failures.first() {
            for err in &failures {
                error!(?err, "node mutation failed");
            }
            return Err(anyhow!(
                "{} of {} node mutations failed, snapshot not saved: {:#}",
                failures.len(),
                changes.total(),
                first
            ));
        }

        Ok(SyncReport {
            added: changes.added.len(),
            updated: changes.updated.len(),
            removed: changes.removed.len(),
            unchanged: changes.unchanged.len(),
            recreated,
        })
    }

    /// Run `op` for every node with bounded concurrency and wait for all of
    /// them. Returns the success count and the failures.
    async fn settle<'n, F, Fut>(&self, nodes: &[&'n Node], op: F) -> (usize, Vec<anyhow::Error>)
    where
        F: Fn(&'n Node) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let results: Vec<Result<()>> = stream::iter(nodes.iter().copied())
            .map(op)
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        let mut ok = 0;
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(()) => ok += 1,
                Err(err) => failures.push(err),
            }
        }
        (ok, failures)
    }
}

/// Touch a node that is still in the graph, recreate it when it was evicted.
async fn keep(graph: &dyn GraphStore, node: &Node) -> Result<Kept> {
    if graph.node_exists(&node.id).await? {
        graph.touch_node(&node.touch_ref()).await?;
        Ok(Kept::Touched)
    } else {
        warn!(node = %node.id, reference = %node.reference, "node missing from graph, recreating");
        graph.create_or_update_node(node).await?;
        Ok(Kept::Recreated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::fixtures::*;
    use crate::model::ParentRef;

    #[derive(Debug, PartialEq)]
    struct Item(&'static str);

    impl Fingerprinted for Item {
        fn content_digest(&self) -> &str {
            self.0
        }
    }

    fn map(items: &[(&str, &'static str)]) -> BTreeMap<String, Item> {
        items.iter().map(|(k, d)| (k.to_string(), Item(*d))).collect()
    }

    #[test]
    fn classifies_every_key_once() {
        let previous = map(&[("a", "1"), ("b", "1"), ("c", "1")]);
        let current = map(&[("a", "1"), ("b", "2"), ("d", "1")]);
        let changes = compute_changes(&previous, &current);

        assert_eq!(changes.unchanged, vec![&Item("1")]);
        assert_eq!(changes.updated, vec![&Item("2")]);
        assert_eq!(changes.added, vec![&Item("1")]);
        assert_eq!(changes.removed, vec![&Item("1")]);
        assert_eq!(changes.total(), 4);
    }

    #[test]
    fn identical_graphs_are_all_unchanged() {
        let graph = compute_node_graph(vec![
            collection("db", ParentRef::Workspace),
            document("p1", in_db("db")),
        ])
        .unwrap();
        let again = compute_node_graph(vec![
            collection("db", ParentRef::Workspace),
            document("p1", in_db("db")),
        ])
        .unwrap();
        let changes = compute_changes(&graph, &again);
        assert_eq!(changes.unchanged.len(), 2);
        assert!(changes.added.is_empty() && changes.updated.is_empty() && changes.removed.is_empty());
    }

    #[test]
    fn empty_previous_means_everything_is_added() {
        let current = compute_node_graph(vec![document("p1", ParentRef::Workspace)]).unwrap();
        let empty = Snapshot::new();
        let changes = compute_changes(&empty, &current);
        assert_eq!(changes.added.len(), 1);
        assert_eq!(changes.total(), 1);
    }

    #[test]
    fn node_graph_propagates_parent_errors() {
        let err = compute_node_graph(vec![document("p1", ParentRef::Unsupported)]).unwrap_err();
        assert!(err.to_string().contains("page:p1"));
    }
}
