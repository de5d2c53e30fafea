//! One sync pass: fetch the configured databases and pages, then reconcile
//! the content graph with them.
use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::model::{Document, Entity};
use crate::notion::NotionSource;
use crate::reconcile::{NodeManager, SyncReport};

/// Ids to sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncTargets {
    pub databases: Vec<String>,
    pub pages: Vec<String>,
}

/// Fetch every target and flatten database entries into the top-level
/// entity list. Collections come first, then documents.
#[instrument(skip_all, fields(databases = targets.databases.len(), pages = targets.pages.len()))]
pub async fn fetch_entities(targets: &SyncTargets, source: &dyn NotionSource) -> Result<Vec<Entity>> {
    let mut collections = Vec::with_capacity(targets.databases.len());
    let mut documents: Vec<Document> = Vec::new();

    for id in &targets.databases {
        let mut collection = source
            .fetch_collection(id)
            .await
            .with_context(|| format!("failed to fetch database {id}"))?;
        let entries = source
            .fetch_collection_entries(id)
            .await
            .with_context(|| format!("failed to fetch entries of database {id}"))?;
        for entry in entries {
            collection.pages.push(complete(source, entry).await?);
        }
        info!(database = %id, pages = collection.pages.len(), "fetched database");
        collections.push(collection);
    }

    for id in &targets.pages {
        let page = source
            .fetch_document(id)
            .await
            .with_context(|| format!("failed to fetch page {id}"))?;
        documents.push(complete(source, page).await?);
    }

    for collection in &mut collections {
        documents.append(&mut collection.pages);
    }

    let mut entities: Vec<Entity> = collections.into_iter().map(Entity::from).collect();
    entities.extend(documents.into_iter().map(Entity::from));
    Ok(entities)
}

async fn complete(source: &dyn NotionSource, document: Document) -> Result<Document> {
    let id = document.id.clone();
    source
        .complete_document(document)
        .await
        .with_context(|| format!("failed to load content of page {id}"))
}

/// Run one full sync pass.
pub async fn run(
    targets: &SyncTargets,
    source: &dyn NotionSource,
    manager: &NodeManager<'_>,
) -> Result<SyncReport> {
    let entities = fetch_entities(targets, source).await?;
    let report = manager.update(entities).await?;
    info!(
        added = report.added,
        updated = report.updated,
        removed = report.removed,
        unchanged = report.unchanged,
        recreated = report.recreated,
        "sync finished"
    );
    Ok(report)
}
