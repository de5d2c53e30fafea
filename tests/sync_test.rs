use anyhow::{anyhow, Result};
use chrono::{TimeZone, Utc};
use notion_source::db::{self, SqliteGraphStore, SqliteSnapshotStore};
use notion_source::model::{
    Block, BlockContent, Collection, Document, Metadata, ParentRef, RichText,
};
use notion_source::node::Node;
use notion_source::notion::NotionSource;
use notion_source::reconcile::{NodeManager, SnapshotStore};
use notion_source::sync::{self, SyncTargets};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

async fn setup_pool() -> sqlx::SqlitePool {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

fn metadata(id: &str) -> Metadata {
    Metadata {
        url: format!("https://www.notion.so/{id}"),
        created_time: Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap(),
        last_edited_time: Utc.with_ymd_and_hms(2021, 1, 2, 0, 0, 0).unwrap(),
        cover_image: None,
        icon_emoji: None,
        icon_image: None,
    }
}

fn document(id: &str, parent: ParentRef) -> Document {
    Document {
        id: id.into(),
        parent,
        title: format!("Page {id}"),
        archived: false,
        metadata: metadata(id),
        properties: Default::default(),
        blocks: Vec::new(),
        markdown: String::new(),
    }
}

fn text_block(id: &str, content: fn(Vec<RichText>) -> BlockContent, text: &str) -> Block {
    Block::new(id, content(vec![RichText::plain(text)]))
}

#[derive(Clone, Default)]
struct RecordingNotion {
    collections: HashMap<String, Collection>,
    entries: HashMap<String, Vec<Document>>,
    pages: HashMap<String, Document>,
    blocks: Arc<Mutex<HashMap<String, Vec<Block>>>>,
    block_calls: Arc<Mutex<Vec<String>>>,
}

impl RecordingNotion {
    fn fixture() -> Self {
        let mut notion = RecordingNotion::default();
        notion.collections.insert(
            "db".into(),
            Collection {
                id: "db".into(),
                parent: ParentRef::Workspace,
                title: "Reading List".into(),
                archived: false,
                metadata: metadata("db"),
                pages: Vec::new(),
            },
        );
        let in_db = || ParentRef::DatabaseId { database_id: "db".into() };
        notion
            .entries
            .insert("db".into(), vec![document("e1", in_db()), document("e2", in_db())]);
        notion
            .pages
            .insert("solo".into(), document("solo", ParentRef::Workspace));

        let mut blocks = HashMap::new();
        let task = |id: &str, text: &str, checked: bool| {
            Block::new(
                id,
                BlockContent::ToDo { rich_text: vec![RichText::plain(text)], checked },
            )
        };
        let mut parent_task = task("t1", "a", true);
        parent_task.has_children = true;
        blocks.insert("e1".to_string(), vec![parent_task]);
        blocks.insert("t1".to_string(), vec![task("t2", "b", false)]);
        blocks.insert(
            "e2".to_string(),
            vec![text_block("h", |rich_text| BlockContent::Heading1 { rich_text }, "Notes")],
        );
        blocks.insert(
            "solo".to_string(),
            vec![
                text_block("l1", |rich_text| BlockContent::BulletedListItem { rich_text }, "one"),
                text_block("l2", |rich_text| BlockContent::BulletedListItem { rich_text }, "two"),
            ],
        );
        notion.blocks = Arc::new(Mutex::new(blocks));
        notion
    }

    async fn set_blocks(&self, id: &str, blocks: Vec<Block>) {
        self.blocks.lock().await.insert(id.to_string(), blocks);
    }
}

#[async_trait::async_trait]
impl NotionSource for RecordingNotion {
    async fn fetch_collection(&self, id: &str) -> Result<Collection> {
        self.collections
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow!("database {id} not found"))
    }

    async fn fetch_collection_entries(&self, id: &str) -> Result<Vec<Document>> {
        Ok(self.entries.get(id).cloned().unwrap_or_default())
    }

    async fn fetch_document(&self, id: &str) -> Result<Document> {
        self.pages
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow!("page {id} not found"))
    }

    async fn fetch_block_children(&self, id: &str) -> Result<Vec<Block>> {
        self.block_calls.lock().await.push(id.to_string());
        Ok(self.blocks.lock().await.get(id).cloned().unwrap_or_default())
    }
}

fn targets() -> SyncTargets {
    SyncTargets {
        databases: vec!["db".into()],
        pages: vec!["solo".into()],
    }
}

async fn stored_nodes(pool: &sqlx::SqlitePool) -> HashMap<String, Node> {
    db::list_nodes(pool)
        .await
        .unwrap()
        .into_iter()
        .map(|row| {
            let node: Node = serde_json::from_str(&row.body).unwrap();
            (node.reference.clone(), node)
        })
        .collect()
}

#[tokio::test]
async fn first_sync_publishes_every_entity() {
    let pool = setup_pool().await;
    let graph = SqliteGraphStore::new(pool.clone());
    let snapshots = SqliteSnapshotStore::new(pool.clone());
    let manager = NodeManager::new(&graph, &snapshots);
    let notion = RecordingNotion::fixture();

    let report = sync::run(&targets(), &notion, &manager).await.unwrap();
    assert_eq!(report.added, 4);

    let nodes = stored_nodes(&pool).await;
    assert_eq!(nodes.len(), 4);

    let db_node = &nodes["db"];
    assert_eq!(db_node.children.len(), 2);
    assert!(db_node.children.contains(&nodes["e1"].id));
    assert_eq!(nodes["e1"].parent.as_deref(), Some(db_node.id.as_str()));
    assert_eq!(nodes["solo"].parent, None);

    let e1 = nodes["e1"].internal.content.as_deref().unwrap();
    assert!(e1.starts_with("---\ntitle: Page e1\n"));
    assert!(e1.ends_with("---\n- [x] a\n  - [ ] b"));
    let solo = nodes["solo"].internal.content.as_deref().unwrap();
    assert!(solo.ends_with("* one\n* two"));

    let snapshot = snapshots.load().await.unwrap().unwrap();
    assert_eq!(snapshot.len(), 4);
    assert!(snapshot.contains_key("database:db"));
    assert!(snapshot.contains_key("page:solo"));
}

#[tokio::test]
async fn second_sync_only_touches() {
    let pool = setup_pool().await;
    let graph = SqliteGraphStore::new(pool.clone());
    let snapshots = SqliteSnapshotStore::new(pool.clone());
    let manager = NodeManager::new(&graph, &snapshots);
    let notion = RecordingNotion::fixture();

    sync::run(&targets(), &notion, &manager).await.unwrap();
    let report = sync::run(&targets(), &notion, &manager).await.unwrap();
    assert_eq!(report.unchanged, 4);
    assert_eq!(report.added + report.updated + report.removed + report.recreated, 0);
}

#[tokio::test]
async fn content_change_updates_only_that_page() {
    let pool = setup_pool().await;
    let graph = SqliteGraphStore::new(pool.clone());
    let snapshots = SqliteSnapshotStore::new(pool.clone());
    let manager = NodeManager::new(&graph, &snapshots);
    let notion = RecordingNotion::fixture();

    sync::run(&targets(), &notion, &manager).await.unwrap();
    let before = stored_nodes(&pool).await;

    notion
        .set_blocks(
            "e2",
            vec![text_block("h", |rich_text| BlockContent::Heading2 { rich_text }, "Notes")],
        )
        .await;
    let report = sync::run(&targets(), &notion, &manager).await.unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(report.unchanged, 3);

    let after = stored_nodes(&pool).await;
    assert_ne!(
        before["e2"].internal.content_digest,
        after["e2"].internal.content_digest
    );
    assert!(after["e2"].internal.content.as_deref().unwrap().ends_with("## Notes\n"));
    assert_eq!(before["e1"], after["e1"]);
}

#[tokio::test]
async fn dropped_target_removes_its_nodes() {
    let pool = setup_pool().await;
    let graph = SqliteGraphStore::new(pool.clone());
    let snapshots = SqliteSnapshotStore::new(pool.clone());
    let manager = NodeManager::new(&graph, &snapshots);
    let notion = RecordingNotion::fixture();

    sync::run(&targets(), &notion, &manager).await.unwrap();
    let only_db = SyncTargets {
        databases: vec!["db".into()],
        pages: Vec::new(),
    };
    let report = sync::run(&only_db, &notion, &manager).await.unwrap();
    assert_eq!(report.removed, 1);

    let nodes = stored_nodes(&pool).await;
    assert_eq!(nodes.len(), 3);
    assert!(!nodes.contains_key("solo"));
}

#[tokio::test]
async fn fetch_failure_leaves_graph_and_snapshot_alone() {
    let pool = setup_pool().await;
    let graph = SqliteGraphStore::new(pool.clone());
    let snapshots = SqliteSnapshotStore::new(pool.clone());
    let manager = NodeManager::new(&graph, &snapshots);
    let notion = RecordingNotion::fixture();

    sync::run(&targets(), &notion, &manager).await.unwrap();
    let snapshot = snapshots.load().await.unwrap();

    let broken = SyncTargets {
        databases: vec!["db".into(), "missing".into()],
        pages: vec!["solo".into()],
    };
    let err = sync::run(&broken, &notion, &manager).await.unwrap_err();
    assert!(format!("{err:#}").contains("missing"));
    assert_eq!(snapshots.load().await.unwrap(), snapshot);
    assert_eq!(stored_nodes(&pool).await.len(), 4);
}

#[tokio::test]
async fn block_tree_is_fetched_for_every_page() {
    let notion = RecordingNotion::fixture();
    let entities = sync::fetch_entities(&targets(), &notion).await.unwrap();
    assert_eq!(entities.len(), 4);

    let mut calls = notion.block_calls.lock().await.clone();
    calls.sort();
    assert_eq!(calls, vec!["e1", "e2", "solo", "t1"]);
}
