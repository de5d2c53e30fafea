use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use notion_source::config;
use notion_source::db::{self, SqliteGraphStore, SqliteResponseCache, SqliteSnapshotStore};
use notion_source::notion::NotionClient;
use notion_source::reconcile::NodeManager;
use notion_source::sync;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Drop expired cache entries before syncing
    #[arg(long)]
    purge_cache: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let mut cfg = config::load(Some(&args.config))?;
    cfg.merge_id_lists(
        std::env::var("NOTION_DATABASES").ok().as_deref(),
        std::env::var("NOTION_PAGES").ok().as_deref(),
    );
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/notion-source.db", cfg.app.data_dir));
    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    if args.purge_cache {
        let purged = db::cache_purge_expired(&pool, chrono::Utc::now().timestamp()).await?;
        info!(purged, "purged expired cache entries");
    }

    let client = NotionClient::from_config(&cfg)?
        .with_cache(Arc::new(SqliteResponseCache::new(pool.clone())));
    let graph = SqliteGraphStore::new(pool.clone());
    let snapshots = SqliteSnapshotStore::new(pool.clone());
    let manager = NodeManager::new(&graph, &snapshots).with_concurrency(cfg.app.mutation_concurrency);

    let targets = cfg.sync_targets();
    info!(
        databases = targets.databases.len(),
        pages = targets.pages.len(),
        "starting notion sync"
    );
    let report = sync::run(&targets, &client, &manager).await?;
    println!(
        "added {} updated {} removed {} unchanged {} recreated {}",
        report.added, report.updated, report.removed, report.unchanged, report.recreated
    );
    Ok(())
}
