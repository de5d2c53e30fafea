use super::model::StoredNode;
use anyhow::Result;
use sqlx::SqlitePool;
use tracing::instrument;

pub type Pool = SqlitePool;

const NOW: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    sqlx::query("PRAGMA journal_mode=WAL;").execute(&pool).await?;
    sqlx::query("PRAGMA synchronous=FULL;").execute(&pool).await?;
    Ok(pool)
}

/// Expand a leading `~/` in file-backed SQLite URLs and create the parent
/// directory. In-memory and non-sqlite URLs pass through.
fn prepare_sqlite_url(url: &str) -> String {
    let Some(rest) = url.strip_prefix("sqlite:") else {
        return url.to_string();
    };
    if rest.starts_with(":memory") {
        return url.to_string();
    }
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let (path, query) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };
    if path.is_empty() {
        return url.to_string();
    }

    let path = match (path.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(tail), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), tail),
        _ => path.to_string(),
    };
    if let Some(parent) = std::path::Path::new(&path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    match query {
        Some(q) => format!("sqlite://{path}?{q}"),
        None => format!("sqlite://{path}"),
    }
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn get_snapshot(pool: &Pool, key: &str) -> Result<Option<String>> {
    let value = sqlx::query_scalar::<_, String>("SELECT value FROM snapshots WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(value)
}

/// Replace the snapshot stored under `key`.
#[instrument(skip_all)]
pub async fn put_snapshot(pool: &Pool, key: &str, value: &str) -> Result<()> {
    sqlx::query(&format!(
        "INSERT INTO snapshots (key, value, updated_at) VALUES (?, ?, {NOW}) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at"
    ))
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

/// Cached value for `key` unless it expired before `now` (unix seconds).
#[instrument(skip_all)]
pub async fn cache_get(pool: &Pool, key: &str, now: i64) -> Result<Option<String>> {
    let value = sqlx::query_scalar::<_, String>(
        "SELECT value FROM response_cache WHERE key = ? AND (expires_at IS NULL OR expires_at > ?)",
    )
    .bind(key)
    .bind(now)
    .fetch_optional(pool)
    .await?;
    Ok(value)
}

/// Store a cached value. `expires_at` of `None` never expires.
#[instrument(skip_all)]
pub async fn cache_put(pool: &Pool, key: &str, value: &str, expires_at: Option<i64>) -> Result<()> {
    sqlx::query(
        "INSERT INTO response_cache (key, value, expires_at) VALUES (?, ?, ?) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
    )
    .bind(key)
    .bind(value)
    .bind(expires_at)
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn cache_purge_expired(pool: &Pool, now: i64) -> Result<u64> {
    let res = sqlx::query("DELETE FROM response_cache WHERE expires_at IS NOT NULL AND expires_at <= ?")
        .bind(now)
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}

#[instrument(skip_all)]
pub async fn upsert_node(
    pool: &Pool,
    id: &str,
    node_type: &str,
    body: &str,
    content_digest: &str,
) -> Result<()> {
    sqlx::query(&format!(
        "INSERT INTO nodes (id, node_type, body, content_digest, touched_at) VALUES (?, ?, ?, ?, {NOW}) \
         ON CONFLICT(id) DO UPDATE SET node_type = excluded.node_type, body = excluded.body, \
         content_digest = excluded.content_digest, touched_at = excluded.touched_at"
    ))
    .bind(id)
    .bind(node_type)
    .bind(body)
    .bind(content_digest)
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn delete_node(pool: &Pool, id: &str) -> Result<bool> {
    let res = sqlx::query("DELETE FROM nodes WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

/// Bump `touched_at`. Returns false when the node is not stored.
#[instrument(skip_all)]
pub async fn touch_node(pool: &Pool, id: &str) -> Result<bool> {
    let res = sqlx::query(&format!("UPDATE nodes SET touched_at = {NOW} WHERE id = ?"))
        .bind(id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

#[instrument(skip_all)]
pub async fn node_exists(pool: &Pool, id: &str) -> Result<bool> {
    let found = sqlx::query_scalar::<_, i64>("SELECT 1 FROM nodes WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

#[instrument(skip_all)]
pub async fn get_node(pool: &Pool, id: &str) -> Result<Option<StoredNode>> {
    let node = sqlx::query_as::<_, StoredNode>(
        "SELECT id, node_type, body, content_digest, touched_at FROM nodes WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(node)
}

#[instrument(skip_all)]
pub async fn list_nodes(pool: &Pool) -> Result<Vec<StoredNode>> {
    let nodes = sqlx::query_as::<_, StoredNode>(
        "SELECT id, node_type, body, content_digest, touched_at FROM nodes ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    Ok(nodes)
}
