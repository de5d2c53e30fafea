use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::config::{Config, Ttl};
use crate::model::{Block, Collection, Document, Metadata};
use crate::notion::model::{ApiBlock, ApiDatabase, ApiList, ApiPage};

pub mod blocks;
pub mod model;

const NOTION_API_BASE: &str = "https://api.notion.com/";
const PAGE_SIZE: u32 = 100;

/// Read side of Notion that the sync driver depends on.
#[async_trait]
pub trait NotionSource: Send + Sync {
    /// Database metadata, without its entries.
    async fn fetch_collection(&self, id: &str) -> Result<Collection>;

    /// Every accessible entry of a database, metadata only.
    async fn fetch_collection_entries(&self, id: &str) -> Result<Vec<Document>>;

    /// A single page, metadata only.
    async fn fetch_document(&self, id: &str) -> Result<Document>;

    /// Direct children of a block or page, without their descendants.
    async fn fetch_block_children(&self, id: &str) -> Result<Vec<Block>>;

    /// Attach the block tree and rendered markdown to a document.
    async fn complete_document(&self, document: Document) -> Result<Document> {
        blocks::complete_document(self, document, blocks::DEFAULT_BLOCK_CONCURRENCY).await
    }
}

/// Key-value cache for API responses. A ttl of zero never expires.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;
}

/// Notion reports edit times at minute precision, so a cached page is only
/// trusted once its last edit is more than a minute old.
pub fn is_cached_content_fresh(cached: &Metadata, current: &Metadata, now: DateTime<Utc>) -> bool {
    cached.last_edited_time == current.last_edited_time
        && now - current.last_edited_time > Duration::minutes(1)
}

/// Drain a cursor-paginated endpoint.
pub async fn collect_all<T, F, Fut>(mut fetch_page: F) -> Result<Vec<T>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<ApiList<T>>>,
{
    let mut items = Vec::new();
    let mut cursor = None;
    loop {
        let page = fetch_page(cursor.take()).await?;
        items.extend(page.results);
        match (page.has_more, page.next_cursor) {
            (true, Some(next)) => cursor = Some(next),
            _ => break,
        }
    }
    Ok(items)
}

#[derive(Clone)]
pub struct NotionClient {
    http: Client,
    base_url: Url,
    token: String,
    version: String,
    ttl: Ttl,
    block_concurrency: usize,
    cache: Option<Arc<dyn ResponseCache>>,
}

impl fmt::Debug for NotionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotionClient")
            .field("base_url", &self.base_url)
            .field("version", &self.version)
            .field("cached", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

impl NotionClient {
    pub fn new(token: String, version: String) -> Result<Self> {
        let base_url = Url::parse(NOTION_API_BASE).context("invalid default Notion URL")?;
        Self::with_base_url(token, version, base_url)
    }

    pub fn with_base_url(token: String, version: String, base_url: Url) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("notion-source/", env!("CARGO_PKG_VERSION")))
            .no_proxy()
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url,
            token,
            version,
            ttl: Ttl::default(),
            block_concurrency: blocks::DEFAULT_BLOCK_CONCURRENCY,
            cache: None,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Ok(Self::new(cfg.notion.token.clone(), cfg.notion.version.clone())?
            .with_ttl(cfg.ttl.clone())
            .with_block_concurrency(cfg.notion.block_concurrency))
    }

    pub fn with_cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_ttl(mut self, ttl: Ttl) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_block_concurrency(mut self, concurrency: usize) -> Self {
        self.block_concurrency = concurrency.max(1);
        self
    }

    pub fn build_request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<reqwest::Request> {
        let endpoint = self
            .base_url
            .join(path)
            .context("invalid Notion base URL")?;
        let mut builder = self
            .http
            .request(method, endpoint)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Notion-Version", &self.version);
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }
        builder.build().context("failed to build Notion request")
    }

    async fn execute<T: DeserializeOwned>(&self, request: reqwest::Request) -> Result<T> {
        debug!(method = %request.method(), url = %request.url(), "notion request");
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach Notion")?;

        let status = res.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            warn!("Rate limited by Notion: {}", body);
            return Err(anyhow!("received 429 from Notion: {}", body));
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            warn!("Notion API error - Status: {}, Body: {}", status, body);
            return Err(anyhow!("notion error {}: {}", status, body));
        }

        let body = res.text().await.context("failed to read Notion response")?;
        serde_json::from_str(&body).context("invalid Notion response JSON")
    }

    #[instrument(skip(self))]
    pub async fn retrieve_database(&self, id: &str) -> Result<ApiDatabase> {
        let request = self.build_request(Method::GET, &format!("v1/databases/{id}"), &[], None)?;
        self.execute(request).await
    }

    pub async fn query_database(&self, id: &str, cursor: Option<String>) -> Result<ApiList<ApiPage>> {
        let mut body = json!({ "page_size": PAGE_SIZE });
        if let Some(cursor) = cursor {
            body["start_cursor"] = Value::String(cursor);
        }
        let request = self.build_request(
            Method::POST,
            &format!("v1/databases/{id}/query"),
            &[],
            Some(&body),
        )?;
        self.execute(request).await
    }

    #[instrument(skip(self))]
    pub async fn retrieve_page(&self, id: &str) -> Result<ApiPage> {
        let request = self.build_request(Method::GET, &format!("v1/pages/{id}"), &[], None)?;
        self.execute(request).await
    }

    pub async fn list_block_children(
        &self,
        id: &str,
        cursor: Option<String>,
    ) -> Result<ApiList<ApiBlock>> {
        let mut query = vec![("page_size", PAGE_SIZE.to_string())];
        if let Some(cursor) = cursor {
            query.push(("start_cursor", cursor));
        }
        let request =
            self.build_request(Method::GET, &format!("v1/blocks/{id}/children"), &query, None)?;
        self.execute(request).await
    }

    async fn cache_get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let cache = self.cache.as_ref()?;
        match cache.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(err) => {
                    warn!(%key, ?err, "discarding unreadable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                warn!(%key, ?err, "response cache read failed");
                None
            }
        }
    }

    async fn cache_set<T: Serialize>(&self, key: &str, value: &T, ttl: u64) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(%key, ?err, "failed to encode cache entry");
                return;
            }
        };
        if let Err(err) = cache.set(key, &raw, ttl).await {
            warn!(%key, ?err, "response cache write failed");
        }
    }

    async fn cached<T, F, Fut>(&self, key: &str, ttl: u64, fetch: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(hit) = self.cache_get(key).await {
            debug!(%key, "cache hit");
            return Ok(hit);
        }
        let value = fetch().await?;
        self.cache_set(key, &value, ttl).await;
        Ok(value)
    }
}

#[async_trait]
impl NotionSource for NotionClient {
    async fn fetch_collection(&self, id: &str) -> Result<Collection> {
        let db = self
            .cached(&format!("database:{id}"), self.ttl.database_meta, || {
                self.retrieve_database(id)
            })
            .await
            .with_context(|| format!("failed to retrieve database {id}"))?;
        Ok(db.into_collection()?)
    }

    async fn fetch_collection_entries(&self, id: &str) -> Result<Vec<Document>> {
        let pages: Vec<ApiPage> = self
            .cached(&format!("database:{id}:pages"), self.ttl.database_entries, || {
                collect_all(|cursor| self.query_database(id, cursor))
            })
            .await
            .with_context(|| format!("failed to query database {id}"))?;
        let total = pages.len();
        let documents = pages
            .into_iter()
            .filter(ApiPage::is_accessible)
            .map(ApiPage::into_document)
            .collect::<Result<Vec<_>, _>>()?;
        if documents.len() < total {
            debug!(database = %id, skipped = total - documents.len(), "skipped inaccessible entries");
        }
        Ok(documents)
    }

    async fn fetch_document(&self, id: &str) -> Result<Document> {
        let page = self
            .cached(&format!("page:{id}"), self.ttl.page_meta, || self.retrieve_page(id))
            .await
            .with_context(|| format!("failed to retrieve page {id}"))?;
        if !page.is_accessible() {
            bail!("page {id} is not accessible to this integration");
        }
        Ok(page.into_document()?)
    }

    async fn fetch_block_children(&self, id: &str) -> Result<Vec<Block>> {
        let raw = collect_all(|cursor| self.list_block_children(id, cursor)).await?;
        let mut blocks = Vec::with_capacity(raw.len());
        for block in raw {
            if let Some(block) = block.into_block()? {
                blocks.push(block);
            }
        }
        Ok(blocks)
    }

    async fn complete_document(&self, document: Document) -> Result<Document> {
        let key = format!("page:{}:content", document.id);
        if let Some(cached) = self.cache_get::<Document>(&key).await {
            if is_cached_content_fresh(&cached.metadata, &document.metadata, Utc::now()) {
                debug!(page = %document.id, "reusing cached page content");
                return Ok(cached);
            }
        }
        let document = blocks::complete_document(self, document, self.block_concurrency).await?;
        self.cache_set(&key, &document, self.ttl.page_content).await;
        Ok(document)
    }
}
