//! Wire types for the Notion REST API and their conversion into domain
//! types.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

use crate::error::SyncError;
use crate::model::{
    Annotations, Block, BlockContent, Collection, Document, EntityKind, Metadata, ParentRef,
    RichText, RichTextKind,
};
use crate::property::{self, file_url, rich_text_plain};

/// One page of a paginated list endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiList<T> {
    pub results: Vec<T>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiDatabase {
    pub object: String,
    pub id: String,
    pub parent: ParentRef,
    pub created_time: DateTime<Utc>,
    pub last_edited_time: DateTime<Utc>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub title: Value,
    #[serde(default)]
    pub icon: Option<Value>,
    #[serde(default)]
    pub cover: Option<Value>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiPage {
    pub object: String,
    pub id: String,
    pub parent: ParentRef,
    pub created_time: DateTime<Utc>,
    pub last_edited_time: DateTime<Utc>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub icon: Option<Value>,
    #[serde(default)]
    pub cover: Option<Value>,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiBlock {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub has_children: bool,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ApiRichText {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    plain_text: String,
    #[serde(default)]
    href: Option<String>,
    #[serde(default)]
    annotations: Annotations,
    #[serde(default)]
    equation: Option<ApiEquation>,
}

#[derive(Debug, Deserialize)]
struct ApiEquation {
    expression: String,
}

impl From<ApiRichText> for RichText {
    fn from(value: ApiRichText) -> Self {
        let kind = match (value.kind.as_str(), value.equation) {
            ("equation", Some(eq)) => RichTextKind::Equation { expression: eq.expression },
            ("mention", _) => RichTextKind::Mention,
            _ => RichTextKind::Text,
        };
        RichText {
            plain_text: value.plain_text,
            href: value.href,
            annotations: value.annotations,
            kind,
        }
    }
}

/// Parse the rich text array of `owner`. Malformed input yields no spans.
pub fn rich_text(owner: &str, value: &Value) -> Vec<RichText> {
    match serde_json::from_value::<Vec<ApiRichText>>(value.clone()) {
        Ok(spans) => spans.into_iter().map(RichText::from).collect(),
        Err(e) => {
            warn!(id = %owner, error = %e, "unreadable rich text, rendering it empty");
            Vec::new()
        }
    }
}

/// Icon and cover urls of an entity.
fn metadata(
    id: &str,
    url: Option<String>,
    created_time: DateTime<Utc>,
    last_edited_time: DateTime<Utc>,
    icon: Option<&Value>,
    cover: Option<&Value>,
) -> Result<Metadata, SyncError> {
    let (icon_emoji, icon_image) = match icon {
        Some(icon) => match icon.get("type").and_then(Value::as_str) {
            Some("emoji") => (icon["emoji"].as_str().map(str::to_string), None),
            Some("external" | "file") => (None, Some(file_url(id, icon)?)),
            _ => (None, None),
        },
        None => (None, None),
    };
    let cover_image = match cover {
        Some(cover) if !cover.is_null() => Some(file_url(id, cover)?),
        _ => None,
    };
    Ok(Metadata {
        url: url.unwrap_or_default(),
        created_time,
        last_edited_time,
        cover_image,
        icon_emoji,
        icon_image,
    })
}

fn expect_kind(object: &str, id: &str, expected: EntityKind) -> Result<(), SyncError> {
    let kind = EntityKind::from_tag(object, id)?;
    if kind != expected {
        return Err(SyncError::UnknownEntityKind {
            id: id.to_string(),
            kind: object.to_string(),
        });
    }
    Ok(())
}

impl ApiDatabase {
    pub fn into_collection(self) -> Result<Collection, SyncError> {
        expect_kind(&self.object, &self.id, EntityKind::Database)?;
        let metadata = metadata(
            &self.id,
            self.url,
            self.created_time,
            self.last_edited_time,
            self.icon.as_ref(),
            self.cover.as_ref(),
        )?;
        Ok(Collection {
            title: rich_text_plain(&self.title),
            id: self.id,
            parent: self.parent,
            archived: self.archived,
            metadata,
            pages: Vec::new(),
        })
    }
}

impl ApiPage {
    /// Pages without a url are not shared with the integration.
    pub fn is_accessible(&self) -> bool {
        self.url.as_deref().is_some_and(|u| !u.is_empty())
    }

    /// Page metadata and properties. Blocks are fetched separately.
    pub fn into_document(self) -> Result<Document, SyncError> {
        expect_kind(&self.object, &self.id, EntityKind::Page)?;
        let properties = property::normalize_properties(&self.id, &self.properties)?;
        let metadata = metadata(
            &self.id,
            self.url,
            self.created_time,
            self.last_edited_time,
            self.icon.as_ref(),
            self.cover.as_ref(),
        )?;
        Ok(Document {
            title: property::title_of(&self.properties),
            id: self.id,
            parent: self.parent,
            archived: self.archived,
            metadata,
            properties,
            blocks: Vec::new(),
            markdown: String::new(),
        })
    }
}

impl ApiBlock {
    /// Convert into a domain block. Blocks without a type or marked
    /// unsupported by the API yield `None`.
    pub fn into_block(self) -> Result<Option<Block>, SyncError> {
        let kind = match self.kind.as_deref() {
            None | Some("unsupported") => return Ok(None),
            Some(kind) => kind,
        };
        let body = self.payload.get(kind).cloned().unwrap_or(Value::Null);
        let spans = || {
            let field = body.get("rich_text").or_else(|| body.get("text"));
            field.map(|v| rich_text(&self.id, v)).unwrap_or_default()
        };
        let content = match kind {
            "heading_1" => BlockContent::Heading1 { rich_text: spans() },
            "heading_2" => BlockContent::Heading2 { rich_text: spans() },
            "heading_3" => BlockContent::Heading3 { rich_text: spans() },
            "paragraph" => BlockContent::Paragraph { rich_text: spans() },
            "bulleted_list_item" => BlockContent::BulletedListItem { rich_text: spans() },
            "numbered_list_item" => BlockContent::NumberedListItem { rich_text: spans() },
            "to_do" => BlockContent::ToDo {
                rich_text: spans(),
                checked: body["checked"].as_bool().unwrap_or(false),
            },
            "toggle" => BlockContent::Toggle { rich_text: spans() },
            "child_page" => BlockContent::ChildPage {
                title: body["title"].as_str().unwrap_or_default().to_string(),
            },
            "image" => BlockContent::Image {
                caption: body
                    .get("caption")
                    .map(|v| rich_text(&self.id, v))
                    .unwrap_or_default(),
                url: file_url(&self.id, &body)?,
            },
            _ => BlockContent::Unsupported,
        };
        Ok(Some(Block {
            id: self.id,
            has_children: self.has_children,
            children: Vec::new(),
            content,
        }))
    }
}
