//! Domain types for Notion content: entities, blocks and rich text.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::SyncError;
use crate::property::PropertyValue;

/// Kind tag of a top-level entity. Node keys are `"{kind}:{id}"`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Page,
    Database,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Page => "page",
            EntityKind::Database => "database",
        }
    }

    /// Parse the `object` tag of an API payload.
    pub fn from_tag(tag: &str, id: &str) -> Result<Self, SyncError> {
        match tag {
            "page" => Ok(EntityKind::Page),
            "database" => Ok(EntityKind::Database),
            other => Err(SyncError::UnknownEntityKind {
                id: id.to_string(),
                kind: other.to_string(),
            }),
        }
    }
}

/// Reference from one entity to another, by kind and identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Link {
    pub kind: EntityKind,
    pub id: String,
}

impl Link {
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        Self { kind, id: id.into() }
    }

    pub fn key(&self) -> String {
        format!("{}:{}", self.kind.as_str(), self.id)
    }
}

/// Raw parent reference as Notion reports it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParentRef {
    DatabaseId { database_id: String },
    PageId { page_id: String },
    Workspace,
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub url: String,
    #[serde(with = "api_time")]
    pub created_time: DateTime<Utc>,
    #[serde(with = "api_time")]
    pub last_edited_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_emoji: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_image: Option<String>,
}

/// Timestamps as the API writes them: UTC with millisecond precision,
/// e.g. `2021-01-02T00:00:00.000Z`.
mod api_time {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        DateTime::<Utc>::deserialize(deserializer)
    }
}

/// A Notion database and the documents it owns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Collection {
    pub id: String,
    pub parent: ParentRef,
    pub title: String,
    pub archived: bool,
    pub metadata: Metadata,
    #[serde(default)]
    pub pages: Vec<Document>,
}

/// A Notion page with its block tree and rendered markdown.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: String,
    pub parent: ParentRef,
    pub title: String,
    pub archived: bool,
    pub metadata: Metadata,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
    #[serde(default)]
    pub blocks: Vec<Block>,
    #[serde(default)]
    pub markdown: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Collection(Collection),
    Document(Document),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Collection(_) => EntityKind::Database,
            Entity::Document(_) => EntityKind::Page,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Entity::Collection(c) => &c.id,
            Entity::Document(d) => &d.id,
        }
    }

    pub fn parent(&self) -> &ParentRef {
        match self {
            Entity::Collection(c) => &c.parent,
            Entity::Document(d) => &d.parent,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Entity::Collection(c) => &c.title,
            Entity::Document(d) => &d.title,
        }
    }

    pub fn archived(&self) -> bool {
        match self {
            Entity::Collection(c) => c.archived,
            Entity::Document(d) => d.archived,
        }
    }

    pub fn metadata(&self) -> &Metadata {
        match self {
            Entity::Collection(c) => &c.metadata,
            Entity::Document(d) => &d.metadata,
        }
    }

    pub fn link(&self) -> Link {
        Link::new(self.kind(), self.id())
    }
}

impl From<Collection> for Entity {
    fn from(value: Collection) -> Self {
        Entity::Collection(value)
    }
}

impl From<Document> for Entity {
    fn from(value: Document) -> Self {
        Entity::Document(value)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    Gray,
    Brown,
    Orange,
    Yellow,
    Green,
    Blue,
    Purple,
    Pink,
    Red,
    GrayBackground,
    BrownBackground,
    OrangeBackground,
    YellowBackground,
    GreenBackground,
    BlueBackground,
    PurpleBackground,
    PinkBackground,
    RedBackground,
    #[default]
    #[serde(other)]
    Default,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Annotations {
    pub bold: bool,
    pub italic: bool,
    pub strikethrough: bool,
    pub underline: bool,
    pub code: bool,
    pub color: Color,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RichTextKind {
    Text,
    Mention,
    Equation { expression: String },
}

/// One styled span of inline text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RichText {
    pub plain_text: String,
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default)]
    pub annotations: Annotations,
    pub kind: RichTextKind,
}

impl RichText {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            plain_text: text.into(),
            href: None,
            annotations: Annotations::default(),
            kind: RichTextKind::Text,
        }
    }

    pub fn equation(expression: impl Into<String>) -> Self {
        let expression = expression.into();
        Self {
            plain_text: expression.clone(),
            href: None,
            annotations: Annotations::default(),
            kind: RichTextKind::Equation { expression },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockContent {
    #[serde(rename = "heading_1")]
    Heading1 { rich_text: Vec<RichText> },
    #[serde(rename = "heading_2")]
    Heading2 { rich_text: Vec<RichText> },
    #[serde(rename = "heading_3")]
    Heading3 { rich_text: Vec<RichText> },
    Paragraph { rich_text: Vec<RichText> },
    BulletedListItem { rich_text: Vec<RichText> },
    NumberedListItem { rich_text: Vec<RichText> },
    ToDo { rich_text: Vec<RichText>, checked: bool },
    Toggle { rich_text: Vec<RichText> },
    ChildPage { title: String },
    Image { caption: Vec<RichText>, url: String },
    Unsupported,
}

impl BlockContent {
    /// List-like blocks are glued to their parent without a blank line.
    pub fn is_list_like(&self) -> bool {
        matches!(
            self,
            BlockContent::BulletedListItem { .. }
                | BlockContent::NumberedListItem { .. }
                | BlockContent::ToDo { .. }
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    pub id: String,
    pub has_children: bool,
    #[serde(default)]
    pub children: Vec<Block>,
    pub content: BlockContent,
}

impl Block {
    pub fn new(id: impl Into<String>, content: BlockContent) -> Self {
        Self {
            id: id.into(),
            has_children: false,
            children: Vec::new(),
            content,
        }
    }

    pub fn with_children(mut self, children: Vec<Block>) -> Self {
        self.has_children = !children.is_empty();
        self.children = children;
        self
    }
}
