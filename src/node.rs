//! Graph nodes built from normalized entities.
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::SyncError;
use crate::graph::NormalizedEntity;
use crate::model::{Entity, EntityKind, Link, Metadata};
use crate::property::PropertyValue;

/// Namespace for deterministic node ids.
const NODE_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_52a4_9d0e_4b7a_8c35_2e91_d4a7_f013);

pub const MARKDOWN_MEDIA_TYPE: &str = "text/markdown";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeType {
    #[serde(rename = "NotionDatabase")]
    Collection,
    #[serde(rename = "NotionPage")]
    Document,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Collection => "NotionDatabase",
            NodeType::Document => "NotionPage",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeInternal {
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub content: Option<String>,
    pub media_type: Option<String>,
    pub content_digest: String,
}

/// A node as published to the content graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    #[serde(rename = "ref")]
    pub reference: String,
    pub kind: EntityKind,
    pub title: String,
    pub archived: bool,
    #[serde(flatten)]
    pub metadata: Metadata,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
    pub parent: Option<String>,
    #[serde(default)]
    pub children: Vec<String>,
    pub internal: NodeInternal,
}

/// The part of a node a touch call needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRef {
    pub id: String,
    pub node_type: NodeType,
    pub content_digest: String,
}

/// Deterministic node id for an entity link.
pub fn node_id(link: &Link) -> String {
    Uuid::new_v5(&NODE_NAMESPACE, link.key().as_bytes()).to_string()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DigestInput<'a> {
    id: &'a str,
    #[serde(rename = "ref")]
    reference: &'a str,
    kind: EntityKind,
    title: &'a str,
    archived: bool,
    #[serde(flatten)]
    metadata: &'a Metadata,
    properties: Option<&'a BTreeMap<String, PropertyValue>>,
    content: Option<&'a str>,
    media_type: Option<&'a str>,
}

/// SHA-256 over the serialized node fields, excluding parent, children and
/// bookkeeping. Lowercase hex.
pub fn content_digest(entity: &Entity) -> Result<String, SyncError> {
    let id = node_id(&entity.link());
    let (properties, content, media_type) = match entity {
        Entity::Collection(_) => (None, None, None),
        Entity::Document(d) => (
            Some(&d.properties),
            Some(d.markdown.as_str()),
            Some(MARKDOWN_MEDIA_TYPE),
        ),
    };
    let input = DigestInput {
        id: &id,
        reference: entity.id(),
        kind: entity.kind(),
        title: entity.title(),
        archived: entity.archived(),
        metadata: entity.metadata(),
        properties,
        content,
        media_type,
    };
    let mut hasher = Sha256::new();
    serde_json::to_writer(&mut hasher, &input).map_err(|source| SyncError::Encode {
        id: entity.link().key(),
        source,
    })?;
    Ok(format!("{:x}", hasher.finalize()))
}

impl NormalizedEntity {
    pub fn content_digest(&self) -> Result<String, SyncError> {
        content_digest(&self.entity)
    }
}

impl Node {
    pub fn from_normalized(normalized: &NormalizedEntity) -> Result<Self, SyncError> {
        let entity = &normalized.entity;
        let (node_type, properties, content, media_type) = match entity {
            Entity::Collection(_) => (NodeType::Collection, BTreeMap::new(), None, None),
            Entity::Document(d) => (
                NodeType::Document,
                d.properties.clone(),
                Some(d.markdown.clone()),
                Some(MARKDOWN_MEDIA_TYPE.to_string()),
            ),
        };
        Ok(Self {
            id: node_id(&entity.link()),
            reference: entity.id().to_string(),
            kind: entity.kind(),
            title: entity.title().to_string(),
            archived: entity.archived(),
            metadata: entity.metadata().clone(),
            properties,
            parent: normalized.parent.as_ref().map(node_id),
            children: normalized.children.iter().map(node_id).collect(),
            internal: NodeInternal {
                node_type,
                content,
                media_type,
                content_digest: normalized.content_digest()?,
            },
        })
    }

    pub fn content_digest(&self) -> &str {
        &self.internal.content_digest
    }

    pub fn touch_ref(&self) -> NodeRef {
        NodeRef {
            id: self.id.clone(),
            node_type: self.internal.node_type,
            content_digest: self.internal.content_digest.clone(),
        }
    }
}
