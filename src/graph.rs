//! Normalizes fetched entities into a keyed map with resolved parent and
//! child links.
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::SyncError;
use crate::model::{Entity, EntityKind, Link, ParentRef};

/// An entity with its parent resolved and back-links to its children.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedEntity {
    pub entity: Entity,
    pub parent: Option<Link>,
    pub children: Vec<Link>,
}

/// Normalized entities keyed by `"{kind}:{id}"`.
pub type EntityMap = BTreeMap<String, NormalizedEntity>;

/// Resolve a raw parent reference. Workspace parents have no link.
pub fn normalize_parent(parent: &ParentRef, entity: &Link) -> Result<Option<Link>, SyncError> {
    match parent {
        ParentRef::DatabaseId { database_id } => {
            Ok(Some(Link::new(EntityKind::Database, database_id.clone())))
        }
        ParentRef::PageId { page_id } => Ok(Some(Link::new(EntityKind::Page, page_id.clone()))),
        ParentRef::Workspace => Ok(None),
        ParentRef::Unsupported => Err(SyncError::UnknownParentKind { entity: entity.key() }),
    }
}

/// Build the entity map in two passes: resolve parents, then attach each
/// entity to its parent's children when the parent is part of the input.
/// Parents outside the input are kept on the child but get no back-link.
pub fn normalize(entities: Vec<Entity>) -> Result<EntityMap, SyncError> {
    let mut map = EntityMap::new();
    let mut edges = Vec::with_capacity(entities.len());

    for entity in entities {
        let link = entity.link();
        let parent = normalize_parent(entity.parent(), &link)?;
        edges.push((parent.clone(), link.clone()));
        map.insert(
            link.key(),
            NormalizedEntity {
                entity,
                parent,
                children: Vec::new(),
            },
        );
    }

    for (parent, child) in edges {
        let Some(parent) = parent else { continue };
        match map.get_mut(&parent.key()) {
            Some(entry) if !entry.children.contains(&child) => entry.children.push(child),
            Some(_) => {}
            None => debug!(child = %child.key(), parent = %parent.key(), "parent not in this sync"),
        }
    }

    Ok(map)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::model::{Collection, Document, Metadata};
    use chrono::{TimeZone, Utc};

    pub fn metadata(id: &str) -> Metadata {
        Metadata {
            url: format!("https://www.notion.so/{id}"),
            created_time: Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap(),
            last_edited_time: Utc.with_ymd_and_hms(2021, 1, 2, 0, 0, 0).unwrap(),
            cover_image: None,
            icon_emoji: None,
            icon_image: None,
        }
    }

    pub fn collection(id: &str, parent: ParentRef) -> Entity {
        Entity::Collection(Collection {
            id: id.into(),
            parent,
            title: format!("Database {id}"),
            archived: false,
            metadata: metadata(id),
            pages: Vec::new(),
        })
    }

    pub fn document(id: &str, parent: ParentRef) -> Entity {
        Entity::Document(Document {
            id: id.into(),
            parent,
            title: format!("Page {id}"),
            archived: false,
            metadata: metadata(id),
            properties: Default::default(),
            blocks: Vec::new(),
            markdown: format!("---\ntitle: Page {id}\n---\n"),
        })
    }

    pub fn in_db(id: &str) -> ParentRef {
        ParentRef::DatabaseId { database_id: id.into() }
    }

    pub fn in_page(id: &str) -> ParentRef {
        ParentRef::PageId { page_id: id.into() }
    }
}
