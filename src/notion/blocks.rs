//! Breadth-first retrieval of a page's block tree.
//!
//! Each level of the tree is fetched with bounded concurrency and blocks are
//! kept in a flat arena. The nested tree is assembled bottom-up once all
//! levels are in, so no step recurses on tree depth.
use anyhow::{Context, Result};
use futures::{stream, StreamExt};
use tracing::debug;

use super::NotionSource;
use crate::markdown;
use crate::model::{Block, Document};

pub const DEFAULT_BLOCK_CONCURRENCY: usize = 4;

struct Slot {
    block: Block,
    children: Vec<usize>,
}

/// Fetch every block under `root_id`, descending into blocks that report
/// children.
pub async fn fetch_block_tree<S>(source: &S, root_id: &str, concurrency: usize) -> Result<Vec<Block>>
where
    S: NotionSource + ?Sized,
{
    let mut arena: Vec<Slot> = Vec::new();
    let top = source
        .fetch_block_children(root_id)
        .await
        .with_context(|| format!("failed to fetch blocks of {root_id}"))?;
    let roots: Vec<usize> = top.into_iter().map(|b| push(&mut arena, b)).collect();
    let mut frontier: Vec<usize> = roots
        .iter()
        .copied()
        .filter(|&i| arena[i].block.has_children)
        .collect();

    let mut level = 0;
    while !frontier.is_empty() {
        level += 1;
        debug!(root = %root_id, level, parents = frontier.len(), "fetching block level");
        let jobs: Vec<(usize, String)> = frontier
            .drain(..)
            .map(|i| (i, arena[i].block.id.clone()))
            .collect();
        let fetched: Vec<(usize, String, Result<Vec<Block>>)> = stream::iter(jobs)
            .map(|(i, id)| async move {
                let children = source.fetch_block_children(&id).await;
                (i, id, children)
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

        for (parent, id, children) in fetched {
            let children = children.with_context(|| format!("failed to fetch blocks of {id}"))?;
            for child in children {
                let idx = push(&mut arena, child);
                arena[parent].children.push(idx);
                if arena[idx].block.has_children {
                    frontier.push(idx);
                }
            }
        }
    }

    Ok(assemble(arena, &roots))
}

fn push(arena: &mut Vec<Slot>, mut block: Block) -> usize {
    block.children.clear();
    arena.push(Slot {
        block,
        children: Vec::new(),
    });
    arena.len() - 1
}

/// Children always sit at higher arena indices than their parent, so a
/// reverse sweep sees every child finished before its parent.
fn assemble(arena: Vec<Slot>, roots: &[usize]) -> Vec<Block> {
    let mut built: Vec<Option<Block>> = Vec::with_capacity(arena.len());
    let mut links: Vec<Vec<usize>> = Vec::with_capacity(arena.len());
    for slot in arena {
        built.push(Some(slot.block));
        links.push(slot.children);
    }
    for i in (0..built.len()).rev() {
        let children: Vec<Block> = links[i].iter().filter_map(|&c| built[c].take()).collect();
        if let Some(block) = built[i].as_mut() {
            block.children = children;
        }
    }
    roots.iter().filter_map(|&r| built[r].take()).collect()
}

/// Fetch the block tree of `document` and render its markdown.
pub async fn complete_document<S>(source: &S, mut document: Document, concurrency: usize) -> Result<Document>
where
    S: NotionSource + ?Sized,
{
    let blocks = fetch_block_tree(source, &document.id, concurrency).await?;
    document.markdown = markdown::render_page(&document.title, &document.metadata, &blocks)?;
    document.blocks = blocks;
    Ok(document)
}
