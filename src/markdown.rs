//! Markdown rendering for Notion blocks and rich text.
//!
//! Annotation wrappers are pure: each returns a new span with the marker
//! applied to its text and the matching flag cleared. Nesting from the
//! outside in is link, bold, italic, strikethrough, code.
use anyhow::{Context, Result};
use serde::Serialize;
use tracing::warn;

use crate::model::{Block, BlockContent, Metadata, RichText, RichTextKind};

/// Nesting beyond this depth is not rendered.
pub const MAX_RENDER_DEPTH: usize = 128;

const CHILD_INDENT: &str = "  ";

pub fn math(span: &RichText) -> RichText {
    match &span.kind {
        RichTextKind::Equation { expression } => RichText {
            plain_text: format!("${expression}$"),
            kind: RichTextKind::Text,
            ..span.clone()
        },
        _ => span.clone(),
    }
}

pub fn code(span: &RichText) -> RichText {
    wrap(span, |a| &mut a.code, "`")
}

pub fn strikethrough(span: &RichText) -> RichText {
    wrap(span, |a| &mut a.strikethrough, "~~")
}

pub fn italic(span: &RichText) -> RichText {
    wrap(span, |a| &mut a.italic, "_")
}

pub fn bold(span: &RichText) -> RichText {
    wrap(span, |a| &mut a.bold, "**")
}

fn wrap(
    span: &RichText,
    flag: impl Fn(&mut crate::model::Annotations) -> &mut bool,
    marker: &str,
) -> RichText {
    let mut out = span.clone();
    let set = flag(&mut out.annotations);
    if *set {
        *set = false;
        out.plain_text = format!("{marker}{}{marker}", span.plain_text);
    }
    out
}

/// Render one span to markdown.
pub fn render_text(span: &RichText) -> String {
    let styled = bold(&italic(&strikethrough(&code(&math(span)))));
    match &styled.href {
        Some(href) => format!("[{}]({})", styled.plain_text, href),
        None => styled.plain_text,
    }
}

/// Render a span list, prefixed with `indent`.
pub fn render_texts(spans: &[RichText], indent: &str) -> String {
    let mut out = String::from(indent);
    for span in spans {
        out.push_str(&render_text(span));
    }
    out
}

/// Render blocks at `indent`, joining rendered blocks with a newline.
pub fn render_blocks(blocks: &[Block], indent: &str) -> String {
    render_blocks_at(blocks, indent, 0)
}

/// Render a single block, `None` for block types with no markdown form.
pub fn render_block(block: &Block, indent: &str) -> Option<String> {
    render_block_at(block, indent, 0)
}

fn render_blocks_at(blocks: &[Block], indent: &str, depth: usize) -> String {
    blocks
        .iter()
        .filter_map(|b| render_block_at(b, indent, depth))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_block_at(block: &Block, indent: &str, depth: usize) -> Option<String> {
    let append = |parent: String| append_children(parent, block, indent, depth);
    let rendered = match &block.content {
        BlockContent::Heading1 { rich_text } => format!("# {}\n", render_texts(rich_text, "")),
        BlockContent::Heading2 { rich_text } => format!("## {}\n", render_texts(rich_text, "")),
        BlockContent::Heading3 { rich_text } => format!("### {}\n", render_texts(rich_text, "")),
        BlockContent::Paragraph { rich_text } | BlockContent::Toggle { rich_text } => {
            format!("{}\n", append(render_texts(rich_text, "")))
        }
        BlockContent::BulletedListItem { rich_text } => {
            format!("{indent}{}", append(format!("* {}", render_texts(rich_text, ""))))
        }
        BlockContent::NumberedListItem { rich_text } => {
            format!("{indent}{}", append(format!("1. {}", render_texts(rich_text, ""))))
        }
        BlockContent::ToDo { rich_text, checked } => {
            let mark = if *checked { "x" } else { " " };
            format!(
                "{indent}{}",
                append(format!("- [{mark}] {}", render_texts(rich_text, "")))
            )
        }
        BlockContent::ChildPage { title } => format!("{}\n", append(title.clone())),
        BlockContent::Image { caption, url } => {
            format!("{}\n", append(format!("![{}]({})", render_texts(caption, ""), url)))
        }
        BlockContent::Unsupported => return None,
    };
    Some(rendered)
}

/// Append the rendered children of `block` below `parent`.
fn append_children(parent: String, block: &Block, indent: &str, depth: usize) -> String {
    if !block.has_children {
        return parent;
    }
    let supported: Vec<&Block> = block
        .children
        .iter()
        .filter(|c| c.content != BlockContent::Unsupported)
        .collect();
    let Some(first) = supported.first() else {
        return parent;
    };
    if depth + 1 >= MAX_RENDER_DEPTH {
        warn!(block = %block.id, depth, "block nesting too deep, children not rendered");
        return parent;
    }

    let child_indent = format!("{indent}{CHILD_INDENT}");
    let content = supported
        .iter()
        .filter_map(|c| render_block_at(c, &child_indent, depth + 1))
        .collect::<Vec<_>>()
        .join("\n");
    let glue = if first.content.is_list_like() { "" } else { "\n" };
    format!("{parent}\n{glue}{}", content.trim_end())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Frontmatter<'a> {
    title: &'a str,
    #[serde(flatten)]
    metadata: &'a Metadata,
}

/// Render a page as a YAML frontmatter block followed by its content.
pub fn render_page(title: &str, metadata: &Metadata, blocks: &[Block]) -> Result<String> {
    let yaml = serde_yaml::to_string(&Frontmatter { title, metadata })
        .context("failed to encode page frontmatter")?;
    Ok([
        "---",
        yaml.trim_end(),
        "---",
        render_blocks(blocks, "").as_str(),
    ]
    .join("\n"))
}
