use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use notion_source::config;
use notion_source::notion::{NotionClient, NotionSource};

/// Print a Notion page as markdown with frontmatter.
#[derive(Parser, Debug)]
struct Args {
    /// Path to YAML config
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Page ID to render
    #[arg(long)]
    page_id: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    let client = NotionClient::from_config(&cfg)?;

    let page = client.fetch_document(&args.page_id).await?;
    let page = client.complete_document(page).await?;
    println!("{}", page.markdown);
    Ok(())
}
