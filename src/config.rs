//! Configuration loader and validator for the Notion sync.
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::notion::blocks::DEFAULT_BLOCK_CONCURRENCY;
use crate::reconcile::DEFAULT_MUTATION_CONCURRENCY;
use crate::sync::SyncTargets;

static ID_SEPARATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*").expect("valid separator regex"));

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub notion: Notion,
    #[serde(default)]
    pub ttl: Ttl,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    #[serde(default = "default_mutation_concurrency")]
    pub mutation_concurrency: usize,
}

/// Notion API settings and the ids to sync.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notion {
    pub token: String,
    pub version: String,
    #[serde(default)]
    pub databases: Vec<String>,
    #[serde(default)]
    pub pages: Vec<String>,
    #[serde(default = "default_block_concurrency")]
    pub block_concurrency: usize,
}

/// Response cache lifetimes in seconds. Zero never expires.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Ttl {
    pub database_meta: u64,
    pub database_entries: u64,
    pub page_meta: u64,
    pub page_content: u64,
}

impl Default for Ttl {
    fn default() -> Self {
        Self {
            database_meta: 0,
            database_entries: 5,
            page_meta: 5,
            page_content: 0,
        }
    }
}

fn default_mutation_concurrency() -> usize {
    DEFAULT_MUTATION_CONCURRENCY
}

fn default_block_concurrency() -> usize {
    DEFAULT_BLOCK_CONCURRENCY
}

/// Split a comma separated id list, dropping blanks.
pub fn split_ids(raw: &str) -> Vec<String> {
    ID_SEPARATOR
        .split(raw.trim())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn merge_into(target: &mut Vec<String>, extra: Option<&str>) {
    for id in extra.map(split_ids).unwrap_or_default() {
        if !target.contains(&id) {
            target.push(id);
        }
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// Append ids from comma separated lists, keeping configured ids first.
    pub fn merge_id_lists(&mut self, databases: Option<&str>, pages: Option<&str>) {
        merge_into(&mut self.notion.databases, databases);
        merge_into(&mut self.notion.pages, pages);
    }

    pub fn sync_targets(&self) -> SyncTargets {
        SyncTargets {
            databases: self.notion.databases.clone(),
            pages: self.notion.pages.clone(),
        }
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance. Id lists may be empty here since
/// they can still arrive through the environment.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.mutation_concurrency == 0 {
        return Err(ConfigError::Invalid("app.mutation_concurrency must be > 0"));
    }
    if cfg.notion.token.trim().is_empty() {
        return Err(ConfigError::Invalid("notion.token must be non-empty"));
    }
    if cfg.notion.version.trim().is_empty() {
        return Err(ConfigError::Invalid("notion.version must be non-empty"));
    }
    if cfg.notion.block_concurrency == 0 {
        return Err(ConfigError::Invalid("notion.block_concurrency must be > 0"));
    }
    if cfg
        .notion
        .databases
        .iter()
        .chain(&cfg.notion.pages)
        .any(|id| id.trim().is_empty())
    {
        return Err(ConfigError::Invalid("notion ids must be non-empty"));
    }
    Ok(())
}

/// Example configuration.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  mutation_concurrency: 8

notion:
  token: "YOUR_NOTION_INTEGRATION_TOKEN"
  version: "2022-06-28"
  block_concurrency: 4
  databases:
    - "NOTION_DATABASE_ID"
  pages:
    - "NOTION_PAGE_ID"

ttl:
  database_meta: 0
  database_entries: 5
  page_meta: 5
  page_content: 0
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.notion.databases, vec!["NOTION_DATABASE_ID"]);
        assert_eq!(cfg.ttl, Ttl::default());
    }

    #[test]
    fn defaults_apply_to_minimal_config() {
        let cfg: Config = serde_yaml::from_str(
            "app:\n  data_dir: ./d\nnotion:\n  token: t\n  version: v\n",
        )
        .unwrap();
        validate(&cfg).unwrap();
        assert!(cfg.notion.databases.is_empty());
        assert_eq!(cfg.notion.block_concurrency, DEFAULT_BLOCK_CONCURRENCY);
        assert_eq!(cfg.app.mutation_concurrency, DEFAULT_MUTATION_CONCURRENCY);
        assert_eq!(cfg.ttl.database_entries, 5);
    }

    #[test]
    fn invalid_token() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.notion.token = "".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("notion.token")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_concurrency_and_ids() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.notion.block_concurrency = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.notion.pages.push("  ".into());
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn id_lists_split_on_commas() {
        assert_eq!(split_ids("a, b,c ,  d"), vec!["a", "b", "c", "d"]);
        assert_eq!(split_ids(""), Vec::<String>::new());
        assert_eq!(split_ids("a,,b"), vec!["a", "b"]);
    }

    #[test]
    fn merge_keeps_configured_ids_first() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.merge_id_lists(Some("db2, NOTION_DATABASE_ID"), None);
        assert_eq!(cfg.notion.databases, vec!["NOTION_DATABASE_ID", "db2"]);
        assert_eq!(cfg.notion.pages, vec!["NOTION_PAGE_ID"]);
        let targets = cfg.sync_targets();
        assert_eq!(targets.databases.len(), 2);
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.notion.version, "2022-06-28");
    }
}
