//! Configuration parsing and validation.
//!
//! archdex is configured through an optional TOML file. Every key has a
//! default, so an empty or missing file yields a working configuration.
//!
//! # Example Configuration
//!
//! ```toml
//! [dataset]
//! root = "dataset"
//! repositories = []          # empty = all
//! agents_dir = "agents"
//!
//! [index]
//! path = "dataset.archdex"
//! batch_size = 1000
//! skip_unpublished = false
//! skip_suppressed = true
//!
//! [search]
//! default_size = 10
//! highlight_fields = ["title", "content_description", "subjects", "extents"]
//! facet_field = "subjects"
//! facet_size = 3
//! ```
//!
//! # Precedence
//!
//! Command-line flags > environment (`ARCHDEX_DATASET`, `ARCHDEX_INDEX`) >
//! file > built-in defaults. Flags are applied by the command handlers;
//! this module handles the rest.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file read when `--config` is not given. Its absence is not an error.
pub const DEFAULT_CONFIG_PATH: &str = "./archdex.toml";

/// Environment variable overriding `dataset.root`.
pub const ENV_DATASET: &str = "ARCHDEX_DATASET";
/// Environment variable overriding `index.path`.
pub const ENV_INDEX: &str = "ARCHDEX_INDEX";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatasetConfig {
    #[serde(default = "default_dataset_root")]
    pub root: PathBuf,
    /// Repository ids to read under `repositories/`. Empty means all.
    #[serde(default)]
    pub repositories: Vec<String>,
    /// Agents directory, relative to `root`.
    #[serde(default = "default_agents_dir")]
    pub agents_dir: PathBuf,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            root: default_dataset_root(),
            repositories: Vec::new(),
            agents_dir: default_agents_dir(),
        }
    }
}

fn default_dataset_root() -> PathBuf {
    PathBuf::from("dataset")
}
fn default_agents_dir() -> PathBuf {
    PathBuf::from("agents")
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub skip_unpublished: bool,
    #[serde(default = "default_true")]
    pub skip_suppressed: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
            batch_size: default_batch_size(),
            skip_unpublished: false,
            skip_suppressed: true,
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from("dataset.archdex")
}
fn default_batch_size() -> usize {
    1000
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_size")]
    pub default_size: usize,
    #[serde(default = "default_highlight_fields")]
    pub highlight_fields: Vec<String>,
    /// Facet computed for every search. Empty disables faceting.
    #[serde(default = "default_facet_field")]
    pub facet_field: String,
    #[serde(default = "default_facet_size")]
    pub facet_size: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_size: default_size(),
            highlight_fields: default_highlight_fields(),
            facet_field: default_facet_field(),
            facet_size: default_facet_size(),
        }
    }
}

fn default_size() -> usize {
    10
}
fn default_highlight_fields() -> Vec<String> {
    ["title", "content_description", "subjects", "extents"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_facet_field() -> String {
    "subjects".to_string()
}
fn default_facet_size() -> usize {
    3
}

impl Config {
    /// Apply `ARCHDEX_DATASET` / `ARCHDEX_INDEX` through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup(ENV_DATASET).filter(|v| !v.is_empty()) {
            self.dataset.root = PathBuf::from(root);
        }
        if let Some(path) = lookup(ENV_INDEX).filter(|v| !v.is_empty()) {
            self.index.path = PathBuf::from(path);
        }
    }

    /// Directory holding agent records.
    pub fn agents_root(&self) -> PathBuf {
        self.dataset.root.join(&self.dataset.agents_dir)
    }

    pub fn validate(&self) -> Result<()> {
        if self.index.batch_size == 0 {
            bail!("index.batch_size must be > 0");
        }
        if self.search.default_size == 0 {
            bail!("search.default_size must be > 0");
        }
        if self.search.facet_size == 0 {
            bail!("search.facet_size must be > 0");
        }
        if let Some(bad) = self.dataset.repositories.iter().find(|r| r.trim().is_empty()) {
            bail!("dataset.repositories contains an empty entry: {:?}", bad);
        }
        Ok(())
    }
}

/// Parse a TOML document into a [`Config`] without touching the environment.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    Ok(config)
}

/// Load configuration.
///
/// `path` is the `--config` flag: when given, the file must exist. When
/// absent, [`DEFAULT_CONFIG_PATH`] is read if present and defaults are used
/// otherwise. Environment overrides are applied before validation.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            parse_config(&content)?
        }
        None => {
            let default = Path::new(DEFAULT_CONFIG_PATH);
            if default.is_file() {
                let content = std::fs::read_to_string(default).with_context(|| {
                    format!("Failed to read config file: {}", default.display())
                })?;
                parse_config(&content)?
            } else {
                Config::default()
            }
        }
    };

    config.apply_env(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}
