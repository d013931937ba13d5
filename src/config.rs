use anyhow::{Context, Result};
use catalog_core::ingest::IngestOptions;
use catalog_core::query::QueryLimits;
use catalog_core::search::SearchWeights;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    /// Local path or `http(s)://` URL. `catalog ingest --feed` overrides it.
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_progress_every")]
    pub progress_every: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            source: None,
            timeout_secs: default_timeout_secs(),
            progress_every: default_progress_every(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    60
}
fn default_progress_every() -> u64 {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueryConfig {
    #[serde(default = "default_per_page")]
    pub default_per_page: usize,
    #[serde(default = "default_max_per_page")]
    pub max_per_page: usize,
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
    #[serde(default = "default_min_query_chars")]
    pub min_query_chars: usize,
    #[serde(default = "default_path_separator")]
    pub path_separator: String,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_per_page: default_per_page(),
            max_per_page: default_max_per_page(),
            search_limit: default_search_limit(),
            min_query_chars: default_min_query_chars(),
            path_separator: default_path_separator(),
        }
    }
}

fn default_per_page() -> usize {
    30
}
fn default_max_per_page() -> usize {
    500
}
fn default_search_limit() -> usize {
    catalog_core::search::DEFAULT_SEARCH_LIMIT
}
fn default_min_query_chars() -> usize {
    2
}
fn default_path_separator() -> String {
    " > ".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_article_weight")]
    pub article_weight: f64,
    #[serde(default = "default_name_weight")]
    pub name_weight: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            article_weight: default_article_weight(),
            name_weight: default_name_weight(),
        }
    }
}

fn default_article_weight() -> f64 {
    1.0
}
fn default_name_weight() -> f64 {
    0.4
}

impl Config {
    pub fn query_limits(&self) -> QueryLimits {
        QueryLimits {
            max_per_page: self.query.max_per_page,
            search_limit: self.query.search_limit,
            min_query_chars: self.query.min_query_chars,
            path_separator: self.query.path_separator.clone(),
        }
    }

    pub fn search_weights(&self) -> SearchWeights {
        SearchWeights {
            article: self.search.article_weight,
            name: self.search.name_weight,
        }
    }

    pub fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            progress_every: self.feed.progress_every,
            search_weights: self.search_weights(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate feed
    if config.feed.timeout_secs == 0 {
        anyhow::bail!("feed.timeout_secs must be > 0");
    }
    if config.feed.progress_every == 0 {
        anyhow::bail!("feed.progress_every must be > 0");
    }

    // Validate query
    let q = &config.query;
    if q.max_per_page < 1 {
        anyhow::bail!("query.max_per_page must be >= 1");
    }
    if q.default_per_page < 1 || q.default_per_page > q.max_per_page {
        anyhow::bail!(
            "query.default_per_page must be in [1, {}] (query.max_per_page)",
            q.max_per_page
        );
    }
    if !(1..=catalog_core::search::DEFAULT_SEARCH_LIMIT).contains(&q.search_limit) {
        anyhow::bail!(
            "query.search_limit must be in [1, {}]",
            catalog_core::search::DEFAULT_SEARCH_LIMIT
        );
    }
    if q.min_query_chars < 1 {
        anyhow::bail!("query.min_query_chars must be >= 1");
    }

    // Validate search weights
    let s = &config.search;
    if !(s.article_weight.is_finite() && s.article_weight > 0.0) {
        anyhow::bail!("search.article_weight must be a finite number > 0");
    }
    if !(s.name_weight.is_finite() && s.name_weight > 0.0) {
        anyhow::bail!("search.name_weight must be a finite number > 0");
    }
    if s.name_weight > s.article_weight {
        anyhow::bail!("search.name_weight must be <= search.article_weight");
    }

    Ok(config)
}
