//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{ArticlesProfile, FieldSelector, SourceKind, SourceProfile};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP and crawling behavior settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Record source URLs and selectors
    #[serde(default)]
    pub source: SourceConfig,

    /// Years to crawl
    #[serde(default)]
    pub partitions: PartitionConfig,

    /// Chunk output settings
    #[serde(default)]
    pub output: OutputConfig,

    /// Relational sink settings
    #[serde(default)]
    pub sink: SinkConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.crawler.max_concurrent == 0 {
            return Err(AppError::validation("crawler.max_concurrent must be > 0"));
        }
        if self.crawler.partition_concurrency == 0 {
            return Err(AppError::validation(
                "crawler.partition_concurrency must be > 0",
            ));
        }
        if self.output.chunk_threshold_bytes == 0 {
            return Err(AppError::validation(
                "output.chunk_threshold_bytes must be > 0",
            ));
        }
        if self.output.file_prefix.trim().is_empty() {
            return Err(AppError::validation("output.file_prefix is empty"));
        }
        if self.partitions.years.is_empty() && self.partitions.years_file.is_none() {
            return Err(AppError::validation(
                "partitions.years is empty and no partitions.years_file is set",
            ));
        }

        let profile = self.source.profile();
        if !profile.listing_url.contains("{year}") || !profile.listing_url.contains("{page}") {
            return Err(AppError::validation(
                "source.listing_url must contain {year} and {page}",
            ));
        }
        if !profile.detail_url.contains("{id}") {
            return Err(AppError::validation("source.detail_url must contain {id}"));
        }
        Url::parse(&profile.listing_url(2000, 1))?;
        Url::parse(&profile.detail_url("1"))?;
        for pattern in [&profile.item_link_pattern, &profile.page_number_pattern] {
            Regex::new(pattern)
                .map_err(|e| AppError::validation(format!("invalid pattern '{pattern}': {e}")))?;
        }
        if profile.fields.is_empty() {
            return Err(AppError::validation("source.fields is empty"));
        }
        Ok(())
    }
}

/// HTTP client and crawling behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Delay between listing-page requests in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,

    /// Maximum concurrent detail-page fetches
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Number of partitions walked at the same time
    #[serde(default = "defaults::partition_concurrency")]
    pub partition_concurrency: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            request_delay_ms: defaults::request_delay(),
            max_concurrent: defaults::max_concurrent(),
            partition_concurrency: defaults::partition_concurrency(),
        }
    }
}

/// Record source settings. Unset values fall back to the built-in profile
/// for `kind`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub kind: SourceKind,

    #[serde(default)]
    pub listing_url: Option<String>,

    #[serde(default)]
    pub detail_url: Option<String>,

    #[serde(default)]
    pub item_link_pattern: Option<String>,

    #[serde(default)]
    pub pagination_selector: Option<String>,

    #[serde(default)]
    pub page_number_pattern: Option<String>,

    #[serde(default)]
    pub fields: Vec<FieldSelector>,

    #[serde(default)]
    pub articles: Option<ArticlesProfile>,
}

impl SourceConfig {
    /// Resolve overrides against the built-in profile for `kind`.
    pub fn profile(&self) -> SourceProfile {
        let mut profile = SourceProfile::for_kind(self.kind);
        if let Some(url) = &self.listing_url {
            profile.listing_url = url.clone();
        }
        if let Some(url) = &self.detail_url {
            profile.detail_url = url.clone();
        }
        if let Some(pattern) = &self.item_link_pattern {
            profile.item_link_pattern = pattern.clone();
        }
        if let Some(selector) = &self.pagination_selector {
            profile.pagination_selector = selector.clone();
        }
        if let Some(pattern) = &self.page_number_pattern {
            profile.page_number_pattern = pattern.clone();
        }
        if !self.fields.is_empty() {
            profile.fields = self.fields.clone();
        }
        if self.articles.is_some() {
            profile.articles = self.articles.clone();
        }
        profile
    }
}

/// Partition (year) input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionConfig {
    /// Years listed inline
    #[serde(default = "defaults::years")]
    pub years: Vec<i32>,

    /// JSON file of the form `{"years": [...]}`; takes precedence over `years`
    #[serde(default)]
    pub years_file: Option<PathBuf>,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            years: defaults::years(),
            years_file: None,
        }
    }
}

/// Chunk output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory holding chunks and index documents
    #[serde(default = "defaults::output_dir")]
    pub dir: PathBuf,

    /// Chunk file name prefix (`{prefix}_0001.chunk`)
    #[serde(default = "defaults::file_prefix")]
    pub file_prefix: String,

    /// Rotation threshold per chunk in bytes
    #[serde(default = "defaults::chunk_threshold")]
    pub chunk_threshold_bytes: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: defaults::output_dir(),
            file_prefix: defaults::file_prefix(),
            chunk_threshold_bytes: defaults::chunk_threshold(),
        }
    }
}

/// Relational sink settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    #[serde(default)]
    pub enabled: bool,

    /// SQLite database path
    #[serde(default = "defaults::database")]
    pub database: PathBuf,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            database: defaults::database(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    // Crawler defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; rulings-crawler/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn request_delay() -> u64 {
        0
    }
    pub fn max_concurrent() -> usize {
        10
    }
    pub fn partition_concurrency() -> usize {
        1
    }

    // Partition defaults
    pub fn years() -> Vec<i32> {
        Vec::new()
    }

    // Output defaults
    pub fn output_dir() -> PathBuf {
        PathBuf::from("output")
    }
    pub fn file_prefix() -> String {
        "rulings".into()
    }
    pub fn chunk_threshold() -> u64 {
        2 * 1024 * 1024
    }

    // Sink defaults
    pub fn database() -> PathBuf {
        PathBuf::from("output/records.sqlite3")
    }
}
