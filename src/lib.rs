//! KB-Harvest: a documentation-site harvester
//!
//! This crate discovers documentation pages through a site's sitemap, maps the site's
//! navigation into a category tree, fetches every page politely, extracts a normalized
//! article from each one and upserts it into a SQLite knowledge base.

pub mod category;
pub mod config;
pub mod crawler;
pub mod extract;
pub mod output;
pub mod sitemap;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for run-level (fatal) failures
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to fetch sitemap {url}: {message}")]
    SitemapFetch { url: String, message: String },

    #[error("Failed to parse sitemap {url}: {message}")]
    SitemapParse { url: String, message: String },

    #[error("Failed to fetch navigation page {url}: {message}")]
    NavigationFetch { url: String, message: String },

    #[error("Failed to create root category '{name}': {source}")]
    RootCategory {
        name: String,
        source: storage::StorageError,
    },

    #[error("Category index is sealed; no categories may be added once dispatch starts")]
    IndexSealed,

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),
}

/// Per-page failures; logged and accumulated, never fatal for a run
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Fetch failed for {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("Parse failed for {url}: {message}")]
    Parse { url: String, message: String },

    #[error("Incomplete content at {url} (title found: {has_title}, body found: {has_body})")]
    IncompleteContent {
        url: String,
        has_title: bool,
        has_body: bool,
    },

    #[error("No category for {url}: neither '{path}' nor the default category is indexed")]
    CategoryResolution { url: String, path: String },

    #[error("Failed to store article {url}: {source}")]
    Storage {
        url: String,
        source: storage::StorageError,
    },
}

impl CrawlError {
    /// Short machine-friendly kind, used for the run report tallies
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fetch { .. } => "fetch",
            Self::Parse { .. } => "parse",
            Self::IncompleteContent { .. } => "incomplete_content",
            Self::CategoryResolution { .. } => "category_resolution",
            Self::Storage { .. } => "storage",
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),

    #[error("Invalid duration '{0}'")]
    InvalidDuration(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for run-level operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use category::{CategoryIndex, CategoryPath};
pub use config::Config;
pub use crawler::{CrawlDispatcher, DispatchOutcome, JobRunner, RunOutcome};
pub use extract::{extract, ParsedContent};
pub use state::{CrawlJob, JobStatus};
pub use url::{extract_domain, is_allowed_domain, normalize_url};
