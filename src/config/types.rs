use serde::Deserialize;

/// Main configuration structure for KB-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    pub output: OutputConfig,
    #[serde(default, rename = "job")]
    pub jobs: Vec<JobConfig>,
}

/// Process-wide crawl limits shared by every job
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    /// Maximum number of crawl runs executing at once, across all jobs
    #[serde(rename = "max-concurrent-crawls", default = "default_max_concurrent_crawls")]
    pub max_concurrent_crawls: u32,

    /// Maximum number of in-flight page fetches within a single run
    #[serde(rename = "max-concurrent-fetches", default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: u32,

    /// Upper bound of the randomized per-domain delay between requests (milliseconds)
    #[serde(rename = "random-delay-ms", default = "default_random_delay_ms")]
    pub random_delay_ms: u64,

    /// Network timeout for a single fetch (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Wall-clock bound for a whole run, from category mapping through dispatch (seconds)
    #[serde(rename = "run-timeout-secs", default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,

    /// How discovered categories are parented when persisted
    #[serde(rename = "category-hierarchy", default)]
    pub category_hierarchy: CategoryHierarchy,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_concurrent_crawls: default_max_concurrent_crawls(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            random_delay_ms: default_random_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            run_timeout_secs: default_run_timeout_secs(),
            category_hierarchy: CategoryHierarchy::default(),
        }
    }
}

/// Parent assignment for categories discovered in the navigation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryHierarchy {
    /// Every discovered category is parented to the root category
    #[default]
    Flat,
    /// Each category is parented to the category registered under its path prefix
    Nested,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// One crawl job: a documentation site and how to categorize it
#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    /// Unique job name, used to find the persisted job record
    pub name: String,

    /// Sitemap XML listing every page to harvest
    #[serde(rename = "sitemap-url")]
    pub sitemap_url: String,

    /// Page carrying the navigation tree; derived from the sitemap URL when empty
    #[serde(rename = "map-url", default)]
    pub map_url: String,

    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum link depth; sitemap pages are visited at depth one and links are never followed
    #[serde(rename = "max-depth", default = "default_max_depth")]
    pub max_depth: u32,

    /// Domain patterns (e.g., "example.com" or "*.example.com"); empty allows every domain
    #[serde(rename = "allowed-domains", default)]
    pub allowed_domains: Vec<String>,

    /// Name of the root category every path starts from
    #[serde(rename = "default-category")]
    pub default_category: String,

    /// Go-style duration between scheduled runs (e.g., "24h", "1h30m")
    #[serde(rename = "crawl-interval", default = "default_crawl_interval")]
    pub crawl_interval: String,

    /// Selector of the navigation container on the map page
    #[serde(rename = "nav-selector", default = "default_nav_selector")]
    pub nav_selector: String,

    /// Selectors whose text forms a page's breadcrumb trail, in order
    #[serde(rename = "breadcrumb-selectors", default = "default_breadcrumb_selectors")]
    pub breadcrumb_selectors: Vec<String>,
}

fn default_max_concurrent_crawls() -> u32 {
    5
}

fn default_max_concurrent_fetches() -> u32 {
    2
}

fn default_random_delay_ms() -> u64 {
    2000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_run_timeout_secs() -> u64 {
    6 * 60 * 60
}

pub(crate) fn default_user_agent() -> String {
    "KB Crawler Bot v1.0".to_string()
}

pub(crate) fn default_max_depth() -> u32 {
    10
}

pub(crate) fn default_crawl_interval() -> String {
    "24h".to_string()
}

pub(crate) fn default_nav_selector() -> String {
    "nav.sidebarNav".to_string()
}

pub(crate) fn default_breadcrumb_selectors() -> Vec<String> {
    vec![
        ".sidenav li.is-selected".to_string(),
        ".breadcrumbs li".to_string(),
        ".navigation .selected".to_string(),
        "nav .mc-breadcrumb li".to_string(),
    ]
}
