//! Sitemap discovery
//!
//! Fetches a `urlset` document and turns each `<url>` into a `SitemapEntry`.

use crate::HarvestError;
use quick_xml::de::from_str;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

/// One `<url>` entry of a sitemap
#[derive(Debug, Clone, PartialEq)]
pub struct SitemapEntry {
    pub loc: String,
    pub last_modified: Option<String>,
    pub change_frequency: Option<String>,
    pub priority: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename = "urlset")]
struct UrlSet {
    #[serde(rename = "url", default)]
    urls: Vec<UrlEntry>,
}

#[derive(Debug, Deserialize)]
struct UrlEntry {
    loc: String,
    #[serde(default)]
    lastmod: Option<String>,
    #[serde(default)]
    changefreq: Option<String>,
    #[serde(default)]
    priority: Option<String>,
}

impl From<UrlEntry> for SitemapEntry {
    fn from(entry: UrlEntry) -> Self {
        Self {
            loc: entry.loc.trim().to_string(),
            last_modified: non_empty(entry.lastmod),
            change_frequency: non_empty(entry.changefreq),
            // A bad priority only loses the hint, not the page
            priority: entry.priority.and_then(|p| p.trim().parse().ok()),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parses sitemap XML, preserving document order
///
/// A `priority` that is not a number is dropped rather than failing the
/// whole document.
pub fn parse_sitemap(xml: &str) -> Result<Vec<SitemapEntry>, quick_xml::DeError> {
    let set: UrlSet = from_str(xml)?;
    Ok(set.urls.into_iter().map(SitemapEntry::from).collect())
}

/// Fetches and parses sitemaps
///
/// No retries: the caller decides whether a failure aborts the run.
#[derive(Debug, Clone)]
pub struct SitemapReader {
    client: Client,
}

impl SitemapReader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Fetches `url` and returns its entries in document order
    ///
    /// # Arguments
    ///
    /// * `url` - Location of the sitemap XML
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<SitemapEntry>)` - Every `<url>` entry, in document order
    /// * `Err(HarvestError::SitemapFetch)` - Transport failure or non-2xx status
    /// * `Err(HarvestError::SitemapParse)` - The body is not sitemap XML
    ///
    /// Nothing is retried; the caller decides whether the run can go on.
    pub async fn fetch(&self, url: &str) -> Result<Vec<SitemapEntry>, HarvestError> {
        let fetch_error = |message: String| HarvestError::SitemapFetch {
            url: url.to_string(),
            message,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(format!("HTTP {}", status.as_u16())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        let entries = parse_sitemap(&body).map_err(|e| HarvestError::SitemapParse {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        debug!("Sitemap {} lists {} URLs", url, entries.len());
        Ok(entries)
    }
}
