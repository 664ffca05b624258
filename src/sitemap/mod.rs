//! Sitemap discovery
//!
//! Reads a standard `urlset` sitemap into an ordered list of candidate page URLs.

mod reader;

pub use reader::{parse_sitemap, SitemapEntry, SitemapReader};
