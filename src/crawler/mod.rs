//! Crawler module for page fetching and run orchestration
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching
//! - Politeness limits (bounded parallelism, per-domain random delay)
//! - Concurrent dispatch of sitemap pages
//! - Run-level orchestration and job bookkeeping

mod dispatcher;
mod fetcher;
mod politeness;
mod runner;

pub use dispatcher::{CrawlDispatcher, DispatchOutcome, DispatchReport, DispatchSettings};
pub use fetcher::{build_http_client, HttpFetcher, PageFetcher};
pub use politeness::Politeness;
pub use runner::{JobRunner, RunOutcome};
