//! Storage traits and error types
//!
//! This module defines the persistence gateway contract the crawler writes
//! through, and its error type.

use crate::state::CrawlJob;
use crate::storage::{ArticleRecord, CategoryRecord};
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Writes are upserts; the crawler never retries a failed call itself.
pub trait Storage {
    // ===== Categories =====

    /// Inserts a category or overwrites the row with the same id
    fn upsert_category(&mut self, category: &CategoryRecord) -> StorageResult<()>;

    /// Gets a category by id
    fn get_category(&self, id: Uuid) -> StorageResult<Option<CategoryRecord>>;

    /// Lists every category, oldest first
    fn list_categories(&self) -> StorageResult<Vec<CategoryRecord>>;

    /// Counts all categories
    fn count_categories(&self) -> StorageResult<u64>;

    // ===== Articles =====

    /// Inserts an article or updates the row with the same URL in place
    ///
    /// On conflict the category, title, body, tags, author, metadata and update
    /// timestamp are overwritten; the original id and creation timestamp are kept.
    fn upsert_article(&mut self, article: &ArticleRecord) -> StorageResult<()>;

    /// Gets an article by its canonical URL
    fn get_article_by_url(&self, url: &str) -> StorageResult<Option<ArticleRecord>>;

    /// Counts all articles
    fn count_articles(&self) -> StorageResult<u64>;

    /// Article counts per category name, largest first
    fn count_articles_by_category(&self) -> StorageResult<Vec<(String, u64)>>;

    // ===== Crawl jobs =====

    /// Inserts a job or overwrites the row with the same id
    fn upsert_job(&mut self, job: &CrawlJob) -> StorageResult<()>;

    /// Gets a job by id
    fn get_job(&self, id: Uuid) -> StorageResult<Option<CrawlJob>>;

    /// Gets a job by its unique name
    fn get_job_by_name(&self, name: &str) -> StorageResult<Option<CrawlJob>>;

    /// Lists every job ordered by name
    fn list_jobs(&self) -> StorageResult<Vec<CrawlJob>>;

    /// Moves jobs left `Running` by a previous process to `Stopped`
    ///
    /// Returns the number of jobs reset.
    fn reset_interrupted_jobs(&mut self) -> StorageResult<usize>;
}
