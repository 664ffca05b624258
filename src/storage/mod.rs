//! Storage module for persisting harvested data
//!
//! This module is the persistence gateway of the crawler:
//! - Category upserts keyed by id
//! - Article upserts keyed by canonical URL
//! - Crawl job records and their run bookkeeping
//! - Counters for the operator statistics view

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Storage handle shared by the mapper, the dispatcher tasks and the job runner
pub type SharedStorage<S> = Arc<Mutex<S>>;

/// Locks shared storage, recovering the guard if a previous holder panicked
///
/// Every write is a single statement, so a panic mid-call cannot leave the
/// connection half-updated.
pub fn lock<S>(storage: &Mutex<S>) -> MutexGuard<'_, S> {
    storage.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A node of the category tree
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryRecord {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// `None` for the root category
    pub parent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CategoryRecord {
    /// Creates a root category with a fresh id
    pub fn new_root(name: &str) -> Self {
        Self::new(name, None, Some("Root category".to_string()))
    }

    /// Creates a category beneath `parent_id` with a fresh id
    pub fn new_child(name: &str, parent_id: Uuid, description: String) -> Self {
        Self::new(name, Some(parent_id), Some(description))
    }

    fn new(name: &str, parent_id: Option<Uuid>, description: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description,
            parent_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if the category has no parent
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// A harvested documentation page
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleRecord {
    pub id: Uuid,
    pub category_id: Uuid,
    pub title: String,
    pub body: String,
    /// Canonical page URL; unique across the table
    pub url: String,
    pub tags: Vec<String>,
    pub author: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
