//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::state::{CrawlJob, JobStatus};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageResult};
use crate::storage::{ArticleRecord, CategoryRecord};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use uuid::Uuid;

const CATEGORY_COLUMNS: &str = "id, name, description, parent_id, created_at, updated_at";

const ARTICLE_COLUMNS: &str =
    "id, category_id, name, body, url, tags, author, metadata, created_at, updated_at";

const JOB_COLUMNS: &str = "id, name, sitemap_url, map_url, user_agent, max_depth, \
     allowed_domains, default_category, crawl_interval, nav_selector, breadcrumb_selectors, \
     status, is_first_run, last_run, next_run, errors, created_at, updated_at";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens or creates the database file at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Connection with WAL and foreign keys enabled and the schema in place
    /// * `Err(StorageError)` - Failed to open the file or apply the schema
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    ///
    /// Nothing survives the process.
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn count(&self, sql: &str) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn query_job(&self, where_clause: &str, key: &str) -> StorageResult<Option<CrawlJob>> {
        let sql = format!("SELECT {} FROM crawl_jobs WHERE {}", JOB_COLUMNS, where_clause);
        let job = self
            .conn
            .query_row(&sql, params![key], job_from_row)
            .optional()?;
        Ok(job)
    }
}

impl Storage for SqliteStorage {
    // ===== Categories =====

    fn upsert_category(&mut self, category: &CategoryRecord) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO categories (id, name, description, parent_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                parent_id = excluded.parent_id,
                updated_at = excluded.updated_at",
            params![
                category.id.to_string(),
                category.name,
                category.description,
                category.parent_id.map(|id| id.to_string()),
                category.created_at.to_rfc3339(),
                category.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn get_category(&self, id: Uuid) -> StorageResult<Option<CategoryRecord>> {
        let sql = format!("SELECT {} FROM categories WHERE id = ?1", CATEGORY_COLUMNS);
        let category = self
            .conn
            .query_row(&sql, params![id.to_string()], category_from_row)
            .optional()?;
        Ok(category)
    }

    fn list_categories(&self) -> StorageResult<Vec<CategoryRecord>> {
        let sql = format!(
            "SELECT {} FROM categories ORDER BY created_at, rowid",
            CATEGORY_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let categories = stmt
            .query_map([], category_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(categories)
    }

    fn count_categories(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM categories")
    }

    // ===== Articles =====

    fn upsert_article(&mut self, article: &ArticleRecord) -> StorageResult<()> {
        let tags = serde_json::to_string(&article.tags)?;
        let metadata = serde_json::to_string(&article.metadata)?;

        self.conn.execute(
            "INSERT INTO articles
                (id, category_id, name, body, url, tags, author, metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(url) DO UPDATE SET
                category_id = excluded.category_id,
                name = excluded.name,
                body = excluded.body,
                tags = excluded.tags,
                author = excluded.author,
                metadata = excluded.metadata,
                updated_at = excluded.updated_at",
            params![
                article.id.to_string(),
                article.category_id.to_string(),
                article.title,
                article.body,
                article.url,
                tags,
                article.author,
                metadata,
                article.created_at.to_rfc3339(),
                article.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn get_article_by_url(&self, url: &str) -> StorageResult<Option<ArticleRecord>> {
        let sql = format!("SELECT {} FROM articles WHERE url = ?1", ARTICLE_COLUMNS);
        let article = self
            .conn
            .query_row(&sql, params![url], article_from_row)
            .optional()?;
        Ok(article)
    }

    fn count_articles(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM articles")
    }

    fn count_articles_by_category(&self) -> StorageResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT c.name, COUNT(a.id) AS total
             FROM articles a
             JOIN categories c ON c.id = a.category_id
             GROUP BY c.id
             ORDER BY total DESC, c.name",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    // ===== Crawl jobs =====

    fn upsert_job(&mut self, job: &CrawlJob) -> StorageResult<()> {
        let allowed_domains = serde_json::to_string(&job.allowed_domains)?;
        let breadcrumb_selectors = serde_json::to_string(&job.breadcrumb_selectors)?;
        let errors = serde_json::to_string(&job.errors)?;

        self.conn.execute(
            "INSERT INTO crawl_jobs
                (id, name, sitemap_url, map_url, user_agent, max_depth, allowed_domains,
                 default_category, crawl_interval, nav_selector, breadcrumb_selectors,
                 status, is_first_run, last_run, next_run, errors, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                sitemap_url = excluded.sitemap_url,
                map_url = excluded.map_url,
                user_agent = excluded.user_agent,
                max_depth = excluded.max_depth,
                allowed_domains = excluded.allowed_domains,
                default_category = excluded.default_category,
                crawl_interval = excluded.crawl_interval,
                nav_selector = excluded.nav_selector,
                breadcrumb_selectors = excluded.breadcrumb_selectors,
                status = excluded.status,
                is_first_run = excluded.is_first_run,
                last_run = excluded.last_run,
                next_run = excluded.next_run,
                errors = excluded.errors,
                updated_at = excluded.updated_at",
            params![
                job.id.to_string(),
                job.name,
                job.sitemap_url,
                job.map_url,
                job.user_agent,
                job.max_depth,
                allowed_domains,
                job.default_category,
                job.crawl_interval,
                job.nav_selector,
                breadcrumb_selectors,
                job.status.to_db_string(),
                job.is_first_run,
                job.last_run.map(|t| t.to_rfc3339()),
                job.next_run.map(|t| t.to_rfc3339()),
                errors,
                job.created_at.to_rfc3339(),
                job.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn get_job(&self, id: Uuid) -> StorageResult<Option<CrawlJob>> {
        self.query_job("id = ?1", &id.to_string())
    }

    fn get_job_by_name(&self, name: &str) -> StorageResult<Option<CrawlJob>> {
        self.query_job("name = ?1", name)
    }

    fn list_jobs(&self) -> StorageResult<Vec<CrawlJob>> {
        let sql = format!("SELECT {} FROM crawl_jobs ORDER BY name", JOB_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let jobs = stmt
            .query_map([], job_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    fn reset_interrupted_jobs(&mut self) -> StorageResult<usize> {
        let now = Utc::now().to_rfc3339();
        let reset = self.conn.execute(
            "UPDATE crawl_jobs SET status = ?1, updated_at = ?2 WHERE status = ?3",
            params![
                JobStatus::Stopped.to_db_string(),
                now,
                JobStatus::Running.to_db_string()
            ],
        )?;
        Ok(reset)
    }
}

fn category_from_row(row: &Row<'_>) -> rusqlite::Result<CategoryRecord> {
    let parent_id: Option<String> = row.get(3)?;
    Ok(CategoryRecord {
        id: uuid_column(row, 0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        parent_id: parent_id.map(|id| parse_uuid(3, &id)).transpose()?,
        created_at: time_column(row, 4)?,
        updated_at: time_column(row, 5)?,
    })
}

fn article_from_row(row: &Row<'_>) -> rusqlite::Result<ArticleRecord> {
    Ok(ArticleRecord {
        id: uuid_column(row, 0)?,
        category_id: uuid_column(row, 1)?,
        title: row.get(2)?,
        body: row.get(3)?,
        url: row.get(4)?,
        tags: json_column(row, 5)?,
        author: row.get(6)?,
        metadata: json_column(row, 7)?,
        created_at: time_column(row, 8)?,
        updated_at: time_column(row, 9)?,
    })
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<CrawlJob> {
    let status: String = row.get(11)?;
    let last_run: Option<String> = row.get(13)?;
    let next_run: Option<String> = row.get(14)?;

    Ok(CrawlJob {
        id: uuid_column(row, 0)?,
        name: row.get(1)?,
        sitemap_url: row.get(2)?,
        map_url: row.get(3)?,
        user_agent: row.get(4)?,
        max_depth: row.get(5)?,
        allowed_domains: json_column(row, 6)?,
        default_category: row.get(7)?,
        crawl_interval: row.get(8)?,
        nav_selector: row.get(9)?,
        breadcrumb_selectors: json_column(row, 10)?,
        status: JobStatus::from_db_string(&status).unwrap_or(JobStatus::Stopped),
        is_first_run: row.get(12)?,
        last_run: last_run.map(|t| parse_time(13, &t)).transpose()?,
        next_run: next_run.map(|t| parse_time(14, &t)).transpose()?,
        errors: json_column(row, 15)?,
        created_at: time_column(row, 16)?,
        updated_at: time_column(row, 17)?,
    })
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn parse_uuid(idx: usize, value: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| conversion_error(idx, e))
}

fn parse_time(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn uuid_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    parse_uuid(idx, &row.get::<_, String>(idx)?)
}

fn time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    parse_time(idx, &row.get::<_, String>(idx)?)
}

fn json_column<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    serde_json::from_str(&row.get::<_, String>(idx)?).map_err(|e| conversion_error(idx, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JobConfig;
    use serde_json::json;

    fn storage_with_root() -> (SqliteStorage, CategoryRecord) {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let root = CategoryRecord::new_root("Docs");
        storage.upsert_category(&root).unwrap();
        (storage, root)
    }

    fn article(category: Uuid, url: &str, body: &str) -> ArticleRecord {
        let now = Utc::now();
        ArticleRecord {
            id: Uuid::new_v4(),
            category_id: category,
            title: "Install".to_string(),
            body: body.to_string(),
            url: url.to_string(),
            tags: vec!["setup".to_string()],
            author: Some("Docs Team".to_string()),
            metadata: json!({ "categoryPath": ["Docs"] }),
            created_at: now,
            updated_at: now,
        }
    }

    fn job_config(name: &str) -> JobConfig {
        JobConfig {
            name: name.to_string(),
            sitemap_url: "https://docs.example.com/Content/Sitemap.xml".to_string(),
            map_url: String::new(),
            user_agent: "TestBot".to_string(),
            max_depth: 10,
            allowed_domains: vec!["docs.example.com".to_string()],
            default_category: "Docs".to_string(),
            crawl_interval: "1h".to_string(),
            nav_selector: "nav.sidebarNav".to_string(),
            breadcrumb_selectors: vec![".breadcrumbs li".to_string()],
        }
    }

    #[test]
    fn test_create_in_memory() {
        let storage = SqliteStorage::open_in_memory();
        assert!(storage.is_ok());
    }

    #[test]
    fn test_category_roundtrip() {
        let (mut storage, root) = storage_with_root();
        let child = CategoryRecord::new_child("Setup", root.id, "Category: Docs:Setup".into());
        storage.upsert_category(&child).unwrap();

        let loaded = storage.get_category(child.id).unwrap().unwrap();
        assert_eq!(loaded.name, "Setup");
        assert_eq!(loaded.parent_id, Some(root.id));
        assert_eq!(storage.count_categories().unwrap(), 2);
        assert!(storage.get_category(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_category_requires_existing_parent() {
        let (mut storage, _) = storage_with_root();
        let orphan = CategoryRecord::new_child("Lost", Uuid::new_v4(), String::new());
        assert!(storage.upsert_category(&orphan).is_err());
    }

    #[test]
    fn test_article_upsert_keeps_one_row_per_url() {
        let (mut storage, root) = storage_with_root();
        let url = "https://docs.example.com/install.htm";

        let first = article(root.id, url, "<p>v1</p>");
        storage.upsert_article(&first).unwrap();

        let second = article(root.id, url, "<p>v2</p>");
        storage.upsert_article(&second).unwrap();

        assert_eq!(storage.count_articles().unwrap(), 1);
        let stored = storage.get_article_by_url(url).unwrap().unwrap();
        assert_eq!(stored.body, "<p>v2</p>");
        assert_eq!(stored.id, first.id);
        assert_eq!(stored.tags, vec!["setup".to_string()]);
        assert_eq!(stored.metadata["categoryPath"][0], "Docs");
    }

    #[test]
    fn test_article_requires_existing_category() {
        let (mut storage, _) = storage_with_root();
        let stray = article(Uuid::new_v4(), "https://docs.example.com/x.htm", "<p>x</p>");
        assert!(storage.upsert_article(&stray).is_err());
    }

    #[test]
    fn test_count_articles_by_category() {
        let (mut storage, root) = storage_with_root();
        let child = CategoryRecord::new_child("Setup", root.id, String::new());
        storage.upsert_category(&child).unwrap();

        storage
            .upsert_article(&article(child.id, "https://docs.example.com/a.htm", "a"))
            .unwrap();
        storage
            .upsert_article(&article(child.id, "https://docs.example.com/b.htm", "b"))
            .unwrap();
        storage
            .upsert_article(&article(root.id, "https://docs.example.com/c.htm", "c"))
            .unwrap();

        let counts = storage.count_articles_by_category().unwrap();
        assert_eq!(
            counts,
            vec![("Setup".to_string(), 2), ("Docs".to_string(), 1)]
        );
    }

    #[test]
    fn test_job_roundtrip() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let mut job = CrawlJob::from_config(&job_config("docs"));
        job.mark_completed(Utc::now(), vec!["page failed".to_string()]);
        storage.upsert_job(&job).unwrap();

        let by_name = storage.get_job_by_name("docs").unwrap().unwrap();
        assert_eq!(by_name.id, job.id);
        assert_eq!(by_name.status, JobStatus::Completed);
        assert!(!by_name.is_first_run);
        assert_eq!(by_name.errors, vec!["page failed".to_string()]);
        assert_eq!(by_name.allowed_domains, job.allowed_domains);
        assert!(by_name.next_run.is_some());

        let by_id = storage.get_job(job.id).unwrap().unwrap();
        assert_eq!(by_id.name, "docs");
        assert!(storage.get_job_by_name("missing").unwrap().is_none());
    }

    #[test]
    fn test_list_jobs_ordered_by_name() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        storage
            .upsert_job(&CrawlJob::from_config(&job_config("zeta")))
            .unwrap();
        storage
            .upsert_job(&CrawlJob::from_config(&job_config("alpha")))
            .unwrap();

        let names: Vec<_> = storage
            .list_jobs()
            .unwrap()
            .into_iter()
            .map(|j| j.name)
            .collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_reset_interrupted_jobs() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let mut running = CrawlJob::from_config(&job_config("running"));
        running.mark_running(Utc::now());
        storage.upsert_job(&running).unwrap();
        storage
            .upsert_job(&CrawlJob::from_config(&job_config("idle")))
            .unwrap();

        assert_eq!(storage.reset_interrupted_jobs().unwrap(), 1);
        let job = storage.get_job(running.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Stopped);
        assert_eq!(
            storage
                .get_job_by_name("idle")
                .unwrap()
                .unwrap()
                .status,
            JobStatus::Scheduled
        );
    }

    #[test]
    fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.db");

        {
            let mut storage = SqliteStorage::new(&path).unwrap();
            storage
                .upsert_category(&CategoryRecord::new_root("Docs"))
                .unwrap();
        }

        let storage = SqliteStorage::new(&path).unwrap();
        assert_eq!(storage.count_categories().unwrap(), 1);
    }
}
