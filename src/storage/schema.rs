//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the KB-Harvest database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Category tree; the root category has no parent
CREATE TABLE IF NOT EXISTS categories (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT,
    parent_id TEXT REFERENCES categories(id),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_categories_parent ON categories(parent_id);

-- Harvested articles, deduplicated by canonical URL
CREATE TABLE IF NOT EXISTS articles (
    id TEXT PRIMARY KEY,
    category_id TEXT NOT NULL REFERENCES categories(id),
    name TEXT NOT NULL,
    body TEXT NOT NULL,
    url TEXT NOT NULL UNIQUE,
    tags TEXT NOT NULL DEFAULT '[]',
    author TEXT,
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_articles_category ON articles(category_id);

-- Crawl jobs and their run bookkeeping
CREATE TABLE IF NOT EXISTS crawl_jobs (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    sitemap_url TEXT NOT NULL,
    map_url TEXT NOT NULL,
    user_agent TEXT NOT NULL,
    max_depth INTEGER NOT NULL,
    allowed_domains TEXT NOT NULL DEFAULT '[]',
    default_category TEXT NOT NULL,
    crawl_interval TEXT NOT NULL,
    nav_selector TEXT NOT NULL,
    breadcrumb_selectors TEXT NOT NULL DEFAULT '[]',
    status TEXT NOT NULL,
    is_first_run INTEGER NOT NULL DEFAULT 1,
    last_run TEXT,
    next_run TEXT,
    errors TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_crawl_jobs_status ON crawl_jobs(status);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
