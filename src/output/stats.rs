//! Statistics generation from the knowledge base
//!
//! This module provides functionality for extracting and displaying
//! harvest statistics from the storage layer.

use crate::state::JobStatus;
use crate::storage::{Storage, StorageResult};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Article counts shown per category before the list is truncated
const TOP_CATEGORIES: usize = 15;

/// Snapshot of one job record
#[derive(Debug, Clone)]
pub struct JobSummary {
    pub name: String,
    pub status: JobStatus,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub error_count: usize,
    pub last_error: Option<String>,
}

/// Knowledge base statistics summary
#[derive(Debug, Clone)]
pub struct HarvestStatistics {
    pub total_categories: u64,
    pub total_articles: u64,

    /// Article counts per category name, largest first
    pub articles_by_category: Vec<(String, u64)>,

    /// Job counts per status; statuses with no jobs are omitted
    pub jobs_by_status: BTreeMap<String, u64>,

    pub jobs: Vec<JobSummary>,
}

/// Loads statistics from storage
pub fn load_statistics(storage: &dyn Storage) -> StorageResult<HarvestStatistics> {
    let total_categories = storage.count_categories()?;
    let total_articles = storage.count_articles()?;
    let articles_by_category = storage.count_articles_by_category()?;

    let jobs: Vec<JobSummary> = storage
        .list_jobs()?
        .into_iter()
        .map(|job| JobSummary {
            error_count: job.errors.len(),
            last_error: job.errors.last().cloned(),
            name: job.name,
            status: job.status,
            last_run: job.last_run,
            next_run: job.next_run,
        })
        .collect();

    let mut jobs_by_status = BTreeMap::new();
    for status in JobStatus::all() {
        let count = jobs.iter().filter(|job| job.status == status).count() as u64;
        if count > 0 {
            jobs_by_status.insert(status.to_string(), count);
        }
    }

    Ok(HarvestStatistics {
        total_categories,
        total_articles,
        articles_by_category,
        jobs_by_status,
        jobs,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &HarvestStatistics) {
    println!("=== Knowledge Base Statistics ===\n");

    println!("Overview:");
    println!("  Categories: {}", stats.total_categories);
    println!("  Articles: {}", stats.total_articles);
    println!();

    if !stats.articles_by_category.is_empty() {
        println!("Articles by Category:");
        for (name, count) in stats.articles_by_category.iter().take(TOP_CATEGORIES) {
            let percentage = if stats.total_articles > 0 {
                (*count as f64 / stats.total_articles as f64) * 100.0
            } else {
                0.0
            };
            println!("  {}: {} ({:.1}%)", name, count, percentage);
        }
        let hidden = stats.articles_by_category.len().saturating_sub(TOP_CATEGORIES);
        if hidden > 0 {
            println!("  ... and {} more categories", hidden);
        }
        println!();
    }

    if !stats.jobs_by_status.is_empty() {
        println!("Jobs by Status:");
        for (status, count) in &stats.jobs_by_status {
            println!("  {}: {}", status, count);
        }
        println!();
    }

    for job in &stats.jobs {
        println!("Job '{}':", job.name);
        println!("  Status: {}", job.status);
        println!("  Last run: {}", format_time(job.last_run));
        println!("  Next run: {}", format_time(job.next_run));
        println!("  Recorded errors: {}", job.error_count);
        if let Some(error) = &job.last_error {
            println!("  Latest error: {}", error);
        }
        println!();
    }
}

fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "never".to_string())
}
