//! KB-Harvest main entry point
//!
//! This is the command-line interface for the KB-Harvest documentation harvester.

use anyhow::{bail, Context};
use chrono::Utc;
use clap::Parser;
use kb_harvest::config::{load_config_with_hash, Config, JobConfig};
use kb_harvest::crawler::{JobRunner, RunOutcome};
use kb_harvest::output::{load_statistics, print_run_summary, print_statistics};
use kb_harvest::state::{parse_interval, CrawlJob};
use kb_harvest::storage::{SharedStorage, SqliteStorage, Storage};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// How long watch mode sleeps when no job has a next run scheduled
const IDLE_POLL: Duration = Duration::from_secs(60);

/// KB-Harvest: a documentation-site harvester
///
/// KB-Harvest reads each job's sitemap, maps the site's navigation into a
/// category tree, politely fetches every page and upserts the extracted
/// articles into a SQLite knowledge base.
#[derive(Parser, Debug)]
#[command(name = "kb-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A documentation-site harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Only run the job with this name
    #[arg(long, value_name = "NAME")]
    job: Option<String>,

    /// Keep running and re-crawl each job when its interval elapses
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    watch: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let jobs = select_jobs(&config, cli.job.as_deref())?;

    if cli.dry_run {
        handle_dry_run(&config, &jobs);
        Ok(())
    } else if cli.stats {
        handle_stats(&config)
    } else {
        handle_crawl(&config, &jobs, cli.watch).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("kb_harvest=info,warn"),
            1 => EnvFilter::new("kb_harvest=debug,info"),
            2 => EnvFilter::new("kb_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn select_jobs<'a>(config: &'a Config, only: Option<&str>) -> anyhow::Result<Vec<&'a JobConfig>> {
    let jobs: Vec<&JobConfig> = config
        .jobs
        .iter()
        .filter(|job| only.map_or(true, |name| job.name == name))
        .collect();

    if jobs.is_empty() {
        match only {
            Some(name) => bail!("No job named '{}' in the configuration", name),
            None => bail!("The configuration defines no [[job]] entries"),
        }
    }

    Ok(jobs)
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config, jobs: &[&JobConfig]) {
    println!("=== KB-Harvest Dry Run ===\n");

    println!("Runtime:");
    println!(
        "  Max concurrent crawls: {}",
        config.runtime.max_concurrent_crawls
    );
    println!(
        "  Max concurrent fetches per crawl: {}",
        config.runtime.max_concurrent_fetches
    );
    println!("  Random delay: up to {}ms", config.runtime.random_delay_ms);
    println!(
        "  Request timeout: {}s",
        config.runtime.request_timeout_secs
    );
    println!("  Run timeout: {}s", config.runtime.run_timeout_secs);
    println!(
        "  Category hierarchy: {:?}",
        config.runtime.category_hierarchy
    );

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\nJobs ({}):", jobs.len());
    for job in jobs {
        let record = CrawlJob::from_config(job);
        println!("  - {}", job.name);
        println!("    Sitemap: {}", job.sitemap_url);
        println!("    Navigation: {}", record.resolved_map_url());
        println!("    Root category: {}", job.default_category);
        println!("    User agent: {}", job.user_agent);
        if job.allowed_domains.is_empty() {
            println!("    Allowed domains: any");
        } else {
            println!("    Allowed domains: {}", job.allowed_domains.join(", "));
        }
        match parse_interval(&job.crawl_interval) {
            Ok(interval) => println!("    Interval: {} ({:?})", job.crawl_interval, interval),
            Err(_) => println!("    Interval: {}", job.crawl_interval),
        }
        println!("    Navigation selector: {}", job.nav_selector);
        println!(
            "    Breadcrumb selectors: {}",
            job.breadcrumb_selectors.join(" | ")
        );
    }

    println!("\n✓ Configuration is valid");
    println!("✓ Would crawl {} job(s)", jobs.len());
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the crawl modes: one pass over the jobs, or a watch loop
async fn handle_crawl(config: &Config, jobs: &[&JobConfig], watch: bool) -> anyhow::Result<()> {
    let mut storage = SqliteStorage::new(Path::new(&config.output.database_path))
        .with_context(|| format!("Failed to open database {}", config.output.database_path))?;

    let reset = storage.reset_interrupted_jobs()?;
    if reset > 0 {
        tracing::warn!("Marked {} interrupted job(s) as stopped", reset);
    }

    let storage: SharedStorage<SqliteStorage> = Arc::new(Mutex::new(storage));
    let runner = JobRunner::new(storage, config.runtime.clone());

    let mut names_by_id = HashMap::new();
    for job in jobs {
        let record = runner.sync_job(job)?;
        names_by_id.insert(record.id, record.name);
    }
    let names: Vec<String> = names_by_id.values().cloned().collect();

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, finishing in-flight pages");
                cancel.cancel();
            }
        });
    }

    if !watch {
        let ids = names_by_id.keys().copied().collect();
        let results = run_pass(&runner, ids, &names_by_id, &cancel).await;
        let failed = results
            .iter()
            .filter(|(_, outcome)| matches!(outcome, RunOutcome::Failed(_)))
            .count();
        if failed > 0 {
            bail!("{} job(s) failed", failed);
        }
        return Ok(());
    }

    tracing::info!("Watching {} job(s)", names.len());
    loop {
        let due = runner.due_jobs(&names, Utc::now())?;
        if !due.is_empty() {
            run_pass(&runner, due, &names_by_id, &cancel).await;
        }
        if cancel.is_cancelled() {
            break;
        }

        let wait = match runner.next_wakeup(&names)? {
            Some(next) => (next - Utc::now()).to_std().unwrap_or(Duration::ZERO),
            None => IDLE_POLL,
        };
        tracing::info!("Next run in {}s", wait.as_secs());

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }
    }

    tracing::info!("Watch stopped");
    Ok(())
}

async fn run_pass(
    runner: &JobRunner<SqliteStorage>,
    ids: Vec<Uuid>,
    names_by_id: &HashMap<Uuid, String>,
    cancel: &CancellationToken,
) -> Vec<(String, RunOutcome)> {
    let mut results = Vec::new();
    for (id, result) in runner.run_jobs(ids, cancel).await {
        let name = names_by_id
            .get(&id)
            .cloned()
            .unwrap_or_else(|| id.to_string());
        match result {
            Ok(outcome) => results.push((name, outcome)),
            Err(e) => {
                tracing::error!("Job '{}' could not be run: {}", name, e);
                results.push((name, RunOutcome::Failed(e.to_string())));
            }
        }
    }

    results.sort_by(|a, b| a.0.cmp(&b.0));
    print_run_summary(&results);
    results
}
