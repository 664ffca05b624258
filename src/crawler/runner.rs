//! Job runner - run-level orchestration
//!
//! A run of one job goes through:
//! 1. The at-most-one-run check (jobs already `Running` are skipped)
//! 2. A process-wide run slot
//! 3. Category mapping from the navigation page
//! 4. Sitemap discovery
//! 5. Dispatch of every page
//! 6. Status and schedule bookkeeping on the job record

use crate::category::{CategoryIndex, CategoryMapper};
use crate::config::{CategoryHierarchy, JobConfig, RuntimeConfig};
use crate::crawler::dispatcher::{CrawlDispatcher, DispatchOutcome, DispatchReport, DispatchSettings};
use crate::crawler::fetcher::{build_http_client, HttpFetcher};
use crate::sitemap::{SitemapEntry, SitemapReader};
use crate::state::CrawlJob;
use crate::storage::{lock, SharedStorage, Storage, StorageError};
use crate::HarvestError;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use reqwest::Client;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// How a requested run ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Another run of the same job was already in progress
    Skipped,
    /// Every page was dispatched; individual pages may have failed
    Completed(DispatchReport),
    /// Cancellation or the run timeout stopped the run early
    Cancelled(DispatchReport),
    /// A fatal failure aborted the run
    Failed(String),
}

impl RunOutcome {
    /// Short label for logs and the CLI summary
    pub fn label(&self) -> &'static str {
        match self {
            Self::Skipped => "skipped",
            Self::Completed(_) => "completed",
            Self::Cancelled(_) => "cancelled",
            Self::Failed(_) => "failed",
        }
    }
}

/// Runs crawl jobs against shared storage
///
/// Cloning is cheap; clones share the run-slot semaphore.
pub struct JobRunner<S> {
    storage: SharedStorage<S>,
    runtime: RuntimeConfig,
    run_slots: Arc<Semaphore>,
}

impl<S> Clone for JobRunner<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            runtime: self.runtime.clone(),
            run_slots: Arc::clone(&self.run_slots),
        }
    }
}

impl<S> JobRunner<S>
where
    S: Storage + Send + 'static,
{
    pub fn new(storage: SharedStorage<S>, runtime: RuntimeConfig) -> Self {
        let run_slots = Arc::new(Semaphore::new(runtime.max_concurrent_crawls.max(1) as usize));
        Self {
            storage,
            runtime,
            run_slots,
        }
    }

    pub fn storage(&self) -> &SharedStorage<S> {
        &self.storage
    }

    /// Loads the job named in `config`, creating it on first sight
    ///
    /// Site parameters are refreshed from the configuration; identity, status
    /// and run history are kept.
    pub fn sync_job(&self, config: &JobConfig) -> Result<CrawlJob, HarvestError> {
        let mut storage = lock(&self.storage);
        let job = match storage.get_job_by_name(&config.name)? {
            Some(mut job) => {
                job.apply_config(config);
                job
            }
            None => {
                info!("Registering new job '{}'", config.name);
                CrawlJob::from_config(config)
            }
        };
        storage.upsert_job(&job)?;
        Ok(job)
    }

    /// Runs one job to the end and records the result on its job record
    pub async fn run_job(
        &self,
        job_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, HarvestError> {
        let mut job = {
            let mut storage = lock(&self.storage);
            let mut job = storage
                .get_job(job_id)?
                .ok_or_else(|| StorageError::NotFound(format!("crawl job {}", job_id)))?;

            if job.status.is_running() {
                info!("Job '{}' is already running, skipping", job.name);
                return Ok(RunOutcome::Skipped);
            }

            job.mark_running(Utc::now());
            storage.upsert_job(&job)?;
            job
        };

        let span = info_span!("crawl", job = %job.name);
        let outcome = self.run_marked(&job, cancel).instrument(span).await;
        let end = Utc::now();

        let outcome = match outcome {
            Ok(DispatchOutcome::Completed(report)) => {
                job.mark_completed(end, report.errors.clone());
                info!(
                    "Job '{}' completed: {} stored, {} failed",
                    job.name, report.stored, report.failed
                );
                RunOutcome::Completed(report)
            }
            Ok(DispatchOutcome::Cancelled(report)) => {
                job.mark_stopped(end, report.errors.clone());
                warn!("Job '{}' stopped before finishing", job.name);
                RunOutcome::Cancelled(report)
            }
            Err(e) => {
                let message = e.to_string();
                error!("Job '{}' failed: {}", job.name, message);
                job.mark_error(end, message.clone());
                RunOutcome::Failed(message)
            }
        };

        lock(&self.storage).upsert_job(&job)?;
        Ok(outcome)
    }

    /// Runs the given jobs concurrently, bounded by the run slots
    ///
    /// Returns each job's name with its result, in completion order.
    pub async fn run_jobs(
        &self,
        job_ids: Vec<Uuid>,
        cancel: &CancellationToken,
    ) -> Vec<(Uuid, Result<RunOutcome, HarvestError>)> {
        let mut tasks = JoinSet::new();
        for job_id in job_ids {
            let runner = self.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let result = runner.run_job(job_id, &cancel).await;
                (job_id, result)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => error!("Job task failed: {}", e),
            }
        }
        results
    }

    /// Ids of the jobs among `names` whose next run is due at `now`
    pub fn due_jobs(&self, names: &[String], now: DateTime<Utc>) -> Result<Vec<Uuid>, HarvestError> {
        let jobs = lock(&self.storage).list_jobs()?;
        Ok(jobs
            .into_iter()
            .filter(|job| names.contains(&job.name) && job.is_due(now))
            .map(|job| job.id)
            .collect())
    }

    /// Earliest scheduled next run among `names`
    pub fn next_wakeup(&self, names: &[String]) -> Result<Option<DateTime<Utc>>, HarvestError> {
        let jobs = lock(&self.storage).list_jobs()?;
        Ok(jobs
            .into_iter()
            .filter(|job| names.contains(&job.name))
            .filter_map(|job| job.next_run)
            .min())
    }

    /// Everything between marking the job running and recording the result
    async fn run_marked(
        &self,
        job: &CrawlJob,
        cancel: &CancellationToken,
    ) -> Result<DispatchOutcome, HarvestError> {
        let _slot = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Ok(DispatchOutcome::Cancelled(DispatchReport::default()));
            }
            slot = Arc::clone(&self.run_slots).acquire_owned() => slot,
        };

        info!("Starting crawl of {}", job.sitemap_url);
        let run_timeout = Duration::from_secs(self.runtime.run_timeout_secs);
        let deadline = Instant::now() + run_timeout;
        let timeout = Duration::from_secs(self.runtime.request_timeout_secs);

        // Mapping and sitemap discovery count against the same deadline as dispatch
        let (index, entries, client) = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Ok(DispatchOutcome::Cancelled(DispatchReport::default()));
            }
            _ = tokio::time::sleep_until(deadline) => {
                warn!("Run timeout of {:?} reached before dispatch started", run_timeout);
                return Ok(DispatchOutcome::Cancelled(DispatchReport::default()));
            }
            prepared = self.prepare(job, timeout) => prepared?,
        };

        let dispatcher = CrawlDispatcher::new(
            Arc::new(HttpFetcher::new(client)),
            Arc::clone(&self.storage),
            DispatchSettings {
                max_concurrent_fetches: self.runtime.max_concurrent_fetches as usize,
                random_delay: Duration::from_millis(self.runtime.random_delay_ms),
                run_timeout: deadline.saturating_duration_since(Instant::now()),
            },
        );

        let locations = entries.into_iter().map(|entry| entry.loc).collect();
        dispatcher.run(locations, Arc::new(index), job, cancel).await
    }

    /// Maps categories and reads the sitemap; either failing is fatal for the run
    async fn prepare(
        &self,
        job: &CrawlJob,
        timeout: Duration,
    ) -> Result<(CategoryIndex, Vec<SitemapEntry>, Client), HarvestError> {
        // The navigation page gets its own client, separate from content fetching
        let mapper = CategoryMapper::new(
            build_http_client(&job.user_agent, timeout)?,
            self.hierarchy(),
        );
        let index = mapper.map(job, &self.storage).await?;

        let client = build_http_client(&job.user_agent, timeout)?;
        let entries = SitemapReader::new(client.clone())
            .fetch(&job.sitemap_url)
            .await?;
        info!("Sitemap lists {} pages", entries.len());

        Ok((index, entries, client))
    }

    fn hierarchy(&self) -> CategoryHierarchy {
        self.runtime.category_hierarchy
    }
}
