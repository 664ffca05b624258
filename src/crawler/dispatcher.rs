//! Crawl dispatcher - concurrent fetch, extract, categorize and persist
//!
//! One dispatcher run takes the sitemap locations of a job and, for each page:
//! 1. Checks the job's domain allow-list
//! 2. Waits for a fetch slot and the domain's next request time
//! 3. Fetches the page
//! 4. Extracts its content and derives its category path from breadcrumbs
//! 5. Resolves the category through the sealed index (root as fallback)
//! 6. Upserts the article by URL
//!
//! Per-page failures are accumulated in the report; they never stop the run.

use crate::category::{page_category_path, CategoryIndex, CategoryPath, ResolvedCategory};
use crate::crawler::fetcher::PageFetcher;
use crate::crawler::politeness::Politeness;
use crate::extract::{extract_document, parse_page, ParsedContent};
use crate::state::CrawlJob;
use crate::storage::{lock, ArticleRecord, SharedStorage, Storage};
use crate::url::{extract_domain, is_allowed_domain, normalize_url};
use crate::{ConfigError, CrawlError, HarvestError};
use chrono::Utc;
use scraper::Selector;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedSemaphorePermit;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

/// Limits applied to one dispatch run
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Maximum simultaneous in-flight fetches
    pub max_concurrent_fetches: usize,
    /// Upper bound of the randomized per-domain delay
    pub random_delay: Duration,
    /// Wall-clock bound for dispatching; hitting it acts like cancellation
    pub run_timeout: Duration,
}

/// Tallies of one dispatch run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchReport {
    /// Locations handed to the dispatcher
    pub discovered: usize,
    /// Pages handed to a fetch task
    pub dispatched: usize,
    /// Articles upserted
    pub stored: usize,
    /// Articles stored under the root because their own path was not indexed
    pub fell_back_to_root: usize,
    /// Locations outside the allowed domains
    pub skipped: usize,
    /// Dispatched pages dropped by cancellation before their fetch began
    pub abandoned: usize,
    /// Pages that failed somewhere between fetch and upsert
    pub failed: usize,
    pub failures_by_kind: BTreeMap<&'static str, usize>,
    /// One rendered message per failed page
    pub errors: Vec<String>,
}

impl DispatchReport {
    fn record_failure(&mut self, error: &CrawlError) {
        warn!("{}", error);
        self.failed += 1;
        *self.failures_by_kind.entry(error.kind()).or_insert(0) += 1;
        self.errors.push(error.to_string());
    }

    fn record_joined(&mut self, joined: Result<PageOutcome, JoinError>) {
        match joined {
            Ok(outcome) => self.record(outcome),
            Err(e) => {
                warn!("Page task failed: {}", e);
                self.failed += 1;
                *self.failures_by_kind.entry("task").or_insert(0) += 1;
                self.errors.push(format!("Page task failed: {}", e));
            }
        }
    }

    fn record(&mut self, outcome: PageOutcome) {
        match outcome {
            PageOutcome::Stored { fell_back } => {
                self.stored += 1;
                if fell_back {
                    self.fell_back_to_root += 1;
                }
            }
            PageOutcome::Abandoned => self.abandoned += 1,
            PageOutcome::Failed(error) => self.record_failure(&error),
        }
    }
}

/// How a dispatch run ended
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Every allowed location was dispatched and has finished
    Completed(DispatchReport),
    /// Cancellation or the run timeout stopped dispatching early
    Cancelled(DispatchReport),
}

impl DispatchOutcome {
    pub fn report(&self) -> &DispatchReport {
        match self {
            Self::Completed(report) | Self::Cancelled(report) => report,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

#[derive(Debug)]
enum PageOutcome {
    Stored { fell_back: bool },
    Abandoned,
    Failed(CrawlError),
}

/// Everything a page task needs, shared across the run
struct PageContext<S> {
    fetcher: Arc<dyn PageFetcher>,
    storage: SharedStorage<S>,
    index: Arc<CategoryIndex>,
    politeness: Politeness,
    default_category: String,
    root: CategoryPath,
    breadcrumbs: Vec<Selector>,
    cancel: CancellationToken,
}

/// Drives every sitemap page of a job through fetch, extraction and persistence
pub struct CrawlDispatcher<S> {
    fetcher: Arc<dyn PageFetcher>,
    storage: SharedStorage<S>,
    settings: DispatchSettings,
}

impl<S> CrawlDispatcher<S>
where
    S: Storage + Send + 'static,
{
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        storage: SharedStorage<S>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            fetcher,
            storage,
            settings,
        }
    }

    /// Dispatches `locations` for `job`
    ///
    /// Once `cancel` fires or the run timeout passes, no further fetch is
    /// started, including for pages already dispatched but still waiting for
    /// their politeness turn. Pages already fetching finish and are counted.
    /// The outcome is `Cancelled` whenever that happens before every
    /// dispatched page has finished.
    ///
    /// Fails only if the job's breadcrumb selectors are invalid.
    pub async fn run(
        &self,
        locations: Vec<String>,
        index: Arc<CategoryIndex>,
        job: &CrawlJob,
        cancel: &CancellationToken,
    ) -> Result<DispatchOutcome, HarvestError> {
        let breadcrumbs = compile_selectors(&job.breadcrumb_selectors)?;
        if !index.is_sealed() {
            warn!("Dispatching with an unsealed category index");
        }

        // Fires on external cancellation or on the run deadline
        let stop = cancel.child_token();
        let ctx = Arc::new(PageContext {
            fetcher: Arc::clone(&self.fetcher),
            storage: Arc::clone(&self.storage),
            index,
            politeness: Politeness::new(
                self.settings.max_concurrent_fetches,
                self.settings.random_delay,
            ),
            default_category: job.default_category.clone(),
            root: CategoryPath::root(&job.default_category),
            breadcrumbs,
            cancel: stop.clone(),
        });

        let mut report = DispatchReport {
            discovered: locations.len(),
            ..DispatchReport::default()
        };
        let mut tasks = JoinSet::new();
        let mut stopped = false;

        let deadline = tokio::time::sleep(self.settings.run_timeout);
        tokio::pin!(deadline);

        info!(
            "Dispatching {} pages (max {} in flight)",
            locations.len(),
            self.settings.max_concurrent_fetches
        );

        for location in locations {
            let url = match normalize_url(&location) {
                Ok(url) => url,
                Err(e) => {
                    report.record_failure(&CrawlError::Parse {
                        url: location,
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            if !is_allowed_domain(&url, &job.allowed_domains) {
                debug!("Skipping {}: domain not allowed", url);
                report.skipped += 1;
                continue;
            }

            let permit = tokio::select! {
                biased;
                _ = stop.cancelled() => {
                    stopped = true;
                    break;
                }
                _ = &mut deadline => {
                    warn!("Run timeout of {:?} reached, stopping dispatch", self.settings.run_timeout);
                    stop.cancel();
                    stopped = true;
                    break;
                }
                permit = ctx.politeness.acquire() => permit,
            };

            let Some(permit) = permit else {
                stopped = true;
                break;
            };

            report.dispatched += 1;
            tasks.spawn(process_page(Arc::clone(&ctx), url, permit));
        }

        if stopped {
            info!(
                "Dispatch stopped, waiting for {} in-flight pages",
                tasks.len()
            );
        }

        // Cancellation and the deadline still apply while dispatched pages finish
        loop {
            tokio::select! {
                biased;
                joined = tasks.join_next() => match joined {
                    Some(joined) => report.record_joined(joined),
                    None => break,
                },
                _ = stop.cancelled(), if !stopped => {
                    info!("Dispatch cancelled with {} pages outstanding", tasks.len());
                    stopped = true;
                }
                _ = &mut deadline, if !stopped => {
                    warn!("Run timeout of {:?} reached, abandoning queued pages", self.settings.run_timeout);
                    stop.cancel();
                    stopped = true;
                }
            }
        }

        // A page dropped before its fetch means the run did not finish
        let stopped = stopped || report.abandoned > 0;

        info!(
            "Dispatch finished: {} stored, {} failed, {} skipped",
            report.stored, report.failed, report.skipped
        );

        Ok(if stopped {
            DispatchOutcome::Cancelled(report)
        } else {
            DispatchOutcome::Completed(report)
        })
    }
}

fn compile_selectors(raw: &[String]) -> Result<Vec<Selector>, ConfigError> {
    raw.iter()
        .map(|selector| {
            Selector::parse(selector).map_err(|e| {
                ConfigError::Validation(format!("Invalid selector '{}': {:?}", selector, e))
            })
        })
        .collect()
}

async fn process_page<S>(
    ctx: Arc<PageContext<S>>,
    url: Url,
    _permit: OwnedSemaphorePermit,
) -> PageOutcome
where
    S: Storage,
{
    let domain = extract_domain(&url).unwrap_or_default();

    tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => return PageOutcome::Abandoned,
        _ = ctx.politeness.wait_turn(&domain) => {}
    }

    debug!("Fetching {}", url);
    let body = match ctx.fetcher.fetch(url.as_str()).await {
        Ok(body) => body,
        Err(e) => return PageOutcome::Failed(e),
    };

    match store_page(&ctx, &url, &body) {
        Ok(resolved) => {
            debug!("Stored {} under {}", url, resolved.path);
            PageOutcome::Stored {
                fell_back: resolved.fell_back,
            }
        }
        Err(e) => PageOutcome::Failed(e),
    }
}

/// Extracts, categorizes and upserts one fetched page
fn store_page<S>(
    ctx: &PageContext<S>,
    url: &Url,
    body: &[u8],
) -> Result<ResolvedCategory, CrawlError>
where
    S: Storage,
{
    let document = parse_page(body).map_err(|e| CrawlError::Parse {
        url: url.to_string(),
        message: e.to_string(),
    })?;
    let content = extract_document(&document);
    let path = page_category_path(&document, &ctx.default_category, &ctx.breadcrumbs);

    if !content.is_complete() {
        return Err(CrawlError::IncompleteContent {
            url: url.to_string(),
            has_title: !content.title.is_empty(),
            has_body: content.body_has_text,
        });
    }

    let resolved =
        ctx.index
            .resolve(&path, &ctx.root)
            .ok_or_else(|| CrawlError::CategoryResolution {
                url: url.to_string(),
                path: path.key(),
            })?;

    if resolved.fell_back {
        debug!("Category not found for path {}, using {}", path, resolved.path);
    }

    let article = build_article(url, content, &path, &resolved);
    lock(&ctx.storage)
        .upsert_article(&article)
        .map_err(|source| CrawlError::Storage {
            url: url.to_string(),
            source,
        })?;

    Ok(resolved)
}

fn build_article(
    url: &Url,
    content: ParsedContent,
    path: &CategoryPath,
    resolved: &ResolvedCategory,
) -> ArticleRecord {
    let now = Utc::now();
    let metadata = json!({
        "categoryPath": path.segments(),
        "fullCategoryString": path.key(),
        "resolvedCategory": resolved.path.key(),
        "url": url.as_str(),
        "metaTags": &content.tags,
        "author": &content.author,
        "categoryHint": &content.category_hint,
    });

    ArticleRecord {
        id: Uuid::new_v4(),
        category_id: resolved.category.id,
        title: content.title,
        body: content.body,
        url: url.to_string(),
        tags: content.tags,
        author: content.author,
        metadata,
        created_at: now,
        updated_at: now,
    }
}
