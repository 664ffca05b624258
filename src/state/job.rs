use crate::config::JobConfig;
use crate::state::{parse_interval, JobStatus};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Oldest entries are dropped once a job's error list grows past this
pub const MAX_JOB_ERRORS: usize = 200;

/// Sitemap file name replaced when deriving the navigation page URL
const SITEMAP_FILE: &str = "Sitemap.xml";

/// Navigation page that takes its place
const HOME_PAGE: &str = "0HOME/Home.htm";

/// Persisted crawl job: target site parameters plus run bookkeeping
///
/// Only one run may mutate a job at a time; the runner enforces that through
/// `status` before it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlJob {
    pub id: Uuid,
    pub name: String,
    pub sitemap_url: String,
    pub map_url: String,
    pub user_agent: String,
    pub max_depth: u32,
    pub allowed_domains: Vec<String>,
    pub default_category: String,
    pub crawl_interval: String,
    pub nav_selector: String,
    pub breadcrumb_selectors: Vec<String>,

    pub status: JobStatus,
    pub is_first_run: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub errors: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CrawlJob {
    /// Creates a fresh, never-run job from its configuration entry
    pub fn from_config(config: &JobConfig) -> Self {
        let now = Utc::now();
        let mut job = Self {
            id: Uuid::new_v4(),
            name: config.name.clone(),
            sitemap_url: String::new(),
            map_url: String::new(),
            user_agent: String::new(),
            max_depth: 0,
            allowed_domains: Vec::new(),
            default_category: String::new(),
            crawl_interval: String::new(),
            nav_selector: String::new(),
            breadcrumb_selectors: Vec::new(),
            status: JobStatus::Scheduled,
            is_first_run: true,
            last_run: None,
            next_run: None,
            errors: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        job.apply_config(config);
        job
    }

    /// Refreshes the target-site parameters, keeping identity and run history
    pub fn apply_config(&mut self, config: &JobConfig) {
        self.sitemap_url = config.sitemap_url.clone();
        self.map_url = config.map_url.clone();
        self.user_agent = config.user_agent.clone();
        self.max_depth = config.max_depth;
        self.allowed_domains = config.allowed_domains.clone();
        self.default_category = config.default_category.clone();
        self.crawl_interval = config.crawl_interval.clone();
        self.nav_selector = config.nav_selector.clone();
        self.breadcrumb_selectors = config.breadcrumb_selectors.clone();
        self.updated_at = Utc::now();
    }

    /// The navigation page URL, derived from the sitemap URL when not configured
    ///
    /// `.../Content/Sitemap.xml` becomes `.../Content/0HOME/Home.htm`; any other
    /// sitemap location falls back to the site root.
    pub fn resolved_map_url(&self) -> String {
        if !self.map_url.trim().is_empty() {
            return self.map_url.clone();
        }

        if self.sitemap_url.contains(SITEMAP_FILE) {
            return self.sitemap_url.replacen(SITEMAP_FILE, HOME_PAGE, 1);
        }

        match url::Url::parse(&self.sitemap_url) {
            Ok(mut url) => {
                url.set_path("/");
                url.set_query(None);
                url.set_fragment(None);
                url.to_string()
            }
            Err(_) => self.sitemap_url.clone(),
        }
    }

    /// Returns true when the job is idle and its next run time has arrived
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_running() && self.next_run.map_or(true, |next| next <= now)
    }

    /// Marks the start of a run
    pub fn mark_running(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Running;
        self.updated_at = now;
    }

    /// Records a run that dispatched every page
    ///
    /// Per-page failures are appended for operator inspection; they do not change
    /// the status.
    pub fn mark_completed(&mut self, end: DateTime<Utc>, page_errors: Vec<String>) {
        self.status = JobStatus::Completed;
        self.push_errors(page_errors);
        self.finish(end);
    }

    /// Records a cancelled or timed-out run
    pub fn mark_stopped(&mut self, end: DateTime<Utc>, page_errors: Vec<String>) {
        self.status = JobStatus::Stopped;
        self.push_errors(page_errors);
        self.finish(end);
    }

    /// Records a run that hit a fatal failure
    pub fn mark_error(&mut self, end: DateTime<Utc>, message: String) {
        self.status = JobStatus::Error;
        self.push_errors(vec![message]);
        self.finish(end);
    }

    fn finish(&mut self, end: DateTime<Utc>) {
        self.last_run = Some(end);
        self.next_run = parse_interval(&self.crawl_interval)
            .ok()
            .and_then(|interval| chrono::Duration::from_std(interval).ok())
            .map(|interval| end + interval);
        self.is_first_run = false;
        self.updated_at = end;
    }

    fn push_errors(&mut self, errors: Vec<String>) {
        self.errors.extend(errors);
        if self.errors.len() > MAX_JOB_ERRORS {
            let overflow = self.errors.len() - MAX_JOB_ERRORS;
            self.errors.drain(..overflow);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn config() -> JobConfig {
        JobConfig {
            name: "rmm".to_string(),
            sitemap_url: "https://docs.example.com/help/en/Content/Sitemap.xml".to_string(),
            map_url: String::new(),
            user_agent: "TestBot".to_string(),
            max_depth: 3,
            allowed_domains: vec!["docs.example.com".to_string()],
            default_category: "RMM".to_string(),
            crawl_interval: "24h".to_string(),
            nav_selector: "nav.sidebarNav".to_string(),
            breadcrumb_selectors: vec![".breadcrumbs li".to_string()],
        }
    }

    #[test]
    fn test_new_job_is_scheduled_first_run() {
        let job = CrawlJob::from_config(&config());
        assert_eq!(job.status, JobStatus::Scheduled);
        assert!(job.is_first_run);
        assert!(job.last_run.is_none());
        assert!(job.errors.is_empty());
    }

    #[test]
    fn test_map_url_derived_from_sitemap() {
        let job = CrawlJob::from_config(&config());
        assert_eq!(
            job.resolved_map_url(),
            "https://docs.example.com/help/en/Content/0HOME/Home.htm"
        );
    }

    #[test]
    fn test_map_url_falls_back_to_site_root() {
        let mut cfg = config();
        cfg.sitemap_url = "https://docs.example.com/sitemap_index.xml?v=2".to_string();
        let job = CrawlJob::from_config(&cfg);
        assert_eq!(job.resolved_map_url(), "https://docs.example.com/");
    }

    #[test]
    fn test_explicit_map_url_wins() {
        let mut cfg = config();
        cfg.map_url = "https://docs.example.com/nav.htm".to_string();
        let job = CrawlJob::from_config(&cfg);
        assert_eq!(job.resolved_map_url(), "https://docs.example.com/nav.htm");
    }

    #[test]
    fn test_completed_run_schedules_next() {
        let mut job = CrawlJob::from_config(&config());
        let end = Utc::now();
        job.mark_running(end);
        job.mark_completed(end, vec!["page failed".to_string()]);

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.last_run, Some(end));
        assert_eq!(job.next_run, Some(end + Duration::hours(24)));
        assert!(!job.is_first_run);
        assert_eq!(job.errors, vec!["page failed".to_string()]);
    }

    #[test]
    fn test_error_run_appends_message() {
        let mut job = CrawlJob::from_config(&config());
        job.errors.push("older".to_string());
        job.mark_error(Utc::now(), "sitemap unreachable".to_string());

        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.errors.len(), 2);
        assert_eq!(job.errors[1], "sitemap unreachable");
    }

    #[test]
    fn test_unparsable_interval_leaves_next_run_empty() {
        let mut job = CrawlJob::from_config(&config());
        job.crawl_interval = "weekly".to_string();
        job.mark_completed(Utc::now(), Vec::new());
        assert!(job.next_run.is_none());
        assert!(job.last_run.is_some());
    }

    #[test]
    fn test_error_list_is_capped() {
        let mut job = CrawlJob::from_config(&config());
        let errors = (0..MAX_JOB_ERRORS + 5).map(|i| format!("e{}", i)).collect();
        job.mark_completed(Utc::now(), errors);

        assert_eq!(job.errors.len(), MAX_JOB_ERRORS);
        assert_eq!(job.errors[0], "e5");
    }

    #[test]
    fn test_is_due() {
        let now = Utc::now();
        let mut job = CrawlJob::from_config(&config());
        assert!(job.is_due(now));

        job.next_run = Some(now + Duration::hours(1));
        assert!(!job.is_due(now));

        job.next_run = Some(now - Duration::seconds(1));
        assert!(job.is_due(now));

        job.mark_running(now);
        assert!(!job.is_due(now));
    }
}
