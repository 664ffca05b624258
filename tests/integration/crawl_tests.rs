//! Integration tests for the harvester
//!
//! These tests use wiremock to serve a small documentation site (navigation
//! page, sitemap and articles) and drive full job runs against a SQLite file.

use kb_harvest::config::{JobConfig, RuntimeConfig};
use kb_harvest::crawler::{JobRunner, RunOutcome};
use kb_harvest::state::JobStatus;
use kb_harvest::storage::{lock, SharedStorage, SqliteStorage, Storage};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const NAV_PAGE: &str = r#"<html><head><title>Home</title></head><body>
    <nav class="sidebarNav">
      <ul>
        <li><a href="/Content/start.htm">Getting Started</a>
          <ul>
            <li><a href="/Content/install.htm">Install</a></li>
          </ul>
        </li>
        <li><a href="/Content/reference.htm">Reference</a></li>
      </ul>
    </nav>
</body></html>"#;

const INSTALL_PAGE: &str = r#"<html><head>
    <title>Installing the agent</title>
    <meta name="keywords" content="Agent, Setup">
    <meta name="author" content="Docs Team">
</head><body>
    <ul class="breadcrumbs"><li>Getting Started</li><li>Install</li></ul>
    <article><h1>Install</h1><p>Run the installer.</p><script>track()</script></article>
</body></html>"#;

const REFERENCE_PAGE: &str = r#"<html><head><title>Reference</title></head><body>
    <ul class="breadcrumbs"><li>Reference</li></ul>
    <article><p>All the options.</p></article>
</body></html>"#;

const ORPHAN_PAGE: &str = r#"<html><head><title>Release notes</title></head><body>
    <ul class="breadcrumbs"><li>Archive</li></ul>
    <article><p>Older releases.</p></article>
</body></html>"#;

fn sitemap(base_url: &str, pages: &[&str]) -> String {
    let urls: String = pages
        .iter()
        .map(|page| format!("<url><loc>{}{}</loc></url>", base_url, page))
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">{}</urlset>"#,
        urls
    )
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/html")
}

async fn mount_page(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(html(body))
        .mount(server)
        .await;
}

/// Mounts the navigation page and the three article pages
async fn mount_site(server: &MockServer) {
    mount_page(server, "/Content/0HOME/Home.htm", NAV_PAGE).await;
    mount_page(server, "/Content/install.htm", INSTALL_PAGE).await;
    mount_page(server, "/Content/reference.htm", REFERENCE_PAGE).await;
    mount_page(server, "/Content/notes.htm", ORPHAN_PAGE).await;
}

async fn mount_sitemap(server: &MockServer, pages: &[&str]) {
    Mock::given(method("GET"))
        .and(path("/Content/Sitemap.xml"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(sitemap(&server.uri(), pages).into_bytes(), "application/xml"),
        )
        .mount(server)
        .await;
}

fn job_config(base_url: &str) -> JobConfig {
    JobConfig {
        name: "docs".to_string(),
        sitemap_url: format!("{}/Content/Sitemap.xml", base_url),
        map_url: String::new(),
        user_agent: "TestBot".to_string(),
        max_depth: 10,
        allowed_domains: vec!["127.0.0.1".to_string()],
        default_category: "Docs".to_string(),
        crawl_interval: "1h".to_string(),
        nav_selector: "nav.sidebarNav".to_string(),
        breadcrumb_selectors: vec![".breadcrumbs li".to_string()],
    }
}

fn runtime() -> RuntimeConfig {
    RuntimeConfig {
        max_concurrent_fetches: 2,
        random_delay_ms: 0,
        request_timeout_secs: 5,
        run_timeout_secs: 60,
        ..RuntimeConfig::default()
    }
}

fn open_runner(dir: &TempDir) -> JobRunner<SqliteStorage> {
    let storage = SqliteStorage::new(&dir.path().join("kb.db")).expect("Failed to open database");
    let storage: SharedStorage<SqliteStorage> = Arc::new(Mutex::new(storage));
    JobRunner::new(storage, runtime())
}

#[tokio::test]
async fn test_full_harvest_of_documentation_site() {
    let server = MockServer::start().await;
    let base_url = server.uri();
    mount_site(&server).await;
    mount_sitemap(
        &server,
        &["/Content/install.htm", "/Content/reference.htm", "/Content/notes.htm"],
    )
    .await;

    let dir = TempDir::new().unwrap();
    let runner = open_runner(&dir);
    let job = runner.sync_job(&job_config(&base_url)).unwrap();

    let outcome = runner
        .run_job(job.id, &CancellationToken::new())
        .await
        .unwrap();

    let report = match outcome {
        RunOutcome::Completed(report) => report,
        other => panic!("Expected a completed run, got {:?}", other),
    };
    assert_eq!(report.discovered, 3);
    assert_eq!(report.stored, 3);
    assert_eq!(report.fell_back_to_root, 1);
    assert_eq!(report.failed, 0);

    let storage = lock(runner.storage());

    // Root plus the three navigation entries
    let categories = storage.list_categories().unwrap();
    assert_eq!(categories.len(), 4);
    let root = categories.iter().find(|c| c.is_root()).unwrap();
    assert_eq!(root.name, "Docs");

    let install = storage
        .get_article_by_url(&format!("{}/Content/install.htm", base_url))
        .unwrap()
        .expect("install page stored");
    assert_eq!(install.title, "Installing the agent");
    assert_eq!(install.tags, vec!["agent", "setup"]);
    assert_eq!(install.author.as_deref(), Some("Docs Team"));
    assert!(install.body.contains("Run the installer."));
    assert!(!install.body.contains("track()"));
    assert_eq!(
        install.metadata["fullCategoryString"],
        "Docs:Getting Started:Install"
    );
    let install_category = categories
        .iter()
        .find(|c| c.id == install.category_id)
        .unwrap();
    assert_eq!(install_category.name, "Install");

    let orphan = storage
        .get_article_by_url(&format!("{}/Content/notes.htm", base_url))
        .unwrap()
        .expect("orphan page stored");
    assert_eq!(orphan.category_id, root.id);
    assert_eq!(orphan.metadata["resolvedCategory"], "Docs");

    let job = storage.get_job_by_name("docs").unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(!job.is_first_run);
    assert!(job.last_run.is_some());
    assert!(job.next_run > job.last_run);
    assert!(job.errors.is_empty());
}

#[tokio::test]
async fn test_rerun_updates_articles_in_place() {
    let server = MockServer::start().await;
    let base_url = server.uri();
    mount_site(&server).await;
    mount_sitemap(&server, &["/Content/install.htm", "/Content/reference.htm"]).await;

    let dir = TempDir::new().unwrap();
    let runner = open_runner(&dir);
    let job = runner.sync_job(&job_config(&base_url)).unwrap();
    let cancel = CancellationToken::new();

    runner.run_job(job.id, &cancel).await.unwrap();
    let first_id = lock(runner.storage())
        .get_article_by_url(&format!("{}/Content/install.htm", base_url))
        .unwrap()
        .unwrap()
        .id;

    let outcome = runner.run_job(job.id, &cancel).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Completed(_)));

    let storage = lock(runner.storage());
    assert_eq!(storage.count_articles().unwrap(), 2);
    let article = storage
        .get_article_by_url(&format!("{}/Content/install.htm", base_url))
        .unwrap()
        .unwrap();
    assert_eq!(article.id, first_id);
}

#[tokio::test]
async fn test_missing_page_is_recorded_on_job() {
    let server = MockServer::start().await;
    let base_url = server.uri();
    mount_site(&server).await;
    mount_sitemap(&server, &["/Content/install.htm", "/Content/gone.htm"]).await;

    let dir = TempDir::new().unwrap();
    let runner = open_runner(&dir);
    let job = runner.sync_job(&job_config(&base_url)).unwrap();

    let outcome = runner
        .run_job(job.id, &CancellationToken::new())
        .await
        .unwrap();

    let report = match outcome {
        RunOutcome::Completed(report) => report,
        other => panic!("Expected a completed run, got {:?}", other),
    };
    assert_eq!(report.stored, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failures_by_kind.get("fetch"), Some(&1));

    let storage = lock(runner.storage());
    assert_eq!(storage.count_articles().unwrap(), 1);
    let job = storage.get_job_by_name("docs").unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.errors.len(), 1);
    assert!(job.errors[0].contains("gone.htm"));
}

#[tokio::test]
async fn test_sitemap_failure_marks_job_error() {
    let server = MockServer::start().await;
    let base_url = server.uri();
    mount_site(&server).await;
    Mock::given(method("GET"))
        .and(path("/Content/Sitemap.xml"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let runner = open_runner(&dir);
    let job = runner.sync_job(&job_config(&base_url)).unwrap();

    let outcome = runner
        .run_job(job.id, &CancellationToken::new())
        .await
        .unwrap();
    assert!(matches!(outcome, RunOutcome::Failed(_)));

    let storage = lock(runner.storage());
    assert_eq!(storage.count_articles().unwrap(), 0);
    let job = storage.get_job_by_name("docs").unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Error);
    assert_eq!(job.errors.len(), 1);
    assert!(job.next_run.is_some());
}

#[tokio::test]
async fn test_disallowed_pages_are_not_fetched() {
    let server = MockServer::start().await;
    let base_url = server.uri();
    mount_page(&server, "/Content/0HOME/Home.htm", NAV_PAGE).await;
    mount_sitemap(&server, &["/Content/install.htm"]).await;
    Mock::given(method("GET"))
        .and(path("/Content/install.htm"))
        .respond_with(html(INSTALL_PAGE))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let runner = open_runner(&dir);
    let mut config = job_config(&base_url);
    config.allowed_domains = vec!["docs.example.com".to_string()];
    let job = runner.sync_job(&config).unwrap();

    let outcome = runner
        .run_job(job.id, &CancellationToken::new())
        .await
        .unwrap();

    let report = match outcome {
        RunOutcome::Completed(report) => report,
        other => panic!("Expected a completed run, got {:?}", other),
    };
    assert_eq!(report.skipped, 1);
    assert_eq!(report.stored, 0);
    assert_eq!(lock(runner.storage()).count_articles().unwrap(), 0);
}

#[tokio::test]
async fn test_jobs_persist_across_reopen() {
    let server = MockServer::start().await;
    let base_url = server.uri();
    mount_site(&server).await;
    mount_sitemap(&server, &["/Content/reference.htm"]).await;

    let dir = TempDir::new().unwrap();
    let job_id = {
        let runner = open_runner(&dir);
        let job = runner.sync_job(&job_config(&base_url)).unwrap();
        runner
            .run_job(job.id, &CancellationToken::new())
            .await
            .unwrap();
        job.id
    };

    let runner = open_runner(&dir);
    let job = runner.sync_job(&job_config(&base_url)).unwrap();
    assert_eq!(job.id, job_id);
    assert_eq!(job.status, JobStatus::Completed);

    let names = vec!["docs".to_string()];
    assert!(runner.due_jobs(&names, chrono::Utc::now()).unwrap().is_empty());
    assert_eq!(runner.next_wakeup(&names).unwrap(), job.next_run);
    assert_eq!(lock(runner.storage()).count_articles().unwrap(), 1);
}
