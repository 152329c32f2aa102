//! Integration tests for full scans
//!
//! These tests use wiremock to serve small sites and run the whole pipeline:
//! discovery, crawling, evaluation, persistence and output files.

use std::path::Path;
use sumi_lens::config::{parse_config, Config};
use sumi_lens::crawler::run_scan;
use sumi_lens::output::read_json_report;
use sumi_lens::state::{StrategyUsed, UrlState};
use sumi_lens::storage::{RunStatus, SqliteStorage, Storage};
use sumi_lens::ScanError;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Builds a configuration whose outputs live in `dir`
fn scan_config(dir: &Path, scan_type: &str, url: &str, extra: &str) -> Config {
    let toml = format!(
        r#"
[scan]
type = "{scan_type}"
url = "{url}"

[crawl]
max-pages = 10
max-concurrency = 2
navigation-timeout-ms = 5000
max-retries = 0

[user-agent]
crawler-name = "TestBot"
crawler-version = "1.0.0"

[output]
database-path = '{db}'
summary-path = '{summary}'
report-path = '{report}'

{extra}
"#,
        db = dir.join("scan.db").display(),
        summary = dir.join("summary.md").display(),
        report = dir.join("report.json").display(),
    );
    parse_config(&toml).expect("test config should parse")
}

async fn mount_page(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(format!("<html><body>{}</body></html>", body), "text/html"),
        )
        .mount(server)
        .await;
}

async fn mount_robots(server: &MockServer, body: &str) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

fn open_db(dir: &TempDir) -> SqliteStorage {
    SqliteStorage::new(&dir.path().join("scan.db")).expect("database should open")
}

#[tokio::test]
async fn test_website_scan_follows_links() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_page(&server, "/", r#"<a href="/a">A</a><a href="/b">B</a>"#).await;
    mount_page(
        &server,
        "/a",
        r#"<a href="/b">B again</a><a href="/theme.css">css</a><a href="https://elsewhere.org/">x</a>"#,
    )
    .await;
    mount_page(&server, "/b", "leaf").await;

    let dir = TempDir::new().unwrap();
    let config = scan_config(dir.path(), "website", &format!("{}/", base), "");

    let report = run_scan(&config, "test-hash").await.unwrap();

    assert_eq!(report.scanned_count(), 3);
    assert_eq!(report.strategy, StrategyUsed::Domain);
    assert!(report.abort.is_none());
    assert!(report.duplicates >= 1);

    let storage = open_db(&dir);
    let scan = storage.get_latest_scan().unwrap().unwrap();
    assert_eq!(scan.status, RunStatus::Completed);
    assert_eq!(scan.config_hash, "test-hash");
    assert_eq!(storage.count_urls(scan.id).unwrap().scanned, 3);

    let pages = storage.load_pages(scan.id).unwrap();
    assert_eq!(pages.len(), 3);
    assert_eq!(pages[0].url, format!("{}/", base));
    assert!(pages.iter().all(|p| p.outcome == UrlState::Scanned));

    let summary = std::fs::read_to_string(dir.path().join("summary.md")).unwrap();
    assert!(summary.contains("| Scanned | 3 |"));

    let written = read_json_report(&dir.path().join("report.json")).unwrap();
    assert_eq!(written.scanned_count(), 3);
}

#[tokio::test]
async fn test_intelligent_scan_uses_sitemap_then_links() {
    let server = MockServer::start().await;
    let base = server.uri();

    let sitemap = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>{base}/</loc></url>
  <url><loc>{base}/docs/one</loc></url>
  <url><loc>{base}/docs/two</loc></url>
</urlset>"#
    );
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sitemap, "application/xml"))
        .mount(&server)
        .await;

    mount_page(&server, "/", r#"<a href="/about">About</a><a href="/docs/one">One</a>"#).await;
    mount_page(&server, "/docs/one", "one").await;
    mount_page(&server, "/docs/two", "two").await;
    Mock::given(method("GET"))
        .and(path("/about"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<html>about</html>", "text/html"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = scan_config(dir.path(), "intelligent", &format!("{}/", base), "");

    let report = run_scan(&config, "h").await.unwrap();

    assert_eq!(report.strategy, StrategyUsed::SitemapThenDomain);
    assert_eq!(report.scanned_count(), 4);

    let storage = open_db(&dir);
    let scan = storage.get_latest_scan().unwrap().unwrap();
    assert_eq!(scan.strategy.as_deref(), Some("sitemap-then-domain"));
}

#[tokio::test]
async fn test_sitemap_scan_only_visits_listed_pages() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/sitemap.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(format!("{base}/first\n{base}/second\n")),
        )
        .mount(&server)
        .await;
    mount_page(&server, "/first", r#"<a href="/unlisted">u</a>"#).await;
    mount_page(&server, "/second", "second").await;
    Mock::given(method("GET"))
        .and(path("/unlisted"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = scan_config(dir.path(), "sitemap", &format!("{}/sitemap.txt", base), "");

    let report = run_scan(&config, "h").await.unwrap();

    assert_eq!(report.strategy, StrategyUsed::Sitemap);
    assert_eq!(report.scanned_count(), 2);
}

#[tokio::test]
async fn test_robots_disallow_is_honored() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_robots(&server, "User-agent: *\nDisallow: /private").await;
    mount_page(
        &server,
        "/",
        r#"<a href="/private/report">secret</a><a href="/public">public</a>"#,
    )
    .await;
    mount_page(&server, "/public", "ok").await;
    Mock::given(method("GET"))
        .and(path("/private/report"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = scan_config(dir.path(), "website", &format!("{}/", base), "");

    let report = run_scan(&config, "h").await.unwrap();

    assert_eq!(report.scanned_count(), 2);
    let private = report
        .records
        .iter()
        .find(|r| r.canonical_url.ends_with("/private/report"))
        .expect("disallowed link is archived");
    assert_eq!(private.state, UrlState::Excluded);
    assert_eq!(report.urls_crawled.excluded.len(), 1);
}

#[tokio::test]
async fn test_blacklist_keeps_pages_out() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(&server, "/", r#"<a href="/admin/panel">a</a><a href="/docs">d</a>"#).await;
    mount_page(&server, "/docs", "docs").await;
    Mock::given(method("GET"))
        .and(path("/admin/panel"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let extra = "[filters]\nblacklist = [\"/admin\"]\n";
    let mut config = scan_config(dir.path(), "website", &format!("{}/", base), extra);
    config.crawl.follow_robots = false;

    let report = run_scan(&config, "h").await.unwrap();
    assert_eq!(report.scanned_count(), 2);
}

#[cfg(unix)]
#[tokio::test]
async fn test_threshold_abort_is_persisted() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(
        &server,
        "/",
        r#"<a href="/a">a</a><a href="/b">b</a><a href="/c">c</a>"#,
    )
    .await;
    for route in ["/a", "/b", "/c"] {
        mount_page(&server, route, r#"<img src="x.png">"#).await;
    }

    let script = r#"cat > /dev/null; echo '[{"id":"image-alt","impact":"critical","tags":["wcag2a"],"html":"<img src=x.png>","helpUrl":"https://rules.example/image-alt"}]'"#;

    let dir = TempDir::new().unwrap();
    let extra = "[thresholds]\nmust-fix = 1\n";
    let mut config = scan_config(dir.path(), "website", &format!("{}/", base), extra);
    config.evaluator.command = vec!["sh".to_string(), "-c".to_string(), script.to_string()];
    config.crawl.max_concurrency = 1;
    config.crawl.follow_robots = false;

    let report = run_scan(&config, "h").await.unwrap();

    let reason = report.abort.expect("scan should abort");
    assert_eq!(reason.to_string(), "mustFix occurrences found: 2 > 1");
    assert_eq!(report.scanned_count(), 2);
    assert_eq!(report.issues.len(), 1);

    let storage = open_db(&dir);
    let scan = storage.get_latest_scan().unwrap().unwrap();
    assert_eq!(scan.status, RunStatus::Aborted);
    assert_eq!(
        scan.abort_reason.as_deref(),
        Some("mustFix occurrences found: 2 > 1")
    );
    assert_eq!(storage.severity_counts(scan.id).unwrap().critical, 2);

    let summary = std::fs::read_to_string(dir.path().join("summary.md")).unwrap();
    assert!(summary.contains("- **Aborted**: mustFix occurrences found: 2 > 1"));
}

#[tokio::test]
async fn test_unreachable_seed_scans_nothing() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = scan_config(dir.path(), "website", &format!("{}/", base), "");
    config.crawl.follow_robots = false;

    let result = run_scan(&config, "h").await;
    assert!(matches!(result, Err(ScanError::NothingScanned { .. })));

    let storage = open_db(&dir);
    let scan = storage.get_latest_scan().unwrap().unwrap();
    assert_eq!(scan.status, RunStatus::Completed);
    assert_eq!(storage.count_urls(scan.id).unwrap().failed, 1);

    let failures: Vec<_> = storage
        .load_pages(scan.id)
        .unwrap()
        .into_iter()
        .filter(|p| p.outcome == UrlState::Failed)
        .collect();
    assert_eq!(failures[0].error.as_deref(), Some("HTTP 500"));
}
