//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and exercise the
//! full crawl cycle end-to-end: taxonomy resolution, paginated listing
//! fan-out over the pool and scheduler, filtering, dedup, and CSV export.

use stacksift::config::{CatalogConfig, Criteria, PoolConfig, SchedulerConfig};
use stacksift::crawler::{Coordinator, PageFetcher, TaskScheduler};
use stacksift::output::CsvExporter;
use stacksift::pool::{ConnectionPool, HttpConnector};
use std::path::Path;
use std::sync::Arc;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test catalog configuration pointed at the mock server
fn create_test_catalog(base_url: &str) -> CatalogConfig {
    CatalogConfig {
        base_url: base_url.to_string(),
        taxonomy_path: "/tag/".to_string(),
        page_size: 20,
        user_agent: "TestAgent/1.0".to_string(),
        session_cookie: None,
    }
}

/// Wires a coordinator over a real pool and scheduler, exporting CSV into
/// `output_dir`
fn create_coordinator(
    catalog: &CatalogConfig,
    output_dir: &Path,
) -> (Coordinator, TaskScheduler, Arc<ConnectionPool>) {
    let pool_config = PoolConfig::default();
    let pool = Arc::new(ConnectionPool::new(
        pool_config.clone(),
        Arc::new(HttpConnector::new(
            pool_config.connect_timeout(),
            pool_config.read_timeout(),
        )),
    ));
    let scheduler = TaskScheduler::new(&SchedulerConfig::default());
    let fetcher = PageFetcher::new(Arc::clone(&pool), catalog);
    let exporter = Box::new(CsvExporter::new(output_dir));

    let coordinator = Coordinator::new(fetcher, scheduler.handle(), catalog.clone(), exporter);
    (coordinator, scheduler, pool)
}

fn taxonomy_page() -> String {
    r#"<html><body><div id="content">
        <a name="life"><h2>life</h2></a>
        <table class="tagCol">
            <tr><td><a href="/tag/essay">essay</a></td></tr>
        </table>
        <a name="tech"><h2>tech</h2></a>
        <table class="tagCol">
            <tr><td><a href="/tag/programming">programming</a></td></tr>
        </table>
    </div></body></html>"#
        .to_string()
}

fn entry_html(title: &str, score: &str, count: &str, link: &str) -> String {
    format!(
        r#"<li class="subject-item">
            <div class="info">
                <h2><a href="{link}" title="{title}">{title}</a></h2>
                <div class="star clearfix">
                    <span class="rating_nums">{score}</span>
                    <span class="pl">({count}人评价)</span>
                </div>
            </div>
        </li>"#
    )
}

fn listing_page(entries: &[String], total_pages: Option<u32>) -> String {
    let paginator = match total_pages {
        Some(n) => {
            let links: String = (2..=n)
                .map(|i| format!(r#"<a href="?start={}&amp;type=T">{}</a>"#, (i - 1) * 20, i))
                .collect();
            format!(
                r#"<div class="paginator"><span class="prev">&lt;前页</span>{}</div>"#,
                links
            )
        }
        None => String::new(),
    };
    format!(
        r#"<html><body><div id="subject_list"><ul>{}</ul></div>{}</body></html>"#,
        entries.join("\n"),
        paginator
    )
}

async fn mount_taxonomy(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/tag/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(taxonomy_page()))
        .mount(server)
        .await;
}

/// Mounts a result-page mock for a specific `start` offset
///
/// Query mocks must be mounted before the bare listing mock: wiremock
/// dispatches to the first matching mock and `path` ignores the query.
async fn mount_result_page(server: &MockServer, listing: &str, start: u32, body: String) {
    Mock::given(method("GET"))
        .and(path(listing))
        .and(query_param("start", start.to_string()))
        .and(query_param("type", "T"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

async fn mount_listing_probe(server: &MockServer, listing: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(listing))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_crawl_filters_and_exports_csv() {
    let mock_server = MockServer::start().await;
    mount_taxonomy(&mock_server).await;

    // Two result pages: Alpha passes, Beta fails the score threshold even
    // though its rating count is higher, Carol passes on the second page.
    mount_result_page(
        &mock_server,
        "/tag/essay",
        0,
        listing_page(
            &[
                entry_html("Alpha", "9.0", "3000", "https://books.example.com/subject/1/"),
                entry_html("Beta", "7.0", "5000", "https://books.example.com/subject/2/"),
            ],
            None,
        ),
    )
    .await;
    mount_result_page(
        &mock_server,
        "/tag/essay",
        20,
        listing_page(
            &[entry_html(
                "Carol",
                "8.6",
                "2200",
                "https://books.example.com/subject/3/",
            )],
            None,
        ),
    )
    .await;
    mount_listing_probe(&mock_server, "/tag/essay", listing_page(&[], Some(2))).await;

    let output_dir = tempfile::tempdir().unwrap();
    let catalog = create_test_catalog(&mock_server.uri());
    let (coordinator, scheduler, pool) = create_coordinator(&catalog, output_dir.path());

    let criteria = Criteria {
        tag: "life".to_string(),
        min_score: 8.5,
        min_count: 2000,
    };
    let report = coordinator.run(&criteria).await.unwrap();

    assert_eq!(report.listings, 1);
    assert_eq!(report.tasks_failed, 0);
    assert_eq!(report.records, 2);

    let csv_path = output_dir.path().join("life-8.5-2000.csv");
    let content = std::fs::read_to_string(&csv_path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines[0], "title,score,people,link");
    assert_eq!(lines.len(), 3);
    // Sorted by title; Beta filtered out.
    assert!(lines[1].starts_with("Alpha,9,3000,"));
    assert!(lines[2].starts_with("Carol,8.6,2200,"));
    assert!(!content.contains("Beta"));

    scheduler.shutdown().await;
    pool.shutdown().await;
}

#[tokio::test]
async fn test_duplicate_titles_across_pages_recorded_once() {
    let mock_server = MockServer::start().await;
    mount_taxonomy(&mock_server).await;

    // The same title appears on both result pages; concurrent page tasks
    // must record it exactly once.
    let duplicate = entry_html("Alpha", "9.0", "3000", "https://books.example.com/subject/1/");
    mount_result_page(
        &mock_server,
        "/tag/essay",
        0,
        listing_page(&[duplicate.clone()], None),
    )
    .await;
    mount_result_page(
        &mock_server,
        "/tag/essay",
        20,
        listing_page(&[duplicate], None),
    )
    .await;
    mount_listing_probe(&mock_server, "/tag/essay", listing_page(&[], Some(2))).await;

    let output_dir = tempfile::tempdir().unwrap();
    let catalog = create_test_catalog(&mock_server.uri());
    let (coordinator, scheduler, pool) = create_coordinator(&catalog, output_dir.path());

    let criteria = Criteria {
        tag: "life".to_string(),
        min_score: 8.0,
        min_count: 1000,
    };
    let report = coordinator.run(&criteria).await.unwrap();
    assert_eq!(report.records, 1);

    let content =
        std::fs::read_to_string(output_dir.path().join("life-8-1000.csv")).unwrap();
    assert_eq!(content.lines().count(), 2);

    scheduler.shutdown().await;
    pool.shutdown().await;
}

#[tokio::test]
async fn test_missing_paginator_crawls_a_single_page() {
    let mock_server = MockServer::start().await;
    mount_taxonomy(&mock_server).await;

    // First result page only; the mock asserts it is hit exactly once.
    Mock::given(method("GET"))
        .and(path("/tag/essay"))
        .and(query_param("start", "0"))
        .and(query_param("type", "T"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(
            &[entry_html(
                "Alpha",
                "9.0",
                "3000",
                "https://books.example.com/subject/1/",
            )],
            None,
        )))
        .expect(1)
        .mount(&mock_server)
        .await;
    // Probe page without a pagination control: page count falls back to 1.
    mount_listing_probe(&mock_server, "/tag/essay", listing_page(&[], None)).await;

    let output_dir = tempfile::tempdir().unwrap();
    let catalog = create_test_catalog(&mock_server.uri());
    let (coordinator, scheduler, pool) = create_coordinator(&catalog, output_dir.path());

    let criteria = Criteria {
        tag: "life".to_string(),
        min_score: 8.0,
        min_count: 1000,
    };
    let report = coordinator.run(&criteria).await.unwrap();
    assert_eq!(report.records, 1);
    assert_eq!(report.tasks_failed, 0);

    // No request beyond the first page offset.
    let requests = mock_server.received_requests().await.unwrap();
    assert!(requests
        .iter()
        .all(|r| !r.url.query().unwrap_or("").contains("start=20")));

    scheduler.shutdown().await;
    pool.shutdown().await;
}

#[tokio::test]
async fn test_unavailable_listing_degrades_to_empty_export() {
    let mock_server = MockServer::start().await;
    mount_taxonomy(&mock_server).await;

    // The listing page 404s; the run must finish and export an empty set.
    Mock::given(method("GET"))
        .and(path("/tag/essay"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let output_dir = tempfile::tempdir().unwrap();
    let catalog = create_test_catalog(&mock_server.uri());
    let (coordinator, scheduler, pool) = create_coordinator(&catalog, output_dir.path());

    let criteria = Criteria {
        tag: "life".to_string(),
        min_score: 8.0,
        min_count: 1000,
    };
    let report = coordinator.run(&criteria).await.unwrap();

    assert_eq!(report.tasks_failed, 0);
    assert_eq!(report.records, 0);
    let content =
        std::fs::read_to_string(output_dir.path().join("life-8-1000.csv")).unwrap();
    assert_eq!(content, "title,score,people,link\n");

    scheduler.shutdown().await;
    pool.shutdown().await;
}

#[tokio::test]
async fn test_unknown_tag_yields_empty_run() {
    let mock_server = MockServer::start().await;
    mount_taxonomy(&mock_server).await;

    let output_dir = tempfile::tempdir().unwrap();
    let catalog = create_test_catalog(&mock_server.uri());
    let (coordinator, scheduler, pool) = create_coordinator(&catalog, output_dir.path());

    let criteria = Criteria {
        tag: "philosophy".to_string(),
        min_score: 8.0,
        min_count: 1000,
    };
    let report = coordinator.run(&criteria).await.unwrap();

    assert_eq!(report.listings, 0);
    assert_eq!(report.records, 0);

    scheduler.shutdown().await;
    pool.shutdown().await;
}
