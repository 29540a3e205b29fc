//! Crawl coordination: one run per criteria over shared pool and workers
//!
//! A run resolves the listing URLs for the criteria's tag, fans one task
//! per listing URL out onto the scheduler, and each listing task fans one
//! sub-task per result page back onto the same scheduler. Sub-task handles
//! are forwarded to the coordinator over a channel instead of being awaited
//! inside a worker, so a listing task never ties up a worker slot waiting
//! for its own pool. The run barrier covers every handle, top-level and
//! sub-task alike, before the results are exported.

use crate::aggregate::ResultAggregator;
use crate::config::{CatalogConfig, Criteria};
use crate::crawler::fetcher::PageFetcher;
use crate::crawler::links::resolve_links;
use crate::crawler::parser::{extract_candidates, page_count};
use crate::crawler::scheduler::{await_all, SchedulerHandle, TaskHandle};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Outcome summary of one criteria run
#[derive(Debug)]
pub struct RunReport {
    pub tag: String,
    pub listings: usize,
    pub tasks_completed: usize,
    pub tasks_failed: usize,
    pub records: usize,
    pub exported_to: Option<PathBuf>,
}

/// Drives crawl runs over a shared fetcher, scheduler, and exporter
pub struct Coordinator {
    fetcher: PageFetcher,
    scheduler: SchedulerHandle,
    catalog: CatalogConfig,
    exporter: Box<dyn crate::output::Exporter>,
}

impl Coordinator {
    pub fn new(
        fetcher: PageFetcher,
        scheduler: SchedulerHandle,
        catalog: CatalogConfig,
        exporter: Box<dyn crate::output::Exporter>,
    ) -> Self {
        Self {
            fetcher,
            scheduler,
            catalog,
            exporter,
        }
    }

    /// Runs every criteria sequentially over the shared pool and workers
    ///
    /// A run that fails outright is logged and skipped; the remaining
    /// criteria still execute.
    pub async fn run_all(&self, criteria: &[Criteria]) -> Vec<RunReport> {
        let mut reports = Vec::with_capacity(criteria.len());
        for entry in criteria {
            match self.run(entry).await {
                Ok(report) => {
                    tracing::info!(
                        tag = %report.tag,
                        records = report.records,
                        tasks_failed = report.tasks_failed,
                        "run finished"
                    );
                    reports.push(report);
                }
                Err(e) => {
                    tracing::error!(tag = %entry.tag, error = %e, "run aborted");
                }
            }
        }
        reports
    }

    /// Executes one crawl run for `criteria`
    ///
    /// The aggregation set lives for exactly this run and is discarded
    /// after export.
    pub async fn run(&self, criteria: &Criteria) -> crate::Result<RunReport> {
        tracing::info!(
            tag = %criteria.tag,
            min_score = criteria.min_score,
            min_count = criteria.min_count,
            "starting run"
        );

        let aggregator = Arc::new(ResultAggregator::new());
        let criteria_shared = Arc::new(criteria.clone());
        let listings = resolve_links(&self.fetcher, &self.catalog, &criteria.tag).await?;

        // Sub-task handles flow back here so the barrier can cover the
        // full fan-out without any worker awaiting another task.
        let (sub_tx, mut sub_rx) = mpsc::unbounded_channel::<TaskHandle>();

        let mut top_handles = Vec::with_capacity(listings.len());
        for listing in &listings {
            let handle = self.submit_listing(
                listing.clone(),
                Arc::clone(&criteria_shared),
                Arc::clone(&aggregator),
                sub_tx.clone(),
            );
            top_handles.push(handle);
        }
        // Remaining senders are held only by in-flight listing tasks;
        // sub_rx closes once they all finish.
        drop(sub_tx);

        let mut report = await_all(top_handles).await;
        while let Some(handle) = sub_rx.recv().await {
            report.record(handle.wait().await);
        }

        let records = aggregator.sorted_records();
        let exported_to = match self.exporter.export(criteria, &records) {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::error!(tag = %criteria.tag, error = %e, "export failed");
                None
            }
        };

        Ok(RunReport {
            tag: criteria.tag.clone(),
            listings: listings.len(),
            tasks_completed: report.completed,
            tasks_failed: report.failed,
            records: records.len(),
            exported_to,
        })
    }

    /// Submits the per-listing task: page-count probe plus page fan-out
    fn submit_listing(
        &self,
        listing: String,
        criteria: Arc<Criteria>,
        aggregator: Arc<ResultAggregator>,
        sub_tx: mpsc::UnboundedSender<TaskHandle>,
    ) -> TaskHandle {
        let fetcher = self.fetcher.clone();
        let scheduler = self.scheduler.clone();
        let page_size = self.catalog.page_size;
        let listing_url = listing.clone();

        let submission = self.scheduler.submit(async move {
            let body = match fetcher.fetch(&listing).await {
                Ok(body) => body,
                Err(e) if e.degrades_to_empty() => {
                    tracing::warn!(url = %listing, error = %e, "listing unavailable, skipping");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            };

            let pages = page_count(&body);
            tracing::debug!(url = %listing, pages, "listing paginated");

            for index in 0..pages {
                let url = page_url(&listing, index, page_size);
                let task = page_task(
                    fetcher.clone(),
                    url,
                    Arc::clone(&criteria),
                    Arc::clone(&aggregator),
                );
                let handle = match scheduler.submit(task) {
                    Ok(handle) => handle,
                    Err(e) => {
                        tracing::warn!(url = %listing, page = index, error = %e, "page task rejected");
                        TaskHandle::rejected(e.to_string())
                    }
                };
                // The coordinator outlives every listing task; a closed
                // channel only happens when the run was dropped.
                let _ = sub_tx.send(handle);
            }
            Ok(())
        });

        match submission {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(url = %listing_url, error = %e, "listing task rejected");
                TaskHandle::rejected(e.to_string())
            }
        }
    }
}

/// Fetches one result page, filters its entries, and records the matches
async fn page_task(
    fetcher: PageFetcher,
    url: String,
    criteria: Arc<Criteria>,
    aggregator: Arc<ResultAggregator>,
) -> crate::Result<()> {
    let body = match fetcher.fetch(&url).await {
        Ok(body) => body,
        Err(e) if e.degrades_to_empty() => {
            tracing::warn!(url = %url, error = %e, "page unavailable, treated as empty");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    for entry in extract_candidates(&body) {
        if let Some(record) = entry.filter(&criteria) {
            let title = record.title.clone();
            let score = record.score;
            let rating_count = record.rating_count;
            if aggregator.try_add(record) {
                tracing::info!(title = %title, score, rating_count, "found match");
            }
        }
    }
    Ok(())
}

/// Result-page URL for a zero-based page index
fn page_url(listing: &str, index: u32, page_size: u32) -> String {
    format!("{}?start={}&type=T", listing, index * page_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Record;
    use crate::config::{PoolConfig, SchedulerConfig};
    use crate::crawler::scheduler::TaskScheduler;
    use crate::output::{ExportResult, Exporter};
    use crate::pool::{Connector, ConnectionPool, RawResponse, Transport, TransportError};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[test]
    fn test_page_url_steps_by_page_size() {
        assert_eq!(
            page_url("https://books.example.com/tag/essay", 0, 20),
            "https://books.example.com/tag/essay?start=0&type=T"
        );
        assert_eq!(
            page_url("https://books.example.com/tag/essay", 3, 20),
            "https://books.example.com/tag/essay?start=60&type=T"
        );
    }

    struct CannedTransport {
        pages: Arc<HashMap<String, String>>,
    }

    #[async_trait]
    impl Transport for CannedTransport {
        async fn get(
            &self,
            url: &str,
            _headers: &[(String, String)],
        ) -> Result<RawResponse, TransportError> {
            match self.pages.get(url) {
                Some(body) => Ok(RawResponse {
                    status: 200,
                    body: body.clone(),
                    keep_alive: None,
                }),
                None => Ok(RawResponse {
                    status: 404,
                    body: String::new(),
                    keep_alive: None,
                }),
            }
        }
    }

    struct CannedConnector {
        pages: Arc<HashMap<String, String>>,
    }

    #[async_trait]
    impl Connector for CannedConnector {
        async fn connect(&self, _host: &str) -> Result<Box<dyn Transport>, TransportError> {
            Ok(Box::new(CannedTransport {
                pages: Arc::clone(&self.pages),
            }))
        }
    }

    struct CapturingExporter {
        captured: Arc<Mutex<Vec<(String, Vec<Record>)>>>,
    }

    impl Exporter for CapturingExporter {
        fn export(&self, criteria: &Criteria, records: &[Record]) -> ExportResult<PathBuf> {
            self.captured
                .lock()
                .unwrap()
                .push((criteria.tag.clone(), records.to_vec()));
            Ok(PathBuf::from("/dev/null"))
        }
    }

    fn catalog() -> CatalogConfig {
        CatalogConfig {
            base_url: "https://books.example.com".to_string(),
            taxonomy_path: "/tag/".to_string(),
            page_size: 20,
            user_agent: "Chrome/83.0".to_string(),
            session_cookie: None,
        }
    }

    fn entry_html(title: &str, score: &str, count: &str) -> String {
        format!(
            r#"<li class="subject-item">
                <div class="info">
                    <h2><a href="https://books.example.com/subject/{title}/" title="{title}">{title}</a></h2>
                    <div class="star clearfix">
                        <span class="rating_nums">{score}</span>
                        <span class="pl">({count}人评价)</span>
                    </div>
                </div>
            </li>"#
        )
    }

    fn listing_page(entries: &[String], paginator: &str) -> String {
        format!(
            r#"<html><body>
                <div id="subject_list"><ul>{}</ul></div>
                {}
            </body></html>"#,
            entries.join("\n"),
            paginator
        )
    }

    fn fixture_pages() -> HashMap<String, String> {
        let mut pages = HashMap::new();

        pages.insert(
            "https://books.example.com/tag/".to_string(),
            r#"<html><body>
                <a name="life"><h2>life</h2></a>
                <table><tr><td><a href="/tag/essay">essay</a></td></tr></table>
            </body></html>"#
                .to_string(),
        );

        let paginator = r#"<div class="paginator">
            <a href="?start=20&type=T">2</a>
        </div>"#;
        pages.insert(
            "https://books.example.com/tag/essay".to_string(),
            listing_page(&[], paginator),
        );
        pages.insert(
            "https://books.example.com/tag/essay?start=0&type=T".to_string(),
            listing_page(
                &[
                    entry_html("Alpha", "9.0", "3000"),
                    entry_html("Beta", "7.0", "5000"),
                ],
                "",
            ),
        );
        pages.insert(
            "https://books.example.com/tag/essay?start=20&type=T".to_string(),
            listing_page(&[entry_html("Alpha", "9.0", "3000")], ""),
        );

        pages
    }

    #[tokio::test]
    async fn test_run_filters_and_deduplicates_across_pages() {
        let pages = Arc::new(fixture_pages());
        let pool = Arc::new(ConnectionPool::new(
            PoolConfig::default(),
            Arc::new(CannedConnector {
                pages: Arc::clone(&pages),
            }),
        ));
        let scheduler = TaskScheduler::new(&SchedulerConfig::default());
        let captured = Arc::new(Mutex::new(Vec::new()));

        let coordinator = Coordinator::new(
            PageFetcher::new(Arc::clone(&pool), &catalog()),
            scheduler.handle(),
            catalog(),
            Box::new(CapturingExporter {
                captured: Arc::clone(&captured),
            }),
        );

        let criteria = Criteria {
            tag: "life".to_string(),
            min_score: 8.5,
            min_count: 2000,
        };
        let report = coordinator.run(&criteria).await.unwrap();

        // One listing task plus two page tasks, none failed.
        assert_eq!(report.listings, 1);
        assert_eq!(report.tasks_completed, 3);
        assert_eq!(report.tasks_failed, 0);
        // Beta misses the score threshold; Alpha appears on both pages
        // but is recorded once.
        assert_eq!(report.records, 1);

        let captured = captured.lock().unwrap();
        assert_eq!(captured.len(), 1);
        let (tag, records) = &captured[0];
        assert_eq!(tag, "life");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Alpha");

            scheduler.shutdown().await;
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_tag_exports_empty_set() {
        let pages = Arc::new(fixture_pages());
        let pool = Arc::new(ConnectionPool::new(
            PoolConfig::default(),
            Arc::new(CannedConnector { pages }),
        ));
        let scheduler = TaskScheduler::new(&SchedulerConfig::default());
        let captured = Arc::new(Mutex::new(Vec::new()));

        let coordinator = Coordinator::new(
            PageFetcher::new(Arc::clone(&pool), &catalog()),
            scheduler.handle(),
            catalog(),
            Box::new(CapturingExporter {
                captured: Arc::clone(&captured),
            }),
        );

        let criteria = Criteria {
            tag: "philosophy".to_string(),
            min_score: 8.0,
            min_count: 1000,
        };
        let report = coordinator.run(&criteria).await.unwrap();

        assert_eq!(report.listings, 0);
        assert_eq!(report.records, 0);
        assert_eq!(captured.lock().unwrap().len(), 1);

            scheduler.shutdown().await;
        pool.shutdown().await;
    }
}
