use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use harvest_logging::{harvest_debug, harvest_info};
use url::Url;

use crate::download::{DownloadSink, SinkError};
use crate::fetch::{Fetcher, ProgressSink};
use crate::filename::{destination_filename, disambiguate, FilenamePattern};
use crate::records::RecordSink;
use crate::scrape::{scrape_page, ScrapeError, ScrapedPage};
use crate::{DownloadTask, EngineEvent, FetchRequest, TaskId};

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Downloads in flight at once.
    pub concurrency: usize,
    /// Per-request deadline; `None` leaves the fetcher's default in place.
    pub request_timeout: Option<Duration>,
    pub max_download_bytes: Option<u64>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            request_timeout: None,
            max_download_bytes: None,
        }
    }
}

#[derive(Debug)]
pub struct DownloadOutcome {
    pub task: DownloadTask,
    pub result: Result<u64, SinkError>,
}

/// Outcomes of one batch, in completion order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<DownloadOutcome>,
}

impl BatchReport {
    pub fn completed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.completed()
    }

    pub fn bytes_written(&self) -> u64 {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .sum()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    fn record(&mut self, outcome: DownloadOutcome) {
        self.outcomes.push(outcome);
    }
}

/// One download task per url, writing into `output_dir`.
///
/// Task ids follow the order of `urls`, starting at 0. A file name that
/// collides with an earlier task gets `-{index}` inserted before its extension.
pub fn plan_downloads(urls: &[Url], output_dir: &Path, pattern: &FilenamePattern) -> Vec<DownloadTask> {
    let mut taken = HashSet::new();
    urls.iter()
        .enumerate()
        .map(|(index, url)| {
            let mut filename = destination_filename(pattern, url, index);
            // Case-insensitive filesystems treat `A.jpg` and `a.jpg` as one file.
            if !taken.insert(filename.to_lowercase()) {
                let base = filename;
                let mut suffix = index;
                filename = disambiguate(&base, suffix);
                while !taken.insert(filename.to_lowercase()) {
                    suffix += 1;
                    filename = disambiguate(&base, suffix);
                }
            }
            DownloadTask {
                task_id: index as TaskId,
                source_url: url.to_string(),
                destination_path: output_dir.join(filename),
            }
        })
        .collect()
}

/// Runs scrape and download batches against one fetcher.
pub struct Engine {
    fetcher: Arc<dyn Fetcher>,
    page_fetcher: Option<Arc<dyn Fetcher>>,
    settings: EngineSettings,
}

impl Engine {
    pub fn new(fetcher: Arc<dyn Fetcher>, settings: EngineSettings) -> Self {
        Self {
            fetcher,
            page_fetcher: None,
            settings,
        }
    }

    /// Use a separate fetcher for pages, e.g. one restricted to HTML.
    pub fn with_page_fetcher(mut self, page_fetcher: Arc<dyn Fetcher>) -> Self {
        self.page_fetcher = Some(page_fetcher);
        self
    }

    pub async fn scrape(
        &self,
        page_url: &str,
        selector: &str,
        records: &mut dyn RecordSink,
    ) -> Result<ScrapedPage, ScrapeError> {
        let request = FetchRequest {
            url: page_url.to_string(),
            timeout: self.settings.request_timeout,
        };
        let fetcher = self.page_fetcher.as_ref().unwrap_or(&self.fetcher);
        scrape_page(fetcher.as_ref(), &request, selector, records).await
    }

    /// Downloads every task with at most `concurrency` in flight.
    ///
    /// A failing task never stops its siblings: each failure is recorded in
    /// the report and announced through `progress`, and the batch carries on.
    pub async fn download_all(&self, tasks: Vec<DownloadTask>, progress: &dyn ProgressSink) -> BatchReport {
        let sink = DownloadSink::new(self.fetcher.clone())
            .with_timeout(self.settings.request_timeout)
            .with_max_bytes(self.settings.max_download_bytes);
        let concurrency = self.settings.concurrency.max(1);
        harvest_info!("Downloading {} files, {} at a time", tasks.len(), concurrency);

        let sink = &sink;
        let mut completions = stream::iter(tasks)
            .map(|task| async move {
                let result = sink.persist(&task, progress).await;
                DownloadOutcome { task, result }
            })
            .buffer_unordered(concurrency);

        let mut report = BatchReport::default();
        while let Some(outcome) = completions.next().await {
            match &outcome.result {
                Ok(bytes) => harvest_info!(
                    "Download completed: {} ({} bytes)",
                    outcome.task.destination_path.display(),
                    bytes
                ),
                Err(err) => harvest_debug!(
                    "Download failed: {} from {}: {}",
                    outcome.task.destination_path.display(),
                    outcome.task.source_url,
                    err
                ),
            }
            progress.emit(EngineEvent::TaskCompleted {
                task_id: outcome.task.task_id,
                url: outcome.task.source_url.clone(),
                result: outcome.result.as_ref().copied().map_err(SinkError::to_fetch_error),
            });
            report.record(outcome);
        }
        report
    }
}

/// Paths of every task that finished successfully.
pub fn completed_paths(report: &BatchReport) -> Vec<PathBuf> {
    report
        .outcomes
        .iter()
        .filter(|o| o.result.is_ok())
        .map(|o| o.task.destination_path.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(raw: &[&str]) -> Vec<Url> {
        raw.iter().map(|u| Url::parse(u).unwrap()).collect()
    }

    #[test]
    fn plan_assigns_sequential_ids_and_indexed_names() {
        let tasks = plan_downloads(
            &urls(&["http://example.com/image1.jpg", "http://example.com/image2.png"]),
            Path::new("out"),
            &FilenamePattern::default(),
        );
        assert_eq!(tasks[0].task_id, 0);
        assert_eq!(tasks[0].destination_path, Path::new("out").join("image0.jpg"));
        assert_eq!(tasks[1].task_id, 1);
        assert_eq!(tasks[1].destination_path, Path::new("out").join("image1.png"));
    }

    #[test]
    fn plan_disambiguates_colliding_basenames() {
        let tasks = plan_downloads(
            &urls(&[
                "http://a.example.com/pic.jpg",
                "http://b.example.com/pic.jpg",
                "http://c.example.com/PIC.jpg",
            ]),
            Path::new("out"),
            &FilenamePattern::UrlBasename,
        );
        let names: Vec<_> = tasks
            .iter()
            .map(|t| t.destination_path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["pic.jpg", "pic-1.jpg", "PIC-2.jpg"]);
    }

    #[test]
    fn empty_report_counts_nothing() {
        let report = BatchReport::default();
        assert_eq!(report.completed(), 0);
        assert_eq!(report.failed(), 0);
        assert!(report.is_success());
    }
}
