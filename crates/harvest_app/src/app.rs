use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use harvest_core::BatchSummary;
use harvest_engine::{
    ensure_output_dir, plan_downloads, write_records_json, Engine, EngineSettings, FetchSettings,
    LogRecordSink, ReqwestFetcher,
};
use harvest_logging::harvest_info;

use crate::config::HarvestConfig;
use crate::effects::ProgressBridge;

/// Scrape the target page and download everything the selector points at.
///
/// Runs on a single-threaded runtime: downloads interleave on one thread.
pub fn run(config: &HarvestConfig) -> anyhow::Result<BatchSummary> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;
    runtime.block_on(harvest(config))
}

async fn harvest(config: &HarvestConfig) -> anyhow::Result<BatchSummary> {
    ensure_output_dir(&config.output_dir)
        .with_context(|| format!("output directory {}", config.output_dir.display()))?;

    let engine = build_engine(config);
    let page = engine
        .scrape(&config.target_url, &config.selector, &mut LogRecordSink)
        .await
        .with_context(|| format!("scraping {} failed", config.target_url))?;

    if let Some(records_file) = &config.records_file {
        write_records_json(&config.output_dir, records_file, &page.items)
            .context("writing extracted records failed")?;
    }

    let urls = page.resolved_urls();
    if urls.is_empty() {
        harvest_info!("Nothing to download from {}", page.final_url);
        return Ok(BatchSummary::default());
    }

    let tasks = plan_downloads(&urls, &config.output_dir, &config.filename_pattern);
    let bridge = ProgressBridge::new();
    bridge.queue(&tasks);
    let report = engine.download_all(tasks, &bridge).await;
    harvest_info!(
        "completed={} failed={} bytes={}",
        report.completed(),
        report.failed(),
        report.bytes_written()
    );

    Ok(bridge.summary())
}

fn build_engine(config: &HarvestConfig) -> Engine {
    let settings = EngineSettings {
        concurrency: config.concurrency,
        request_timeout: config.timeout_ms.map(Duration::from_millis),
        max_download_bytes: config.max_download_bytes,
    };
    let downloads = ReqwestFetcher::new(FetchSettings::default());
    let pages = ReqwestFetcher::new(FetchSettings::for_documents());
    Engine::new(Arc::new(downloads), settings).with_page_fetcher(Arc::new(pages))
}
