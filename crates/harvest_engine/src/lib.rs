//! Harvest engine: fetch, extract and persist pipeline.
mod decode;
mod download;
mod engine;
mod extract;
mod fetch;
mod filename;
mod records;
mod scrape;
mod types;

pub use decode::{decode_document, DecodedDocument};
pub use download::{DownloadSink, SinkError};
pub use engine::{
    completed_paths, plan_downloads, BatchReport, DownloadOutcome, Engine, EngineSettings,
};
pub use extract::{extract, resolve_href, resolve_items, ExtractError, Extraction};
pub use fetch::{
    parse_absolute_url, FetchSettings, Fetcher, ProgressSink, ReqwestFetcher, ResponseStream,
};
pub use filename::{destination_filename, disambiguate, FilenamePattern};
pub use records::{
    ensure_output_dir, write_atomically, write_records_json, CollectingRecordSink, LogRecordSink,
    OutputError, RecordSink,
};
pub use scrape::{scrape_page, ScrapeError, ScrapedPage};
pub use types::{
    DownloadTask, EngineEvent, ExtractedItem, FailureKind, FetchError, FetchMetadata,
    FetchOutput, FetchRequest, Stage, TaskId, TaskProgress,
};
