use harvest_logging::{harvest_debug, harvest_info};
use thiserror::Error;
use url::Url;

use crate::decode::decode_document;
use crate::extract::{compile_selector, extract, resolve_items, ExtractError};
use crate::fetch::{parse_absolute_url, Fetcher};
use crate::records::RecordSink;
use crate::{ExtractedItem, FetchError, FetchRequest};

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapedPage {
    /// Url after redirects; relative hrefs resolve against this.
    pub final_url: Url,
    pub items: Vec<ExtractedItem>,
}

impl ScrapedPage {
    pub fn resolved_urls(&self) -> Vec<Url> {
        resolve_items(&self.items, &self.final_url)
    }
}

/// Fetch one page, decode it and emit every selector match to `records`.
///
/// The selector is compiled before any network traffic so a typo fails fast.
pub async fn scrape_page(
    fetcher: &dyn Fetcher,
    request: &FetchRequest,
    selector: &str,
    records: &mut dyn RecordSink,
) -> Result<ScrapedPage, ScrapeError> {
    compile_selector(selector)?;

    let output = fetcher.fetch(request).await?;
    let decoded = decode_document(&output.bytes, output.content_type());
    harvest_debug!(
        "Decoded {} bytes from {} as {}",
        output.bytes.len(),
        output.metadata.final_url,
        decoded.encoding_label
    );

    let items = extract(&decoded.text, selector)?.items();
    for (index, item) in items.iter().enumerate() {
        records.emit(index, item);
    }
    harvest_info!(
        "Selector `{}` matched {} elements on {}",
        selector,
        items.len(),
        output.metadata.final_url
    );

    let final_url = parse_absolute_url(&output.metadata.final_url)?;
    Ok(ScrapedPage { final_url, items })
}
