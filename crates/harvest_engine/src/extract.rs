use harvest_logging::{harvest_debug, harvest_warn};
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::ExtractedItem;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    #[error("invalid selector `{selector}`: {message}")]
    InvalidSelector { selector: String, message: String },
}

/// Selector matches over one document.
///
/// Nothing is parsed until [`Extraction::items`] is called, and every call
/// parses the document again, so the sequence can be restarted at will and
/// always yields the same items in document order.
#[derive(Debug, Clone)]
pub struct Extraction<'a> {
    document: &'a str,
    selector: Selector,
}

/// Compile `selector` and bind it to `document`.
pub fn extract<'a>(document: &'a str, selector: &str) -> Result<Extraction<'a>, ExtractError> {
    let compiled = compile_selector(selector)?;
    Ok(Extraction {
        document,
        selector: compiled,
    })
}

pub(crate) fn compile_selector(selector: &str) -> Result<Selector, ExtractError> {
    Selector::parse(selector).map_err(|err| ExtractError::InvalidSelector {
        selector: selector.to_string(),
        message: err.to_string(),
    })
}

impl Extraction<'_> {
    pub fn items(&self) -> Vec<ExtractedItem> {
        let doc = Html::parse_document(self.document);
        if !doc.errors.is_empty() {
            harvest_debug!("document parsed with {} recoverable errors", doc.errors.len());
        }
        doc.select(&self.selector).map(to_item).collect()
    }

    /// Absolute urls for every item, resolved against `base`.
    ///
    /// Items whose href is empty, a fragment, or a script reference are skipped.
    pub fn resolved(&self, base: &Url) -> Vec<Url> {
        resolve_items(&self.items(), base)
    }
}

impl IntoIterator for &Extraction<'_> {
    type Item = ExtractedItem;
    type IntoIter = std::vec::IntoIter<ExtractedItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items().into_iter()
    }
}

fn to_item(element: ElementRef<'_>) -> ExtractedItem {
    let attrs = element.value();
    let href = attrs
        .attr("href")
        .or_else(|| attrs.attr("src"))
        .unwrap_or_default()
        .to_string();
    let label = element.text().collect::<String>().trim().to_string();
    ExtractedItem { href, label }
}

pub fn resolve_items(items: &[ExtractedItem], base: &Url) -> Vec<Url> {
    items
        .iter()
        .filter_map(|item| {
            let resolved = resolve_href(&item.href, base);
            if resolved.is_none() {
                harvest_warn!("Skipping item `{}` with unusable href `{}`", item.label, item.href);
            }
            resolved
        })
        .collect()
}

pub fn resolve_href(reference: &str, base: &Url) -> Option<Url> {
    let trimmed = reference.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with('#') || lower.starts_with("javascript:") || lower.starts_with("data:") {
        return None;
    }
    let url = match Url::parse(trimmed) {
        Ok(url) => url,
        Err(_) => base.join(trimmed).ok()?,
    };
    matches!(url.scheme(), "http" | "https").then_some(url)
}
