use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

const MAX_STEM_LEN: usize = 80;
const MAX_EXT_LEN: usize = 10;

/// How a download's file name is derived from its url and batch index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilenamePattern {
    /// `{prefix}{index}{ext}`, e.g. `image0.jpg`.
    Indexed { prefix: String },
    /// Last path segment of the url, e.g. `photo.png`.
    UrlBasename,
    /// `{short_hash(url)}{ext}`; stable across runs.
    Hashed,
}

impl Default for FilenamePattern {
    fn default() -> Self {
        FilenamePattern::Indexed {
            prefix: "image".to_string(),
        }
    }
}

/// Windows-safe file name for the download at position `index` of a batch.
pub fn destination_filename(pattern: &FilenamePattern, url: &Url, index: usize) -> String {
    let ext = url_extension(url).map(|e| format!(".{e}")).unwrap_or_default();
    match pattern {
        FilenamePattern::Indexed { prefix } => {
            let stem = sanitize_stem(&format!("{prefix}{index}"), "image");
            format!("{stem}{ext}")
        }
        FilenamePattern::UrlBasename => match last_segment(url) {
            Some(segment) => {
                let (stem, _) = split_extension(segment);
                let stem = sanitize_stem(stem, "download");
                format!("{stem}{ext}")
            }
            None => format!("download{index}{ext}"),
        },
        FilenamePattern::Hashed => format!("{}{ext}", short_hash(url.as_str())),
    }
}

/// Inserts `-{index}` before the extension: `a.jpg` -> `a-3.jpg`.
pub fn disambiguate(filename: &str, index: usize) -> String {
    let (stem, ext) = split_extension(filename);
    match ext {
        Some(ext) => format!("{stem}-{index}.{ext}"),
        None => format!("{stem}-{index}"),
    }
}

fn last_segment(url: &Url) -> Option<&str> {
    url.path_segments()?.next_back().filter(|s| !s.is_empty())
}

fn url_extension(url: &Url) -> Option<String> {
    let (_, ext) = split_extension(last_segment(url)?);
    ext.filter(|e| e.len() <= MAX_EXT_LEN && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| e.to_ascii_lowercase())
}

fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    }
}

fn sanitize_stem(input: &str, fallback: &str) -> String {
    let mut compacted = String::with_capacity(input.len());
    let mut prev_underscore = false;
    for c in input.chars() {
        let c = if is_forbidden(c) { '_' } else { c };
        if c == '_' && prev_underscore {
            continue;
        }
        prev_underscore = c == '_';
        compacted.push(c);
    }
    let mut cleaned = compacted.trim_matches(&['_', ' ', '.'][..]).to_string();
    if cleaned.is_empty() {
        cleaned = fallback.to_string();
    }
    if cleaned.len() > MAX_STEM_LEN {
        let mut end = MAX_STEM_LEN;
        while !cleaned.is_char_boundary(end) {
            end -= 1;
        }
        cleaned.truncate(end);
    }
    if is_reserved_windows_name(&cleaned) {
        cleaned.push('_');
    }
    cleaned
}

fn is_forbidden(c: char) -> bool {
    matches!(c,
        '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0'..='\u{1F}'
    )
}

fn is_reserved_windows_name(name: &str) -> bool {
    const RESERVED: &[&str] = &[
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
}

fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut hex = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        use std::fmt::Write;
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(raw: &str) -> Url {
        Url::parse(raw).unwrap()
    }

    #[test]
    fn indexed_pattern_keeps_extension() {
        let name = destination_filename(
            &FilenamePattern::default(),
            &url("http://example.com/image1.jpg"),
            0,
        );
        assert_eq!(name, "image0.jpg");
    }

    #[test]
    fn basename_pattern_uses_last_segment() {
        let name = destination_filename(
            &FilenamePattern::UrlBasename,
            &url("https://example.com/a/b/photo.PNG?size=large"),
            4,
        );
        assert_eq!(name, "photo.png");
    }

    #[test]
    fn basename_pattern_falls_back_on_directory_urls() {
        let name =
            destination_filename(&FilenamePattern::UrlBasename, &url("https://example.com/"), 2);
        assert_eq!(name, "download2");
    }

    #[test]
    fn basename_pattern_patches_reserved_names() {
        let name = destination_filename(
            &FilenamePattern::UrlBasename,
            &url("https://example.com/CON.txt"),
            0,
        );
        assert_eq!(name, "CON_.txt");
    }

    #[test]
    fn hashed_pattern_is_stable() {
        let u = url("https://example.com/x.gif");
        let first = destination_filename(&FilenamePattern::Hashed, &u, 0);
        let second = destination_filename(&FilenamePattern::Hashed, &u, 9);
        assert_eq!(first, second);
        assert!(first.ends_with(".gif"));
        assert_eq!(first.len(), 16 + ".gif".len());
    }

    #[test]
    fn suspicious_extensions_are_dropped() {
        let name = destination_filename(
            &FilenamePattern::default(),
            &url("https://example.com/file.tar%20gz"),
            1,
        );
        assert_eq!(name, "image1");
    }

    #[test]
    fn disambiguate_inserts_index_before_extension() {
        assert_eq!(disambiguate("a.jpg", 3), "a-3.jpg");
        assert_eq!(disambiguate("noext", 1), "noext-1");
    }
}
