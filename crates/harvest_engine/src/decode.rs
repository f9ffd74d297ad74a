use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8};
use harvest_logging::harvest_warn;

/// How far into the document to look for a `<meta charset>` declaration.
const META_PRESCAN_BYTES: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedDocument {
    pub text: String,
    pub encoding_label: String,
    /// Malformed sequences were replaced with U+FFFD.
    pub had_errors: bool,
}

/// Decode raw bytes into UTF-8 using: BOM -> Content-Type charset -> `<meta charset>` -> chardetng.
///
/// Never fails: malformed bytes become U+FFFD so the rest of the page stays readable.
pub fn decode_document(bytes: &[u8], content_type: Option<&str>) -> DecodedDocument {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return decode_with(bytes, encoding);
    }

    if let Some(enc) = content_type
        .and_then(charset_from_content_type)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
    {
        return decode_with(bytes, enc);
    }

    if let Some(enc) = charset_from_meta(bytes).and_then(|label| Encoding::for_label(label.as_bytes())) {
        return decode_with(bytes, meta_override(enc));
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let enc = detector.guess(None, true);
    decode_with(bytes, enc)
}

/// A `<meta>` we could read as ASCII cannot be in UTF-16; treat it as UTF-8.
fn meta_override(enc: &'static Encoding) -> &'static Encoding {
    if enc == UTF_16LE || enc == UTF_16BE {
        UTF_8
    } else {
        enc
    }
}

fn charset_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').find_map(|part| {
        let (key, value) = part.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("charset") {
            return None;
        }
        let value = value.trim().trim_matches(['"', '\''].as_ref());
        (!value.is_empty()).then(|| value.to_string())
    })
}

/// Finds `charset=` inside the first `<meta` tags of the document head.
fn charset_from_meta(bytes: &[u8]) -> Option<String> {
    let head = &bytes[..bytes.len().min(META_PRESCAN_BYTES)];
    let head = String::from_utf8_lossy(head).to_ascii_lowercase();
    head.match_indices("<meta").find_map(|(start, _)| {
        let tag = &head[start..];
        let tag = &tag[..tag.find('>').unwrap_or(tag.len())];
        let after = &tag[tag.find("charset=")? + "charset=".len()..];
        let label: String = after
            .trim_start_matches(['"', '\''].as_ref())
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
            .collect();
        (!label.is_empty()).then_some(label)
    })
}

fn decode_with(bytes: &[u8], enc: &'static Encoding) -> DecodedDocument {
    let (text, _, had_errors) = enc.decode(bytes);
    if had_errors {
        harvest_warn!("Malformed {} byte sequences replaced while decoding", enc.name());
    }
    DecodedDocument {
        text: text.into_owned(),
        encoding_label: enc.name().to_string(),
        had_errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_charset_is_case_insensitive() {
        assert_eq!(
            charset_from_content_type("text/html; Charset=\"ISO-8859-1\""),
            Some("ISO-8859-1".to_string())
        );
        assert_eq!(charset_from_content_type("text/html"), None);
    }

    #[test]
    fn meta_charset_is_found_in_head() {
        let html = br#"<html><head><meta charset="windows-1252"><title>x</title>"#;
        assert_eq!(charset_from_meta(html), Some("windows-1252".to_string()));
    }

    #[test]
    fn meta_http_equiv_content_is_found() {
        let html = br#"<meta http-equiv="Content-Type" content="text/html; charset=Shift_JIS">"#;
        assert_eq!(charset_from_meta(html), Some("shift_jis".to_string()));
    }

    #[test]
    fn meta_charset_decodes_latin1_body() {
        let html = b"<meta charset=\"iso-8859-1\"><p>caf\xe9</p>";
        let decoded = decode_document(html, None);
        assert!(decoded.text.contains("caf\u{e9}"));
        assert!(!decoded.had_errors);
    }

    #[test]
    fn utf16_meta_label_decodes_as_utf8() {
        let html = br#"<html><head><meta charset="utf-16"></head><body><a href="img1.jpg">A</a></body></html>"#;
        let decoded = decode_document(html, None);
        assert_eq!(decoded.encoding_label, "UTF-8");
        assert!(!decoded.had_errors);
        assert!(decoded.text.contains(r#"href="img1.jpg""#));
    }

    #[test]
    fn malformed_bytes_are_replaced() {
        let decoded = decode_document(b"caf\xff!", Some("text/html; charset=utf-8"));
        assert!(decoded.had_errors);
        assert_eq!(decoded.text, "caf\u{fffd}!");
    }
}
