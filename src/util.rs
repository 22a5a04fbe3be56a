//! Byte, encoding and path helpers shared by the format parsers.

use std::borrow::Cow;
use std::path::{Component, Path, PathBuf};

use percent_encoding::percent_decode_str;

/// Image extensions recognized as comic pages and inline images.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp"];

/// Bytes inspected when deciding whether a file is binary.
const BINARY_SNIFF_LEN: usize = 8192;

/// Decode bytes to a string, handling various encodings.
///
/// 1. A byte-order mark wins (UTF-8, UTF-16LE/BE).
/// 2. Valid UTF-8 is returned as-is.
/// 3. Otherwise the hint encoding (from `<?xml encoding="..."?>`) is used.
/// 4. Windows-1252 is the last resort (common in old ebooks).
///
/// Uses `Cow<str>` to avoid allocation when the input is valid UTF-8.
pub fn decode_text<'a>(bytes: &'a [u8], hint_encoding: Option<&str>) -> Cow<'a, str> {
    if let Some((encoding, _)) = encoding_rs::Encoding::for_bom(bytes) {
        let (result, _, _) = encoding.decode(bytes);
        return result;
    }

    let (result, _encoding, malformed) = encoding_rs::UTF_8.decode(bytes);
    if !malformed {
        return result;
    }

    if let Some(name) = hint_encoding
        && let Some(encoding) = encoding_rs::Encoding::for_label(name.as_bytes())
    {
        let (result, _, _) = encoding.decode(bytes);
        return result;
    }

    let (result, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
    result
}

/// Decode an XML document using the encoding named in its declaration.
///
/// A declared non-UTF-8 encoding (e.g. `windows-1251` in FB2 files) takes
/// priority over UTF-8 validity so single-byte Cyrillic is not misread.
pub fn decode_xml(bytes: &[u8]) -> Cow<'_, str> {
    let declared = extract_xml_encoding(bytes);
    if let Some(name) = declared
        && encoding_rs::Encoding::for_bom(bytes).is_none()
        && let Some(encoding) = encoding_rs::Encoding::for_label(name.as_bytes())
        && encoding != encoding_rs::UTF_8
        && encoding != encoding_rs::UTF_16LE
        && encoding != encoding_rs::UTF_16BE
    {
        let (result, _, _) = encoding.decode(bytes);
        return result;
    }
    decode_text(bytes, declared)
}

/// Extract encoding from XML declaration.
///
/// Parses `<?xml ... encoding="..." ?>` in the first 100 bytes.
pub fn extract_xml_encoding(bytes: &[u8]) -> Option<&str> {
    let check_len = bytes.len().min(100);
    let prefix = &bytes[..check_len];

    let xml_start = prefix.windows(5).position(|w| w == b"<?xml")?;
    let after_xml = &prefix[xml_start..];

    let enc_pos = after_xml
        .windows(9)
        .position(|w| w.eq_ignore_ascii_case(b"encoding="))?;
    let after_enc = &after_xml[enc_pos + 9..];

    let quote = *after_enc.first()?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }

    let value_end = after_enc[1..].iter().position(|&b| b == quote)? + 1;
    std::str::from_utf8(&after_enc[1..value_end]).ok()
}

/// Whether a byte buffer looks like binary data (NUL in the leading bytes).
pub fn looks_binary(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(BINARY_SNIFF_LEN)];
    if encoding_rs::Encoding::for_bom(head).is_some_and(|(enc, _)| enc != encoding_rs::UTF_8) {
        return false;
    }
    memchr::memchr(0, head).is_some()
}

/// Whether an entry or file name has an image extension.
pub fn is_image_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|i| ext.eq_ignore_ascii_case(i)))
}

/// Resolve a relative href against the path of the document containing it.
///
/// For example, base `OEBPS/text/ch01.xhtml` and href `../images/a%20b.jpg`
/// give `OEBPS/images/a b.jpg`. Fragments are dropped; URLs and `data:`
/// URIs return `None`.
pub fn resolve_href(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.contains("://") || href.starts_with("data:")
    {
        return None;
    }
    let href = href.split('#').next().unwrap_or(href);
    let decoded = percent_decode_str(href).decode_utf8_lossy();

    let joined = if let Some(absolute) = decoded.strip_prefix('/') {
        PathBuf::from(absolute)
    } else {
        Path::new(base)
            .parent()
            .unwrap_or(Path::new(""))
            .join(decoded.as_ref())
    };

    let mut result = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::ParentDir => {
                result.pop();
            }
            Component::Normal(name) => result.push(name),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }

    let resolved = result.to_string_lossy().replace('\\', "/");
    (!resolved.is_empty()).then_some(resolved)
}
