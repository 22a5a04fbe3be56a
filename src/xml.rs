//! Tolerant XML helpers shared by the OPF, FB2, FODT and ComicInfo readers.
//!
//! Element and attribute names are matched after stripping any namespace
//! prefix and lowercasing, so `dc:Title`, `opf:title` and `title` are the
//! same element. Readers are configured to survive mismatched end tags and
//! stray ampersands, which are common in hand-made ebooks.

use std::borrow::Cow;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

/// A reader over `text` configured for mixed content and sloppy markup.
///
/// Empty elements are expanded into start/end pairs so callers only
/// handle `Start` and `End`.
pub fn reader(text: &str) -> Reader<&[u8]> {
    let mut reader = Reader::from_str(text);
    let config = reader.config_mut();
    config.trim_text(false);
    config.expand_empty_elements = true;
    config.check_end_names = false;
    config.allow_unmatched_ends = true;
    config.allow_dangling_amp = true;
    reader
}

/// Namespace-free, lowercase local name (`"dc:Title"` -> `"title"`).
pub fn local_name(name: &[u8]) -> String {
    let local = name
        .iter()
        .rposition(|&b| b == b':')
        .map(|i| &name[i + 1..])
        .unwrap_or(name);
    String::from_utf8_lossy(local).to_ascii_lowercase()
}

/// Local name of a start tag.
pub fn element_name(e: &BytesStart<'_>) -> String {
    local_name(e.name().as_ref())
}

/// Value of the attribute whose local name is `name` (case-insensitive),
/// with entities unescaped.
pub fn attr(e: &BytesStart<'_>, name: &str) -> Option<String> {
    e.attributes()
        .with_checks(false)
        .flatten()
        .find(|a| local_name(a.key.as_ref()) == name)
        .map(|a| {
            let raw = String::from_utf8_lossy(&a.value);
            match quick_xml::escape::unescape(&raw) {
                Ok(value) => value.into_owned(),
                Err(_) => raw.into_owned(),
            }
        })
}

/// Character data carried by an event: text, CDATA or a resolved entity
/// reference. Other events yield `None`.
pub fn event_text<'a>(event: &'a Event<'_>) -> Option<Cow<'a, str>> {
    match event {
        Event::Text(e) => Some(String::from_utf8_lossy(e.as_ref())),
        Event::CData(e) => Some(String::from_utf8_lossy(e.as_ref())),
        Event::GeneralRef(e) => {
            let entity = String::from_utf8_lossy(e.as_ref());
            Some(Cow::Owned(
                resolve_entity(&entity).unwrap_or_else(|| format!("&{entity};")),
            ))
        }
        _ => None,
    }
}

/// Resolve XML entity references, plus the HTML named entities that show
/// up in ebook XML without a DTD.
pub fn resolve_entity(entity: &str) -> Option<String> {
    let named = match entity {
        "apos" => "'",
        "quot" => "\"",
        "lt" => "<",
        "gt" => ">",
        "amp" => "&",
        "nbsp" => "\u{a0}",
        "shy" => "\u{ad}",
        "ndash" => "\u{2013}",
        "mdash" => "\u{2014}",
        "hellip" => "\u{2026}",
        "lsquo" => "\u{2018}",
        "rsquo" => "\u{2019}",
        "ldquo" => "\u{201c}",
        "rdquo" => "\u{201d}",
        "laquo" => "\u{ab}",
        "raquo" => "\u{bb}",
        "copy" => "\u{a9}",
        _ => "",
    };
    if !named.is_empty() {
        return Some(named.to_string());
    }

    if let Some(hex) = entity
        .strip_prefix("#x")
        .or_else(|| entity.strip_prefix("#X"))
    {
        if let Ok(code) = u32::from_str_radix(hex, 16)
            && let Some(c) = char::from_u32(code)
        {
            return Some(c.to_string());
        }
    } else if let Some(dec) = entity.strip_prefix('#')
        && let Ok(code) = dec.parse::<u32>()
        && let Some(c) = char::from_u32(code)
    {
        return Some(c.to_string());
    }

    None
}
