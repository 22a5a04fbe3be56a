//! FictionBook 2: a single XML document with metadata, sections and
//! base64 binaries. Also read from inside a ZIP (`.fb2.zip`).
//!
//! Format structure:
//! - `<description>`: metadata (`title-info`, `document-info`, ...)
//! - `<body>`: main content as nested `<section>`s
//! - `<body name="notes">`: footnotes, skipped
//! - `<binary id="...">`: base64-encoded images

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use log::{debug, warn};
use quick_xml::events::Event;

use super::ParseContext;
use crate::archive::{Archive, ArchiveKind};
use crate::book::{BookRecord, CoverRef, SourceFormat, TextBlock};
use crate::error::{Error, Result};
use crate::io::{BookSource, read_all};
use crate::util::decode_xml;
use crate::xml::{self, attr, element_name};

/// Binaries in the wild are often missing their padding.
const BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// FB2 author information
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Fb2Author {
    first_name: Option<String>,
    middle_name: Option<String>,
    last_name: Option<String>,
    nickname: Option<String>,
}

impl fmt::Display for Fb2Author {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = [&self.first_name, &self.middle_name, &self.last_name]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect();
        if parts.is_empty()
            && let Some(nickname) = &self.nickname
        {
            return f.write_str(nickname);
        }
        f.write_str(&parts.join(" "))
    }
}

/// Metadata from `description/title-info`.
#[derive(Debug, Default)]
struct TitleInfo {
    title: Option<String>,
    author: Option<Fb2Author>,
    annotation: Vec<String>,
    cover_id: Option<String>,
}

fn parse_title_info(content: &str) -> Result<TitleInfo> {
    let mut reader = xml::reader(content);
    let mut info = TitleInfo::default();
    let mut path: Vec<String> = Vec::new();
    let mut buf_text = String::new();
    let mut author: Option<Fb2Author> = None;

    loop {
        let event = reader.read_event()?;
        match &event {
            Event::Start(e) => {
                let name = element_name(e);
                if name == "body" {
                    break;
                }
                let in_title_info = path.iter().any(|p| p == "title-info");
                match name.as_str() {
                    "author" if in_title_info && info.author.is_none() => {
                        author = Some(Fb2Author::default());
                    }
                    "image" if in_title_info && path.last().is_some_and(|p| p == "coverpage") => {
                        if let Some(href) = attr(e, "href") {
                            info.cover_id.get_or_insert(href.trim_start_matches('#').to_string());
                        }
                    }
                    _ => {}
                }
                buf_text.clear();
                path.push(name);
            }
            Event::End(_) => {
                let Some(name) = path.pop() else {
                    continue;
                };
                let value = crate::book::collapse_whitespace(&buf_text);
                buf_text.clear();
                let in_title_info = path.iter().any(|p| p == "title-info");
                if !in_title_info {
                    continue;
                }
                let parent = path.last().map(String::as_str);
                match (name.as_str(), parent) {
                    ("book-title", _) if !value.is_empty() => {
                        info.title.get_or_insert(value);
                    }
                    ("first-name" | "middle-name" | "last-name" | "nickname", Some("author")) => {
                        if let Some(author) = author.as_mut()
                            && !value.is_empty()
                        {
                            let slot = match name.as_str() {
                                "first-name" => &mut author.first_name,
                                "middle-name" => &mut author.middle_name,
                                "last-name" => &mut author.last_name,
                                _ => &mut author.nickname,
                            };
                            *slot = Some(value);
                        }
                    }
                    ("author", _) => {
                        if let Some(done) = author.take()
                            && !done.to_string().is_empty()
                        {
                            info.author.get_or_insert(done);
                        }
                    }
                    ("p", _) if path.iter().any(|p| p == "annotation") && !value.is_empty() => {
                        info.annotation.push(value);
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            other => {
                if let Some(text) = xml::event_text(other) {
                    buf_text.push_str(&text);
                }
            }
        }
    }
    Ok(info)
}

/// Decode the `<binary>` elements whose id passes `wanted`.
fn read_binaries(content: &str, wanted: impl Fn(&str) -> bool) -> Result<HashMap<String, Arc<[u8]>>> {
    let mut reader = xml::reader(content);
    let mut binaries = HashMap::new();
    let mut current: Option<String> = None;
    let mut data = String::new();

    loop {
        let event = reader.read_event()?;
        match &event {
            Event::Start(e) if element_name(e) == "binary" => {
                current = attr(e, "id").filter(|id| wanted(id));
                data.clear();
            }
            Event::End(e) if xml::local_name(e.name().as_ref()) == "binary" => {
                if let Some(id) = current.take() {
                    let cleaned: String = data.split_whitespace().collect();
                    match BASE64.decode(cleaned.as_bytes()) {
                        Ok(bytes) => {
                            binaries.insert(id, Arc::from(bytes));
                        }
                        Err(e) => warn!("skipping undecodable binary '{id}': {e}"),
                    }
                }
            }
            Event::Text(_) | Event::CData(_) if current.is_some() => {
                if let Some(text) = xml::event_text(&event) {
                    data.push_str(&text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(binaries)
}

/// Builds paragraph text, turning FB2 inline styles into inline markup.
///
/// Opening markers are held back until the next visible character and
/// closing markers are placed before trailing whitespace, so emphasis
/// never starts or ends on a space.
#[derive(Default)]
struct InlineText {
    buf: String,
    pending: String,
}

impl InlineText {
    fn open(&mut self, marker: &str) {
        self.pending.push_str(marker);
    }

    fn close(&mut self, marker: &str) {
        if let Some(kept) = self.pending.strip_suffix(marker) {
            let len = kept.len();
            self.pending.truncate(len);
            return;
        }
        let content_len = self.buf.trim_end().len();
        let tail = self.buf.split_off(content_len);
        self.buf.push_str(marker);
        self.buf.push_str(&tail);
    }

    fn text(&mut self, text: &str) {
        let escaped = escape_markup(text);
        let lead = escaped.len() - escaped.trim_start().len();
        if self.pending.is_empty() || lead == escaped.len() {
            self.buf.push_str(&escaped);
            return;
        }
        self.buf.push_str(&escaped[..lead]);
        self.buf.push_str(&std::mem::take(&mut self.pending));
        self.buf.push_str(&escaped[lead..]);
    }

    fn finish(self) -> String {
        self.buf
    }
}

fn escape_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '_' | '~' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn marker(name: &str) -> Option<&'static str> {
    match name {
        "strong" => Some("**"),
        "emphasis" => Some("*"),
        "strikethrough" => Some("~~"),
        _ => None,
    }
}

/// Walk the main body into blocks. Images are emitted as
/// `CoverRef::Entry(binary id)` and resolved by the caller.
fn parse_body(content: &str, ctx: ParseContext<'_>) -> Result<Vec<TextBlock>> {
    let mut reader = xml::reader(content);
    let mut builder = ctx.builder();

    let mut found_body = false;
    let mut in_body = false;
    // Depth of a skipped subtree (notes body, secondary bodies, binaries).
    let mut skip_depth = 0usize;
    let mut section_depth = 0usize;
    let mut title: Option<Vec<String>> = None;
    let mut title_para: Option<String> = None;
    let mut paragraph: Option<InlineText> = None;

    loop {
        let event = reader.read_event()?;
        match &event {
            Event::Start(e) => {
                let name = element_name(e);
                if skip_depth > 0 {
                    skip_depth += 1;
                    continue;
                }
                if !in_body {
                    if name == "body" {
                        let is_notes = attr(e, "name").is_some_and(|n| n == "notes");
                        if is_notes || found_body {
                            skip_depth = 1;
                        } else {
                            found_body = true;
                            in_body = true;
                        }
                    }
                    continue;
                }

                match name.as_str() {
                    "section" => {
                        ctx.cancel.check()?;
                        section_depth += 1;
                    }
                    "title" if paragraph.is_none() => title = Some(Vec::new()),
                    "p" if title.is_some() => title_para = Some(String::new()),
                    "p" | "v" | "subtitle" | "text-author" => {
                        paragraph = Some(InlineText::default());
                    }
                    "image" => {
                        if let Some(id) = attr(e, "href") {
                            builder.image(CoverRef::Entry(id.trim_start_matches('#').to_string()));
                        }
                    }
                    other => {
                        if let (Some(marker), Some(p)) = (marker(other), paragraph.as_mut()) {
                            p.open(marker);
                        }
                    }
                }
            }
            Event::End(e) => {
                if skip_depth > 0 {
                    skip_depth -= 1;
                    continue;
                }
                if !in_body {
                    continue;
                }
                let name = xml::local_name(e.name().as_ref());
                match name.as_str() {
                    "body" => in_body = false,
                    "section" => section_depth = section_depth.saturating_sub(1),
                    "title" if paragraph.is_none() => {
                        if let Some(parts) = title.take() {
                            let level = section_depth.saturating_sub(1).min(u8::MAX as usize) as u8;
                            builder.chapter(&parts.join(" "), level);
                        }
                    }
                    "p" if title_para.is_some() => {
                        if let (Some(text), Some(parts)) = (title_para.take(), title.as_mut()) {
                            parts.push(text);
                        }
                    }
                    "p" | "v" | "subtitle" | "text-author" => {
                        if let Some(p) = paragraph.take() {
                            builder.markup_line(&p.finish());
                        }
                    }
                    other => {
                        if let (Some(marker), Some(p)) = (marker(other), paragraph.as_mut()) {
                            p.close(marker);
                        }
                    }
                }
            }
            Event::Eof => break,
            other => {
                if skip_depth > 0 || !in_body {
                    continue;
                }
                if let Some(text) = xml::event_text(other) {
                    if let Some(p) = paragraph.as_mut() {
                        p.text(&text);
                    } else if let Some(t) = title_para.as_mut() {
                        t.push_str(&text);
                    } else if let Some(parts) = title.as_mut() {
                        parts.push(text.into_owned());
                    }
                }
            }
        }
    }

    if !found_body {
        return Err(Error::unsupported("FB2 document has no <body>"));
    }
    Ok(builder.finish())
}

fn metadata_from_bytes(bytes: &[u8], source: &dyn BookSource) -> Result<BookRecord> {
    let text = decode_xml(bytes);
    let info = parse_title_info(&text)?;

    let cover = match &info.cover_id {
        Some(id) => {
            let mut binaries = read_binaries(&text, |b| b == id)?;
            binaries.remove(id).map(CoverRef::Embedded)
        }
        None => None,
    };

    let description = (!info.annotation.is_empty()).then(|| info.annotation.join("\n"));
    let mut record = BookRecord::new(
        info.title.unwrap_or_default(),
        source.name(),
        SourceFormat::Fb2,
        source.path(),
    )
    .with_description(description)
    .with_cover(cover);
    if let Some(author) = info.author {
        record = record.with_author(author.to_string());
    }
    Ok(record)
}

fn content_from_bytes(bytes: &[u8], ctx: ParseContext<'_>) -> Result<Vec<TextBlock>> {
    let text = decode_xml(bytes);
    let mut blocks = parse_body(&text, ctx)?;

    let wanted: Vec<String> = blocks
        .iter()
        .filter_map(|b| match b {
            TextBlock::Image {
                target: CoverRef::Entry(id),
            } => Some(id.clone()),
            _ => None,
        })
        .collect();
    if wanted.is_empty() {
        return Ok(blocks);
    }

    let binaries = read_binaries(&text, |id| wanted.iter().any(|w| w == id))?;
    blocks.retain_mut(|block| match block {
        TextBlock::Image { target } => {
            let CoverRef::Entry(id) = target else {
                return true;
            };
            match binaries.get(id.as_str()) {
                Some(bytes) => {
                    *target = CoverRef::Embedded(Arc::clone(bytes));
                    true
                }
                None => {
                    debug!("dropping image with missing binary '{id}'");
                    false
                }
            }
        }
        _ => true,
    });
    Ok(blocks)
}

pub fn metadata(source: &dyn BookSource, ctx: ParseContext<'_>) -> Result<BookRecord> {
    let bytes = read_all(source, ctx.config.max_document_size)?;
    metadata_from_bytes(&bytes, source)
}

pub fn content(source: &dyn BookSource, ctx: ParseContext<'_>) -> Result<Vec<TextBlock>> {
    let bytes = read_all(source, ctx.config.max_document_size)?;
    content_from_bytes(&bytes, ctx)
}

/// Bytes of the first `.fb2` entry of a ZIP.
fn unzip(source: &dyn BookSource, ctx: ParseContext<'_>) -> Result<Vec<u8>> {
    let mut archive = Archive::open(source, ArchiveKind::Zip, ctx.config.max_entry_size)?;
    let name = archive
        .find(|name| name.to_ascii_lowercase().ends_with(".fb2"))
        .map(|entry| entry.name.clone())
        .ok_or_else(|| Error::unsupported(format!("{}: no .fb2 entry", source.name())))?;
    archive.read(&name)
}

pub fn zipped_metadata(source: &dyn BookSource, ctx: ParseContext<'_>) -> Result<BookRecord> {
    let bytes = unzip(source, ctx)?;
    metadata_from_bytes(&bytes, source)
}

pub fn zipped_content(source: &dyn BookSource, ctx: ParseContext<'_>) -> Result<Vec<TextBlock>> {
    let bytes = unzip(source, ctx)?;
    content_from_bytes(&bytes, ctx)
}
