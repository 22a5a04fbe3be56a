//! Flat OpenDocument Text (`.fodt`): a single XML file holding metadata,
//! styles and the document body.

use log::debug;
use quick_xml::events::Event;

use super::ParseContext;
use crate::book::{BookRecord, SourceFormat, TextBlock, collapse_whitespace};
use crate::error::{Error, Result};
use crate::io::{BookSource, read_all};
use crate::util::decode_xml;
use crate::xml::{self, attr, element_name};

/// Inline subtrees whose text never belongs to the reading flow.
const SKIPPED: &[&str] = &["note", "annotation", "tracked-changes"];

/// Children of the document root holding no reading text. Matched only
/// at that depth: `text:meta` inside a paragraph is ordinary text.
const SKIPPED_SECTIONS: &[&str] = &[
    "meta",
    "settings",
    "scripts",
    "font-face-decls",
    "styles",
    "automatic-styles",
    "master-styles",
];

#[derive(Debug, Default, PartialEq, Eq)]
struct OdtMeta {
    title: Option<String>,
    creator: Option<String>,
    initial_creator: Option<String>,
    description: Option<String>,
    subject: Option<String>,
}

fn parse_meta(content: &str) -> Result<OdtMeta> {
    let mut reader = xml::reader(content);
    let mut meta = OdtMeta::default();
    let mut in_meta = false;
    let mut current: Option<String> = None;
    let mut buf_text = String::new();

    loop {
        let event = reader.read_event()?;
        match &event {
            Event::Start(e) => {
                let name = element_name(e);
                if name == "body" {
                    break;
                }
                if name == "meta" {
                    in_meta = true;
                } else if in_meta {
                    current = Some(name);
                    buf_text.clear();
                }
            }
            Event::End(e) => {
                let name = xml::local_name(e.name().as_ref());
                if name == "meta" {
                    in_meta = false;
                    continue;
                }
                if current.as_deref() != Some(name.as_str()) {
                    continue;
                }
                current = None;
                let value = collapse_whitespace(&buf_text);
                if value.is_empty() {
                    continue;
                }
                let slot = match name.as_str() {
                    "title" => &mut meta.title,
                    "creator" => &mut meta.creator,
                    "initial-creator" => &mut meta.initial_creator,
                    "description" => &mut meta.description,
                    "subject" => &mut meta.subject,
                    _ => continue,
                };
                slot.get_or_insert(value);
            }
            Event::Eof => break,
            other => {
                if current.is_some()
                    && let Some(text) = xml::event_text(other)
                {
                    buf_text.push_str(&text);
                }
            }
        }
    }
    Ok(meta)
}

enum OpenBlock {
    Heading { level: u8, text: String },
    Paragraph(String),
}

impl OpenBlock {
    fn text_mut(&mut self) -> &mut String {
        match self {
            OpenBlock::Heading { text, .. } | OpenBlock::Paragraph(text) => text,
        }
    }
}

/// Collect `text:h` and `text:p` elements. With `scoped`, only the
/// `office:body/office:text` container is read and `None` is returned
/// when it is missing.
fn scan(content: &str, ctx: ParseContext<'_>, scoped: bool) -> Result<Option<Vec<TextBlock>>> {
    let mut reader = xml::reader(content);
    let mut builder = ctx.builder();
    let mut path: Vec<String> = Vec::new();
    let mut found_container = false;
    let mut container_depth: Option<usize> = None;
    let mut skip_depth = 0usize;
    let mut open: Vec<OpenBlock> = Vec::new();

    loop {
        let event = reader.read_event()?;
        match &event {
            Event::Start(e) => {
                let name = element_name(e);
                if skip_depth > 0 {
                    skip_depth += 1;
                    path.push(name);
                    continue;
                }
                if scoped
                    && name == "text"
                    && container_depth.is_none()
                    && path.last().is_some_and(|p| p == "body")
                {
                    found_container = true;
                    container_depth = Some(path.len());
                }
                let active = !scoped || container_depth.is_some();

                if SKIPPED.contains(&name.as_str())
                    || (path.len() == 1 && SKIPPED_SECTIONS.contains(&name.as_str()))
                {
                    skip_depth = 1;
                } else if active {
                    match name.as_str() {
                        "h" => {
                            let level = attr(e, "outline-level")
                                .and_then(|l| l.trim().parse::<u8>().ok())
                                .unwrap_or(1)
                                .saturating_sub(1);
                            open.push(OpenBlock::Heading {
                                level,
                                text: String::new(),
                            });
                        }
                        "p" => {
                            ctx.cancel.check()?;
                            open.push(OpenBlock::Paragraph(String::new()));
                        }
                        "s" => {
                            let count = attr(e, "c")
                                .and_then(|c| c.trim().parse::<usize>().ok())
                                .unwrap_or(1);
                            if let Some(block) = open.last_mut() {
                                block.text_mut().push_str(&" ".repeat(count.min(64)));
                            }
                        }
                        "tab" => {
                            if let Some(block) = open.last_mut() {
                                block.text_mut().push('\t');
                            }
                        }
                        "line-break" => {
                            if let Some(block) = open.last_mut() {
                                block.text_mut().push(' ');
                            }
                        }
                        _ => {}
                    }
                }
                path.push(name);
            }
            Event::End(_) => {
                let Some(name) = path.pop() else {
                    continue;
                };
                if skip_depth > 0 {
                    skip_depth -= 1;
                    continue;
                }
                if container_depth == Some(path.len()) {
                    container_depth = None;
                }
                if matches!(name.as_str(), "h" | "p") {
                    match open.pop() {
                        Some(OpenBlock::Heading { level, text }) => builder.chapter(&text, level),
                        Some(OpenBlock::Paragraph(text)) => builder.plain(&text),
                        None => {}
                    }
                }
            }
            Event::Eof => break,
            other => {
                if skip_depth == 0
                    && let Some(block) = open.last_mut()
                    && let Some(text) = xml::event_text(other)
                {
                    block.text_mut().push_str(&text);
                }
            }
        }
    }

    if scoped && !found_container {
        return Ok(None);
    }
    if builder.is_empty() {
        return Err(Error::unsupported("no headings or paragraphs in document"));
    }
    Ok(Some(builder.finish()))
}

pub fn metadata(source: &dyn BookSource, ctx: ParseContext<'_>) -> Result<BookRecord> {
    let bytes = read_all(source, ctx.config.max_document_size)?;
    let meta = parse_meta(&decode_xml(&bytes))?;

    let mut record = BookRecord::new(
        meta.title.unwrap_or_default(),
        source.name(),
        SourceFormat::Fodt,
        source.path(),
    )
    .with_description(meta.description.or(meta.subject));
    if let Some(author) = meta.creator.or(meta.initial_creator) {
        record = record.with_author(author);
    }
    Ok(record)
}

pub fn content(source: &dyn BookSource, ctx: ParseContext<'_>) -> Result<Vec<TextBlock>> {
    let bytes = read_all(source, ctx.config.max_document_size)?;
    let text = decode_xml(&bytes);
    if let Some(blocks) = scan(&text, ctx, true)? {
        return Ok(blocks);
    }
    debug!("{}: no office:text container, scanning whole document", source.name());
    scan(&text, ctx, false)?.ok_or_else(|| Error::unsupported("no document body"))
}
