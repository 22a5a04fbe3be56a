//! PDF: Info dictionary metadata and per-page text extraction through
//! lopdf, plus a read-only text search.
//!
//! Page text is rebuilt from the content stream: every change of baseline
//! (`Td`, `TD`, `Tm`, `T*`, `'`, `"`) starts a new line, and each line
//! becomes one paragraph.

use std::collections::BTreeMap;

use log::{debug, warn};
use lopdf::{Dictionary, Document, Encoding, Object, ObjectId};
use serde::Serialize;

use super::ParseContext;
use crate::book::{BookRecord, CoverRef, SourceFormat, TextBlock, collapse_whitespace};
use crate::cancel::CancelToken;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::io::{BookSource, read_all};
use crate::util::decode_text;

/// One occurrence of a search query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    /// Zero-based page index.
    pub page: u32,
    /// Character offset of the match in the page's whitespace-collapsed text.
    pub offset: usize,
    /// The match with surrounding context.
    pub excerpt: String,
}

fn load(source: &dyn BookSource, ctx: ParseContext<'_>) -> Result<Document> {
    let bytes = read_all(source, ctx.config.max_document_size)?;
    Ok(Document::load_mem(&bytes)?)
}

/// Decode a PDF text string: UTF-16BE with BOM, UTF-8, or
/// PDFDocEncoding (read as Windows-1252).
fn text_string(object: &Object) -> Option<String> {
    match object {
        Object::String(bytes, _) => Some(decode_text(bytes, Some("windows-1252")).into_owned()),
        Object::Name(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        _ => None,
    }
}

fn info_dictionary(doc: &Document) -> Option<&Dictionary> {
    match doc.trailer.get(b"Info").ok()? {
        Object::Reference(id) => doc.get_object(*id).ok()?.as_dict().ok(),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

fn split_authors(authors: &str) -> Vec<String> {
    authors
        .split([';', ',', '&'])
        .map(collapse_whitespace)
        .filter(|a| !a.is_empty())
        .collect()
}

pub fn metadata(source: &dyn BookSource, ctx: ParseContext<'_>) -> Result<BookRecord> {
    let doc = load(source, ctx)?;
    let info = info_dictionary(&doc);
    let field = |key: &[u8]| {
        info.and_then(|dict| dict.get(key).ok())
            .and_then(text_string)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };

    let has_pages = !doc.get_pages().is_empty();
    let mut record = BookRecord::new(
        field(b"Title").unwrap_or_default(),
        source.name(),
        SourceFormat::Pdf,
        source.path(),
    )
    .with_description(field(b"Subject"))
    .with_cover(has_pages.then_some(CoverRef::Page(0)));
    for author in field(b"Author").as_deref().map(split_authors).unwrap_or_default() {
        record = record.with_author(author);
    }
    Ok(record)
}

/// Extract the text of every page, in order, checking `cancel` between
/// pages. Pages whose content stream cannot be read are skipped.
fn page_texts(doc: &Document, cancel: &CancelToken) -> Result<Vec<(u32, String)>> {
    let pages = doc.get_pages();
    if pages.is_empty() {
        return Err(Error::unsupported("PDF has no pages"));
    }
    let mut texts = Vec::with_capacity(pages.len());
    for (index, (number, page_id)) in pages.into_iter().enumerate() {
        cancel.check()?;
        match page_text(doc, page_id) {
            Ok(lines) => {
                if lines.skipped > 0 {
                    warn!("page {number}: skipped {} undecodable text runs", lines.skipped);
                }
                texts.push((index as u32, lines.out));
            }
            Err(e) => warn!("skipping page {number}: {e}"),
        }
    }
    Ok(texts)
}

/// Decode one page's content stream into visual lines.
///
/// Runs in a font whose encoding cannot be resolved, and strings that fail
/// to decode, are dropped without losing the rest of the page.
fn page_text(doc: &Document, page_id: ObjectId) -> Result<Lines> {
    let encodings: BTreeMap<Vec<u8>, Encoding<'_>> = doc
        .get_page_fonts(page_id)?
        .into_iter()
        .filter_map(|(name, font)| match font.get_font_encoding(doc) {
            Ok(encoding) => Some((name, encoding)),
            Err(e) => {
                debug!("font {}: {e}", String::from_utf8_lossy(&name));
                None
            }
        })
        .collect();
    let content = doc.get_and_decode_page_content(page_id)?;

    let mut lines = Lines::default();
    let mut font = None;
    for op in &content.operations {
        let operands = op.operands.as_slice();
        let number = |i: usize| operands.get(i).and_then(|o| o.as_float().ok());
        match op.operator.as_str() {
            "q" => lines.saved.push(lines.ctm_y),
            "Q" => {
                if let Some(y) = lines.saved.pop() {
                    lines.ctm_y = y;
                }
            }
            "cm" => lines.ctm_y += number(5).unwrap_or(0.0),
            "BT" => lines.begin_text(),
            "ET" => lines.gap = true,
            "Tf" => {
                let name = operands.first().and_then(|o| o.as_name().ok());
                font = name.and_then(|n| encodings.get(n));
            }
            "TL" => lines.leading = number(0).unwrap_or(0.0),
            "Td" => lines.move_by(number(1).unwrap_or(0.0)),
            "TD" => {
                let ty = number(1).unwrap_or(0.0);
                lines.leading = -ty;
                lines.move_by(ty);
            }
            "Tm" => lines.set_line(number(5).unwrap_or(0.0)),
            "T*" => lines.next_line(),
            "Tj" | "TJ" => lines.show(font, operands),
            "'" => {
                lines.next_line();
                lines.show(font, operands);
            }
            "\"" => {
                lines.next_line();
                lines.show(font, operands.get(2..).unwrap_or_default());
            }
            _ => {}
        }
    }
    Ok(lines)
}

/// Baseline movement below this is treated as the same line.
const LINE_EPSILON: f32 = 0.5;
/// A `TJ` adjustment wider than this (thousandths of an em) is a word gap.
const WORD_GAP: f32 = 100.0;

/// Reassembles visual lines from text-positioning and text-showing
/// operators. Lines are separated by `\n`; pieces of text on the same
/// baseline that were positioned separately are joined with a space.
#[derive(Debug, Default)]
struct Lines {
    out: String,
    skipped: usize,
    /// Vertical offset of the current transformation matrix.
    ctm_y: f32,
    saved: Vec<f32>,
    /// Baseline of the current text line, in text space.
    y: f32,
    leading: f32,
    /// Baseline of the last text written to `out`.
    shown_y: Option<f32>,
    new_line: bool,
    gap: bool,
}

impl Lines {
    fn begin_text(&mut self) {
        self.y = 0.0;
        self.gap = true;
    }

    fn move_by(&mut self, ty: f32) {
        self.y += ty;
        self.gap = true;
    }

    fn set_line(&mut self, y: f32) {
        self.y = y;
        self.gap = true;
    }

    fn next_line(&mut self) {
        self.y -= self.leading;
        self.new_line = true;
    }

    fn show(&mut self, encoding: Option<&Encoding<'_>>, operands: &[Object]) {
        let Some(encoding) = encoding else {
            self.skipped += 1;
            return;
        };
        let mut text = String::new();
        self.decode(encoding, operands, &mut text);
        if text.is_empty() {
            return;
        }
        let baseline = self.ctm_y + self.y;
        if let Some(prev) = self.shown_y {
            if self.new_line || (prev - baseline).abs() > LINE_EPSILON {
                self.out.push('\n');
            } else if self.gap {
                self.out.push(' ');
            }
        }
        self.out.push_str(&text);
        self.shown_y = Some(baseline);
        self.new_line = false;
        self.gap = false;
    }

    fn decode(&mut self, encoding: &Encoding<'_>, operands: &[Object], text: &mut String) {
        for operand in operands {
            match operand {
                Object::String(bytes, _) => match Document::decode_text(encoding, bytes) {
                    Ok(decoded) => text.push_str(&decoded),
                    Err(_) => self.skipped += 1,
                },
                Object::Array(items) => self.decode(encoding, items, text),
                Object::Integer(_) | Object::Real(_) => {
                    if operand.as_float().is_ok_and(|n| n < -WORD_GAP) {
                        text.push(' ');
                    }
                }
                _ => {}
            }
        }
    }
}

/// Join words hyphenated across a line break or a space
/// (`"exam-\nple"` -> `"example"`).
fn join_soft_hyphens(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '-' && i > 0 && chars[i - 1].is_alphabetic() {
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if j > i + 1 && chars.get(j).is_some_and(|n| n.is_lowercase()) {
                i = j;
                continue;
            }
        }
        out.push(c);
        i += 1;
    }
    out
}

/// Split extracted page text into paragraphs, one per visual line.
fn paragraphs(page_text: &str) -> Vec<String> {
    join_soft_hyphens(page_text)
        .split('\n')
        .map(collapse_whitespace)
        .filter(|p| !p.is_empty())
        .collect()
}

pub fn content(source: &dyn BookSource, ctx: ParseContext<'_>) -> Result<Vec<TextBlock>> {
    let doc = load(source, ctx)?;
    let texts = page_texts(&doc, ctx.cancel)?;
    debug!("{}: extracted {} pages", source.name(), texts.len());

    let mut builder = ctx.builder();
    for (_, text) in &texts {
        for paragraph in paragraphs(text) {
            builder.plain(&paragraph);
        }
    }
    Ok(builder.finish())
}

/// Find every case-insensitive occurrence of `query`.
///
/// Matching runs over each page's whitespace-collapsed text, so a query
/// spanning a line break still matches. Each hit carries
/// `config.search_context` characters of context on both sides.
pub fn search(
    source: &dyn BookSource,
    query: &str,
    config: &Config,
    cancel: &CancelToken,
) -> Result<Vec<SearchHit>> {
    let needle: Vec<char> = fold(&collapse_whitespace(query));
    if needle.is_empty() {
        return Ok(Vec::new());
    }
    let doc = load(source, ParseContext::new(config, cancel))?;

    let mut hits = Vec::new();
    for (page, text) in page_texts(&doc, cancel)? {
        let original: Vec<char> = collapse_whitespace(&text).chars().collect();
        let haystack = fold_chars(&original);
        let mut start = 0;
        while start + needle.len() <= haystack.len() {
            if haystack[start..start + needle.len()] != needle[..] {
                start += 1;
                continue;
            }
            let end = start + needle.len();
            let from = start.saturating_sub(config.search_context);
            let to = (end + config.search_context).min(original.len());
            hits.push(SearchHit {
                page,
                offset: start,
                excerpt: original[from..to].iter().collect::<String>().trim().to_string(),
            });
            start = end;
        }
    }
    Ok(hits)
}

/// Lowercase one character at a time so offsets stay aligned with the
/// original text.
fn fold_chars(chars: &[char]) -> Vec<char> {
    chars
        .iter()
        .map(|c| c.to_lowercase().next().unwrap_or(*c))
        .collect()
}

fn fold(text: &str) -> Vec<char> {
    fold_chars(&text.chars().collect::<Vec<_>>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemorySource;
    use crate::pipeline::Pipeline;
    use crate::test_support::{courier, pdf_bytes, pdf_document};
    use lopdf::content::Operation;
    use lopdf::dictionary;

    fn op(operator: &str, operands: Vec<Object>) -> Operation {
        Operation::new(operator, operands)
    }

    fn text(s: &str) -> Object {
        Object::string_literal(s)
    }

    /// One text object holding a heading and a paragraph that wraps over
    /// three lines, moved with `Td`, `T*`, `'` and a kerned `TJ`.
    fn wrapped_story() -> Vec<u8> {
        let page = vec![
            op("BT", vec![]),
            op("Tf", vec!["F1".into(), 12.into()]),
            op("TL", vec![14.into()]),
            op("Td", vec![72.into(), 700.into()]),
            op("Tj", vec![text("Opening")]),
            op("Td", vec![0.into(), (-28).into()]),
            op("Tj", vec![text("The quick brown")]),
            op("T*", vec![]),
            op("Tj", vec![text("fox jumps over the exam-")]),
            op("'", vec![text("ple of a ")]),
            op("TJ", vec![Object::Array(vec![text("lazy"), (-300).into(), text("dog.")])]),
            op("ET", vec![]),
        ];
        pdf_document(vec![page], vec![("F1", courier())], &[])
    }

    fn parts() -> (Config, CancelToken) {
        (Config::default(), CancelToken::new())
    }

    #[test]
    fn test_metadata_from_info() {
        let (config, cancel) = parts();
        let bytes = pdf_bytes(
            &[&["Hello"]],
            &[("Title", "A Paper"), ("Author", "Ann Lee; Bo Park & Cy Diaz"), ("Subject", "Tests")],
        );
        let source = MemorySource::new("paper.pdf", bytes);
        let record = metadata(&source, ParseContext::new(&config, &cancel)).unwrap();
        assert_eq!(record.title, "A Paper");
        assert_eq!(record.authors, vec!["Ann Lee", "Bo Park", "Cy Diaz"]);
        assert_eq!(record.description.as_deref(), Some("Tests"));
        assert_eq!(record.cover, Some(CoverRef::Page(0)));
    }

    #[test]
    fn test_metadata_without_info() {
        let (config, cancel) = parts();
        let source = MemorySource::new("untitled scan.pdf", pdf_bytes(&[&["x"]], &[]));
        let record = metadata(&source, ParseContext::new(&config, &cancel)).unwrap();
        assert_eq!(record.title, "untitled scan");
        assert!(record.authors.is_empty());
    }

    #[test]
    fn test_content_paragraphs() {
        let (config, cancel) = parts();
        let bytes = pdf_bytes(&[&["Opening", "First paragraph."], &["***", "Second page."]], &[]);
        let source = MemorySource::new("doc.pdf", bytes);
        let blocks = content(&source, ParseContext::new(&config, &cancel)).unwrap();
        assert_eq!(
            blocks,
            vec![
                TextBlock::chapter("Opening", 0),
                TextBlock::plain_paragraph("First paragraph."),
                TextBlock::Separator,
                TextBlock::plain_paragraph("Second page."),
            ]
        );
    }

    #[test]
    fn test_search() {
        let (config, cancel) = parts();
        let bytes = pdf_bytes(&[&["Nothing here"], &["The Whale surfaced.", "A whale again."]], &[]);
        let source = MemorySource::new("doc.pdf", bytes);
        let hits = search(&source, "WHALE", &config, &cancel).unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.page == 1));
        assert_eq!(hits[0].offset, 4);
        assert!(hits[0].excerpt.contains("The Whale surfaced."));
        assert!(search(&source, "   ", &config, &cancel).unwrap().is_empty());
    }

    #[test]
    fn test_cancelled_between_pages() {
        let (config, cancel) = parts();
        cancel.cancel();
        let source = MemorySource::new("doc.pdf", pdf_bytes(&[&["a"], &["b"]], &[]));
        assert!(matches!(
            content(&source, ParseContext::new(&config, &cancel)),
            Err(Error::Cancelled)
        ));
    }

    #[test]
    fn test_garbage_is_corrupt() {
        let (config, cancel) = parts();
        let source = MemorySource::new("bad.pdf", b"%PDF-1.4\nnot really".to_vec());
        assert!(matches!(
            content(&source, ParseContext::new(&config, &cancel)),
            Err(Error::CorruptContainer(_))
        ));
    }

    #[test]
    fn test_lines_inside_one_text_object() {
        let (config, cancel) = parts();
        let source = MemorySource::new("story.pdf", wrapped_story());
        let blocks = content(&source, ParseContext::new(&config, &cancel)).unwrap();
        assert_eq!(
            blocks,
            vec![
                TextBlock::chapter("Opening", 0),
                TextBlock::plain_paragraph("The quick brown"),
                TextBlock::plain_paragraph("fox jumps over the example of a lazy dog."),
            ]
        );
        assert!(Pipeline::default().content(&source).is_ok());
    }

    #[test]
    fn test_search_across_line_moves() {
        let (config, cancel) = parts();
        let source = MemorySource::new("story.pdf", wrapped_story());
        let hits = search(&source, "brown fox", &config, &cancel).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].page, 0);
        assert_eq!(hits[0].offset, 18);
        assert_eq!(search(&source, "lazy dog", &config, &cancel).unwrap().len(), 1);
    }

    #[test]
    fn test_same_baseline_objects_share_a_line() {
        let (config, cancel) = parts();
        let page = vec![
            op("BT", vec![]),
            op("Tf", vec!["F1".into(), 12.into()]),
            op("Td", vec![72.into(), 700.into()]),
            op("Tj", vec![text("Title")]),
            op("ET", vec![]),
            op("BT", vec![]),
            op("Tf", vec!["F1".into(), 12.into()]),
            op("Td", vec![72.into(), 680.into()]),
            op("Tj", vec![text("Hello")]),
            op("ET", vec![]),
            op("BT", vec![]),
            op("Tf", vec!["F1".into(), 12.into()]),
            op("Td", vec![150.into(), 680.into()]),
            op("Tj", vec![text("world")]),
            op("ET", vec![]),
            op("q", vec![]),
            op("cm", vec![1.into(), 0.into(), 0.into(), 1.into(), 72.into(), 600.into()]),
            op("BT", vec![]),
            op("Tf", vec!["F1".into(), 12.into()]),
            op("Tj", vec![text("Placed by cm")]),
            op("ET", vec![]),
            op("Q", vec![]),
        ];
        let bytes = pdf_document(vec![page], vec![("F1", courier())], &[]);
        let source = MemorySource::new("doc.pdf", bytes);
        let blocks = content(&source, ParseContext::new(&config, &cancel)).unwrap();
        assert_eq!(
            blocks,
            vec![
                TextBlock::chapter("Title", 0),
                TextBlock::plain_paragraph("Hello world"),
                TextBlock::plain_paragraph("Placed by cm"),
            ]
        );
    }

    #[test]
    fn test_undecodable_runs_keep_the_page() {
        let (config, cancel) = parts();
        let line = |font: &str, y: i64, s: Object| {
            vec![
                op("BT", vec![]),
                op("Tf", vec![font.into(), 12.into()]),
                op("Td", vec![72.into(), y.into()]),
                op("Tj", vec![s]),
                op("ET", vec![]),
            ]
        };
        let page = [
            line("F1", 700, text("Kept line")),
            line("F2", 680, Object::String(vec![0x00, 0x41], lopdf::StringFormat::Hexadecimal)),
            line("F3", 660, text("lost")),
            line("F1", 640, text("Also kept")),
        ]
        .concat();
        let fonts = vec![
            ("F1", courier()),
            // Identity-H without a ToUnicode map has no usable encoding.
            (
                "F2",
                dictionary! {
                    "Type" => "Font",
                    "Subtype" => "Type0",
                    "BaseFont" => "Unknown",
                    "Encoding" => "Identity-H",
                },
            ),
            (
                "F3",
                dictionary! {
                    "Type" => "Font",
                    "Subtype" => "Type1",
                    "BaseFont" => "Odd",
                    "Encoding" => "OddEncoding",
                },
            ),
        ];
        let bytes = pdf_document(vec![page], fonts, &[]);
        let source = MemorySource::new("mixed.pdf", bytes);
        let blocks = content(&source, ParseContext::new(&config, &cancel)).unwrap();
        assert_eq!(
            blocks,
            vec![
                TextBlock::chapter("Kept line", 0),
                TextBlock::plain_paragraph("Also kept"),
            ]
        );
    }

    #[test]
    fn test_soft_hyphen_join() {
        assert_eq!(join_soft_hyphens("exam- ple text"), "example text");
        assert_eq!(join_soft_hyphens("exam-\nple"), "example");
        assert_eq!(join_soft_hyphens("well-known"), "well-known");
        assert_eq!(join_soft_hyphens("pre- And"), "pre- And");
    }

    #[test]
    fn test_split_authors() {
        assert_eq!(split_authors(" A ;B, C & D "), vec!["A", "B", "C", "D"]);
        assert!(split_authors(" ; ").is_empty());
    }
}
