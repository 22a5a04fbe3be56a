//! Standalone HTML/XHTML files, plus the block walker EPUB content
//! documents go through.

use scraper::{ElementRef, Html, Node};

use super::{BlockBuilder, ParseContext};
use crate::book::{BookRecord, CoverRef, Emphasis, SourceFormat, StyledRun, TextBlock};
use crate::error::Result;
use crate::io::{BookSource, read_all};
use crate::util::{decode_text, resolve_href};

/// Title from `<title>`, author and description from `<meta>`.
pub fn metadata(source: &dyn BookSource, ctx: ParseContext<'_>) -> Result<BookRecord> {
    let bytes = read_all(source, ctx.config.max_document_size)?;
    let document = Html::parse_document(&decode_html(&bytes));

    let mut title = String::new();
    let mut author = None;
    let mut description = None;
    for element in document.root_element().descendants().filter_map(ElementRef::wrap) {
        match element.value().name() {
            "title" if title.is_empty() => title = element.text().collect(),
            "meta" => {
                let name = element.value().attr("name").unwrap_or_default();
                let content = element.value().attr("content").map(str::to_string);
                if name.eq_ignore_ascii_case("author") && author.is_none() {
                    author = content;
                } else if name.eq_ignore_ascii_case("description") && description.is_none() {
                    description = content;
                }
            }
            _ => {}
        }
    }

    let mut record = BookRecord::new(title, source.name(), SourceFormat::Html, source.path())
        .with_description(description);
    if let Some(author) = author {
        record = record.with_author(author);
    }
    Ok(record)
}

pub fn content(source: &dyn BookSource, ctx: ParseContext<'_>) -> Result<Vec<TextBlock>> {
    let bytes = read_all(source, ctx.config.max_document_size)?;
    let mut builder = ctx.builder();
    walk_document(&decode_html(&bytes), None, &mut builder);
    Ok(builder.finish())
}

/// Decode HTML bytes, honouring an XML declaration or `<meta charset>`.
pub(crate) fn decode_html(bytes: &[u8]) -> String {
    let hint = crate::util::extract_xml_encoding(bytes).or_else(|| meta_charset(bytes));
    decode_text(bytes, hint).into_owned()
}

fn meta_charset(bytes: &[u8]) -> Option<&str> {
    let head = &bytes[..bytes.len().min(1024)];
    let lower = head.to_ascii_lowercase();
    let pos = memchr::memmem::find(&lower, b"charset=")? + b"charset=".len();
    let rest = &head[pos..];
    let rest = rest.strip_prefix(b"\"").or_else(|| rest.strip_prefix(b"'")).unwrap_or(rest);
    let end = rest
        .iter()
        .position(|b| !(b.is_ascii_alphanumeric() || *b == b'-' || *b == b'_'))
        .unwrap_or(rest.len());
    std::str::from_utf8(&rest[..end]).ok().filter(|s| !s.is_empty())
}

/// Plain text of an HTML fragment with tags removed and whitespace
/// collapsed.
pub(crate) fn strip_tags(fragment: &str) -> String {
    let html = Html::parse_fragment(fragment);
    let text: String = html.root_element().text().collect::<Vec<_>>().join(" ");
    crate::book::collapse_whitespace(&text)
}

/// Walk a parsed document body into `builder`.
///
/// `base` is the archive path of the document; images are only emitted
/// when it is known, since their targets are archive entries.
pub(crate) fn walk_document(text: &str, base: Option<&str>, builder: &mut BlockBuilder<'_>) {
    let document = Html::parse_document(text);
    let root = document.root_element();
    let body = root
        .descendants()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == "body")
        .unwrap_or(root);

    let mut walker = Walker {
        builder,
        base,
        runs: Vec::new(),
        emphasis: Emphasis::PLAIN,
    };
    walker.children(body);
    walker.flush();
}

fn heading_level(name: &str) -> Option<u8> {
    match name {
        "h1" => Some(0),
        "h2" => Some(1),
        "h3" => Some(2),
        "h4" => Some(3),
        "h5" => Some(4),
        "h6" => Some(5),
        _ => None,
    }
}

fn is_block(name: &str) -> bool {
    matches!(
        name,
        "p" | "div"
            | "li"
            | "ul"
            | "ol"
            | "dl"
            | "dt"
            | "dd"
            | "blockquote"
            | "pre"
            | "table"
            | "thead"
            | "tbody"
            | "tfoot"
            | "tr"
            | "td"
            | "th"
            | "caption"
            | "section"
            | "article"
            | "aside"
            | "header"
            | "footer"
            | "main"
            | "nav"
            | "figure"
            | "figcaption"
            | "address"
            | "center"
            | "body"
    )
}

struct Walker<'w, 'c> {
    builder: &'w mut BlockBuilder<'c>,
    base: Option<&'w str>,
    runs: Vec<StyledRun>,
    emphasis: Emphasis,
}

impl Walker<'_, '_> {
    fn children(&mut self, element: ElementRef<'_>) {
        for child in element.children() {
            match child.value() {
                Node::Text(text) => self.text(text),
                Node::Element(_) => {
                    if let Some(child) = ElementRef::wrap(child) {
                        self.element(child);
                    }
                }
                _ => {}
            }
        }
    }

    fn element(&mut self, element: ElementRef<'_>) {
        let name = element.value().name();
        if let Some(level) = heading_level(name) {
            self.flush();
            let title: String = element.text().collect();
            self.builder.chapter(&title, level);
            return;
        }

        match name {
            "script" | "style" | "head" | "title" | "noscript" | "template" => {}
            "br" => self.text(" "),
            "hr" => {
                self.flush();
                self.builder.separator();
            }
            "img" | "image" => {
                let value = element.value();
                // SVG images carry a namespaced xlink:href, so match on the
                // local attribute name.
                let src = value
                    .attr("src")
                    .or_else(|| value.attrs().find(|(k, _)| *k == "href").map(|(_, v)| v));
                if let (Some(base), Some(src)) = (self.base, src)
                    && let Some(path) = resolve_href(base, src)
                {
                    self.flush();
                    self.builder.image(CoverRef::Entry(path));
                }
            }
            "b" | "strong" => self.styled(element, |e| e.bold = true),
            "i" | "em" | "cite" | "dfn" | "var" => self.styled(element, |e| e.italic = true),
            "s" | "strike" | "del" => self.styled(element, |e| e.strikethrough = true),
            _ if is_block(name) => {
                self.flush();
                self.children(element);
                self.flush();
            }
            _ => self.children(element),
        }
    }

    fn styled(&mut self, element: ElementRef<'_>, apply: impl Fn(&mut Emphasis)) {
        let saved = self.emphasis;
        apply(&mut self.emphasis);
        self.children(element);
        self.emphasis = saved;
    }

    fn text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        match self.runs.last_mut() {
            Some(last) if last.emphasis == self.emphasis => last.text.push_str(text),
            _ => self.runs.push(StyledRun::styled(text, self.emphasis)),
        }
    }

    fn flush(&mut self) {
        if !self.runs.is_empty() {
            self.builder.paragraph(std::mem::take(&mut self.runs));
        }
    }
}
