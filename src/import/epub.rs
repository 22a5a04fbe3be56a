//! EPUB: an OPF package inside a ZIP container.

use log::{debug, warn};
use quick_xml::events::Event;

use super::{ParseContext, html};
use crate::archive::{Archive, ArchiveKind};
use crate::book::{BookRecord, CoverRef, SourceFormat, TextBlock, UNKNOWN_AUTHOR};
use crate::error::{Error, Result};
use crate::io::BookSource;
use crate::util::{decode_xml, resolve_href};
use crate::xml::{self, attr, element_name};

/// Parsed OPF package data.
#[derive(Debug, Default)]
pub struct Package {
    pub title: Option<String>,
    pub creators: Vec<String>,
    pub description: Option<String>,
    /// Manifest id named by `<meta name="cover" content="...">`.
    pub cover_id: Option<String>,
    pub manifest: Vec<ManifestItem>,
    /// Spine `idref`s in reading order.
    pub spine: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestItem {
    pub id: String,
    pub href: String,
    pub media_type: String,
    pub properties: Option<String>,
}

impl Package {
    fn item(&self, id: &str) -> Option<&ManifestItem> {
        self.manifest.iter().find(|item| item.id == id)
    }

    /// The cover image href: the item named by the cover `<meta>`, then
    /// the EPUB 3 `cover-image` item, then the first image in the manifest.
    pub fn cover_href(&self) -> Option<&str> {
        let by_meta = self.cover_id.as_deref().and_then(|id| self.item(id));
        let by_property = || {
            self.manifest.iter().find(|item| {
                item.properties
                    .as_ref()
                    .is_some_and(|p| p.split_ascii_whitespace().any(|p| p == "cover-image"))
            })
        };
        let first_image = || {
            self.manifest
                .iter()
                .find(|item| item.media_type.to_ascii_lowercase().starts_with("image/"))
        };
        by_meta
            .or_else(by_property)
            .or_else(first_image)
            .map(|item| item.href.as_str())
    }

    /// Archive paths of the spine documents, resolved against the OPF path.
    pub fn spine_paths(&self, opf_path: &str) -> Vec<String> {
        self.spine
            .iter()
            .filter_map(|idref| {
                let item = self.item(idref);
                if item.is_none() {
                    warn!("spine references unknown manifest item '{idref}'");
                }
                item
            })
            .filter_map(|item| resolve_href(opf_path, &item.href))
            .collect()
    }
}

/// Parse an OPF package document.
pub fn parse_opf(content: &str) -> Result<Package> {
    let mut reader = xml::reader(content);
    let mut package = Package::default();

    let mut in_metadata = false;
    let mut current: Option<String> = None;
    let mut buf_text = String::new();

    loop {
        let event = reader.read_event()?;
        match &event {
            Event::Start(e) => {
                let name = element_name(e);
                match name.as_str() {
                    "metadata" => in_metadata = true,
                    "title" | "creator" | "description" if in_metadata => {
                        current = Some(name);
                        buf_text.clear();
                    }
                    "meta" if in_metadata => {
                        if attr(e, "name").is_some_and(|n| n.eq_ignore_ascii_case("cover"))
                            && let Some(id) = attr(e, "content")
                        {
                            package.cover_id = Some(id.trim().to_string());
                        }
                    }
                    "item" => {
                        let id = attr(e, "id").unwrap_or_default();
                        let href = attr(e, "href").unwrap_or_default();
                        if !id.is_empty() && !href.is_empty() {
                            package.manifest.push(ManifestItem {
                                id,
                                href,
                                media_type: attr(e, "media-type").unwrap_or_default(),
                                properties: attr(e, "properties"),
                            });
                        }
                    }
                    "itemref" => {
                        if let Some(idref) = attr(e, "idref") {
                            package.spine.push(idref);
                        }
                    }
                    _ => {}
                }
            }
            Event::End(e) => {
                let name = xml::local_name(e.name().as_ref());
                if name == "metadata" {
                    in_metadata = false;
                }
                if current.as_deref() == Some(name.as_str()) {
                    let value = buf_text.trim().to_string();
                    match name.as_str() {
                        "title" if package.title.is_none() && !value.is_empty() => {
                            package.title = Some(value)
                        }
                        "creator" if !value.is_empty() => package.creators.push(value),
                        "description" if package.description.is_none() => {
                            package.description = Some(value)
                        }
                        _ => {}
                    }
                    current = None;
                    buf_text.clear();
                }
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

    Ok(package)
}

fn open(source: &dyn BookSource, ctx: ParseContext<'_>) -> Result<Archive> {
    Archive::open(source, ArchiveKind::Zip, ctx.config.max_entry_size)
}

/// First `.opf` entry in container order.
fn find_opf(archive: &Archive) -> Option<String> {
    archive
        .find(|name| name.to_ascii_lowercase().ends_with(".opf"))
        .map(|entry| entry.name.clone())
}

fn read_package(archive: &mut Archive, opf_path: &str) -> Result<Package> {
    let bytes = archive.read(opf_path)?;
    parse_opf(&decode_xml(&bytes))
}

pub fn metadata(source: &dyn BookSource, ctx: ParseContext<'_>) -> Result<BookRecord> {
    let mut archive = open(source, ctx)?;
    let opf_path = find_opf(&archive)
        .ok_or_else(|| Error::unsupported(format!("{}: no OPF package document", source.name())))?;
    debug!("{}: package document at {opf_path}", source.name());
    let package = read_package(&mut archive, &opf_path)?;

    let cover = package
        .cover_href()
        .and_then(|href| resolve_href(&opf_path, href))
        .map(CoverRef::Entry);
    let description = package
        .description
        .as_deref()
        .map(html::strip_tags)
        .filter(|d| !d.is_empty());

    let mut record = BookRecord::new(
        package.title.unwrap_or_default(),
        source.name(),
        SourceFormat::Epub,
        source.path(),
    )
    .with_description(description)
    .with_cover(cover);
    for creator in package.creators {
        record = record.with_author(creator);
    }
    if record.authors.is_empty() {
        record = record.with_author(UNKNOWN_AUTHOR);
    }
    Ok(record)
}

/// Walk the spine documents in reading order. Without a usable package
/// document every HTML entry is read in path order instead.
pub fn content(source: &dyn BookSource, ctx: ParseContext<'_>) -> Result<Vec<TextBlock>> {
    let mut archive = open(source, ctx)?;

    let mut documents = match find_opf(&archive) {
        Some(opf_path) => match read_package(&mut archive, &opf_path) {
            Ok(package) => package.spine_paths(&opf_path),
            Err(e) => {
                warn!("{}: unreadable package document: {e}", source.name());
                Vec::new()
            }
        },
        None => Vec::new(),
    };
    if documents.is_empty() {
        warn!("{}: no spine, reading loose HTML entries", source.name());
        documents = loose_documents(&archive);
    }

    let mut builder = ctx.builder();
    for path in documents {
        ctx.cancel.check()?;
        let bytes = match archive.read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("{}: skipping {path}: {e}", source.name());
                continue;
            }
        };
        html::walk_document(&html::decode_html(&bytes), Some(&path), &mut builder);
    }
    Ok(builder.finish())
}

fn loose_documents(archive: &Archive) -> Vec<String> {
    let mut paths: Vec<String> = archive
        .entries()
        .iter()
        .filter(|e| {
            let lower = e.name.to_ascii_lowercase();
            lower.ends_with(".xhtml") || lower.ends_with(".html") || lower.ends_with(".htm")
        })
        .map(|e| e.name.clone())
        .collect();
    paths.sort();
    paths
}
