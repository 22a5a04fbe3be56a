//! Comic archives (CBZ, CBR, CB7, CBT): every image entry is a page.

use log::warn;
use quick_xml::events::Event;

use super::ParseContext;
use crate::archive::{Archive, ArchiveKind};
use crate::book::{BookRecord, CoverRef, SourceFormat, TextBlock};
use crate::error::Result;
use crate::io::BookSource;
use crate::util::{decode_xml, is_image_name};
use crate::xml::{self, element_name};

/// Fields read from a `ComicInfo.xml` entry.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ComicInfo {
    pub title: Option<String>,
    pub series: Option<String>,
    pub number: Option<String>,
    pub writer: Option<String>,
    pub summary: Option<String>,
}

impl ComicInfo {
    /// `Title`, else `Series #Number`, else `Series`.
    pub fn display_title(&self) -> Option<String> {
        if let Some(title) = &self.title {
            return Some(title.clone());
        }
        let series = self.series.as_ref()?;
        Some(match &self.number {
            Some(number) => format!("{series} #{number}"),
            None => series.clone(),
        })
    }

    /// Writers, split on commas.
    pub fn writers(&self) -> Vec<String> {
        self.writer
            .as_deref()
            .map(|w| {
                w.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

pub fn parse_comic_info(content: &str) -> Result<ComicInfo> {
    let mut reader = xml::reader(content);
    let mut info = ComicInfo::default();
    let mut current: Option<String> = None;
    let mut buf_text = String::new();

    loop {
        let event = reader.read_event()?;
        match &event {
            Event::Start(e) => {
                current = Some(element_name(e));
                buf_text.clear();
            }
            Event::End(_) => {
                let value = buf_text.trim().to_string();
                if let Some(name) = current.take()
                    && !value.is_empty()
                {
                    let slot = match name.as_str() {
                        "title" => &mut info.title,
                        "series" => &mut info.series,
                        "number" => &mut info.number,
                        "writer" => &mut info.writer,
                        "summary" => &mut info.summary,
                        _ => continue,
                    };
                    slot.get_or_insert(value);
                }
                buf_text.clear();
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

/// Image entries sorted by full path, byte order.
pub fn page_names(archive: &Archive) -> Vec<String> {
    let mut pages: Vec<String> = archive
        .entries()
        .iter()
        .filter(|e| is_image_name(&e.name))
        .map(|e| e.name.clone())
        .collect();
    pages.sort();
    pages
}

fn open(
    source: &dyn BookSource,
    hint: Option<ArchiveKind>,
    ctx: ParseContext<'_>,
) -> Result<Archive> {
    Archive::open_detect(source, hint, ctx.config.max_entry_size)
}

fn read_comic_info(archive: &mut Archive, display: &str) -> Option<ComicInfo> {
    let name = archive
        .find(|name| {
            name.rsplit('/')
                .next()
                .is_some_and(|base| base.eq_ignore_ascii_case("comicinfo.xml"))
        })?
        .name
        .clone();
    let parsed = archive
        .read(&name)
        .and_then(|bytes| parse_comic_info(&decode_xml(&bytes)));
    match parsed {
        Ok(info) => Some(info),
        Err(e) => {
            warn!("{display}: ignoring unreadable {name}: {e}");
            None
        }
    }
}

pub fn metadata(
    source: &dyn BookSource,
    hint: Option<ArchiveKind>,
    ctx: ParseContext<'_>,
) -> Result<BookRecord> {
    let mut archive = open(source, hint, ctx)?;
    let cover = page_names(&archive).into_iter().next().map(CoverRef::Entry);
    let info = read_comic_info(&mut archive, source.name()).unwrap_or_default();

    let mut record = BookRecord::new(
        info.display_title().unwrap_or_default(),
        source.name(),
        SourceFormat::Comic,
        source.path(),
    )
    .with_description(info.summary.clone())
    .with_cover(cover);
    for writer in info.writers() {
        record = record.with_author(writer);
    }
    Ok(record)
}

/// One image block per page, in sorted order.
pub fn content(
    source: &dyn BookSource,
    hint: Option<ArchiveKind>,
    ctx: ParseContext<'_>,
) -> Result<Vec<TextBlock>> {
    let archive = open(source, hint, ctx)?;
    let mut blocks = Vec::new();
    for name in page_names(&archive) {
        ctx.cancel.check()?;
        blocks.push(TextBlock::Image {
            target: CoverRef::Entry(name),
        });
    }
    Ok(blocks)
}
