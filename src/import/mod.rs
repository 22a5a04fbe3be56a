//! Format parsers.
//!
//! Every format is a pair of free functions over a [`BookSource`]:
//! `metadata` builds the [`BookRecord`], `content` builds the ordered
//! [`TextBlock`] sequence. Parsers hold no state between calls, and every
//! archive they open is closed before they return.

pub mod blocks;
pub mod comic;
pub mod epub;
pub mod fb2;
pub mod fodt;
pub mod html;
pub mod pdf;
pub mod txt;

pub use blocks::BlockBuilder;

use crate::book::{BookRecord, TextBlock};
use crate::cancel::CancelToken;
use crate::config::Config;
use crate::error::Result;
use crate::format::Format;
use crate::io::BookSource;

/// Settings and cancellation shared by one parse.
#[derive(Debug, Clone, Copy)]
pub struct ParseContext<'a> {
    pub config: &'a Config,
    pub cancel: &'a CancelToken,
}

impl<'a> ParseContext<'a> {
    pub fn new(config: &'a Config, cancel: &'a CancelToken) -> Self {
        Self { config, cancel }
    }

    pub fn builder(&self) -> BlockBuilder<'a> {
        BlockBuilder::new(self.config)
    }
}

/// Read metadata with the parser for `format`.
pub fn metadata(format: Format, source: &dyn BookSource, ctx: ParseContext<'_>) -> Result<BookRecord> {
    match format {
        Format::Epub => epub::metadata(source, ctx),
        Format::Pdf => pdf::metadata(source, ctx),
        Format::Fb2 => fb2::metadata(source, ctx),
        Format::Fb2Zip => fb2::zipped_metadata(source, ctx),
        Format::Fodt => fodt::metadata(source, ctx),
        Format::Html => html::metadata(source, ctx),
        Format::Txt => txt::metadata(source, ctx),
        Format::Comic(kind) => comic::metadata(source, Some(kind), ctx),
    }
}

/// Read the block sequence with the parser for `format`.
pub fn content(format: Format, source: &dyn BookSource, ctx: ParseContext<'_>) -> Result<Vec<TextBlock>> {
    match format {
        Format::Epub => epub::content(source, ctx),
        Format::Pdf => pdf::content(source, ctx),
        Format::Fb2 => fb2::content(source, ctx),
        Format::Fb2Zip => fb2::zipped_content(source, ctx),
        Format::Fodt => fodt::content(source, ctx),
        Format::Html => html::content(source, ctx),
        Format::Txt => txt::content(source, ctx),
        Format::Comic(kind) => comic::content(source, Some(kind), ctx),
    }
}
