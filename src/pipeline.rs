//! Format dispatch and import orchestration.
//!
//! The [`Pipeline`] picks a parser for each source (extension table first,
//! then file signature), falls back to plain text when the chosen parser
//! fails, and checks the produced block sequence before handing it out.

use log::{debug, warn};
use rayon::prelude::*;
use serde::Serialize;

use crate::book::{BookRecord, ContentHash, TextBlock};
use crate::cancel::CancelToken;
use crate::config::Config;
use crate::cover::{self, CoverImage};
use crate::error::{Error, Result};
use crate::format::Format;
use crate::hash;
use crate::import::{self, ParseContext};
use crate::io::{BookSource, read_prefix};

/// Leading bytes read for signature sniffing.
const SNIFF_LEN: usize = 4096;

/// Which outputs an import should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub metadata: bool,
    pub content: bool,
    pub hash: bool,
}

impl Request {
    pub const ALL: Request = Request {
        metadata: true,
        content: true,
        hash: true,
    };

    pub const METADATA: Request = Request {
        metadata: true,
        content: false,
        hash: false,
    };

    pub const CONTENT: Request = Request {
        metadata: false,
        content: true,
        hash: false,
    };

    pub const HASH: Request = Request {
        metadata: false,
        content: false,
        hash: true,
    };
}

impl Default for Request {
    fn default() -> Self {
        Request::ALL
    }
}

/// The outputs of one successful import. Fields not asked for in the
/// [`Request`] are `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Imported {
    pub record: Option<BookRecord>,
    pub blocks: Option<Vec<TextBlock>>,
    pub hash: Option<ContentHash>,
}

/// Outcome of [`Pipeline::import_batch`], in input order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub imported: Vec<(String, Imported)>,
    /// Source name and the error that stopped its import.
    pub failed: Vec<(String, Error)>,
}

impl BatchReport {
    pub fn skipped(&self) -> usize {
        self.failed.len()
    }
}

/// Dispatches sources to the format parsers.
///
/// A pipeline holds no per-file state and can be shared across threads.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: Config,
    cancel: CancelToken,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            cancel: CancelToken::new(),
        }
    }

    /// Use `cancel` for every parse started by this pipeline.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    fn ctx(&self) -> ParseContext<'_> {
        ParseContext::new(&self.config, &self.cancel)
    }

    /// The format a source would be parsed as before any fallback: the
    /// extension table first, then the leading-byte signature.
    pub fn detect(&self, source: &dyn BookSource) -> Result<Option<Format>> {
        if let Some(format) = self.config.format_for_name(source.name()) {
            return Ok(Some(format));
        }
        let prefix = read_prefix(source, SNIFF_LEN)?;
        let sniffed = Format::sniff(&prefix);
        debug!("{}: unknown extension, sniffed {:?}", source.name(), sniffed);
        Ok(sniffed)
    }

    /// Run `parse` with the detected format, retrying as plain text when
    /// no format matched or the parser failed with a retryable error.
    ///
    /// When the retry fails too, the first parser's error is returned.
    fn dispatch<T>(
        &self,
        source: &dyn BookSource,
        parse: impl Fn(Format) -> Result<T>,
    ) -> Result<(Format, T)> {
        let detected = self.detect(source)?;
        let primary = match detected {
            Some(format) if format != Format::Txt => match parse(format) {
                Ok(value) => return Ok((format, value)),
                Err(e) if !e.is_fallback_candidate() => return Err(e),
                Err(e) => {
                    debug!("{}: {format} parser failed ({e}), trying plain text", source.name());
                    Some(e)
                }
            },
            Some(_) => None,
            None => {
                debug!("{}: no format matched, trying plain text", source.name());
                None
            }
        };

        match parse(Format::Txt) {
            Ok(value) => Ok((Format::Txt, value)),
            Err(fallback) => Err(match primary {
                Some(primary) if fallback.is_fallback_candidate() => primary,
                _ => fallback,
            }),
        }
    }

    /// Read the bibliographic record. For a readable source this only
    /// fails on cancellation: the plain-text fallback derives a record
    /// from the file name.
    pub fn metadata(&self, source: &dyn BookSource) -> Result<BookRecord> {
        let ctx = self.ctx();
        let (format, record) = self.dispatch(source, |format| import::metadata(format, source, ctx))?;
        debug!("{}: metadata via {format}", source.name());
        Ok(record)
    }

    /// Read the validated block sequence.
    pub fn content(&self, source: &dyn BookSource) -> Result<Vec<TextBlock>> {
        let ctx = self.ctx();
        let (format, blocks) = self.dispatch(source, |format| {
            import::content(format, source, ctx).and_then(|blocks| validate_blocks(format, blocks))
        })?;
        debug!("{}: {} blocks via {format}", source.name(), blocks.len());
        Ok(blocks)
    }

    /// Stream the source through the content hasher.
    pub fn hash(&self, source: &dyn BookSource) -> Result<ContentHash> {
        hash::hash_source(source, &self.cancel)
    }

    /// Produce the outputs selected by `request`. Any failing step fails
    /// the whole import.
    pub fn import(&self, source: &dyn BookSource, request: Request) -> Result<Imported> {
        let record = request.metadata.then(|| self.metadata(source)).transpose()?;
        let blocks = request.content.then(|| self.content(source)).transpose()?;
        let hash = request.hash.then(|| self.hash(source)).transpose()?;
        Ok(Imported {
            record,
            blocks,
            hash,
        })
    }

    /// Import many sources on the rayon pool. One failing source never
    /// stops the others.
    pub fn import_batch<S: BookSource>(&self, sources: &[S], request: Request) -> BatchReport {
        let results: Vec<(String, Result<Imported>)> = sources
            .par_iter()
            .map(|source| (source.name().to_string(), self.import(source, request)))
            .collect();

        let mut report = BatchReport::default();
        for (name, result) in results {
            match result {
                Ok(imported) => report.imported.push((name, imported)),
                Err(e) => {
                    warn!("skipping {name}: {e}");
                    report.failed.push((name, e));
                }
            }
        }
        report
    }

    /// Produce a cover for a record read from `source`.
    pub fn cover(&self, source: &dyn BookSource, record: &BookRecord) -> CoverImage {
        cover::extract(source, record, &self.config)
    }
}

/// Check a finished block sequence.
///
/// Comic sequences need at least one image; every other sequence needs a
/// chapter and a paragraph.
pub fn validate_blocks(format: Format, blocks: Vec<TextBlock>) -> Result<Vec<TextBlock>> {
    let valid = if format.is_comic() {
        blocks.iter().any(|b| matches!(b, TextBlock::Image { .. }))
    } else {
        blocks.iter().any(TextBlock::is_chapter) && blocks.iter().any(TextBlock::is_paragraph)
    };
    if valid { Ok(blocks) } else { Err(Error::EmptyResult) }
}
