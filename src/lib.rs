//! # tome
//!
//! Ebook and comic ingestion: turn an opaque file handle into a
//! bibliographic record, a flat sequence of text blocks, a content hash,
//! and a cover image.
//!
//! ## Features
//!
//! - EPUB, PDF, FB2 (also zipped), flat ODT, HTML and plain text
//! - Comic archives: CBZ, CBR, CB7 and CBT (optionally xz-compressed)
//! - Plain-text fallback when a file is mislabelled or unparseable
//! - Inline `**bold**` / `*italic*` / `~~strike~~` markup in text formats
//! - Cooperative cancellation and parallel batch import
//!
//! ## Quick Start
//!
//! ```no_run
//! use tome::{FileSource, Pipeline, Request};
//!
//! let pipeline = Pipeline::default();
//! let source = FileSource::new("moby-dick.epub");
//!
//! let imported = pipeline.import(&source, Request::ALL).unwrap();
//! let record = imported.record.unwrap();
//! println!("{} by {}", record.title, record.authors.join(", "));
//! println!("hash {}", imported.hash.unwrap());
//! ```
//!
//! ## Text Blocks
//!
//! Content comes back as [`TextBlock`]s in reading order. Every non-comic
//! sequence holds at least one chapter and one paragraph:
//!
//! ```
//! use tome::{MemorySource, Pipeline, TextBlock};
//!
//! let source = MemorySource::new("note.txt", b"Hello\nWorld".to_vec());
//! let blocks = Pipeline::default().content(&source).unwrap();
//! assert_eq!(
//!     blocks,
//!     vec![TextBlock::chapter("Hello", 0), TextBlock::plain_paragraph("World")]
//! );
//! ```

pub mod archive;
pub mod book;
pub mod cancel;
pub mod config;
pub mod cover;
pub mod error;
pub mod format;
pub mod hash;
pub mod import;
pub mod io;
pub mod markup;
pub mod pipeline;
pub(crate) mod util;
pub mod xml;

#[cfg(test)]
mod test_support;

pub use book::{BookRecord, ContentHash, CoverRef, Emphasis, SourceFormat, StyledRun, TextBlock};
pub use cancel::CancelToken;
pub use config::Config;
pub use cover::{CoverImage, CoverStrategy};
pub use error::{Error, Result};
pub use format::Format;
pub use io::{BookSource, FileSource, MemorySource};
pub use pipeline::{BatchReport, Imported, Pipeline, Request};
