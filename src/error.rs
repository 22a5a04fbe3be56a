//! Error types for tome operations.

use thiserror::Error;

/// Errors that can occur while ingesting a book.
///
/// Every format parser converts its internal failures into one of these
/// kinds, so callers can tell "try another interpretation" apart from
/// "this file is broken".
#[derive(Error, Debug)]
pub enum Error {
    /// The source stream could not be opened or read.
    #[error("unreadable source: {0}")]
    UnreadableSource(String),

    /// Archive directory, XML well-formedness or PDF structure is broken.
    #[error("corrupt container: {0}")]
    CorruptContainer(String),

    /// The container was recognized but the expected structure is missing.
    #[error("unsupported structure: {0}")]
    UnsupportedStructure(String),

    /// Parsing finished without producing readable content.
    #[error("parse produced no readable content")]
    EmptyResult,

    /// The operation was cancelled by the caller.
    #[error("cancelled")]
    Cancelled,
}

impl Error {
    /// Whether the dispatcher may retry the file with the plain-text parser.
    pub fn is_fallback_candidate(&self) -> bool {
        !matches!(self, Error::Cancelled | Error::UnreadableSource(_))
    }

    pub(crate) fn corrupt(msg: impl std::fmt::Display) -> Self {
        Error::CorruptContainer(msg.to_string())
    }

    pub(crate) fn unsupported(msg: impl std::fmt::Display) -> Self {
        Error::UnsupportedStructure(msg.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::InvalidData | std::io::ErrorKind::UnexpectedEof => {
                Error::CorruptContainer(e.to_string())
            }
            _ => Error::UnreadableSource(e.to_string()),
        }
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(e: zip::result::ZipError) -> Self {
        match e {
            zip::result::ZipError::Io(io) => Error::CorruptContainer(io.to_string()),
            other => Error::CorruptContainer(other.to_string()),
        }
    }
}

impl From<quick_xml::Error> for Error {
    fn from(e: quick_xml::Error) -> Self {
        Error::CorruptContainer(format!("XML: {e}"))
    }
}

impl From<lopdf::Error> for Error {
    fn from(e: lopdf::Error) -> Self {
        Error::CorruptContainer(format!("PDF: {e}"))
    }
}

impl From<sevenz_rust::Error> for Error {
    fn from(e: sevenz_rust::Error) -> Self {
        Error::CorruptContainer(format!("7z: {e}"))
    }
}

impl From<unrar::error::UnrarError> for Error {
    fn from(e: unrar::error::UnrarError) -> Self {
        Error::CorruptContainer(format!("RAR: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
