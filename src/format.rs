//! Format tags and detection.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use memchr::memmem;
use serde::Deserialize;

use crate::archive::ArchiveKind;

/// A parser pair the dispatcher can route a file to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum Format {
    Epub,
    Pdf,
    Fb2,
    /// FB2 document wrapped in a ZIP archive.
    Fb2Zip,
    Fodt,
    Html,
    Txt,
    Comic(ArchiveKind),
}

impl Format {
    /// The built-in extension table.
    pub fn default_extensions() -> HashMap<String, Format> {
        [
            ("epub", Format::Epub),
            ("pdf", Format::Pdf),
            ("fb2", Format::Fb2),
            ("fb2.zip", Format::Fb2Zip),
            ("fbz", Format::Fb2Zip),
            ("fodt", Format::Fodt),
            ("html", Format::Html),
            ("htm", Format::Html),
            ("xhtml", Format::Html),
            ("txt", Format::Txt),
            ("text", Format::Txt),
            ("md", Format::Txt),
            ("cbz", Format::Comic(ArchiveKind::Zip)),
            ("cbr", Format::Comic(ArchiveKind::Rar)),
            ("cb7", Format::Comic(ArchiveKind::SevenZip)),
            ("cbt", Format::Comic(ArchiveKind::Tar)),
            ("cbt.xz", Format::Comic(ArchiveKind::Tar)),
            ("tar.xz", Format::Comic(ArchiveKind::Tar)),
        ]
        .into_iter()
        .map(|(ext, format)| (ext.to_string(), format))
        .collect()
    }

    pub fn is_comic(&self) -> bool {
        matches!(self, Format::Comic(_))
    }

    /// Guess a format from the leading bytes of a file.
    ///
    /// A bare ZIP is treated as EPUB when it carries the EPUB mimetype
    /// entry and as a comic otherwise.
    pub fn sniff(prefix: &[u8]) -> Option<Format> {
        if prefix.starts_with(b"%PDF-") {
            return Some(Format::Pdf);
        }
        if let Some(kind) = ArchiveKind::from_magic_bytes(prefix) {
            return Some(match kind {
                ArchiveKind::Zip if memmem::find(prefix, b"application/epub+zip").is_some() => {
                    Format::Epub
                }
                kind => Format::Comic(kind),
            });
        }

        let head = &prefix[..prefix.len().min(1024)];
        let lower = head.to_ascii_lowercase();
        if memmem::find(&lower, b"<fictionbook").is_some() {
            return Some(Format::Fb2);
        }
        if memmem::find(&lower, b"office:document").is_some() {
            return Some(Format::Fodt);
        }
        if memmem::find(&lower, b"<html").is_some() || memmem::find(&lower, b"<!doctype html").is_some()
        {
            return Some(Format::Html);
        }
        None
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Format::Epub => "epub",
            Format::Pdf => "pdf",
            Format::Fb2 => "fb2",
            Format::Fb2Zip => "fb2.zip",
            Format::Fodt => "fodt",
            Format::Html => "html",
            Format::Txt => "txt",
            Format::Comic(ArchiveKind::Zip) => "cbz",
            Format::Comic(ArchiveKind::Rar) => "cbr",
            Format::Comic(ArchiveKind::SevenZip) => "cb7",
            Format::Comic(ArchiveKind::Tar) => "cbt",
        };
        f.write_str(name)
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "epub" => Ok(Format::Epub),
            "pdf" => Ok(Format::Pdf),
            "fb2" => Ok(Format::Fb2),
            "fb2.zip" | "fbz" => Ok(Format::Fb2Zip),
            "fodt" => Ok(Format::Fodt),
            "html" | "htm" => Ok(Format::Html),
            "txt" | "text" => Ok(Format::Txt),
            "cbz" | "zip" => Ok(Format::Comic(ArchiveKind::Zip)),
            "cbr" | "rar" => Ok(Format::Comic(ArchiveKind::Rar)),
            "cb7" | "7z" => Ok(Format::Comic(ArchiveKind::SevenZip)),
            "cbt" | "tar" => Ok(Format::Comic(ArchiveKind::Tar)),
            _ => Err(format!(
                "unknown format '{s}'. Expected: epub, pdf, fb2, fb2.zip, fodt, html, txt, cbz, cbr, cb7, cbt"
            )),
        }
    }
}

impl TryFrom<String> for Format {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
