//! Fixture builders shared by the integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};

#[path = "../../src/test_support.rs"]
mod archives;

pub use archives::*;

const CONTAINER_XML: &[u8] = br#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

/// An EPUB with the given package document and chapter files under
/// `OEBPS/`, plus any extra entries.
pub fn epub_bytes(opf: &str, chapters: &[(&str, &str)], extra: &[(&str, &[u8])]) -> Vec<u8> {
    let chapter_paths: Vec<String> = chapters
        .iter()
        .map(|(name, _)| format!("OEBPS/{name}"))
        .collect();
    let mut entries: Vec<(&str, &[u8])> = vec![
        ("mimetype", b"application/epub+zip"),
        ("META-INF/container.xml", CONTAINER_XML),
        ("OEBPS/content.opf", opf.as_bytes()),
    ];
    for (path, (_, body)) in chapter_paths.iter().zip(chapters) {
        entries.push((path.as_str(), body.as_bytes()));
    }
    entries.extend_from_slice(extra);
    zip_bytes(&entries)
}

pub fn xhtml(title: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml"><head><title>{title}</title></head>
<body>{body}</body></html>"#
    )
}

/// Write `data` to `dir/name` and return the path.
pub fn write_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    path
}
