//! Content hashing for deduplication.
//!
//! The hash covers the raw byte stream only, so a file keeps its identity
//! when it is renamed, moved, or re-imported through a different URI.

use std::io::Read;

use xxhash_rust::xxh3::Xxh3;

use crate::book::ContentHash;
use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::io::BookSource;

const CHUNK_SIZE: usize = 64 * 1024;

/// Stream `source` through XXH3-64.
pub fn hash_source(source: &dyn BookSource, cancel: &CancelToken) -> Result<ContentHash> {
    let reader = source
        .open()
        .map_err(|e| Error::UnreadableSource(format!("{}: {e}", source.name())))?;
    hash_reader(reader, cancel)
}

/// Stream any reader through XXH3-64, checking `cancel` between chunks.
pub fn hash_reader(mut reader: impl Read, cancel: &CancelToken) -> Result<ContentHash> {
    let mut hasher = Xxh3::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        cancel.check()?;
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::UnreadableSource(e.to_string())),
        };
        hasher.update(&buf[..n]);
    }
    Ok(ContentHash(hasher.digest()))
}

/// One-shot hash of an in-memory buffer. Equal to [`hash_reader`] over the
/// same bytes.
pub fn hash_bytes(data: &[u8]) -> ContentHash {
    ContentHash(xxhash_rust::xxh3::xxh3_64(data))
}
