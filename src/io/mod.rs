//! Readable-file handles: re-openable, read-only access to book bytes.

mod source;

pub use source::{BookSource, FileSource, MemorySource, ReadSeek, read_all, read_prefix};
