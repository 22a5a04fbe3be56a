use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A `Read + Seek` stream that can be handed to archive decoders.
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// A thread-safe, re-openable, read-only handle to the bytes of a book.
///
/// Every call to [`open`](BookSource::open) starts a fresh stream at offset
/// zero, so parsers may read a source more than once (sniffing, then
/// parsing). Implementations hold no stream state themselves.
pub trait BookSource: Send + Sync {
    /// Display name, typically the file name including its extension.
    fn name(&self) -> &str;

    /// Logical path: a filesystem path or an opaque content URI.
    fn path(&self) -> &str;

    /// Open a new sequential stream over the bytes.
    fn open(&self) -> io::Result<Box<dyn Read + Send>>;

    /// Open a new random-access stream over the bytes.
    fn open_seekable(&self) -> io::Result<Box<dyn ReadSeek>>;

    /// Total length in bytes.
    fn len(&self) -> io::Result<u64>;

    /// Returns true if the source holds no bytes.
    fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Direct filesystem path, for decoders that only accept paths.
    fn local_path(&self) -> Option<&Path> {
        None
    }
}

// --- Implementation: Local File ---

/// A book on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    logical: String,
    name: String,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let logical = path.to_string_lossy().into_owned();
        Self {
            path,
            logical,
            name,
        }
    }
}

impl BookSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> &str {
        &self.logical
    }

    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(BufReader::new(File::open(&self.path)?)))
    }

    fn open_seekable(&self) -> io::Result<Box<dyn ReadSeek>> {
        Ok(Box::new(BufReader::new(File::open(&self.path)?)))
    }

    fn len(&self) -> io::Result<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }

    fn local_path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

// --- Implementation: In-Memory ---

/// A book whose bytes are already in memory, such as a document handed
/// over by a content provider under an opaque URI.
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    uri: String,
    data: Arc<[u8]>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        let name = name.into();
        Self {
            uri: name.clone(),
            name,
            data: data.into(),
        }
    }

    /// Set the logical path reported by [`BookSource::path`].
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = uri.into();
        self
    }
}

impl BookSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> &str {
        &self.uri
    }

    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(Cursor::new(Arc::clone(&self.data))))
    }

    fn open_seekable(&self) -> io::Result<Box<dyn ReadSeek>> {
        Ok(Box::new(Cursor::new(Arc::clone(&self.data))))
    }

    fn len(&self) -> io::Result<u64> {
        Ok(self.data.len() as u64)
    }
}

/// Read up to `len` leading bytes of a source.
pub fn read_prefix(source: &dyn BookSource, len: usize) -> io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(len);
    source.open()?.take(len as u64).read_to_end(&mut buf)?;
    Ok(buf)
}

/// Read a whole source, refusing sources larger than `limit` bytes.
pub fn read_all(source: &dyn BookSource, limit: u64) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    source.open()?.take(limit + 1).read_to_end(&mut buf)?;
    if buf.len() as u64 > limit {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{} exceeds {} bytes", source.name(), limit),
        ));
    }
    Ok(buf)
}
