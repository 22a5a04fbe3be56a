//! TAR access. Compressed tarballs have no random access, so every read
//! rewinds and streams through the archive until the entry is found.

use std::io::{Read, Seek, SeekFrom};

use flate2::read::GzDecoder;
use xz2::read::XzDecoder;

use super::{ArchiveEntry, GZIP_MAGIC, XZ_MAGIC, normalize_entry_name};
use crate::error::{Error, Result};
use crate::io::{BookSource, ReadSeek};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TarCompression {
    None,
    Gzip,
    Xz,
}

impl TarCompression {
    fn from_magic_bytes(bytes: &[u8]) -> Self {
        if bytes.starts_with(XZ_MAGIC) {
            Self::Xz
        } else if bytes.starts_with(GZIP_MAGIC) {
            Self::Gzip
        } else {
            Self::None
        }
    }
}

pub(super) struct TarBackend {
    reader: Box<dyn ReadSeek>,
    compression: TarCompression,
}

impl TarBackend {
    pub(super) fn open(source: &dyn BookSource) -> Result<(Vec<ArchiveEntry>, Self)> {
        let mut reader = source.open_seekable()?;
        let mut magic = [0u8; 6];
        let read = read_up_to(&mut reader, &mut magic)?;
        let compression = TarCompression::from_magic_bytes(&magic[..read]);

        let mut backend = Self {
            reader,
            compression,
        };
        let mut entries = Vec::new();
        backend.scan(|name, size, _| {
            entries.push(ArchiveEntry {
                name: name.to_string(),
                size,
            });
            Ok(true)
        })?;
        Ok((entries, backend))
    }

    pub(super) fn read(&mut self, name: &str, limit: u64) -> Result<Vec<u8>> {
        let mut found = None;
        self.scan(|entry_name, _, entry| {
            if entry_name != name {
                return Ok(true);
            }
            let mut data = Vec::new();
            entry
                .take(limit)
                .read_to_end(&mut data)
                .map_err(Error::corrupt)?;
            found = Some(data);
            Ok(false)
        })?;
        found.ok_or_else(|| Error::corrupt(format!("TAR entry vanished while reading: {name}")))
    }

    /// Visit regular-file entries from the start until `visit` returns false.
    fn scan<F>(&mut self, mut visit: F) -> Result<()>
    where
        F: FnMut(&str, u64, &mut dyn Read) -> Result<bool>,
    {
        self.reader.seek(SeekFrom::Start(0))?;
        let stream: Box<dyn Read + '_> = match self.compression {
            TarCompression::None => Box::new(&mut self.reader),
            TarCompression::Gzip => Box::new(GzDecoder::new(&mut self.reader)),
            TarCompression::Xz => Box::new(XzDecoder::new(&mut self.reader)),
        };
        let mut archive = ::tar::Archive::new(stream);
        for entry in archive.entries().map_err(Error::corrupt)? {
            let mut entry = entry.map_err(Error::corrupt)?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let name = normalize_entry_name(&entry.path().map_err(Error::corrupt)?.to_string_lossy());
            let size = entry.size();
            if !visit(&name, size, &mut entry)? {
                break;
            }
        }
        Ok(())
    }
}

fn read_up_to(reader: &mut dyn Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}
