//! Archive Reader: uniform entry listing and extraction over ZIP, RAR,
//! 7z and TAR (plain, gzip or xz) containers.
//!
//! An [`Archive`] owns every resource it acquires (file handles, decoder
//! state, spill files) and releases them when dropped, so a parse that
//! returns early or fails part-way never leaks a descriptor.

mod rar;
mod sevenz;
mod tar;
mod zip;

use std::fmt;

use log::debug;

use crate::error::{Error, Result};
use crate::io::{BookSource, read_prefix};

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const ZIP_EMPTY_MAGIC: &[u8] = b"PK\x05\x06";
const RAR_MAGIC: &[u8] = b"Rar!\x1a\x07";
const SEVENZ_MAGIC: &[u8] = b"7z\xbc\xaf\x27\x1c";
const XZ_MAGIC: &[u8] = b"\xfd7zXZ\x00";
const GZIP_MAGIC: &[u8] = b"\x1f\x8b";
const USTAR_OFFSET: usize = 257;

/// Container families the reader understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveKind {
    Zip,
    Rar,
    SevenZip,
    /// TAR, optionally gzip- or xz-compressed.
    Tar,
}

impl ArchiveKind {
    /// Detect the container from its leading bytes.
    pub fn from_magic_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(ZIP_EMPTY_MAGIC) {
            Some(Self::Zip)
        } else if bytes.starts_with(RAR_MAGIC) {
            Some(Self::Rar)
        } else if bytes.starts_with(SEVENZ_MAGIC) {
            Some(Self::SevenZip)
        } else if bytes.starts_with(XZ_MAGIC)
            || bytes.starts_with(GZIP_MAGIC)
            || bytes
                .get(USTAR_OFFSET..USTAR_OFFSET + 5)
                .is_some_and(|m| m == b"ustar")
        {
            Some(Self::Tar)
        } else {
            None
        }
    }
}

impl fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Zip => "zip",
            Self::Rar => "rar",
            Self::SevenZip => "7z",
            Self::Tar => "tar",
        };
        f.write_str(s)
    }
}

/// A file stored in an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Entry path with `/` separators.
    pub name: String,
    /// Uncompressed size in bytes.
    pub size: u64,
}

enum Backend {
    Zip(zip::ZipBackend),
    Rar(rar::RarBackend),
    SevenZip(sevenz::SevenZipBackend),
    Tar(tar::TarBackend),
}

/// An open archive. Dropping it releases the underlying handles.
pub struct Archive {
    kind: ArchiveKind,
    entries: Vec<ArchiveEntry>,
    backend: Backend,
    max_entry_size: u64,
}

impl Archive {
    /// Open `source` as an archive of the given kind.
    pub fn open(source: &dyn BookSource, kind: ArchiveKind, max_entry_size: u64) -> Result<Self> {
        debug!("opening {} as {kind}", source.name());
        let (entries, backend) = match kind {
            ArchiveKind::Zip => {
                let (entries, backend) = zip::ZipBackend::open(source)?;
                (entries, Backend::Zip(backend))
            }
            ArchiveKind::Rar => {
                let (entries, backend) = rar::RarBackend::open(source)?;
                (entries, Backend::Rar(backend))
            }
            ArchiveKind::SevenZip => {
                let (entries, backend) = sevenz::SevenZipBackend::open(source)?;
                (entries, Backend::SevenZip(backend))
            }
            ArchiveKind::Tar => {
                let (entries, backend) = tar::TarBackend::open(source)?;
                (entries, Backend::Tar(backend))
            }
        };
        Ok(Self {
            kind,
            entries,
            backend,
            max_entry_size,
        })
    }

    /// Open `source`, trusting its signature over the `hint` when they
    /// disagree (comic files are often mis-extensioned).
    pub fn open_detect(
        source: &dyn BookSource,
        hint: Option<ArchiveKind>,
        max_entry_size: u64,
    ) -> Result<Self> {
        let prefix = read_prefix(source, USTAR_OFFSET + 8)?;
        let kind = ArchiveKind::from_magic_bytes(&prefix)
            .or(hint)
            .ok_or_else(|| Error::corrupt(format!("{} is not a known archive", source.name())))?;
        Self::open(source, kind, max_entry_size)
    }

    /// Entries in container order, directories excluded.
    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    /// First entry whose name matches `pred`, in container order.
    pub fn find(&self, pred: impl Fn(&str) -> bool) -> Option<&ArchiveEntry> {
        self.entries.iter().find(|e| pred(&e.name))
    }

    /// Read and decompress one entry.
    pub fn read(&mut self, name: &str) -> Result<Vec<u8>> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| Error::unsupported(format!("entry not found: {name}")))?;
        if entry.size > self.max_entry_size {
            return Err(Error::unsupported(format!(
                "entry '{name}' is too large ({} bytes, max {} bytes)",
                entry.size, self.max_entry_size
            )));
        }
        let limit = self.max_entry_size;
        match &mut self.backend {
            Backend::Zip(b) => b.read(name, limit),
            Backend::Rar(b) => b.read(name),
            Backend::SevenZip(b) => b.read(name, limit),
            Backend::Tar(b) => b.read(name, limit),
        }
    }
}

impl fmt::Debug for Archive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archive")
            .field("kind", &self.kind)
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// Normalize an entry path to forward slashes without a leading `./` or `/`.
pub(crate) fn normalize_entry_name(name: &str) -> String {
    let name = name.replace('\\', "/");
    let mut trimmed = name.as_str();
    loop {
        if let Some(rest) = trimmed.strip_prefix("./") {
            trimmed = rest;
        } else if let Some(rest) = trimmed.strip_prefix('/') {
            trimmed = rest;
        } else {
            break;
        }
    }
    trimmed.to_string()
}
