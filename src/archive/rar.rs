//! RAR access through the unrar library.
//!
//! unrar only reads from filesystem paths, so sources without a local path
//! are spilled to a temporary file that lives exactly as long as the
//! backend.

use std::io;
use std::path::{Path, PathBuf};

use log::debug;
use tempfile::NamedTempFile;

use super::{ArchiveEntry, normalize_entry_name};
use crate::error::{Error, Result};
use crate::io::BookSource;

pub(super) struct RarBackend {
    path: PathBuf,
    /// Keeps the spill file alive; deleted on drop.
    _spill: Option<NamedTempFile>,
}

impl RarBackend {
    pub(super) fn open(source: &dyn BookSource) -> Result<(Vec<ArchiveEntry>, Self)> {
        let (path, spill) = match source.local_path() {
            Some(path) => (path.to_path_buf(), None),
            None => {
                debug!("spilling {} to a temporary file for unrar", source.name());
                let mut spill = NamedTempFile::new()?;
                io::copy(&mut source.open()?, spill.as_file_mut())?;
                (spill.path().to_path_buf(), Some(spill))
            }
        };

        let entries = list_entries(&path)?;
        Ok((entries, Self { path, _spill: spill }))
    }

    pub(super) fn read(&mut self, name: &str) -> Result<Vec<u8>> {
        let mut archive = unrar::Archive::new(&self.path).open_for_processing()?;
        while let Some(header) = archive.read_header()? {
            let entry_name = normalize_entry_name(&header.entry().filename.to_string_lossy());
            archive = if entry_name == name && header.entry().is_file() {
                let (data, _rest) = header.read()?;
                return Ok(data);
            } else {
                header.skip()?
            };
        }
        Err(Error::corrupt(format!("RAR entry vanished while reading: {name}")))
    }
}

fn list_entries(path: &Path) -> Result<Vec<ArchiveEntry>> {
    let archive = unrar::Archive::new(path).open_for_listing()?;
    let mut entries = Vec::new();
    for header in archive {
        let header = header?;
        if !header.is_file() {
            continue;
        }
        entries.push(ArchiveEntry {
            name: normalize_entry_name(&header.filename.to_string_lossy()),
            size: header.unpacked_size,
        });
    }
    Ok(entries)
}
