use std::io::Read;

use ::zip::ZipArchive;

use super::{ArchiveEntry, normalize_entry_name};
use crate::error::{Error, Result};
use crate::io::{BookSource, ReadSeek};

pub(super) struct ZipBackend {
    archive: ZipArchive<Box<dyn ReadSeek>>,
    /// Normalized name -> raw name as stored in the central directory.
    raw_names: Vec<(String, String)>,
}

impl ZipBackend {
    pub(super) fn open(source: &dyn BookSource) -> Result<(Vec<ArchiveEntry>, Self)> {
        let reader = source.open_seekable()?;
        let mut archive = ZipArchive::new(reader)?;

        let mut entries = Vec::with_capacity(archive.len());
        let mut raw_names = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let file = archive.by_index_raw(i)?;
            if file.is_dir() {
                continue;
            }
            let raw = file.name().to_string();
            let name = normalize_entry_name(&raw);
            entries.push(ArchiveEntry {
                name: name.clone(),
                size: file.size(),
            });
            raw_names.push((name, raw));
        }

        Ok((entries, Self { archive, raw_names }))
    }

    pub(super) fn read(&mut self, name: &str, limit: u64) -> Result<Vec<u8>> {
        let raw = self
            .raw_names
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, raw)| raw.as_str())
            .ok_or_else(|| Error::unsupported(format!("entry not found: {name}")))?;
        let file = self.archive.by_name(raw)?;
        let mut data = Vec::with_capacity(file.size().min(limit) as usize);
        file.take(limit)
            .read_to_end(&mut data)
            .map_err(Error::corrupt)?;
        Ok(data)
    }
}
