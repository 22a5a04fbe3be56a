use std::io::Read;

use log::warn;
use sevenz_rust::{Password, SevenZReader};

use super::{ArchiveEntry, normalize_entry_name};
use crate::error::{Error, Result};
use crate::io::{BookSource, ReadSeek};

pub(super) struct SevenZipBackend {
    reader: SevenZReader<Box<dyn ReadSeek>>,
}

impl SevenZipBackend {
    pub(super) fn open(source: &dyn BookSource) -> Result<(Vec<ArchiveEntry>, Self)> {
        let len = source.len()?;
        let reader = SevenZReader::new(source.open_seekable()?, len, Password::empty())?;

        let entries = reader
            .archive()
            .files
            .iter()
            .filter(|e| !e.is_directory() && e.has_stream())
            .map(|e| ArchiveEntry {
                name: normalize_entry_name(e.name()),
                size: e.size(),
            })
            .collect();

        Ok((entries, Self { reader }))
    }

    pub(super) fn read(&mut self, name: &str, limit: u64) -> Result<Vec<u8>> {
        let mut found: Option<std::io::Result<Vec<u8>>> = None;

        // 7z folders are solid streams, so reaching an entry means decoding
        // everything before it in the same folder.
        self.reader.for_each_entries(|entry, reader| {
            if entry.is_directory() || normalize_entry_name(entry.name()) != name {
                return Ok(true); // continue iteration
            }
            let mut data = Vec::new();
            found = Some(reader.take(limit).read_to_end(&mut data).map(|_| data));
            Ok(false)
        })?;

        match found {
            Some(Ok(data)) => Ok(data),
            Some(Err(e)) => {
                warn!("failed to extract {name} from 7z: {e}");
                Err(Error::corrupt(format!("7z entry {name}: {e}")))
            }
            None => Err(Error::unsupported(format!("entry not found: {name}"))),
        }
    }
}
