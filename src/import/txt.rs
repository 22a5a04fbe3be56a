//! Plain text. Also the dispatcher's fallback for anything it cannot place.

use std::io::{BufRead, BufReader};

use log::debug;

use super::ParseContext;
use crate::book::{BookRecord, SourceFormat, TextBlock};
use crate::error::{Error, Result};
use crate::io::{BookSource, read_all, read_prefix};
use crate::util::{decode_text, looks_binary};

const SNIFF_LEN: usize = 8192;

/// Title from the file name, no authors.
pub fn metadata(source: &dyn BookSource, _ctx: ParseContext<'_>) -> Result<BookRecord> {
    Ok(BookRecord::new("", source.name(), SourceFormat::Txt, source.path()))
}

/// Stream the file line by line.
///
/// Blank lines are skipped, separator tokens become separators, every
/// other line is one paragraph with inline markup applied. The first
/// paragraph becomes the chapter heading.
pub fn content(source: &dyn BookSource, ctx: ParseContext<'_>) -> Result<Vec<TextBlock>> {
    let prefix = read_prefix(source, SNIFF_LEN)?;
    if looks_binary(&prefix) {
        return Err(Error::unsupported(format!(
            "{} looks like binary data, not text",
            source.name()
        )));
    }

    let mut builder = ctx.builder();

    // UTF-16 cannot be split on newline bytes, so it is decoded whole.
    if let Some((encoding, _)) = encoding_rs::Encoding::for_bom(&prefix)
        && encoding != encoding_rs::UTF_8
    {
        debug!("{}: decoding as {}", source.name(), encoding.name());
        let bytes = read_all(source, ctx.config.max_document_size)?;
        let (text, _, _) = encoding.decode(&bytes);
        for line in text.lines() {
            ctx.cancel.check()?;
            push_line(&mut builder, line);
        }
        return Ok(builder.finish());
    }

    let mut reader = BufReader::new(source.open()?);
    let mut buf = Vec::new();
    loop {
        ctx.cancel.check()?;
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        let line = decode_text(&buf, None);
        push_line(&mut builder, &line);
    }
    Ok(builder.finish())
}

fn push_line(builder: &mut super::BlockBuilder<'_>, line: &str) {
    let line = line.trim_end_matches(['\n', '\r']);
    if line.trim().is_empty() {
        return;
    }
    builder.markup_line(line);
}
