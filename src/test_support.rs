//! Fixture builders shared by the unit tests and, through `tests/common`,
//! the integration tests.
#![allow(dead_code)]

use std::io::{Cursor, Write};

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream, dictionary};
use sevenz_rust::{SevenZArchiveEntry, SevenZWriter};
use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// Build an in-memory ZIP with the given entries, in order.
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    for (name, data) in entries {
        zip.start_file(*name, stored).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// Build an in-memory TAR with the given entries, in order.
pub fn tar_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *data).unwrap();
    }
    builder.into_inner().unwrap()
}

pub fn gzip_bytes(data: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn xz_bytes(data: &[u8]) -> Vec<u8> {
    let mut encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Build an in-memory 7z archive, one LZMA2 stream per entry.
pub fn sevenz_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = SevenZWriter::new(Cursor::new(Vec::new())).unwrap();
    for (name, data) in entries {
        let mut entry = SevenZArchiveEntry::new();
        entry.name = name.to_string();
        writer.push_archive_entry(entry, Some(*data)).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Build a RAR 4 archive holding the entries uncompressed ("stored").
pub fn rar_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    // Every block starts with the low 16 bits of the CRC32 of the rest
    // of its header.
    fn block(out: &mut Vec<u8>, header: &[u8]) {
        let mut crc = flate2::Crc::new();
        crc.update(header);
        out.extend_from_slice(&(crc.sum() as u16).to_le_bytes());
        out.extend_from_slice(header);
    }

    let mut out = b"Rar!\x1a\x07\x00".to_vec();
    let mut main = vec![0x73];
    main.extend_from_slice(&0u16.to_le_bytes());
    main.extend_from_slice(&13u16.to_le_bytes());
    main.extend_from_slice(&[0; 6]);
    block(&mut out, &main);

    for (name, data) in entries {
        let mut crc = flate2::Crc::new();
        crc.update(data);
        let size = data.len() as u32;
        let mut header = vec![0x74];
        header.extend_from_slice(&0x8000u16.to_le_bytes()); // data follows the header
        header.extend_from_slice(&(32 + name.len() as u16).to_le_bytes());
        header.extend_from_slice(&size.to_le_bytes()); // packed
        header.extend_from_slice(&size.to_le_bytes()); // unpacked
        header.push(0); // MS-DOS host
        header.extend_from_slice(&crc.sum().to_le_bytes());
        header.extend_from_slice(&0x5A21_0000u32.to_le_bytes()); // 2025-01-01 00:00
        header.push(20);
        header.push(0x30); // stored
        header.extend_from_slice(&(name.len() as u16).to_le_bytes());
        header.extend_from_slice(&0x20u32.to_le_bytes());
        header.extend_from_slice(name.as_bytes());
        block(&mut out, &header);
        out.extend_from_slice(data);
    }

    out.extend_from_slice(&[0xc4, 0x3d, 0x7b, 0x00, 0x40, 0x07, 0x00]);
    out
}

/// A small valid PNG of one color.
pub fn png_bytes(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let image = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

pub fn courier() -> Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    }
}

/// Build a PDF from raw content operations, one list per page. Every
/// page can use `fonts` by resource name.
pub fn pdf_document(
    pages: Vec<Vec<Operation>>,
    fonts: Vec<(&str, Dictionary)>,
    info: &[(&str, &str)],
) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut font_resources = Dictionary::new();
    for (name, font) in fonts {
        let font_id = doc.add_object(font);
        font_resources.set(name, font_id);
    }

    let mut kids: Vec<Object> = Vec::new();
    for operations in pages {
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => font_resources.clone(),
            },
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    if !info.is_empty() {
        let mut dict = Dictionary::new();
        for (key, value) in info {
            dict.set(*key, Object::string_literal(*value));
        }
        let info_id = doc.add_object(dict);
        doc.trailer.set("Info", info_id);
    }

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

/// Build a PDF whose pages each hold the given lines, one text object
/// per line, 20pt apart, in Courier.
pub fn pdf_bytes(pages: &[&[&str]], info: &[(&str, &str)]) -> Vec<u8> {
    let pages = pages
        .iter()
        .map(|texts| {
            let mut operations = Vec::new();
            for (i, text) in texts.iter().enumerate() {
                let y = 700 - 20 * i as i64;
                operations.push(Operation::new("BT", vec![]));
                operations.push(Operation::new("Tf", vec!["F1".into(), 12.into()]));
                operations.push(Operation::new("Td", vec![72.into(), y.into()]));
                operations.push(Operation::new("Tj", vec![Object::string_literal(*text)]));
                operations.push(Operation::new("ET", vec![]));
            }
            operations
        })
        .collect();
    pdf_document(pages, vec![("F1", courier())], info)
}
