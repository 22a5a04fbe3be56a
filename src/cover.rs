//! Cover images: the declared cover, a rendered first page, or a
//! synthesized placeholder.

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use font8x8::{BASIC_FONTS, LATIN_FONTS, UnicodeFonts};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageResult, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use log::{debug, warn};
use serde::Serialize;

use crate::archive::Archive;
use crate::book::{BookRecord, CoverRef, SourceFormat};
use crate::config::Config;
use crate::import::comic;
use crate::io::BookSource;

const BACKGROUND: Rgba<u8> = Rgba([28, 32, 40, 255]);
const TITLE_COLOR: Rgba<u8> = Rgba([240, 236, 226, 255]);
const AUTHOR_COLOR: Rgba<u8> = Rgba([170, 176, 188, 255]);

/// How a cover was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverStrategy {
    /// The record's own cover reference.
    Declared,
    /// A page of the document itself.
    Rendered,
    /// A placeholder drawn from the title and authors.
    Synthesized,
}

/// A decoded cover bitmap.
#[derive(Debug, Clone)]
pub struct CoverImage {
    pub strategy: CoverStrategy,
    pub image: RgbaImage,
}

impl CoverImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn write_png(&self, path: &Path) -> ImageResult<()> {
        self.image.save_with_format(path, ImageFormat::Png)
    }
}

/// Produce a cover for `record`. Never fails: every strategy that cannot
/// deliver falls through to the next, and synthesis always succeeds.
pub fn extract(source: &dyn BookSource, record: &BookRecord, config: &Config) -> CoverImage {
    if let Some(image) = declared(source, record, config) {
        return fitted(CoverStrategy::Declared, image, config);
    }
    if let Some(image) = rendered(source, record, config) {
        return fitted(CoverStrategy::Rendered, image, config);
    }
    debug!("{}: synthesizing cover", source.name());
    CoverImage {
        strategy: CoverStrategy::Synthesized,
        image: synthesize(record, config),
    }
}

/// Downscale to fit `config.cover_size`, keeping the aspect ratio.
fn fitted(strategy: CoverStrategy, image: RgbaImage, config: &Config) -> CoverImage {
    let (max_w, max_h) = config.cover_size;
    let image = if image.width() > max_w || image.height() > max_h {
        DynamicImage::ImageRgba8(image)
            .resize(max_w, max_h, FilterType::Triangle)
            .into_rgba8()
    } else {
        image
    };
    CoverImage { strategy, image }
}

fn decode(bytes: &[u8]) -> Option<RgbaImage> {
    match image::load_from_memory(bytes) {
        Ok(image) => Some(image.into_rgba8()),
        Err(e) => {
            debug!("cover bytes did not decode: {e}");
            None
        }
    }
}

fn read_entry(archive: &mut Archive, name: &str) -> Option<Vec<u8>> {
    archive
        .read(name)
        .map_err(|e| warn!("cannot read cover entry {name}: {e}"))
        .ok()
}

fn open_archive(source: &dyn BookSource, config: &Config) -> Option<Archive> {
    Archive::open_detect(source, None, config.max_entry_size)
        .map_err(|e| warn!("{}: cannot open for cover: {e}", source.name()))
        .ok()
}

fn declared(source: &dyn BookSource, record: &BookRecord, config: &Config) -> Option<RgbaImage> {
    match record.cover.as_ref()? {
        CoverRef::Embedded(bytes) => decode(bytes),
        CoverRef::Entry(name) => {
            let mut archive = open_archive(source, config)?;
            decode(&read_entry(&mut archive, name)?)
        }
        CoverRef::Page(_) => None,
    }
}

fn rendered(source: &dyn BookSource, record: &BookRecord, config: &Config) -> Option<RgbaImage> {
    match record.format {
        SourceFormat::Comic => {
            let mut archive = open_archive(source, config)?;
            comic::page_names(&archive)
                .iter()
                .find_map(|page| read_entry(&mut archive, page).and_then(|b| decode(&b)))
        }
        SourceFormat::Pdf => render_pdf_page(source, record, config),
        _ => None,
    }
}

#[cfg(feature = "pdf-render")]
fn render_pdf_page(source: &dyn BookSource, record: &BookRecord, config: &Config) -> Option<RgbaImage> {
    use pdfium_render::prelude::*;

    let page_index = match record.cover {
        Some(CoverRef::Page(page)) => page,
        _ => 0,
    };
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| debug!("pdfium unavailable: {e}"))
        .ok()?;
    let pdfium = Pdfium::new(bindings);
    let bytes = crate::io::read_all(source, config.max_document_size).ok()?;
    let document = pdfium
        .load_pdf_from_byte_slice(&bytes, None)
        .map_err(|e| warn!("{}: pdfium cannot open: {e}", source.name()))
        .ok()?;
    let page = document.pages().get(u16::try_from(page_index).ok()?).ok()?;
    let (width, height) = config.cover_size;
    let render = PdfRenderConfig::new()
        .set_target_width(width as i32)
        .set_maximum_height(height as i32);
    let bitmap = page.render_with_config(&render).ok()?;
    RgbaImage::from_raw(
        bitmap.width() as u32,
        bitmap.height() as u32,
        bitmap.as_rgba_bytes(),
    )
}

#[cfg(not(feature = "pdf-render"))]
fn render_pdf_page(_source: &dyn BookSource, _record: &BookRecord, _config: &Config) -> Option<RgbaImage> {
    None
}

/// Text renderer for placeholders: an outline font when one is configured
/// and loads, else the built-in 8x8 bitmap glyphs.
enum Typeface {
    Outline(FontVec),
    Bitmap,
}

impl Typeface {
    fn load(config: &Config) -> Self {
        let Some(path) = &config.cover_font else {
            return Typeface::Bitmap;
        };
        match std::fs::read(path).map(FontVec::try_from_vec) {
            Ok(Ok(font)) => Typeface::Outline(font),
            Ok(Err(e)) => {
                warn!("{}: not a usable font: {e}", path.display());
                Typeface::Bitmap
            }
            Err(e) => {
                warn!("{}: cannot read font: {e}", path.display());
                Typeface::Bitmap
            }
        }
    }

    fn cell(px: f32) -> u32 {
        ((px / 8.0).round() as u32).max(1)
    }

    fn width(&self, text: &str, px: f32) -> u32 {
        match self {
            Typeface::Outline(font) => text_size(PxScale::from(px), font, text).0,
            Typeface::Bitmap => text.chars().count() as u32 * 8 * Self::cell(px),
        }
    }

    fn line_height(&self, px: f32) -> u32 {
        match self {
            Typeface::Outline(_) => (px * 1.25) as u32,
            Typeface::Bitmap => 10 * Self::cell(px),
        }
    }

    fn draw(&self, canvas: &mut RgbaImage, text: &str, x: i32, y: i32, px: f32, color: Rgba<u8>) {
        match self {
            Typeface::Outline(font) => draw_text_mut(canvas, color, x, y, PxScale::from(px), font, text),
            Typeface::Bitmap => {
                let cell = Self::cell(px);
                for (i, c) in text.chars().enumerate() {
                    let glyph = BASIC_FONTS
                        .get(c)
                        .or_else(|| LATIN_FONTS.get(c))
                        .or_else(|| BASIC_FONTS.get('?'))
                        .unwrap_or([0; 8]);
                    let origin_x = x + (i as u32 * 8 * cell) as i32;
                    for (row, bits) in glyph.iter().enumerate() {
                        for col in 0..8 {
                            if bits & (1 << col) == 0 {
                                continue;
                            }
                            let rect = Rect::at(
                                origin_x + (col * cell) as i32,
                                y + (row as u32 * cell) as i32,
                            )
                            .of_size(cell, cell);
                            draw_filled_rect_mut(canvas, rect, color);
                        }
                    }
                }
            }
        }
    }

    /// Greedy word wrap. A word wider than `max_width` gets its own line.
    fn wrap(&self, text: &str, px: f32, max_width: u32) -> Vec<String> {
        let mut lines = Vec::new();
        let mut line = String::new();
        for word in text.split_whitespace() {
            let candidate = if line.is_empty() {
                word.to_string()
            } else {
                format!("{line} {word}")
            };
            if line.is_empty() || self.width(&candidate, px) <= max_width {
                line = candidate;
            } else {
                lines.push(std::mem::replace(&mut line, word.to_string()));
            }
        }
        if !line.is_empty() {
            lines.push(line);
        }
        lines
    }
}

/// Draw a placeholder: the wrapped title in large type on a dark canvas,
/// the authors below it in smaller type.
pub fn synthesize(record: &BookRecord, config: &Config) -> RgbaImage {
    let (width, height) = config.cover_size;
    let (width, height) = (width.max(1), height.max(1));
    let mut canvas = RgbaImage::from_pixel(width, height, BACKGROUND);
    let typeface = Typeface::load(config);

    let margin = width / 10;
    let text_width = width.saturating_sub(2 * margin).max(1);
    let title_px = (width as f32 / 10.0).max(8.0);
    let author_px = (width as f32 / 20.0).max(8.0);

    let mut y = (height / 5) as i32;
    for line in typeface.wrap(&record.title, title_px, text_width) {
        if y >= height as i32 {
            break;
        }
        typeface.draw(&mut canvas, &line, margin as i32, y, title_px, TITLE_COLOR);
        y += typeface.line_height(title_px) as i32;
    }

    if !record.authors.is_empty() {
        y += typeface.line_height(author_px) as i32;
        for line in typeface.wrap(&record.authors.join(", "), author_px, text_width) {
            if y >= height as i32 {
                break;
            }
            typeface.draw(&mut canvas, &line, margin as i32, y, author_px, AUTHOR_COLOR);
            y += typeface.line_height(author_px) as i32;
        }
    }
    canvas
}
