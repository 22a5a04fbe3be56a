use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};

/// Author placeholder used by formats whose metadata names no creator.
pub const UNKNOWN_AUTHOR: &str = "Unknown Author";

/// Title used when neither metadata nor the file name yield one.
pub const UNTITLED: &str = "Untitled";

/// Format a book was read as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Epub,
    Pdf,
    Fb2,
    Fodt,
    Html,
    Txt,
    Comic,
}

impl SourceFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::Epub => "epub",
            SourceFormat::Pdf => "pdf",
            SourceFormat::Fb2 => "fb2",
            SourceFormat::Fodt => "fodt",
            SourceFormat::Html => "html",
            SourceFormat::Txt => "txt",
            SourceFormat::Comic => "comic",
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque reference to an image belonging to a book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoverRef {
    /// Image bytes already decoded out of the source (FB2 binaries).
    Embedded(Arc<[u8]>),
    /// Path of an entry inside the source's container. The container is
    /// re-opened when the image is needed.
    Entry(String),
    /// Zero-based page of a paged document.
    Page(u32),
}

impl Serialize for CoverRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CoverRef::Embedded(bytes) => {
                serializer.serialize_str(&format!("embedded:{} bytes", bytes.len()))
            }
            CoverRef::Entry(path) => serializer.serialize_str(&format!("entry:{path}")),
            CoverRef::Page(page) => serializer.serialize_str(&format!("page:{page}")),
        }
    }
}

/// Bibliographic record produced once per import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookRecord {
    pub title: String,
    pub authors: Vec<String>,
    pub description: Option<String>,
    pub cover: Option<CoverRef>,
    pub format: SourceFormat,
    pub source_path: String,
}

impl BookRecord {
    /// Create a record, substituting a title derived from `display_name`
    /// when `title` is blank.
    pub fn new(
        title: impl Into<String>,
        display_name: &str,
        format: SourceFormat,
        source_path: impl Into<String>,
    ) -> Self {
        let title = title.into();
        let title = if title.trim().is_empty() {
            title_from_name(display_name)
        } else {
            collapse_whitespace(&title)
        };
        Self {
            title,
            authors: Vec::new(),
            description: None,
            cover: None,
            format,
            source_path: source_path.into(),
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        let author = collapse_whitespace(&author.into());
        if !author.is_empty() {
            self.authors.push(author);
        }
        self
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        self
    }

    pub fn with_cover(mut self, cover: Option<CoverRef>) -> Self {
        self.cover = cover;
        self
    }
}

/// Derive a title from a display name: the name with its last extension
/// removed (`"My Book.epub"` → `"My Book"`).
pub fn title_from_name(display_name: &str) -> String {
    let name = display_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(display_name)
        .trim();
    let stem = match name.rfind('.') {
        Some(0) | None => name,
        Some(dot) => &name[..dot],
    };
    let stem = stem.trim();
    if !stem.is_empty() {
        stem.to_string()
    } else if !name.is_empty() {
        name.to_string()
    } else {
        UNTITLED.to_string()
    }
}

/// Collapse runs of whitespace to single spaces and trim the ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Emphasis flags carried by a [`StyledRun`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Emphasis {
    pub bold: bool,
    pub italic: bool,
    pub strikethrough: bool,
}

impl Emphasis {
    pub const PLAIN: Emphasis = Emphasis {
        bold: false,
        italic: false,
        strikethrough: false,
    };
}

/// A span of text with uniform emphasis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StyledRun {
    pub text: String,
    pub emphasis: Emphasis,
}

impl StyledRun {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            emphasis: Emphasis::PLAIN,
        }
    }

    pub fn styled(text: impl Into<String>, emphasis: Emphasis) -> Self {
        Self {
            text: text.into(),
            emphasis,
        }
    }
}

/// One unit of parsed content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TextBlock {
    /// A heading. `level` 0 is the outermost.
    Chapter { title: String, level: u8 },
    Paragraph { runs: Vec<StyledRun> },
    /// A visual break such as a scene break.
    Separator,
    Image { target: CoverRef },
}

impl TextBlock {
    pub fn chapter(title: impl Into<String>, level: u8) -> Self {
        TextBlock::Chapter {
            title: title.into(),
            level,
        }
    }

    /// A paragraph holding a single unstyled run.
    pub fn plain_paragraph(text: impl Into<String>) -> Self {
        TextBlock::Paragraph {
            runs: vec![StyledRun::plain(text)],
        }
    }

    /// Plain text of the block (empty for separators and images).
    pub fn text(&self) -> String {
        match self {
            TextBlock::Chapter { title, .. } => title.clone(),
            TextBlock::Paragraph { runs } => runs.iter().map(|r| r.text.as_str()).collect(),
            TextBlock::Separator | TextBlock::Image { .. } => String::new(),
        }
    }

    pub fn is_chapter(&self) -> bool {
        matches!(self, TextBlock::Chapter { .. })
    }

    pub fn is_paragraph(&self) -> bool {
        matches!(self, TextBlock::Paragraph { .. })
    }
}

/// Stable byte-level identity of a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash(pub u64);

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
