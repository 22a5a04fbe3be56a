//! Pipeline configuration.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::format::Format;

/// Maximum size for a single archive entry (100 MB).
///
/// Entries exceeding this limit are skipped to avoid memory exhaustion
/// from zip bombs or oversized pages.
pub const MAX_ENTRY_SIZE: u64 = 100_000_000;

/// Maximum size of a whole-file read for formats that need the complete
/// document in memory (PDF, FB2, FODT, HTML).
pub const MAX_DOCUMENT_SIZE: u64 = 512_000_000;

/// Characters of context kept on each side of a PDF search match.
pub const SEARCH_CONTEXT: usize = 40;

/// Default lines that are rendered as scene breaks.
pub const SEPARATOR_TOKENS: &[&str] = &["***", "* * *", "---", "___", "###", "~~~"];

/// Settings shared by every parse.
///
/// All fields have defaults; a JSON file only needs to name the fields it
/// overrides:
///
/// ```json
/// { "extensions": { "text": "txt" }, "search_context": 60 }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Extension (lowercase, without dot; compound forms like `fb2.zip`
    /// allowed) to format. Entries here extend the built-in table.
    pub extensions: HashMap<String, Format>,
    /// Lines that become `Separator` blocks after trimming.
    pub separator_tokens: Vec<String>,
    pub search_context: usize,
    pub max_entry_size: u64,
    pub max_document_size: u64,
    /// Placeholder cover canvas size in pixels (width, height).
    pub cover_size: (u32, u32),
    /// TrueType font used to draw placeholder covers.
    pub cover_font: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            extensions: Format::default_extensions(),
            separator_tokens: SEPARATOR_TOKENS.iter().map(|s| s.to_string()).collect(),
            search_context: SEARCH_CONTEXT,
            max_entry_size: MAX_ENTRY_SIZE,
            max_document_size: MAX_DOCUMENT_SIZE,
            cover_size: (600, 900),
            cover_font: None,
        }
    }
}

impl Config {
    /// Load a configuration from a JSON file, layered over the defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        #[derive(Deserialize)]
        struct Overlay {
            #[serde(flatten)]
            config: Config,
            #[serde(default)]
            replace_extensions: bool,
        }

        let overlay: Overlay = serde_json::from_str(text)
            .map_err(|e| Error::unsupported(format!("config: {e}")))?;
        let mut config = overlay.config;
        if !overlay.replace_extensions {
            let mut table = Format::default_extensions();
            table.extend(config.extensions);
            config.extensions = table;
        }
        Ok(config)
    }

    /// Whether a trimmed line is a separator token.
    pub fn is_separator(&self, line: &str) -> bool {
        let line = line.trim();
        !line.is_empty() && self.separator_tokens.iter().any(|t| t == line)
    }

    /// Format registered for a file name, trying compound extensions
    /// (`book.fb2.zip`) before simple ones.
    pub fn format_for_name(&self, name: &str) -> Option<Format> {
        let lower = name.to_ascii_lowercase();
        let mut parts = lower.rsplit('.');
        let last = parts.next()?;
        if last.len() == lower.len() {
            return None;
        }
        if let Some(prev) = parts.next() {
            let compound = format!("{prev}.{last}");
            if prev.len() + last.len() + 1 < lower.len()
                && let Some(format) = self.extensions.get(&compound)
            {
                return Some(*format);
            }
        }
        self.extensions.get(last).copied()
    }
}
