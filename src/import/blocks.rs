//! Block accumulation shared by the text-producing parsers.

use crate::book::{CoverRef, Emphasis, StyledRun, TextBlock, collapse_whitespace};
use crate::config::Config;
use crate::markup;

/// Collects blocks in reading order and applies the rules every text
/// format shares: whitespace collapsing, separator tokens and the
/// synthetic first chapter.
#[derive(Debug)]
pub struct BlockBuilder<'a> {
    config: &'a Config,
    blocks: Vec<TextBlock>,
}

impl<'a> BlockBuilder<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            blocks: Vec::new(),
        }
    }

    /// Add a heading. Titles are plain text, so inline markup is removed;
    /// blank titles are dropped.
    pub fn chapter(&mut self, title: &str, level: u8) {
        let title = collapse_whitespace(&markup::strip(title));
        if !title.is_empty() {
            self.blocks.push(TextBlock::Chapter { title, level });
        }
    }

    /// Add a paragraph from styled runs. Whitespace is collapsed across run
    /// boundaries; a paragraph whose text is a separator token becomes a
    /// [`TextBlock::Separator`]; an empty paragraph is dropped.
    pub fn paragraph(&mut self, runs: Vec<StyledRun>) {
        let runs = normalize_runs(runs);
        if runs.is_empty() {
            return;
        }
        let text: String = runs.iter().map(|r| r.text.as_str()).collect();
        if self.config.is_separator(&text) {
            self.separator();
        } else {
            self.blocks.push(TextBlock::Paragraph { runs });
        }
    }

    /// Add a paragraph with no styling.
    pub fn plain(&mut self, text: &str) {
        self.paragraph(vec![StyledRun::plain(text)]);
    }

    /// Add a line written with inline markup.
    pub fn markup_line(&mut self, line: &str) {
        if self.config.is_separator(line) {
            self.separator();
        } else {
            self.paragraph(markup::parse(line));
        }
    }

    pub fn separator(&mut self) {
        self.blocks.push(TextBlock::Separator);
    }

    pub fn image(&mut self, target: CoverRef) {
        self.blocks.push(TextBlock::Image { target });
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Finish the sequence.
    ///
    /// A sequence without any chapter gets one: its first paragraph is
    /// replaced in place by a level-0 chapter carrying the paragraph's
    /// plain text.
    pub fn finish(self) -> Vec<TextBlock> {
        let mut blocks = self.blocks;
        promote_first_paragraph(&mut blocks);
        blocks
    }
}

/// Replace the first paragraph with a chapter when no chapter exists.
pub(crate) fn promote_first_paragraph(blocks: &mut [TextBlock]) {
    if blocks.iter().any(TextBlock::is_chapter) {
        return;
    }
    if let Some(first) = blocks.iter_mut().find(|b| b.is_paragraph()) {
        let title = first.text();
        *first = TextBlock::chapter(title, 0);
    }
}

/// Collapse whitespace across run boundaries, trim the ends, and merge
/// neighbours that end up with the same emphasis. A collapsed space keeps
/// only the emphasis shared by the text on both sides of it.
fn normalize_runs(runs: Vec<StyledRun>) -> Vec<StyledRun> {
    let mut out: Vec<StyledRun> = Vec::with_capacity(runs.len());
    let mut pending_space = false;

    for run in runs {
        for c in run.text.chars() {
            if c.is_whitespace() {
                pending_space = !out.is_empty();
                continue;
            }
            if pending_space
                && let Some(prev) = out.last().map(|r| r.emphasis)
            {
                let shared = Emphasis {
                    bold: prev.bold && run.emphasis.bold,
                    italic: prev.italic && run.emphasis.italic,
                    strikethrough: prev.strikethrough && run.emphasis.strikethrough,
                };
                push_char(&mut out, ' ', shared);
            }
            pending_space = false;
            push_char(&mut out, c, run.emphasis);
        }
    }
    out
}

fn push_char(out: &mut Vec<StyledRun>, c: char, emphasis: Emphasis) {
    match out.last_mut() {
        Some(last) if last.emphasis == emphasis => last.text.push(c),
        _ => out.push(StyledRun::styled(c.to_string(), emphasis)),
    }
}
