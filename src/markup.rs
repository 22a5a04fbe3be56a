//! Inline markup normalization.
//!
//! Recognizes the inline emphasis subset of Markdown that shows up in
//! plain-text books and converted FB2 paragraphs:
//!
//! | Markup | Emphasis |
//! |---|---|
//! | `**text**`, `__text__` | bold |
//! | `*text*`, `_text_` | italic |
//! | `~~text~~` | strikethrough |
//!
//! Delimiters nest (`***both***`). A delimiter without a partner stays
//! literal, `_` only opens or closes at a word boundary, and a backslash
//! escapes the next delimiter character.

use crate::book::{Emphasis, StyledRun};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Style {
    Bold,
    Italic,
    Strike,
}

#[derive(Debug)]
struct Delim {
    ch: char,
    /// Characters not yet consumed by a matched pair.
    remaining: usize,
    can_open: bool,
    can_close: bool,
    opens: Vec<Style>,
    closes: Vec<Style>,
}

#[derive(Debug)]
enum Piece {
    Text(String),
    Delim(Delim),
}

/// Split a line into styled runs.
///
/// Adjacent runs with the same emphasis are merged and empty runs are
/// dropped, so an unstyled line yields exactly one plain run (or none for
/// an empty line).
pub fn parse(line: &str) -> Vec<StyledRun> {
    let mut pieces = tokenize(line);
    match_delimiters(&mut pieces);
    render(pieces)
}

/// Plain text of a line with all recognized markup removed.
pub fn strip(line: &str) -> String {
    parse(line).into_iter().map(|run| run.text).collect()
}

fn is_delimiter(c: char) -> bool {
    matches!(c, '*' | '_' | '~')
}

fn tokenize(line: &str) -> Vec<Piece> {
    let chars: Vec<char> = line.chars().collect();
    let mut pieces = Vec::new();
    let mut text = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '\\' && chars.get(i + 1).is_some_and(|&n| is_delimiter(n) || n == '\\') {
            text.push(chars[i + 1]);
            i += 2;
            continue;
        }
        if !is_delimiter(c) {
            text.push(c);
            i += 1;
            continue;
        }

        let start = i;
        while i < chars.len() && chars[i] == c {
            i += 1;
        }
        let count = i - start;
        let prev = start.checked_sub(1).map(|p| chars[p]);
        let next = chars.get(i).copied();

        let left_flanking = next.is_some_and(|n| !n.is_whitespace());
        let right_flanking = prev.is_some_and(|p| !p.is_whitespace());
        let (can_open, can_close) = match c {
            '_' => (
                left_flanking && !prev.is_some_and(char::is_alphanumeric),
                right_flanking && !next.is_some_and(char::is_alphanumeric),
            ),
            '~' if count < 2 => (false, false),
            _ => (left_flanking, right_flanking),
        };

        if !text.is_empty() {
            pieces.push(Piece::Text(std::mem::take(&mut text)));
        }
        pieces.push(Piece::Delim(Delim {
            ch: c,
            remaining: count,
            can_open,
            can_close,
            opens: Vec::new(),
            closes: Vec::new(),
        }));
    }
    if !text.is_empty() {
        pieces.push(Piece::Text(text));
    }
    pieces
}

fn delim(pieces: &mut [Piece], index: usize) -> &mut Delim {
    match &mut pieces[index] {
        Piece::Delim(d) => d,
        Piece::Text(_) => unreachable!("opener stack only holds delimiter indices"),
    }
}

/// Pair closers with the nearest compatible opener. Openers skipped over
/// by a match can no longer close and stay literal.
fn match_delimiters(pieces: &mut [Piece]) {
    let mut openers: Vec<usize> = Vec::new();

    for index in 0..pieces.len() {
        let (ch, can_open, can_close) = match &pieces[index] {
            Piece::Delim(d) => (d.ch, d.can_open, d.can_close),
            Piece::Text(_) => continue,
        };

        if can_close {
            while delim(pieces, index).remaining > 0 {
                let Some(pos) = openers
                    .iter()
                    .rposition(|&o| delim(pieces, o).ch == ch)
                else {
                    break;
                };
                let opener = openers[pos];
                let available = delim(pieces, opener).remaining.min(delim(pieces, index).remaining);
                let (style, used) = match ch {
                    '~' if available >= 2 => (Style::Strike, 2),
                    '~' => break,
                    _ if available >= 2 => (Style::Bold, 2),
                    _ => (Style::Italic, 1),
                };

                let open = delim(pieces, opener);
                open.remaining -= used;
                open.opens.push(style);
                let keep_opener = open.remaining > 0;

                let close = delim(pieces, index);
                close.remaining -= used;
                close.closes.push(style);

                openers.truncate(if keep_opener { pos + 1 } else { pos });
            }
        }

        if can_open && delim(pieces, index).remaining > 0 {
            openers.push(index);
        }
    }
}

fn render(pieces: Vec<Piece>) -> Vec<StyledRun> {
    let mut runs: Vec<StyledRun> = Vec::new();
    let mut depth = [0usize; 3];

    let current = |depth: &[usize; 3]| Emphasis {
        bold: depth[0] > 0,
        italic: depth[1] > 0,
        strikethrough: depth[2] > 0,
    };
    let slot = |style: Style| match style {
        Style::Bold => 0,
        Style::Italic => 1,
        Style::Strike => 2,
    };

    for piece in pieces {
        match piece {
            Piece::Text(text) => push_run(&mut runs, &text, current(&depth)),
            Piece::Delim(d) => {
                for style in &d.closes {
                    let s = slot(*style);
                    depth[s] = depth[s].saturating_sub(1);
                }
                if d.remaining > 0 {
                    let literal: String = std::iter::repeat_n(d.ch, d.remaining).collect();
                    push_run(&mut runs, &literal, current(&depth));
                }
                for style in &d.opens {
                    depth[slot(*style)] += 1;
                }
            }
        }
    }
    runs
}

fn push_run(runs: &mut Vec<StyledRun>, text: &str, emphasis: Emphasis) {
    if text.is_empty() {
        return;
    }
    match runs.last_mut() {
        Some(last) if last.emphasis == emphasis => last.text.push_str(text),
        _ => runs.push(StyledRun::styled(text, emphasis)),
    }
}
