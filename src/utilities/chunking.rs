//! Splitting long publications into ordered parts.
//!
//! Text is packed greedily into parts of at most `max_chars` characters.
//! Boundaries are chosen by priority: paragraph breaks first, then sentence
//! ends, then spaces between words. A single word longer than the limit is the
//! only thing ever cut mid-token.
//!
//! Joining the parts with a space and collapsing whitespace gives back the
//! original text with its whitespace collapsed.

use once_cell::sync::Lazy;
use regex::Regex;

/// Characters kept free in every part of a multi-part publication for the
/// `(i/n)` marker.
pub const PART_MARKER_RESERVE: usize = 16;

const PARAGRAPH_SEP: &str = "\n\n";
const INLINE_SEP: &str = " ";

static PARAGRAPH_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n[ \t\r]*\n\s*").expect("static regex"));

static SENTENCE_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[.!?…]+["'»”)\]]*\s+"#).expect("static regex"));

static PART_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n\n\(\d+/\d+\)$").expect("static regex"));

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Greedy accumulator of units into parts.
struct Packer {
    max_chars: usize,
    parts: Vec<String>,
    current: String,
    current_len: usize,
}

impl Packer {
    fn new(max_chars: usize) -> Self {
        Self {
            max_chars,
            parts: Vec::new(),
            current: String::new(),
            current_len: 0,
        }
    }

    /// Append `unit`, joined to the open part by `sep` if it still fits.
    fn push(&mut self, unit: &str, sep: &str) {
        let unit_len = char_len(unit);
        if self.current.is_empty() {
            self.current.push_str(unit);
            self.current_len = unit_len;
        } else if self.current_len + char_len(sep) + unit_len <= self.max_chars {
            self.current.push_str(sep);
            self.current.push_str(unit);
            self.current_len += char_len(sep) + unit_len;
        } else {
            self.flush();
            self.current.push_str(unit);
            self.current_len = unit_len;
        }
    }

    fn flush(&mut self) {
        if !self.current.is_empty() {
            self.parts.push(std::mem::take(&mut self.current));
            self.current_len = 0;
        }
    }

    fn finish(mut self) -> Vec<String> {
        self.flush();
        self.parts
    }
}

/// Split a paragraph into sentences, keeping terminal punctuation.
fn sentences(paragraph: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    for m in SENTENCE_END.find_iter(paragraph) {
        let sentence = paragraph[start..m.end()].trim();
        if !sentence.is_empty() {
            out.push(sentence);
        }
        start = m.end();
    }
    let tail = paragraph[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

/// Cut an over-long token into pieces of at most `max_chars` characters.
fn hard_split(word: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    chars
        .chunks(max_chars)
        .map(|piece| piece.iter().collect())
        .collect()
}

/// Split `text` into ordered parts of at most `max_chars` characters.
///
/// Blank input yields no parts. Text that already fits is returned trimmed as
/// a single part.
pub fn split_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    if char_len(text) <= max_chars {
        return vec![text.to_string()];
    }

    let mut packer = Packer::new(max_chars);
    for paragraph in PARAGRAPH_BREAK.split(text) {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }
        if char_len(paragraph) <= max_chars {
            packer.push(paragraph, PARAGRAPH_SEP);
            continue;
        }

        let mut sentence_sep = PARAGRAPH_SEP;
        for sentence in sentences(paragraph) {
            if char_len(sentence) <= max_chars {
                packer.push(sentence, sentence_sep);
            } else {
                let mut word_sep = sentence_sep;
                for word in sentence.split_whitespace() {
                    if char_len(word) <= max_chars {
                        packer.push(word, word_sep);
                    } else {
                        for piece in hard_split(word, max_chars) {
                            packer.push(&piece, word_sep);
                        }
                    }
                    word_sep = INLINE_SEP;
                }
            }
            sentence_sep = INLINE_SEP;
        }
    }
    packer.finish()
}

/// Split `text` for publication under a per-message limit of `max_chars`.
///
/// Multi-part results carry a trailing `(i/n)` marker and still respect the
/// limit; a text that fits in one message is returned unmarked.
pub fn plan_parts(text: &str, max_chars: usize) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if char_len(trimmed) <= max_chars {
        return vec![trimmed.to_string()];
    }

    let budget = max_chars.saturating_sub(PART_MARKER_RESERVE).max(1);
    let parts = split_text(trimmed, budget);
    let total = parts.len();
    parts
        .into_iter()
        .enumerate()
        .map(|(i, part)| format!("{}\n\n({}/{})", part, i + 1, total))
        .collect()
}

/// Remove the marker added by [`plan_parts`], if any.
pub fn strip_part_marker(part: &str) -> &str {
    match PART_MARKER.find(part) {
        Some(m) => &part[..m.start()],
        None => part,
    }
}
