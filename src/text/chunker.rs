//! Length-bounded chunking of narratable text.
//!
//! Packs paragraphs greedily up to `max_len` characters. A paragraph that is
//! longer than the bound on its own is split into sentences and packed the
//! same way. A single sentence over the bound is emitted whole: the bound is
//! a target, never a reason to cut a sentence in half.

use regex::Regex;
use std::sync::LazyLock;

/// Separator between paragraphs packed into one chunk.
pub const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// Separator between sentences packed into one chunk.
pub const SENTENCE_SEPARATOR: &str = " ";

#[allow(clippy::expect_used)]
static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*\n\s*").expect("invalid paragraph pattern"));

/// One bounded slice of an item's narratable text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Position in the item, starting at 0
    pub sequence: usize,
    pub text: String,
    /// The `max_len` the chunk was packed against
    pub length_bound: usize,
}

impl TextChunk {
    /// Length in characters.
    pub fn len(&self) -> usize {
        char_len(&self.text)
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Split `text` into ordered chunks of at most `max_len` characters where possible.
pub fn chunk(text: &str, max_len: usize) -> Vec<TextChunk> {
    if char_len(text) <= max_len {
        return vec![TextChunk {
            sequence: 0,
            text: text.to_string(),
            length_bound: max_len,
        }];
    }

    let mut packer = Packer::new(max_len);
    for paragraph in paragraphs(text) {
        if char_len(paragraph) > max_len {
            packer.flush();
            for sentence in sentences(paragraph) {
                packer.push(sentence, SENTENCE_SEPARATOR);
            }
            packer.flush();
        } else {
            packer.push(paragraph, PARAGRAPH_SEPARATOR);
        }
    }
    packer.finish()
}

/// Blank-line separated blocks, trimmed, empty blocks dropped.
fn paragraphs(text: &str) -> impl Iterator<Item = &str> {
    PARAGRAPH_BREAK
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
}

/// Split on sentence terminators followed by whitespace.
///
/// Closing quotes and brackets after the terminator stay with the sentence.
fn sentences(paragraph: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = paragraph.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !is_terminator(c) {
            continue;
        }
        let mut end = i + c.len_utf8();
        while let Some(&(j, next)) = chars.peek() {
            if is_terminator(next) || is_closer(next) {
                end = j + next.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        if chars.peek().is_some_and(|&(_, next)| next.is_whitespace()) {
            let sentence = paragraph[start..end].trim();
            if !sentence.is_empty() {
                out.push(sentence);
            }
            start = end;
        }
    }

    let tail = paragraph[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '…')
}

fn is_closer(c: char) -> bool {
    matches!(c, '"' | '\'' | ')' | ']' | '”' | '’' | '»')
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Greedy accumulator shared by paragraph and sentence packing.
struct Packer {
    max_len: usize,
    buffer: String,
    buffer_len: usize,
    chunks: Vec<TextChunk>,
}

impl Packer {
    fn new(max_len: usize) -> Self {
        Self {
            max_len,
            buffer: String::new(),
            buffer_len: 0,
            chunks: Vec::new(),
        }
    }

    fn push(&mut self, piece: &str, separator: &str) {
        let piece_len = char_len(piece);
        if self.buffer.is_empty() {
            self.buffer.push_str(piece);
            self.buffer_len = piece_len;
            return;
        }

        let separator_len = char_len(separator);
        if self.buffer_len + separator_len + piece_len <= self.max_len {
            self.buffer.push_str(separator);
            self.buffer.push_str(piece);
            self.buffer_len += separator_len + piece_len;
        } else {
            self.flush();
            self.buffer.push_str(piece);
            self.buffer_len = piece_len;
        }
    }

    fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        self.chunks.push(TextChunk {
            sequence: self.chunks.len(),
            text: std::mem::take(&mut self.buffer),
            length_bound: self.max_len,
        });
        self.buffer_len = 0;
    }

    fn finish(mut self) -> Vec<TextChunk> {
        self.flush();
        self.chunks
    }
}
