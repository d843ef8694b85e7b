//! Overlapping sliding-window text chunker.
//!
//! Splits parsed document text into [`Chunk`]s of at most `chunk_size`
//! characters. Consecutive chunks share up to `chunk_overlap` characters so
//! a sentence cut at a window edge still appears whole in one of them.
//!
//! Window ends prefer natural boundaries, tried in order: paragraph (`\n\n`),
//! line, sentence (`. `), word. A boundary is only accepted in the second
//! half of the window; otherwise the window is cut at the character limit.
//!
//! Every chunk's text is a verbatim (trimmed) slice of the input, so it is
//! always a substring of the document it came from. Each chunk carries a
//! SHA-256 hash of its text.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// Split text into overlapping chunks with contiguous indices starting at 0.
///
/// Whitespace-only input produces no chunks. `chunk_overlap` is expected to
/// be smaller than `chunk_size` (enforced by config validation); the window
/// always advances regardless.
pub fn chunk_text(source: &str, text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<Chunk> {
    let chunk_size = chunk_size.max(1);
    let len = text.len();
    let mut chunks = Vec::new();
    let mut chunk_index: i64 = 0;
    let mut start = skip_whitespace(text, 0);

    while start < len {
        let window_end = advance_chars(text, start, chunk_size);
        let end = if window_end == len {
            len
        } else {
            break_point(text, start, window_end)
        };

        let piece = text[start..end].trim_end();
        if !piece.is_empty() {
            chunks.push(make_chunk(source, chunk_index, piece));
            chunk_index += 1;
        }

        if end >= len {
            break;
        }

        let mut next = retreat_chars(text, end, chunk_overlap);
        // Don't open a chunk in the middle of a word.
        if next > start && !starts_word(text, next) {
            if let Some(ws) = text[next..end].find(char::is_whitespace) {
                next += ws;
            }
        }
        if next <= start {
            next = end;
        }
        start = skip_whitespace(text, next);
    }

    chunks
}

fn break_point(text: &str, start: usize, window_end: usize) -> usize {
    let window = &text[start..window_end];
    let min_cut = start + window.len() / 2;
    for sep in SEPARATORS {
        if let Some(pos) = window.rfind(sep) {
            let cut = start + pos + sep.len();
            if cut > min_cut {
                return cut;
            }
        }
    }
    window_end
}

/// Byte offset `n` characters after `from`, clamped to the end of `text`.
fn advance_chars(text: &str, from: usize, n: usize) -> usize {
    text[from..]
        .char_indices()
        .nth(n)
        .map(|(i, _)| from + i)
        .unwrap_or(text.len())
}

/// Byte offset `n` characters before `to`.
fn retreat_chars(text: &str, to: usize, n: usize) -> usize {
    text[..to]
        .char_indices()
        .rev()
        .take(n)
        .last()
        .map(|(i, _)| i)
        .unwrap_or(to)
}

fn skip_whitespace(text: &str, from: usize) -> usize {
    text[from..]
        .find(|c: char| !c.is_whitespace())
        .map(|i| from + i)
        .unwrap_or(text.len())
}

fn starts_word(text: &str, at: usize) -> bool {
    text[..at]
        .chars()
        .next_back()
        .map(char::is_whitespace)
        .unwrap_or(true)
}

fn make_chunk(source: &str, index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        source: source.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}
