//! Paragraph-boundary text chunker.
//!
//! Extracted document text is split on blank lines (`\n\n`) and packed into
//! chunks of at most `max_tokens`, approximated by a fixed chars-per-token
//! ratio. Paragraphs longer than the limit are hard-split at the last newline
//! or space before the boundary.
//!
//! Every chunk carries the absolute path of its source file so the vector
//! store can later delete by source. Blank text produces no chunks at all.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

const CHARS_PER_TOKEN: usize = 4;

/// Split `text` into chunks tagged with `source`.
///
/// Indices are contiguous from 0. Whitespace-only input yields an empty vec.
pub fn chunk_text(source: &str, text: &str, max_tokens: usize) -> Vec<Chunk> {
    let max_chars = max_tokens.max(1) * CHARS_PER_TOKEN;
    let mut chunker = Chunker {
        source,
        chunks: Vec::new(),
    };
    let mut buf = String::new();

    for para in text.split("\n\n") {
        let para = para.trim();
        if para.is_empty() {
            continue;
        }

        let joined_len = if buf.is_empty() {
            para.len()
        } else {
            buf.len() + 2 + para.len()
        };
        if joined_len > max_chars && !buf.is_empty() {
            chunker.push(&buf);
            buf.clear();
        }

        if para.len() > max_chars {
            split_long(para, max_chars, &mut chunker);
            continue;
        }

        if !buf.is_empty() {
            buf.push_str("\n\n");
        }
        buf.push_str(para);
    }

    if !buf.is_empty() {
        chunker.push(&buf);
    }
    chunker.chunks
}

struct Chunker<'a> {
    source: &'a str,
    chunks: Vec<Chunk>,
}

impl Chunker<'_> {
    fn push(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let hash = hex::encode(Sha256::digest(text.as_bytes()));
        self.chunks.push(Chunk {
            id: Uuid::new_v4().to_string(),
            source: self.source.to_string(),
            chunk_index: self.chunks.len() as i64,
            text: text.to_string(),
            hash,
        });
    }
}

fn split_long(para: &str, max_chars: usize, chunker: &mut Chunker<'_>) {
    let mut rest = para;
    while !rest.is_empty() {
        if rest.len() <= max_chars {
            chunker.push(rest);
            break;
        }
        let boundary = floor_char_boundary(rest, max_chars);
        let head = &rest[..boundary];
        let cut = head
            .rfind('\n')
            .or_else(|| head.rfind(' '))
            .map(|pos| pos + 1)
            .unwrap_or(boundary);
        chunker.push(&rest[..cut]);
        rest = &rest[cut..];
    }
}

/// Largest char boundary `<= index`, never 0 for non-empty input.
fn floor_char_boundary(s: &str, index: usize) -> usize {
    let mut i = index.min(s.len());
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    if i == 0 {
        s.chars().next().map(char::len_utf8).unwrap_or(0)
    } else {
        i
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_text_is_one_chunk() {
        let chunks = chunk_text("/docs/a.txt", "Hello, world!", 250);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].source, "/docs/a.txt");
    }

    #[test]
    fn blank_text_has_no_chunks() {
        assert!(chunk_text("/docs/a.txt", "", 250).is_empty());
        assert!(chunk_text("/docs/a.txt", "  \n\n \n\n\t", 250).is_empty());
    }

    #[test]
    fn paragraphs_are_packed_under_limit() {
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let chunks = chunk_text("s", text, 250);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.starts_with("First paragraph."));
        assert!(chunks[0].text.ends_with("Third paragraph."));
    }

    #[test]
    fn indices_are_contiguous() {
        let text = (0..50)
            .map(|i| format!("Paragraph number {i}."))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = chunk_text("s", &text, 10);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
            assert!(c.text.len() <= 40);
        }
    }

    #[test]
    fn long_paragraph_is_hard_split() {
        let text = "word ".repeat(100);
        let chunks = chunk_text("s", &text, 5);
        assert!(chunks.len() >= 20);
        assert!(chunks.iter().all(|c| c.text.len() <= 20 && !c.text.is_empty()));
    }

    #[test]
    fn multibyte_text_does_not_panic() {
        let text = "é".repeat(100);
        let chunks = chunk_text("s", &text, 2);
        let rebuilt: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn hashes_are_deterministic_ids_are_not() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        let a = chunk_text("s", text, 2);
        let b = chunk_text("s", text, 2);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.hash, y.hash);
            assert_ne!(x.id, y.id);
        }
    }
}
