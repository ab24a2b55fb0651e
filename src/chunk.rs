//! Overlapping character-window chunker.
//!
//! Splits document text into chunks of at most `chunk_size` characters, with
//! the trailing `chunk_overlap` characters of each chunk repeated at the
//! start of the next so retrieval never loses context at a boundary.
//!
//! Windows prefer to break just after the last whitespace they contain
//! (keeping words intact), but the character bound is authoritative: no
//! produced chunk ever exceeds `chunk_size` characters. Offsets are counted
//! in `char`s, so multi-byte text is never split mid-scalar.

use crate::error::{DocChatError, Result};
use crate::models::{Chunk, Document, Metadata};

/// Split each document independently and concatenate the results in input order.
///
/// Every chunk inherits its document's metadata unchanged. Documents that
/// contain no text (empty or whitespace-only) produce no chunks.
pub fn split_documents(
    documents: &[Document],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<Chunk>> {
    validate_geometry(chunk_size, chunk_overlap)?;

    let mut chunks = Vec::new();
    for doc in documents {
        split_into(&mut chunks, &doc.text, &doc.metadata, chunk_size, chunk_overlap);
    }
    Ok(chunks)
}

/// Split a single text with the given metadata attached to every chunk.
pub fn split_text(
    text: &str,
    metadata: &Metadata,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<Chunk>> {
    validate_geometry(chunk_size, chunk_overlap)?;

    let mut chunks = Vec::new();
    split_into(&mut chunks, text, metadata, chunk_size, chunk_overlap);
    Ok(chunks)
}

fn validate_geometry(chunk_size: usize, chunk_overlap: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(DocChatError::Config("chunk_size must be > 0".to_string()));
    }
    if chunk_overlap >= chunk_size {
        return Err(DocChatError::Config(format!(
            "chunk_overlap ({}) must be < chunk_size ({})",
            chunk_overlap, chunk_size
        )));
    }
    Ok(())
}

fn split_into(
    out: &mut Vec<Chunk>,
    text: &str,
    metadata: &Metadata,
    chunk_size: usize,
    chunk_overlap: usize,
) {
    if text.trim().is_empty() {
        return;
    }

    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();

    // A document that fits in one window is passed through whole.
    if n <= chunk_size {
        out.push(Chunk::new(text, metadata.clone()));
        return;
    }

    let mut start = 0usize;
    while start < n {
        let hard_end = (start + chunk_size).min(n);
        let end = if hard_end < n {
            // Prefer breaking just after the last whitespace in the window.
            match chars[start..hard_end].iter().rposition(|c| c.is_whitespace()) {
                Some(pos) if pos > 0 => start + pos + 1,
                _ => hard_end,
            }
        } else {
            hard_end
        };

        let piece: String = chars[start..end].iter().collect();
        let trimmed = piece.trim();
        if !trimmed.is_empty() {
            out.push(Chunk::new(trimmed, metadata.clone()));
        }

        if end >= n {
            break;
        }
        // Step back by the overlap, but always make forward progress even
        // when a whitespace break produced a chunk shorter than the overlap.
        start = end.saturating_sub(chunk_overlap).max(start + 1);
    }
}
