//! Recursive character splitting with a single separator.
//!
//! The extracted PDF text is cut at every occurrence of the separator
//! (default `". \n"`, i.e. a sentence that ends a line). The separator is
//! kept at the start of the piece that follows it. Pieces shorter than
//! `chunk_size` are then greedily merged into chunks of at most `chunk_size`
//! characters, carrying up to `chunk_overlap` characters of trailing pieces
//! into the next chunk. A piece that is already `chunk_size` or longer
//! becomes its own chunk untouched; with only one separator there is no
//! finer level to recurse into.
//!
//! Lengths are counted in `char`s, not bytes, so multi-byte text is not
//! penalised.

use crate::config::SplitterConfig;
use std::collections::VecDeque;
use tracing::warn;

/// Split `text` into ordered chunks. Never returns empty chunks.
pub fn split_text(text: &str, config: &SplitterConfig) -> Vec<String> {
    let pieces = split_keep_separator(text, &config.separator);

    let mut chunks = Vec::new();
    let mut pending: Vec<&str> = Vec::new();

    for piece in pieces {
        if char_len(piece) < config.chunk_size {
            pending.push(piece);
            continue;
        }

        if !pending.is_empty() {
            chunks.extend(merge_pieces(&pending, config));
            pending.clear();
        }
        if !piece.trim().is_empty() {
            chunks.push(piece.to_string());
        }
    }

    if !pending.is_empty() {
        chunks.extend(merge_pieces(&pending, config));
    }

    chunks
}

/// Cut before every separator occurrence, dropping empty pieces.
fn split_keep_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    let mut pieces = Vec::new();
    let mut start = 0;

    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push(&text[start..idx]);
        }
        start = idx;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }

    pieces
}

/// Greedy merge with overlap. The separator already sits inside the pieces,
/// so they are concatenated without a joiner.
fn merge_pieces(pieces: &[&str], config: &SplitterConfig) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut window: VecDeque<&str> = VecDeque::new();
    let mut total = 0usize;

    for &piece in pieces {
        let len = char_len(piece);

        if total + len > config.chunk_size {
            if total > config.chunk_size {
                warn!(
                    "Created a chunk of {} chars, longer than the configured {}",
                    total, config.chunk_size
                );
            }
            if !window.is_empty() {
                if let Some(chunk) = join_trimmed(&window) {
                    chunks.push(chunk);
                }
                // Keep at most `chunk_overlap` chars, and only as much as
                // still leaves room for the incoming piece.
                while total > config.chunk_overlap
                    || (total + len > config.chunk_size && total > 0)
                {
                    match window.pop_front() {
                        Some(first) => total -= char_len(first),
                        None => break,
                    }
                }
            }
        }

        window.push_back(piece);
        total += len;
    }

    if let Some(chunk) = join_trimmed(&window) {
        chunks.push(chunk);
    }

    chunks
}

fn join_trimmed(window: &VecDeque<&str>) -> Option<String> {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
