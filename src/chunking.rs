use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RagConfig;
use crate::models::{Chunk, ChunkMetadata};

/// Strategy for splitting normalized text into chunks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStrategy {
    /// Pack whole sentences greedily under the character budget
    #[default]
    Semantic,
    /// Pack whole sentences, flushing as soon as the budget is met
    Sentence,
    /// Sliding character window with backward overlap
    Fixed,
}

static HORIZONTAL_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\S\n]+").expect("valid regex"));

/// Normalize raw text before chunking: straighten curly quotes, strip
/// control characters except newlines, collapse whitespace runs to single
/// spaces.
pub fn normalize_text(text: &str) -> String {
    let mut cleaned = String::with_capacity(text.len());

    for c in text.chars() {
        match c {
            '\u{2018}' | '\u{2019}' => cleaned.push('\''),
            '\u{201C}' | '\u{201D}' => cleaned.push('"'),
            '\n' => cleaned.push('\n'),
            '\t' => cleaned.push(' '),
            c if c.is_control() => {}
            c => cleaned.push(c),
        }
    }

    HORIZONTAL_WS.replace_all(&cleaned, " ").trim().to_string()
}

/// Split normalized text into chunks under the configured strategy.
///
/// Chunks under the minimum character or word count are discarded; retained
/// chunks carry contiguous zero-based sequence indices. Empty input yields
/// an empty list, not an error.
pub fn chunk(
    text: &str,
    strategy: ChunkStrategy,
    config: &RagConfig,
    metadata: &ChunkMetadata,
) -> Vec<Chunk> {
    let normalized = normalize_text(text);
    if normalized.is_empty() {
        return Vec::new();
    }

    let pieces = match strategy {
        ChunkStrategy::Semantic => semantic_pieces(&normalized, config.chunk_size),
        ChunkStrategy::Sentence => sentence_pieces(&normalized, config.chunk_size),
        ChunkStrategy::Fixed => fixed_pieces(&normalized, config.chunk_size, config.chunk_overlap),
    };

    let mut chunks = Vec::with_capacity(pieces.len());
    let mut dropped = 0usize;

    for piece in pieces {
        let trimmed = piece.trim();
        if trimmed.chars().count() < config.min_chunk_chars {
            dropped += 1;
            continue;
        }

        let chunk = Chunk::new(trimmed.to_string(), chunks.len(), metadata.clone());
        if chunk.word_count < config.min_chunk_words {
            dropped += 1;
            continue;
        }

        chunks.push(chunk);
    }

    if dropped > 0 {
        debug!("Dropped {} undersized chunks", dropped);
    }

    chunks
}

/// Split text into sentences. A boundary is sentence-ending punctuation
/// followed by whitespace (or end of input), or a newline.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);

        let boundary = match c {
            '.' | '!' | '?' => chars.peek().map_or(true, |next| next.is_whitespace()),
            '\n' => true,
            _ => false,
        };

        if boundary {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_string());
            }
            current.clear();
        }
    }

    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }

    sentences
}

/// Greedily pack consecutive sentences until adding the next one would
/// exceed the budget. Never splits mid-sentence; a single sentence over
/// budget becomes its own chunk.
fn semantic_pieces(text: &str, chunk_size: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();

    for sentence in split_sentences(text) {
        if !current.is_empty()
            && current.chars().count() + 1 + sentence.chars().count() > chunk_size
        {
            pieces.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&sentence);
    }

    if !current.is_empty() {
        pieces.push(current);
    }

    pieces
}

/// Like the semantic strategy but flushes eagerly once the budget is met,
/// without look-ahead.
fn sentence_pieces(text: &str, chunk_size: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();

    for sentence in split_sentences(text) {
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&sentence);

        if current.chars().count() >= chunk_size {
            pieces.push(std::mem::take(&mut current));
        }
    }

    if !current.is_empty() {
        pieces.push(current);
    }

    pieces
}

/// Sliding window of `chunk_size` characters with `chunk_overlap` characters
/// of backward overlap. A window boundary inside a sentence backs up to the
/// nearest sentence end or newline within the last 100 characters.
fn fixed_pieces(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    if len == 0 {
        return Vec::new();
    }

    let chunk_size = chunk_size.max(1);
    let overlap = chunk_overlap.min(chunk_size.saturating_sub(1));

    let mut pieces = Vec::new();
    let mut start = 0;

    while start < len {
        let mut end = (start + chunk_size).min(len);

        if end < len {
            let window_start = end.saturating_sub(100).max(start + 1);
            if let Some(cut) = (window_start..end)
                .rev()
                .find(|&i| matches!(chars[i], '.' | '!' | '?' | '\n'))
            {
                end = cut + 1;
            }
        }

        pieces.push(chars[start..end].iter().collect());

        if end >= len {
            break;
        }
        let next = end.saturating_sub(overlap);
        // Guard against stalling when the backed-up window is tiny
        start = if next > start { next } else { end };
    }

    pieces
}

/// Approximate token count: 1 token per 4 characters of English text.
pub fn count_tokens_approx(text: &str) -> usize {
    (text.len() as f64 / 4.0).ceil() as usize
}
