//! Recursive character splitter.
//!
//! Text is cut on the first separator that occurs in it (paragraphs, then
//! lines, then words, then characters). Pieces that are still too long are
//! cut again with the next separator; short pieces are merged back into
//! chunks of at most `chunk_size` characters, each new chunk starting with
//! up to `chunk_overlap` characters from the end of the previous one.

use std::collections::VecDeque;

use crate::error::{GatewayError, Result};

const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone)]
pub struct RecursiveTextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

impl RecursiveTextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(GatewayError::Validation("chunk size must be greater than zero".to_string()));
        }
        if chunk_overlap >= chunk_size {
            return Err(GatewayError::Validation(format!(
                "chunk overlap ({}) must be less than chunk size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_with(text, &self.separators)
    }

    fn split_with(&self, text: &str, separators: &[String]) -> Vec<String> {
        let position = separators
            .iter()
            .position(|sep| sep.is_empty() || text.contains(sep.as_str()))
            .unwrap_or(separators.len().saturating_sub(1));
        let separator = separators.get(position).map(String::as_str).unwrap_or("");
        let remaining = separators.get(position + 1..).unwrap_or(&[]);

        let pieces: Vec<String> = if separator.is_empty() {
            text.chars().map(String::from).collect()
        } else {
            text.split(separator)
                .filter(|piece| !piece.is_empty())
                .map(str::to_string)
                .collect()
        };

        let mut chunks = Vec::new();
        let mut short_pieces: Vec<String> = Vec::new();
        for piece in pieces {
            if char_len(&piece) < self.chunk_size {
                short_pieces.push(piece);
                continue;
            }
            if !short_pieces.is_empty() {
                chunks.extend(self.merge(&short_pieces, separator));
                short_pieces.clear();
            }
            if remaining.is_empty() {
                let piece = piece.trim();
                if !piece.is_empty() {
                    chunks.push(piece.to_string());
                }
            } else {
                chunks.extend(self.split_with(&piece, remaining));
            }
        }
        if !short_pieces.is_empty() {
            chunks.extend(self.merge(&short_pieces, separator));
        }
        chunks
    }

    fn merge(&self, pieces: &[String], separator: &str) -> Vec<String> {
        let separator_len = char_len(separator);
        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let piece_len = char_len(piece);
            let joint = if window.is_empty() { 0 } else { separator_len };

            if total + piece_len + joint > self.chunk_size && !window.is_empty() {
                push_joined(&mut chunks, &window, separator);

                loop {
                    let joint = if window.is_empty() { 0 } else { separator_len };
                    let overflowing = total > 0 && total + piece_len + joint > self.chunk_size;
                    if total <= self.chunk_overlap && !overflowing {
                        break;
                    }
                    let Some(first) = window.pop_front() else { break };
                    let trailing = if window.is_empty() { 0 } else { separator_len };
                    total -= char_len(first) + trailing;
                }
            }

            let joint = if window.is_empty() { 0 } else { separator_len };
            window.push_back(piece);
            total += piece_len + joint;
        }

        push_joined(&mut chunks, &window, separator);
        chunks
    }
}

fn push_joined(chunks: &mut Vec<String>, window: &VecDeque<&str>, separator: &str) {
    let joined = window.iter().copied().collect::<Vec<_>>().join(separator);
    let joined = joined.trim();
    if !joined.is_empty() {
        chunks.push(joined.to_string());
    }
}
