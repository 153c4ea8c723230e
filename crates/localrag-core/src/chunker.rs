//! Fixed-size character windows with overlap.

use crate::error::{Error, Result};
use crate::types::{Chunk, Document};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    /// Maximum chunk length in chars.
    pub max_size: usize,
    /// Chars shared by consecutive chunks.
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { max_size: 2000, overlap: 50 }
    }
}

impl ChunkingConfig {
    pub fn new(max_size: usize, overlap: usize) -> Result<Self> {
        let config = Self { max_size, overlap };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(Error::InvalidConfiguration("chunk size must be greater than zero".into()));
        }
        if self.overlap >= self.max_size {
            return Err(Error::InvalidConfiguration(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                self.overlap, self.max_size
            )));
        }
        Ok(())
    }

    fn step(&self) -> usize {
        self.max_size - self.overlap
    }
}

/// Split a document into windows of at most `max_size` chars, each starting
/// `max_size - overlap` chars after the previous one.
pub fn split(document: &Document, max_size: usize, overlap: usize) -> Result<Vec<Chunk>> {
    let config = ChunkingConfig::new(max_size, overlap)?;
    Ok(split_with(document, &config))
}

/// Same as [`split`] for an already validated configuration.
pub fn split_with(document: &Document, config: &ChunkingConfig) -> Vec<Chunk> {
    // Byte position of every char boundary, plus the end of the text.
    let boundaries: Vec<usize> = document
        .text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(document.text.len()))
        .collect();
    let total_chars = boundaries.len() - 1;

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < total_chars {
        let end = (start + config.max_size).min(total_chars);
        chunks.push(Chunk {
            text: document.text[boundaries[start]..boundaries[end]].to_string(),
            document_id: document.id.clone(),
            offset: start,
        });
        if end == total_chars {
            break;
        }
        start += config.step();
    }
    chunks
}

/// Rebuild the source text from chunks produced by [`split_with`].
pub fn reassemble(chunks: &[Chunk]) -> String {
    let mut out = String::new();
    let mut covered = 0usize;
    for chunk in chunks {
        let skip = covered.saturating_sub(chunk.offset);
        out.extend(chunk.text.chars().skip(skip));
        covered = chunk.offset + chunk.len();
    }
    out
}
