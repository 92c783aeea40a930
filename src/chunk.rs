//! Fixed-size, overlapping character windows.
//!
//! Every document is cut into windows of `chunk_size` characters, each
//! starting `chunk_size - overlap` characters after the previous one, until
//! a window reaches the end of the content. The last window may be shorter.
//! Sizes are in characters (Unicode scalar values), never bytes, so windows
//! never split a code point.

use crate::error::{CompanionError, Result};
use crate::models::{Chunk, Document};

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_OVERLAP: usize = 200;

/// Validated window parameters. `overlap < chunk_size` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    chunk_size: usize,
    overlap: usize,
}

impl ChunkParams {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(CompanionError::Config("chunk_size must be > 0".into()));
        }
        if overlap >= chunk_size {
            return Err(CompanionError::Config(format!(
                "overlap ({overlap}) must be smaller than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    fn step(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

/// Split all documents, preserving document order.
pub fn split(documents: &[Document], params: ChunkParams) -> Vec<Chunk> {
    documents
        .iter()
        .flat_map(|doc| chunk_document(doc, params))
        .collect()
}

/// Split one document. Empty content yields no chunks.
pub fn chunk_document(doc: &Document, params: ChunkParams) -> Vec<Chunk> {
    let content = doc.content.as_str();
    // Byte offset of every char, plus the end of the string as a sentinel.
    let mut bounds: Vec<usize> = content.char_indices().map(|(i, _)| i).collect();
    let total = bounds.len();
    bounds.push(content.len());

    let mut chunks = Vec::with_capacity(total / params.step() + 1);
    let mut start = 0;
    while start < total {
        let end = (start + params.chunk_size).min(total);
        chunks.push(Chunk {
            text: content[bounds[start]..bounds[end]].to_string(),
            source_path: doc.source_path.clone(),
            offset: start,
            length: end - start,
        });
        if end == total {
            break;
        }
        start += params.step();
    }

    chunks
}
