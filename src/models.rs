//! Core data models used throughout the companion.
//!
//! These types represent the documents, chunks, and retrieval results that
//! flow through the analyze and chat pipelines.

use serde::Serialize;
use std::path::PathBuf;

/// Raw text of one eligible file. Discarded after chunking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Path relative to the clone root, `/`-separated.
    pub source_path: String,
    pub content: String,
}

/// A character window of a document's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub source_path: String,
    /// Start of the window, in characters.
    pub offset: usize,
    /// Window length, in characters.
    pub length: usize,
}

/// A chunk as persisted in the vector index.
#[derive(Debug, Clone)]
pub struct IndexedEntry {
    pub id: String,
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
    pub content_hash: String,
}

/// A retrieved chunk together with its cosine similarity to the query.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub id: String,
    pub chunk: Chunk,
    pub score: f32,
}

/// A file the loader could not turn into a [`Document`].
#[derive(Debug, Clone, Serialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of a loader run.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub documents: Vec<Document>,
    pub skipped: Vec<SkippedFile>,
    /// Every directory entry the walker yielded (files and directories).
    pub entries_visited: usize,
}

/// Provenance of a chunk handed to the generative model.
#[derive(Debug, Clone, Serialize)]
pub struct CitedSource {
    pub chunk_id: String,
    pub source_path: String,
    pub offset: usize,
    pub length: usize,
    pub score: f32,
}

/// Grounded answer returned by chat.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub cited_sources: Vec<CitedSource>,
}

/// Summary of a completed analyze run.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeReport {
    pub message: String,
    pub repository_url: String,
    pub documents: usize,
    pub skipped: Vec<SkippedFile>,
    pub chunks: usize,
}
