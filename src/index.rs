//! Persistent vector index over embedded chunks.
//!
//! An index lives in a directory and is a single SQLite database,
//! `<location>/index.sqlite`, with two tables:
//!
//! - `entries`: chunk text, provenance (`source_path`, character offset and
//!   length), a SHA-256 content hash and the embedding as a little-endian
//!   `f32` BLOB.
//! - `meta`: embedding model, dimensionality, entry count, repository URL,
//!   build time and finally the `ready` marker.
//!
//! [`VectorIndex::open`] refuses a location without the `ready` marker, so
//! a build that died half way is reported as "not found" rather than
//! served partially.
//!
//! Queries score every entry with cosine similarity in Rust, then keep the
//! top `k`. Ties are ordered by source path, then offset.

use futures::{stream, StreamExt, TryStreamExt};
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};

use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, embed_query, vec_to_blob, EmbeddingProvider};
use crate::error::{CompanionError, Result};
use crate::migrate;
use crate::models::{Chunk, IndexedEntry, ScoredChunk};
use crate::workspace::force_remove_dir_all;

pub const INDEX_FILE: &str = "index.sqlite";

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub batch_size: usize,
    pub concurrency: usize,
    pub repository_url: Option<String>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            batch_size: 64,
            concurrency: 4,
            repository_url: None,
        }
    }
}

/// Build metadata, as reported by `status`.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub location: PathBuf,
    pub entries: usize,
    pub model: String,
    pub dims: usize,
    pub repository_url: Option<String>,
    pub built_at: Option<String>,
}

pub struct VectorIndex {
    location: PathBuf,
    pool: SqlitePool,
    model: String,
    dims: usize,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("location", &self.location)
            .field("model", &self.model)
            .field("dims", &self.dims)
            .finish()
    }
}

impl VectorIndex {
    /// Embed `chunks` and persist them at `location`, replacing whatever
    /// index was there.
    ///
    /// On any failure the location is removed, so a later [`open`](Self::open)
    /// reports it as missing.
    pub async fn build(
        location: &Path,
        chunks: Vec<Chunk>,
        provider: &dyn EmbeddingProvider,
        options: &BuildOptions,
    ) -> Result<Self> {
        let db_path = location.join(INDEX_FILE);
        remove_database_files(&db_path)?;

        let pool = db::connect(&db_path, true).await?;
        match write_index(&pool, chunks, provider, options).await {
            Ok(()) => {
                tracing::info!(location = %location.display(), "vector index ready");
                Ok(Self {
                    location: location.to_path_buf(),
                    pool,
                    model: provider.model_name().to_string(),
                    dims: provider.dims(),
                })
            }
            Err(e) => {
                pool.close().await;
                if let Err(cleanup) = force_remove_dir_all(location) {
                    tracing::warn!(
                        location = %location.display(),
                        error = %cleanup,
                        "failed to remove partial index"
                    );
                }
                Err(e)
            }
        }
    }

    /// Open a previously built index.
    pub async fn open(location: &Path) -> Result<Self> {
        let db_path = location.join(INDEX_FILE);
        if !db_path.is_file() {
            return Err(CompanionError::NotFound(location.to_path_buf()));
        }

        let pool = db::connect(&db_path, false).await?;
        if !migrate::has_schema(&pool).await? || meta_value(&pool, "ready").await?.is_none() {
            pool.close().await;
            return Err(CompanionError::NotFound(location.to_path_buf()));
        }

        let model = meta_value(&pool, "model").await?.unwrap_or_default();
        let dims = meta_value(&pool, "dims")
            .await?
            .and_then(|d| d.parse().ok())
            .unwrap_or(0);

        tracing::debug!(location = %location.display(), %model, dims, "opened vector index");
        Ok(Self {
            location: location.to_path_buf(),
            pool,
            model,
            dims,
        })
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Embed `text` with `provider` and return the `k` most similar entries.
    pub async fn query(
        &self,
        text: &str,
        k: usize,
        provider: &dyn EmbeddingProvider,
    ) -> Result<Vec<ScoredChunk>> {
        if provider.model_name() != self.model {
            tracing::warn!(
                index_model = %self.model,
                query_model = provider.model_name(),
                "query model differs from the model the index was built with"
            );
        }
        let vector = embed_query(provider, text).await?;
        self.query_vector(&vector, k).await
    }

    /// Return up to `k` entries by descending cosine similarity to `vector`.
    /// Fewer than `k` entries are returned when the index is smaller.
    pub async fn query_vector(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if vector.len() != self.dims {
            return Err(CompanionError::Config(format!(
                "query vector has {} dimensions, index '{}' was built with {}",
                vector.len(),
                self.model,
                self.dims
            )));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT rowid AS seq, id, source_path, char_offset, char_length, text, embedding FROM entries",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<(i64, ScoredChunk)> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let score = cosine_similarity(vector, &blob_to_vec(&blob));
                let seq: i64 = row.get("seq");
                let offset: i64 = row.get("char_offset");
                let length: i64 = row.get("char_length");
                (
                    seq,
                    ScoredChunk {
                        id: row.get("id"),
                        chunk: Chunk {
                            text: row.get("text"),
                            source_path: row.get("source_path"),
                            offset: offset as usize,
                            length: length as usize,
                        },
                        score,
                    },
                )
            })
            .collect();

        scored.sort_by(|(seq_a, a), (seq_b, b)| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.chunk.source_path.cmp(&b.chunk.source_path))
                .then_with(|| a.chunk.offset.cmp(&b.chunk.offset))
                .then_with(|| seq_a.cmp(seq_b))
        });
        scored.truncate(k);

        Ok(scored.into_iter().map(|(_, s)| s).collect())
    }

    pub async fn len(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    pub async fn stats(&self) -> Result<IndexStats> {
        Ok(IndexStats {
            location: self.location.clone(),
            entries: self.len().await?,
            model: self.model.clone(),
            dims: self.dims,
            repository_url: meta_value(&self.pool, "repository_url").await?,
            built_at: meta_value(&self.pool, "built_at").await?,
        })
    }

    /// Release the database handle. Required before the location can be
    /// deleted on platforms that lock open files.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

async fn write_index(
    pool: &SqlitePool,
    chunks: Vec<Chunk>,
    provider: &dyn EmbeddingProvider,
    options: &BuildOptions,
) -> Result<()> {
    migrate::reset_schema(pool).await?;

    let entries = embed_chunks(chunks, provider, options).await?;

    let mut tx = pool.begin().await?;
    for entry in &entries {
        sqlx::query(
            r#"
            INSERT INTO entries (id, source_path, char_offset, char_length, text, hash, embedding)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.chunk.source_path)
        .bind(entry.chunk.offset as i64)
        .bind(entry.chunk.length as i64)
        .bind(&entry.chunk.text)
        .bind(&entry.content_hash)
        .bind(vec_to_blob(&entry.embedding))
        .execute(&mut *tx)
        .await?;
    }

    let mut meta = vec![
        ("model", provider.model_name().to_string()),
        ("dims", provider.dims().to_string()),
        ("entries", entries.len().to_string()),
        ("built_at", chrono::Utc::now().to_rfc3339()),
    ];
    if let Some(url) = &options.repository_url {
        meta.push(("repository_url", url.clone()));
    }
    for (key, value) in meta {
        sqlx::query("INSERT INTO meta (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    sqlx::query("INSERT INTO meta (key, value) VALUES ('ready', '1')")
        .execute(pool)
        .await?;

    tracing::info!(entries = entries.len(), model = provider.model_name(), "index written");
    Ok(())
}

/// Embed chunks in batches, up to `concurrency` batches in flight.
/// Output order matches input order.
async fn embed_chunks(
    chunks: Vec<Chunk>,
    provider: &dyn EmbeddingProvider,
    options: &BuildOptions,
) -> Result<Vec<IndexedEntry>> {
    let batch_size = options.batch_size.max(1);
    let batches: Vec<Vec<Chunk>> = chunks
        .chunks(batch_size)
        .map(<[Chunk]>::to_vec)
        .collect();
    let total_batches = batches.len();

    let mut embedded: Vec<(usize, Vec<IndexedEntry>)> =
        stream::iter(batches.into_iter().enumerate().map(|(i, batch)| async move {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = provider.embed_batch(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(CompanionError::provider(
                    provider.model_name(),
                    format!("expected {} embeddings, got {}", batch.len(), vectors.len()),
                    false,
                ));
            }

            let mut entries = Vec::with_capacity(batch.len());
            for (chunk, embedding) in batch.into_iter().zip(vectors) {
                if embedding.len() != provider.dims() {
                    return Err(CompanionError::provider(
                        provider.model_name(),
                        format!(
                            "embedding has {} dimensions, expected {}",
                            embedding.len(),
                            provider.dims()
                        ),
                        false,
                    ));
                }
                entries.push(IndexedEntry {
                    id: uuid::Uuid::new_v4().to_string(),
                    content_hash: content_hash(&chunk.text),
                    chunk,
                    embedding,
                });
            }
            tracing::debug!(batch = i + 1, total_batches, "embedded batch");
            Ok::<_, CompanionError>((i, entries))
        }))
        .buffer_unordered(options.concurrency.max(1))
        .try_collect()
        .await?;

    embedded.sort_by_key(|(i, _)| *i);
    Ok(embedded.into_iter().flat_map(|(_, e)| e).collect())
}

fn content_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

async fn meta_value(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM meta WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(value)
}

fn remove_database_files(db_path: &Path) -> Result<()> {
    for suffix in ["", "-wal", "-shm"] {
        let mut name = db_path.as_os_str().to_owned();
        name.push(suffix);
        let path = PathBuf::from(name);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingProvider;
    use async_trait::async_trait;
    use tempfile::TempDir;

    fn chunk(path: &str, text: &str) -> Chunk {
        Chunk {
            text: text.to_string(),
            source_path: path.to_string(),
            offset: 0,
            length: text.chars().count(),
        }
    }

    fn corpus() -> Vec<Chunk> {
        vec![
            chunk("db.py", "def connect_database(url): return pool"),
            chunk("ui.js", "function renderSidebar(colors) { paint(colors) }"),
            chunk("auth.py", "def verify_password(hash, password): compare"),
        ]
    }

    #[tokio::test]
    async fn build_then_query_ranks_relevant_first() {
        let tmp = TempDir::new().unwrap();
        let provider = HashingProvider::new(256);
        let index = VectorIndex::build(tmp.path(), corpus(), &provider, &BuildOptions::default())
            .await
            .unwrap();

        let hits = index.query("connect_database pool", 2, &provider).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.source_path, "db.py");
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn k_larger_than_index_returns_everything() {
        let tmp = TempDir::new().unwrap();
        let provider = HashingProvider::new(64);
        let index = VectorIndex::build(tmp.path(), corpus(), &provider, &BuildOptions::default())
            .await
            .unwrap();
        assert_eq!(index.query("anything", 7, &provider).await.unwrap().len(), 3);
        assert!(index.query("anything", 0, &provider).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_index_is_queryable() {
        let tmp = TempDir::new().unwrap();
        let provider = HashingProvider::new(64);
        let index = VectorIndex::build(tmp.path(), Vec::new(), &provider, &BuildOptions::default())
            .await
            .unwrap();
        assert!(index.is_empty().await.unwrap());
        assert!(index.query("q", 7, &provider).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn ties_ordered_by_source_path() {
        let tmp = TempDir::new().unwrap();
        let provider = HashingProvider::new(64);
        let chunks = vec![chunk("c.md", "same"), chunk("a.md", "same"), chunk("b.md", "same")];
        let index = VectorIndex::build(tmp.path(), chunks, &provider, &BuildOptions::default())
            .await
            .unwrap();
        let order: Vec<String> = index
            .query("same", 3, &provider)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.chunk.source_path)
            .collect();
        assert_eq!(order, vec!["a.md", "b.md", "c.md"]);
    }

    #[tokio::test]
    async fn reopen_preserves_entries_and_meta() {
        let tmp = TempDir::new().unwrap();
        let provider = HashingProvider::new(32);
        let options = BuildOptions {
            batch_size: 1,
            concurrency: 3,
            repository_url: Some("https://example.com/demo.git".into()),
        };
        let built = VectorIndex::build(tmp.path(), corpus(), &provider, &options)
            .await
            .unwrap();
        let before = built.query_vector(&provider.embed_one("verify_password"), 3).await.unwrap();
        built.close().await;

        let reopened = VectorIndex::open(tmp.path()).await.unwrap();
        let stats = reopened.stats().await.unwrap();
        assert_eq!(stats.entries, 3);
        assert_eq!(stats.dims, 32);
        assert_eq!(stats.model, "hash-32");
        assert_eq!(stats.repository_url.as_deref(), Some("https://example.com/demo.git"));
        assert!(stats.built_at.is_some());

        let after = reopened.query_vector(&provider.embed_one("verify_password"), 3).await.unwrap();
        let ids = |v: &[ScoredChunk]| v.iter().map(|s| s.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&before), ids(&after));
    }

    #[tokio::test]
    async fn open_missing_location_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = VectorIndex::open(&tmp.path().join("never-built")).await.unwrap_err();
        assert!(matches!(err, CompanionError::NotFound(_)));
    }

    #[tokio::test]
    async fn open_without_ready_marker_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let pool = db::connect(&tmp.path().join(INDEX_FILE), true).await.unwrap();
        migrate::reset_schema(&pool).await.unwrap();
        pool.close().await;

        let err = VectorIndex::open(tmp.path()).await.unwrap_err();
        assert!(matches!(err, CompanionError::NotFound(_)));
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let provider = HashingProvider::new(16);
        let index = VectorIndex::build(tmp.path(), corpus(), &provider, &BuildOptions::default())
            .await
            .unwrap();
        assert!(index.query_vector(&[1.0, 0.0], 3).await.is_err());
    }

    struct BrokenProvider;

    #[async_trait]
    impl EmbeddingProvider for BrokenProvider {
        fn model_name(&self) -> &str {
            "broken"
        }
        fn dims(&self) -> usize {
            8
        }
        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(CompanionError::provider("broken", "service unavailable", true))
        }
    }

    #[tokio::test]
    async fn failed_build_leaves_nothing_openable() {
        let tmp = TempDir::new().unwrap();
        let location = tmp.path().join("vector_index");
        let result =
            VectorIndex::build(&location, corpus(), &BrokenProvider, &BuildOptions::default()).await;
        assert!(result.unwrap_err().is_retryable());
        assert!(matches!(
            VectorIndex::open(&location).await.unwrap_err(),
            CompanionError::NotFound(_)
        ));
    }

    #[test]
    fn content_hash_is_sha256_hex() {
        assert_eq!(
            content_hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
