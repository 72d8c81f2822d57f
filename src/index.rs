//! Persistent vector index.
//!
//! Each index lives in its own directory as a single SQLite database
//! (`index.sqlite`, WAL mode). Rows hold the chunk text, its metadata and
//! its embedding as a little-endian `f32` BLOB. Queries embed the question,
//! score every stored vector in memory and select results through
//! [`crate::search`].

use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::db;
use crate::embedding::{blob_to_vec, embed_query, vec_to_blob, Embedder};
use crate::error::{EmbeddingError, IndexError};
use crate::migrate;
use crate::models::{DocumentChunk, LineSpan};
use crate::search::{self, QueryOptions};

pub const INDEX_FILE: &str = "index.sqlite";

pub struct VectorIndex {
    pool: SqlitePool,
    path: PathBuf,
    embedder: Arc<dyn Embedder>,
    len: usize,
    dims: usize,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("path", &self.path)
            .field("model", &self.embedder.model_name())
            .field("len", &self.len)
            .field("dims", &self.dims)
            .finish()
    }
}

impl VectorIndex {
    /// Embed `chunks` and store them in `dir`, replacing any previous
    /// content of that index. The chunk iterator is consumed lazily, one
    /// batch of `batch_size` chunks per embedding request.
    ///
    /// The WAL is checkpointed before returning, so the index is durable
    /// once this resolves.
    pub async fn build<I>(
        dir: &Path,
        embedder: Arc<dyn Embedder>,
        chunks: I,
        batch_size: usize,
    ) -> Result<Self, IndexError>
    where
        I: IntoIterator<Item = DocumentChunk>,
    {
        let path = dir.join(INDEX_FILE);
        let pool = db::connect(&path).await?;
        migrate::run_migrations(&pool).await?;
        sqlx::query("DELETE FROM chunks").execute(&pool).await?;

        let batch_size = batch_size.max(1);
        let mut iter = chunks.into_iter();
        let mut batch: Vec<DocumentChunk> = Vec::with_capacity(batch_size);
        let mut stored = 0usize;
        let mut dims: Option<usize> = None;

        loop {
            batch.clear();
            batch.extend(iter.by_ref().take(batch_size));
            if batch.is_empty() {
                break;
            }

            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = embedder.embed(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(EmbeddingError::CountMismatch {
                    expected: batch.len(),
                    actual: vectors.len(),
                }
                .into());
            }

            insert_batch(&pool, &batch, &vectors, stored, &mut dims).await?;
            stored += batch.len();
            tracing::debug!(stored, "embedded batch");
        }

        let dims = dims.unwrap_or(0);
        write_meta(&pool, "model", embedder.model_name()).await?;
        write_meta(&pool, "dims", &dims.to_string()).await?;
        write_meta(&pool, "chunk_count", &stored.to_string()).await?;

        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&pool)
            .await?;

        tracing::info!(path = %path.display(), chunks = stored, dims, "vector index built");

        Ok(Self {
            pool,
            path,
            embedder,
            len: stored,
            dims,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return up to `opts.k` distinct chunks for `question`.
    pub async fn query(
        &self,
        question: &str,
        opts: &QueryOptions,
    ) -> Result<Vec<DocumentChunk>, IndexError> {
        if self.len == 0 || opts.k == 0 {
            return Ok(Vec::new());
        }

        let query_vec = embed_query(self.embedder.as_ref(), question).await?;
        if self.dims != 0 && query_vec.len() != self.dims {
            return Err(IndexError::DimensionMismatch {
                expected: self.dims,
                actual: query_vec.len(),
            });
        }

        let rows = sqlx::query(
            "SELECT id, source_path, chunk_index, language, start_line, end_line, text, embedding \
             FROM chunks ORDER BY seq",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut chunks = Vec::with_capacity(rows.len());
        let mut vectors = Vec::with_capacity(rows.len());
        for row in rows {
            let start_line: Option<i64> = row.try_get("start_line")?;
            let end_line: Option<i64> = row.try_get("end_line")?;
            let span = match (start_line, end_line) {
                (Some(start), Some(end)) => Some(LineSpan {
                    start_line: start as usize,
                    end_line: end as usize,
                }),
                _ => None,
            };
            let chunk_index: i64 = row.try_get("chunk_index")?;
            let blob: Vec<u8> = row.try_get("embedding")?;

            chunks.push(DocumentChunk {
                id: row.try_get("id")?,
                source_path: row.try_get("source_path")?,
                language: row.try_get("language")?,
                chunk_index: chunk_index as usize,
                span,
                text: row.try_get("text")?,
            });
            vectors.push(blob_to_vec(&blob));
        }

        let picked = search::select(&query_vec, &vectors, opts);
        tracing::debug!(candidates = vectors.len(), picked = picked.len(), "index query");

        Ok(picked.into_iter().map(|i| chunks[i].clone()).collect())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

async fn insert_batch(
    pool: &SqlitePool,
    batch: &[DocumentChunk],
    vectors: &[Vec<f32>],
    first_seq: usize,
    dims: &mut Option<usize>,
) -> Result<(), IndexError> {
    let mut tx = pool.begin().await?;

    for (offset, (chunk, vector)) in batch.iter().zip(vectors.iter()).enumerate() {
        match *dims {
            Some(expected) if expected != vector.len() => {
                return Err(IndexError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
            Some(_) => {}
            None => *dims = Some(vector.len()),
        }

        sqlx::query(
            "INSERT OR REPLACE INTO chunks \
             (id, seq, source_path, chunk_index, language, start_line, end_line, text, embedding, dims) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&chunk.id)
        .bind((first_seq + offset) as i64)
        .bind(&chunk.source_path)
        .bind(chunk.chunk_index as i64)
        .bind(&chunk.language)
        .bind(chunk.span.map(|s| s.start_line as i64))
        .bind(chunk.span.map(|s| s.end_line as i64))
        .bind(&chunk.text)
        .bind(vec_to_blob(vector))
        .bind(vector.len() as i64)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

async fn write_meta(pool: &SqlitePool, key: &str, value: &str) -> Result<(), IndexError> {
    sqlx::query(
        r#"
        INSERT INTO index_meta (key, value) VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SearchStrategy;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const TOPICS: &[&str] = &["parser", "network", "storage", "render"];

    /// Counts topic words; the trailing component keeps vectors non-zero.
    struct TopicEmbedder {
        calls: AtomicUsize,
    }

    impl TopicEmbedder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Embedder for TopicEmbedder {
        fn model_name(&self) -> &str {
            "topic-test"
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v: Vec<f32> = TOPICS.iter().map(|w| t.matches(w).count() as f32).collect();
                    v.push(0.1);
                    v
                })
                .collect())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn model_name(&self) -> &str {
            "failing"
        }

        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Err(EmbeddingError::Disabled)
        }
    }

    fn chunk(path: &str, index: usize, text: &str) -> DocumentChunk {
        DocumentChunk::new(
            path,
            "python",
            index,
            Some(LineSpan {
                start_line: index + 1,
                end_line: index + 2,
            }),
            text.to_string(),
        )
    }

    fn sample_chunks() -> Vec<DocumentChunk> {
        vec![
            chunk("parse.py", 0, "def parse(): the parser reads tokens"),
            chunk("parse.py", 1, "parser parser error recovery"),
            chunk("net.py", 0, "network socket setup"),
            chunk("store.py", 0, "storage engine writes pages"),
            chunk("ui.py", 0, "render the page"),
        ]
    }

    #[tokio::test]
    async fn test_build_embeds_in_batches() {
        let tmp = TempDir::new().unwrap();
        let embedder = TopicEmbedder::new();
        let index = VectorIndex::build(tmp.path(), embedder.clone(), sample_chunks(), 2)
            .await
            .unwrap();
        assert_eq!(index.len(), 5);
        assert_eq!(index.dims(), 5);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
        assert!(tmp.path().join(INDEX_FILE).exists());
    }

    #[tokio::test]
    async fn test_query_returns_relevant_chunks_without_duplicates() {
        let tmp = TempDir::new().unwrap();
        let index = VectorIndex::build(tmp.path(), TopicEmbedder::new(), sample_chunks(), 64)
            .await
            .unwrap();

        let results = index
            .query("how does the parser work", &QueryOptions::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 5);
        assert_eq!(results[0].source_path, "parse.py");
        let ids: HashSet<&str> = results.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids.len(), results.len());

        let similarity = QueryOptions {
            k: 2,
            fetch_k: 5,
            strategy: SearchStrategy::Similarity,
        };
        let top = index.query("parser", &similarity).await.unwrap();
        assert_eq!(top.len(), 2);
        assert!(top.iter().all(|c| c.source_path == "parse.py"));
        assert_eq!(top[0].span.unwrap().start_line, top[0].chunk_index + 1);
    }

    #[tokio::test]
    async fn test_rebuild_replaces_previous_content() {
        let tmp = TempDir::new().unwrap();
        VectorIndex::build(tmp.path(), TopicEmbedder::new(), sample_chunks(), 64)
            .await
            .unwrap()
            .close()
            .await;

        let replacement = vec![chunk("only.py", 0, "network only")];
        let index = VectorIndex::build(tmp.path(), TopicEmbedder::new(), replacement, 64)
            .await
            .unwrap();
        assert_eq!(index.len(), 1);
        let results = index.query("parser", &QueryOptions::default()).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source_path, "only.py");
    }

    #[tokio::test]
    async fn test_build_is_durable_on_disk() {
        let tmp = TempDir::new().unwrap();
        let built = VectorIndex::build(tmp.path(), TopicEmbedder::new(), sample_chunks(), 64)
            .await
            .unwrap();
        assert_eq!(built.path(), tmp.path().join(INDEX_FILE));
        built.close().await;

        let pool = db::connect(&tmp.path().join(INDEX_FILE)).await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 5);
        let dims: String = sqlx::query_scalar("SELECT value FROM index_meta WHERE key = 'dims'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(dims, "5");
        let model: String = sqlx::query_scalar("SELECT value FROM index_meta WHERE key = 'model'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(model, "topic-test");
    }

    #[tokio::test]
    async fn test_embedding_failure_propagates() {
        let tmp = TempDir::new().unwrap();
        let err = VectorIndex::build(tmp.path(), Arc::new(FailingEmbedder), sample_chunks(), 64)
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Embedding(EmbeddingError::Disabled)));
    }

    #[tokio::test]
    async fn test_empty_index_query() {
        let tmp = TempDir::new().unwrap();
        let index = VectorIndex::build(tmp.path(), TopicEmbedder::new(), Vec::new(), 64)
            .await
            .unwrap();
        assert!(index.is_empty());
        let results = index.query("anything", &QueryOptions::default()).await.unwrap();
        assert!(results.is_empty());
    }
}
