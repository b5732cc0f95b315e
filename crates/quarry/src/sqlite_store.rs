//! SQLite-backed [`DocumentStore`] implementation.
//!
//! Persists documents in a single `documents` table with vectors stored as
//! little-endian f32 BLOBs. Scoring reuses the same lexical and similarity
//! helpers as the in-memory reference backend, so both satisfy the store
//! contract identically; SQLite only contributes persistence.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use quarry_core::error::StoreError;
use quarry_core::models::{Document, Metadata, SearchResult};
use quarry_core::store::{lexical_score, matches_filter, DocumentStore};
use quarry_core::vector::{blob_to_vec, is_valid_vector, similarity, vec_to_blob, Metric};

use crate::migrate;

/// SQLite implementation of the store port.
///
/// `initialize` runs the idempotent schema migration; repeat calls are a
/// no-op handshake. Upserts preserve a document's original insertion rank,
/// which is the stable tie-breaker in search ordering.
pub struct SqliteStore {
    pool: SqlitePool,
    metric: Metric,
    initialized: AtomicBool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, metric: Metric) -> Self {
        Self {
            pool,
            metric,
            initialized: AtomicBool::new(false),
        }
    }

    fn ensure_initialized(&self) -> Result<(), StoreError> {
        if self.initialized.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StoreError::NotInitialized)
        }
    }

    async fn upsert_one<'e, E>(executor: E, doc: &Document) -> Result<(), StoreError>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        let metadata_json =
            serde_json::to_string(&doc.metadata).map_err(StoreError::backend)?;
        let blob = doc.vector.as_deref().map(vec_to_blob);

        sqlx::query(
            r#"
            INSERT INTO documents (id, content, metadata_json, embedding, rank)
            VALUES (?, ?, ?, ?, (SELECT COALESCE(MAX(rank), -1) + 1 FROM documents))
            ON CONFLICT(id) DO UPDATE SET
                content = excluded.content,
                metadata_json = excluded.metadata_json,
                embedding = excluded.embedding
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.content)
        .bind(&metadata_json)
        .bind(&blob)
        .execute(executor)
        .await
        .map_err(StoreError::backend)?;

        Ok(())
    }

    fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Result<Document, StoreError> {
        let metadata_json: String = row.get("metadata_json");
        let metadata: Metadata =
            serde_json::from_str(&metadata_json).map_err(StoreError::backend)?;
        let blob: Option<Vec<u8>> = row.get("embedding");

        Ok(Document {
            id: row.get("id"),
            content: row.get("content"),
            metadata,
            vector: blob.map(|b| blob_to_vec(&b)),
        })
    }

    fn sort_and_truncate(mut hits: Vec<(SearchResult, i64)>, limit: usize) -> Vec<SearchResult> {
        hits.sort_by(|a, b| {
            b.0.score
                .partial_cmp(&a.0.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });
        hits.truncate(limit);
        hits.into_iter().map(|(r, _)| r).collect()
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn initialize(&self, collection: &str) -> Result<(), StoreError> {
        debug!(collection, "initializing sqlite store");
        migrate::run_migrations(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    async fn add_document(
        &self,
        id: &str,
        content: &str,
        metadata: Metadata,
    ) -> Result<(), StoreError> {
        self.ensure_initialized()?;
        Self::upsert_one(&self.pool, &Document::new(id, content, metadata)).await
    }

    async fn add_documents(&self, batch: Vec<Document>) -> Result<(), StoreError> {
        self.ensure_initialized()?;
        for doc in &batch {
            if let Some(vector) = &doc.vector {
                if !is_valid_vector(vector) {
                    return Err(StoreError::InvalidVector);
                }
            }
        }

        // One transaction per batch: a single round trip from the caller's
        // point of view, with no per-document commits.
        let mut tx = self.pool.begin().await.map_err(StoreError::backend)?;
        for doc in &batch {
            Self::upsert_one(&mut *tx, doc).await?;
        }
        tx.commit().await.map_err(StoreError::backend)?;
        Ok(())
    }

    async fn store_vector(
        &self,
        id: &str,
        vector: Vec<f32>,
        content: &str,
        metadata: Metadata,
    ) -> Result<(), StoreError> {
        self.ensure_initialized()?;
        if !is_valid_vector(&vector) {
            return Err(StoreError::InvalidVector);
        }
        let doc = Document::new(id, content, metadata).with_vector(vector);
        Self::upsert_one(&self.pool, &doc).await
    }

    async fn get(&self, id: &str) -> Result<Option<Document>, StoreError> {
        self.ensure_initialized()?;
        let row = sqlx::query("SELECT id, content, metadata_json, embedding FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::backend)?;

        row.as_ref().map(Self::row_to_document).transpose()
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
        filter: Option<&Metadata>,
    ) -> Result<Vec<SearchResult>, StoreError> {
        self.ensure_initialized()?;
        let rows = sqlx::query("SELECT id, content, metadata_json, rank FROM documents")
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::backend)?;

        let mut hits: Vec<(SearchResult, i64)> = Vec::new();
        for row in &rows {
            let metadata_json: String = row.get("metadata_json");
            let metadata: Metadata =
                serde_json::from_str(&metadata_json).map_err(StoreError::backend)?;
            if !matches_filter(&metadata, filter) {
                continue;
            }
            let content: String = row.get("content");
            let score = lexical_score(query, &content);
            if score > 0.0 {
                hits.push((
                    SearchResult {
                        id: row.get("id"),
                        score,
                        content,
                        metadata,
                    },
                    row.get("rank"),
                ));
            }
        }
        Ok(Self::sort_and_truncate(hits, limit))
    }

    async fn search_by_vector(
        &self,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchResult>, StoreError> {
        self.ensure_initialized()?;
        if !is_valid_vector(query_vector) {
            return Err(StoreError::InvalidQueryVector);
        }

        let rows = sqlx::query(
            "SELECT id, content, metadata_json, embedding, rank FROM documents WHERE embedding IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        let mut hits: Vec<(SearchResult, i64)> = Vec::new();
        for row in &rows {
            let blob: Vec<u8> = row.get("embedding");
            let vector = blob_to_vec(&blob);
            let score = similarity(query_vector, &vector, self.metric)?;
            let metadata_json: String = row.get("metadata_json");
            let metadata: Metadata =
                serde_json::from_str(&metadata_json).map_err(StoreError::backend)?;
            hits.push((
                SearchResult {
                    id: row.get("id"),
                    score,
                    content: row.get("content"),
                    metadata,
                },
                row.get("rank"),
            ));
        }
        Ok(Self::sort_and_truncate(hits, limit))
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.ensure_initialized()?;
        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        Ok(())
    }

    async fn delete_many(&self, ids: &[String]) -> Result<(), StoreError> {
        self.ensure_initialized()?;
        let mut tx = self.pool.begin().await.map_err(StoreError::backend)?;
        for id in ids {
            sqlx::query("DELETE FROM documents WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(StoreError::backend)?;
        }
        tx.commit().await.map_err(StoreError::backend)?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.ensure_initialized()?;
        sqlx::query("DELETE FROM documents")
            .execute(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        Ok(())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        self.ensure_initialized()?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

    async fn fresh() -> SqliteStore {
        // A single shared in-memory connection; more connections would each
        // see their own empty database.
        let options = SqliteConnectOptions::from_str("sqlite::memory:").unwrap();
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        let store = SqliteStore::new(pool, Metric::Cosine);
        store.initialize("test").await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_not_initialized() {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").unwrap();
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        let store = SqliteStore::new(pool, Metric::Cosine);
        let err = store.count().await.unwrap_err();
        assert!(matches!(err, StoreError::NotInitialized));
    }

    #[tokio::test]
    async fn test_round_trip_with_metadata_and_vector() {
        let store = fresh().await;
        let mut meta = Metadata::new();
        meta.insert("lang".into(), "rust".into());
        meta.insert("lines".into(), 10i64.into());

        store
            .store_vector("a", vec![0.5, -1.0], "fn main() {}", meta.clone())
            .await
            .unwrap();

        let doc = store.get("a").await.unwrap().unwrap();
        assert_eq!(doc.content, "fn main() {}");
        assert_eq!(doc.metadata, meta);
        assert_eq!(doc.vector, Some(vec![0.5, -1.0]));

        store.delete("a").await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());
        store.delete("a").await.unwrap(); // idempotent
    }

    #[tokio::test]
    async fn test_upsert_preserves_rank_and_drops_vector() {
        let store = fresh().await;
        store
            .store_vector("a", vec![1.0], "apple banana", Metadata::new())
            .await
            .unwrap();
        store
            .add_document("b", "apple banana", Metadata::new())
            .await
            .unwrap();
        // Overwrite "a": loses its vector, keeps its insertion rank
        store
            .add_document("a", "apple banana", Metadata::new())
            .await
            .unwrap();

        let doc = store.get("a").await.unwrap().unwrap();
        assert!(doc.vector.is_none());

        let results = store.search("apple banana", 10, None).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_batch_upsert() {
        let store = fresh().await;
        let batch = vec![
            Document::new("a", "first doc", Metadata::new()),
            Document::new("b", "second doc", Metadata::new()).with_vector(vec![1.0, 0.0]),
        ];
        store.add_documents(batch).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);

        let results = store.search_by_vector(&[1.0, 0.0], 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "b");
    }

    #[tokio::test]
    async fn test_batch_rejects_invalid_vector_before_writing() {
        let store = fresh().await;
        let batch = vec![
            Document::new("a", "doc", Metadata::new()),
            Document::new("b", "doc", Metadata::new()).with_vector(vec![f32::NAN]),
        ];
        let err = store.add_documents(batch).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidVector));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_search_with_filter() {
        let store = fresh().await;
        let mut js = Metadata::new();
        js.insert("lang".into(), "js".into());
        let mut py = Metadata::new();
        py.insert("lang".into(), "py".into());

        store
            .add_document("a", "login handler", js.clone())
            .await
            .unwrap();
        store.add_document("b", "login handler", py).await.unwrap();

        let results = store.search("login", 10, Some(&js)).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "a");
    }

    #[tokio::test]
    async fn test_invalid_query_vector() {
        let store = fresh().await;
        let err = store.search_by_vector(&[], 10).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidQueryVector));
    }

    #[tokio::test]
    async fn test_clear() {
        let store = fresh().await;
        store
            .add_document("a", "doc", Metadata::new())
            .await
            .unwrap();
        store.clear().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
        store.clear().await.unwrap();
    }
}
