//! Storage abstraction for Quarry.
//!
//! The [`DocumentStore`] trait defines all storage operations the retrieval
//! pipeline needs, enabling pluggable backends (in-memory, SQLite, remote
//! search services). Implementations must be `Send + Sync` to work with
//! async runtimes; the in-memory backend returns immediately-ready futures.
//!
//! The lexical scoring and metadata filtering helpers live here so every
//! backend satisfies the contract with identical semantics.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`initialize`](DocumentStore::initialize) | Open/attach a collection (idempotent) |
//! | [`add_document`](DocumentStore::add_document) | Upsert a document by id |
//! | [`add_documents`](DocumentStore::add_documents) | Upsert a batch in one round trip |
//! | [`store_vector`](DocumentStore::store_vector) | Upsert a document with an embedding |
//! | [`get`](DocumentStore::get) | Fetch a document by id |
//! | [`search`](DocumentStore::search) | Lexical search with optional metadata filter |
//! | [`search_by_vector`](DocumentStore::search_by_vector) | Similarity search over stored vectors |
//! | [`delete`](DocumentStore::delete) / [`delete_many`](DocumentStore::delete_many) / [`clear`](DocumentStore::clear) | Idempotent removal |
//! | [`count`](DocumentStore::count) | Number of live documents |

pub mod memory;

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{Document, Metadata, SearchResult};

/// Abstract document/vector store.
///
/// Every operation other than `initialize` fails with
/// [`StoreError::NotInitialized`] until `initialize` has completed.
/// Upserts are full overwrites: concurrent writes to the same id race and
/// the last write to complete wins.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Open or attach the named collection. Idempotent: calling again with
    /// the same or a different name must not error. Remote backends may
    /// treat this as a connection handshake.
    async fn initialize(&self, collection: &str) -> Result<(), StoreError>;

    /// Insert or overwrite a document by id. Drops any stored vector.
    async fn add_document(
        &self,
        id: &str,
        content: &str,
        metadata: Metadata,
    ) -> Result<(), StoreError>;

    /// Upsert a batch of documents. For remote backends this must cost one
    /// round trip per batch, not per document. The reference backend applies
    /// documents one at a time with no rollback.
    async fn add_documents(&self, batch: Vec<Document>) -> Result<(), StoreError>;

    /// Like [`add_document`](Self::add_document) but stores an embedding
    /// vector. Fails with [`StoreError::InvalidVector`] (no partial write)
    /// unless the vector is non-empty and fully finite.
    async fn store_vector(
        &self,
        id: &str,
        vector: Vec<f32>,
        content: &str,
        metadata: Metadata,
    ) -> Result<(), StoreError>;

    /// Fetch a document by id.
    async fn get(&self, id: &str) -> Result<Option<Document>, StoreError>;

    /// Lexical relevance search over content. `filter` is an exact-match AND
    /// over metadata keys: a document matches only if every filter key is
    /// present with an equal value. Returns at most `limit` results sorted by
    /// descending score, ties broken by insertion order.
    async fn search(
        &self,
        query: &str,
        limit: usize,
        filter: Option<&Metadata>,
    ) -> Result<Vec<SearchResult>, StoreError>;

    /// Similarity search against every document that has a vector, scored
    /// with the backend's configured metric. Fails with
    /// [`StoreError::InvalidQueryVector`] for an invalid query vector.
    /// Same sort contract as [`search`](Self::search).
    async fn search_by_vector(
        &self,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchResult>, StoreError>;

    /// Remove a document. Deleting a non-existent id is not an error.
    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    /// Remove several documents. Idempotent, like [`delete`](Self::delete).
    async fn delete_many(&self, ids: &[String]) -> Result<(), StoreError>;

    /// Remove every document.
    async fn clear(&self) -> Result<(), StoreError>;

    /// Number of currently stored documents.
    async fn count(&self) -> Result<usize, StoreError>;
}

/// Reference lexical score: the count of query tokens present among the
/// content tokens, divided by the larger of the two token counts.
///
/// Tokens are whitespace-separated and compared case-insensitively. This is
/// intentionally crude; it exists to make the store contract testable
/// without an external search engine.
pub fn lexical_score(query: &str, content: &str) -> f32 {
    let query_tokens: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
    let content_tokens: Vec<String> = content.split_whitespace().map(str::to_lowercase).collect();
    if query_tokens.is_empty() || content_tokens.is_empty() {
        return 0.0;
    }

    let content_set: HashSet<&str> = content_tokens.iter().map(String::as_str).collect();
    let hits = query_tokens
        .iter()
        .filter(|t| content_set.contains(t.as_str()))
        .count();

    hits as f32 / query_tokens.len().max(content_tokens.len()) as f32
}

/// True iff every filter key is present in `metadata` with an equal value.
pub fn matches_filter(metadata: &Metadata, filter: Option<&Metadata>) -> bool {
    match filter {
        None => true,
        Some(filter) => filter
            .iter()
            .all(|(k, v)| metadata.get(k).is_some_and(|m| m == v)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetadataValue;

    #[test]
    fn test_lexical_score_full_match() {
        // Both token sets identical: every query token hits, max count equal.
        let score = lexical_score("parse the config", "parse the config");
        assert!((score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_lexical_score_case_insensitive() {
        let score = lexical_score("Parse Config", "parse the CONFIG file");
        // 2 hits / max(2, 4)
        assert!((score - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_lexical_score_no_overlap() {
        assert_eq!(lexical_score("alpha", "beta gamma"), 0.0);
    }

    #[test]
    fn test_lexical_score_empty_sides() {
        assert_eq!(lexical_score("", "content"), 0.0);
        assert_eq!(lexical_score("query", ""), 0.0);
    }

    #[test]
    fn test_matches_filter() {
        let mut meta = Metadata::new();
        meta.insert("lang".into(), "js".into());
        meta.insert("test".into(), false.into());

        let mut filter = Metadata::new();
        filter.insert("lang".into(), "js".into());
        assert!(matches_filter(&meta, Some(&filter)));

        filter.insert("test".into(), MetadataValue::Bool(true));
        assert!(!matches_filter(&meta, Some(&filter)));

        let mut missing = Metadata::new();
        missing.insert("owner".into(), "core".into());
        assert!(!matches_filter(&meta, Some(&missing)));

        assert!(matches_filter(&meta, None));
    }
}
