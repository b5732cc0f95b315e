//! In-memory [`DocumentStore`] reference backend.
//!
//! Uses a `HashMap` behind `std::sync::RwLock` for thread safety. Vector
//! search is a brute-force scan with the metric chosen at construction;
//! lexical search uses the shared token-overlap scorer. All documents are
//! lost on drop; persistence is a backend-specific concern behind the
//! same port.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::debug;

use crate::error::StoreError;
use crate::models::{Document, Metadata, SearchResult};
use crate::vector::{is_valid_vector, similarity, Metric};

use super::{lexical_score, matches_filter, DocumentStore};

struct StoredDoc {
    doc: Document,
    /// Insertion rank, preserved across upserts of the same id. Used as the
    /// stable tie-breaker in search ordering.
    rank: u64,
}

#[derive(Default)]
struct State {
    collection: Option<String>,
    docs: HashMap<String, StoredDoc>,
    next_rank: u64,
}

/// In-memory reference store.
pub struct InMemoryStore {
    metric: Metric,
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new(metric: Metric) -> Self {
        Self {
            metric,
            state: RwLock::new(State::default()),
        }
    }

    fn upsert(state: &mut State, doc: Document) {
        let rank = match state.docs.get(&doc.id) {
            // Overwrite in place: the document keeps its insertion rank.
            Some(existing) => existing.rank,
            None => {
                let r = state.next_rank;
                state.next_rank += 1;
                r
            }
        };
        state.docs.insert(doc.id.clone(), StoredDoc { doc, rank });
    }

    fn sort_and_truncate(mut hits: Vec<(SearchResult, u64)>, limit: usize) -> Vec<SearchResult> {
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

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(Metric::Cosine)
    }
}

macro_rules! read_initialized {
    ($self:ident) => {{
        let state = $self.state.read().unwrap();
        if state.collection.is_none() {
            return Err(StoreError::NotInitialized);
        }
        state
    }};
}

macro_rules! write_initialized {
    ($self:ident) => {{
        let state = $self.state.write().unwrap();
        if state.collection.is_none() {
            return Err(StoreError::NotInitialized);
        }
        state
    }};
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn initialize(&self, collection: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap();
        debug!(collection, "initializing in-memory store");
        state.collection = Some(collection.to_string());
        Ok(())
    }

    async fn add_document(
        &self,
        id: &str,
        content: &str,
        metadata: Metadata,
    ) -> Result<(), StoreError> {
        let mut state = write_initialized!(self);
        Self::upsert(&mut state, Document::new(id, content, metadata));
        Ok(())
    }

    async fn add_documents(&self, batch: Vec<Document>) -> Result<(), StoreError> {
        let mut state = write_initialized!(self);
        for doc in batch {
            if let Some(vector) = &doc.vector {
                if !is_valid_vector(vector) {
                    return Err(StoreError::InvalidVector);
                }
            }
            Self::upsert(&mut state, doc);
        }
        Ok(())
    }

    async fn store_vector(
        &self,
        id: &str,
        vector: Vec<f32>,
        content: &str,
        metadata: Metadata,
    ) -> Result<(), StoreError> {
        if !is_valid_vector(&vector) {
            return Err(StoreError::InvalidVector);
        }
        let mut state = write_initialized!(self);
        Self::upsert(
            &mut state,
            Document::new(id, content, metadata).with_vector(vector),
        );
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Document>, StoreError> {
        let state = read_initialized!(self);
        Ok(state.docs.get(id).map(|s| s.doc.clone()))
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
        filter: Option<&Metadata>,
    ) -> Result<Vec<SearchResult>, StoreError> {
        let state = read_initialized!(self);
        let hits: Vec<(SearchResult, u64)> = state
            .docs
            .values()
            .filter(|s| matches_filter(&s.doc.metadata, filter))
            .filter_map(|s| {
                let score = lexical_score(query, &s.doc.content);
                (score > 0.0).then(|| {
                    (
                        SearchResult {
                            id: s.doc.id.clone(),
                            score,
                            content: s.doc.content.clone(),
                            metadata: s.doc.metadata.clone(),
                        },
                        s.rank,
                    )
                })
            })
            .collect();
        Ok(Self::sort_and_truncate(hits, limit))
    }

    async fn search_by_vector(
        &self,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchResult>, StoreError> {
        if !is_valid_vector(query_vector) {
            return Err(StoreError::InvalidQueryVector);
        }
        let state = read_initialized!(self);
        let mut hits: Vec<(SearchResult, u64)> = Vec::new();
        for s in state.docs.values() {
            let Some(vector) = &s.doc.vector else {
                continue;
            };
            let score = similarity(query_vector, vector, self.metric)?;
            hits.push((
                SearchResult {
                    id: s.doc.id.clone(),
                    score,
                    content: s.doc.content.clone(),
                    metadata: s.doc.metadata.clone(),
                },
                s.rank,
            ));
        }
        Ok(Self::sort_and_truncate(hits, limit))
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut state = write_initialized!(self);
        state.docs.remove(id);
        Ok(())
    }

    async fn delete_many(&self, ids: &[String]) -> Result<(), StoreError> {
        let mut state = write_initialized!(self);
        for id in ids {
            state.docs.remove(id);
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut state = write_initialized!(self);
        state.docs.clear();
        Ok(())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let state = read_initialized!(self);
        Ok(state.docs.len())
    }
}
