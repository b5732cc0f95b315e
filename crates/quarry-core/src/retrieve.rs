//! Hybrid multi-query retriever.
//!
//! Turns one user query plus its [`QueryExpansion`] into a single ranked,
//! deduplicated, confidence-scored answer set. The retriever is stateless
//! per call; all state lives in the [`DocumentStore`].
//!
//! # Algorithm
//!
//! 1. Build the term list: the original query first, then up to
//!    `max_expansion_terms` expanded terms.
//! 2. Per term, in priority order: embed the term, then run a lexical and a
//!    vector search against the store (a hybrid read).
//! 3. Concatenate all per-term results into one pool, in term order.
//! 4. Deduplicate by id, keeping the first occurrence — this biases retained
//!    scores toward the primary query rather than its expansions.
//! 5. Sort descending by score (stable) and truncate to `max_sources`.
//! 6. Confidence: `avg(scores) + min(count/5, 1) × 0.2`, clamped to [0, 1].
//!
//! A term whose embedding fails is dropped and recorded; retrieval degrades
//! gracefully. Only a total failure — every term dropped, nothing searched —
//! surfaces as [`RetrieveError::AllTermsFailed`].

use std::collections::HashSet;

use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

use crate::error::RetrieveError;
use crate::models::{QueryExpansion, SearchResult};
use crate::store::DocumentStore;

/// The external embedding collaborator boundary.
///
/// Implementations may fail or time out per call; the retriever treats any
/// failure as "no signal from this term".
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;
}

/// Retrieval tuning parameters.
#[derive(Debug, Clone)]
pub struct RetrievalParams {
    /// Cap on expansion terms taken from the [`QueryExpansion`].
    pub max_expansion_terms: usize,
    /// Result limit for each per-term store query (lexical and vector each).
    pub per_term_limit: usize,
    /// Maximum results in the final answer set.
    pub max_sources: usize,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            max_expansion_terms: 4,
            per_term_limit: 10,
            max_sources: 8,
        }
    }
}

/// The ranked outcome of one retrieval.
///
/// An empty `results` with confidence `0.0` is the explicit "no relevant
/// results" outcome — a valid non-error state, distinct from
/// [`RetrieveError`].
#[derive(Debug, Clone, Serialize)]
pub struct Retrieval {
    pub results: Vec<SearchResult>,
    /// Overall confidence in `[0, 1]`: average result score plus a
    /// corroboration bonus for more sources at similar relevance.
    pub confidence: f64,
    /// Terms dropped because their embedding lookup failed.
    pub dropped_terms: Vec<String>,
}

impl Retrieval {
    /// True when the retrieval produced no relevant results.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Run a hybrid retrieval against a [`DocumentStore`].
///
/// Per-term lookups are independent; this implementation issues them
/// sequentially in term priority order, which is also the order the
/// deduplication step requires results to be assembled in.
pub async fn retrieve(
    store: &dyn DocumentStore,
    embedder: &dyn Embedder,
    expansion: &QueryExpansion,
    params: &RetrievalParams,
) -> Result<Retrieval, RetrieveError> {
    let mut terms: Vec<&str> = vec![expansion.original_query.as_str()];
    terms.extend(
        expansion
            .expanded_terms
            .iter()
            .take(params.max_expansion_terms)
            .map(String::as_str),
    );

    let mut pool: Vec<SearchResult> = Vec::new();
    let mut dropped_terms: Vec<String> = Vec::new();
    let mut last_embed_err: Option<anyhow::Error> = None;
    let mut terms_searched = 0usize;

    for term in &terms {
        let term_vector = match embedder.embed(term).await {
            Ok(v) => v,
            Err(err) => {
                warn!(term = %term, error = %err, "dropping term: embedding failed");
                dropped_terms.push(term.to_string());
                last_embed_err = Some(err);
                continue;
            }
        };
        terms_searched += 1;

        // Lexical before vector within a term, so a document matched by both
        // signals keeps its lexical score under first-seen dedup.
        let lexical = store.search(term, params.per_term_limit, None).await?;
        let semantic = store
            .search_by_vector(&term_vector, params.per_term_limit)
            .await?;
        pool.extend(lexical);
        pool.extend(semantic);
    }

    if terms_searched == 0 {
        if let Some(last) = last_embed_err {
            return Err(RetrieveError::AllTermsFailed {
                terms: terms.len(),
                last,
            });
        }
    }

    let results = dedup_and_rank(pool, params.max_sources);
    let confidence = confidence_for(&results);

    Ok(Retrieval {
        results,
        confidence,
        dropped_terms,
    })
}

/// Deduplicate a pooled result list by id (first occurrence wins), sort by
/// descending score, and truncate.
///
/// The input pool must already be in term priority order; the stable sort
/// preserves first-seen order among equal scores.
pub fn dedup_and_rank(pool: Vec<SearchResult>, max_sources: usize) -> Vec<SearchResult> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut results: Vec<SearchResult> = pool
        .into_iter()
        .filter(|r| seen.insert(r.id.clone()))
        .collect();

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(max_sources);
    results
}

/// Batch confidence: average score plus a corroboration bonus that saturates
/// at five sources, clamped to `[0, 1]`. Zero results means zero confidence.
pub fn confidence_for(results: &[SearchResult]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    let avg = results.iter().map(|r| f64::from(r.score)).sum::<f64>() / results.len() as f64;
    let corroboration = (results.len() as f64 / 5.0).min(1.0) * 0.2;
    (avg + corroboration).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Metadata;
    use crate::store::memory::InMemoryStore;
    use crate::vector::Metric;
    use std::collections::HashMap;

    fn result(id: &str, score: f32) -> SearchResult {
        SearchResult {
            id: id.to_string(),
            score,
            content: format!("content of {id}"),
            metadata: Metadata::new(),
        }
    }

    /// Embedder returning canned vectors per term.
    struct FakeEmbedder {
        vectors: HashMap<String, Vec<f32>>,
    }

    #[async_trait]
    impl Embedder for FakeEmbedder {
        async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            self.vectors
                .get(text)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no embedding for '{text}'"))
        }
    }

    #[test]
    fn test_dedup_first_seen_bias() {
        // "auth" returned [A(0.9), B(0.5)], "login" returned [B(0.7), C(0.6)]
        let pool = vec![
            result("A", 0.9),
            result("B", 0.5),
            result("B", 0.7),
            result("C", 0.6),
        ];
        let ranked = dedup_and_rank(pool, 10);
        let ids: Vec<&str> = ranked.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "C", "B"]);
        assert_eq!(ranked[2].score, 0.5, "first-seen score retained for B");
    }

    #[test]
    fn test_dedup_truncates_to_max_sources() {
        let pool = (0..10).map(|i| result(&format!("d{i}"), 0.5)).collect();
        assert_eq!(dedup_and_rank(pool, 3).len(), 3);
    }

    #[test]
    fn test_confidence_empty_is_zero() {
        assert_eq!(confidence_for(&[]), 0.0);
    }

    #[test]
    fn test_confidence_saturates_at_one() {
        let results: Vec<SearchResult> =
            (0..5).map(|i| result(&format!("d{i}"), 0.8)).collect();
        let c = confidence_for(&results);
        assert!((c - 1.0).abs() < 1e-9, "0.8 + 1.0 * 0.2 clamps to 1.0, got {c}");
    }

    #[test]
    fn test_confidence_partial_corroboration() {
        let results = vec![result("a", 0.5), result("b", 0.5)];
        // avg 0.5 + (2/5) * 0.2 = 0.58
        let c = confidence_for(&results);
        assert!((c - 0.58).abs() < 1e-9, "got {c}");
    }

    async fn seeded_store() -> InMemoryStore {
        let store = InMemoryStore::new(Metric::Cosine);
        store.initialize("test").await.unwrap();
        store
            .store_vector(
                "auth.rs",
                vec![1.0, 0.0],
                "authentication middleware",
                Metadata::new(),
            )
            .await
            .unwrap();
        store
            .store_vector(
                "login.rs",
                vec![0.0, 1.0],
                "login form validation",
                Metadata::new(),
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_retrieve_end_to_end() {
        let store = seeded_store().await;
        let embedder = FakeEmbedder {
            vectors: HashMap::from([
                ("authentication".to_string(), vec![1.0, 0.0]),
                ("login flow".to_string(), vec![0.0, 1.0]),
            ]),
        };

        let expansion = QueryExpansion {
            original_query: "authentication".to_string(),
            expanded_terms: vec!["login flow".to_string()],
        };
        let out = retrieve(&store, &embedder, &expansion, &RetrievalParams::default())
            .await
            .unwrap();

        assert!(!out.is_empty());
        assert!(out.dropped_terms.is_empty());
        let ids: Vec<&str> = out.results.iter().map(|r| r.id.as_str()).collect();
        assert!(ids.contains(&"auth.rs"));
        assert!(ids.contains(&"login.rs"));
        assert!(out.confidence > 0.0 && out.confidence <= 1.0);
    }

    #[tokio::test]
    async fn test_retrieve_drops_failed_term_and_continues() {
        let store = seeded_store().await;
        let embedder = FakeEmbedder {
            vectors: HashMap::from([("authentication".to_string(), vec![1.0, 0.0])]),
        };

        let expansion = QueryExpansion {
            original_query: "authentication".to_string(),
            expanded_terms: vec!["unembeddable".to_string()],
        };
        let out = retrieve(&store, &embedder, &expansion, &RetrievalParams::default())
            .await
            .unwrap();

        assert_eq!(out.dropped_terms, vec!["unembeddable".to_string()]);
        assert!(!out.is_empty());
    }

    #[tokio::test]
    async fn test_retrieve_all_terms_failed() {
        let store = seeded_store().await;
        let embedder = FakeEmbedder {
            vectors: HashMap::new(),
        };

        let expansion = QueryExpansion::bare("anything");
        let err = retrieve(&store, &embedder, &expansion, &RetrievalParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RetrieveError::AllTermsFailed { terms: 1, .. }));
    }

    #[tokio::test]
    async fn test_retrieve_empty_store_is_no_results_not_error() {
        let store = InMemoryStore::new(Metric::Cosine);
        store.initialize("test").await.unwrap();
        let embedder = FakeEmbedder {
            vectors: HashMap::from([("query".to_string(), vec![1.0, 0.0])]),
        };

        let out = retrieve(
            &store,
            &embedder,
            &QueryExpansion::bare("query"),
            &RetrievalParams::default(),
        )
        .await
        .unwrap();
        assert!(out.is_empty());
        assert_eq!(out.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_retrieve_caps_expansion_terms() {
        let store = seeded_store().await;
        let embedder = FakeEmbedder {
            vectors: HashMap::from([("q".to_string(), vec![1.0, 0.0])]),
        };
        let expansion = QueryExpansion {
            original_query: "q".to_string(),
            expanded_terms: (0..10).map(|i| format!("t{i}")).collect(),
        };
        let params = RetrievalParams {
            max_expansion_terms: 2,
            ..Default::default()
        };
        let out = retrieve(&store, &embedder, &expansion, &params).await.unwrap();
        // Only the two capped expansion terms could fail to embed
        assert_eq!(out.dropped_terms.len(), 2);
    }
}
