//! Search and answer front end over the core retriever.
//!
//! `search` runs the full expansion + hybrid retrieval pipeline when a
//! provider is configured, and falls back to plain lexical store search
//! when embeddings are disabled. `ask` goes one step further and
//! synthesizes an answer from the retrieved chunks via chat completion.

use anyhow::{Context, Result};
use tracing::debug;

use quarry_core::models::SearchResult;
use quarry_core::retrieve::{confidence_for, retrieve, Retrieval};
use quarry_core::store::DocumentStore;

use crate::config::Config;
use crate::expand::expand_query;
use crate::provider::AiProvider;

const ANSWER_SYSTEM_PROMPT: &str = "You answer questions about a codebase using only the \
    provided source excerpts. Cite the excerpt ids you used. If the excerpts do not contain \
    the answer, say so.";

/// Retrieve ranked sources for `query`.
///
/// With a provider configured this is hybrid retrieval over the expanded
/// query; otherwise it degrades to a single lexical search.
pub async fn search(
    store: &dyn DocumentStore,
    provider: &dyn AiProvider,
    config: &Config,
    query: &str,
) -> Result<Retrieval> {
    if config.embedding.is_enabled() {
        let expansion =
            expand_query(provider, query, config.retrieval.max_expansion_terms).await;
        debug!(
            terms = expansion.expanded_terms.len(),
            "running hybrid retrieval"
        );
        retrieve(store, provider, &expansion, &config.retrieval.params())
            .await
            .context("Retrieval failed")
    } else {
        let results = store
            .search(query, config.retrieval.max_sources, None)
            .await?;
        let confidence = confidence_for(&results);
        Ok(Retrieval {
            results,
            confidence,
            dropped_terms: Vec::new(),
        })
    }
}

/// A synthesized answer plus the retrieval it was grounded on.
pub struct Answer {
    pub text: String,
    pub retrieval: Retrieval,
}

/// Answer `query` from indexed content.
///
/// Requires a configured chat model. An empty retrieval short-circuits
/// without calling the provider.
pub async fn ask(
    store: &dyn DocumentStore,
    provider: &dyn AiProvider,
    config: &Config,
    query: &str,
) -> Result<Answer> {
    let retrieval = search(store, provider, config, query).await?;
    if retrieval.is_empty() {
        return Ok(Answer {
            text: String::new(),
            retrieval,
        });
    }

    let prompt = build_prompt(query, &retrieval.results);
    let text = provider
        .complete(ANSWER_SYSTEM_PROMPT, &prompt)
        .await
        .context("Answer synthesis failed")?;

    Ok(Answer { text, retrieval })
}

/// Assemble the completion prompt: the question followed by the retrieved
/// excerpts in rank order.
fn build_prompt(query: &str, results: &[SearchResult]) -> String {
    let mut prompt = format!("Question: {}\n\nSource excerpts:\n", query);
    for result in results {
        prompt.push_str(&format!("\n[{}]\n{}\n", result.id, result.content));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    use quarry_core::models::Metadata;
    use quarry_core::store::memory::InMemoryStore;
    use quarry_core::vector::Metric;

    use crate::provider::DisabledProvider;

    fn lexical_config() -> Config {
        toml::from_str("").unwrap()
    }

    #[tokio::test]
    async fn test_search_lexical_fallback() {
        let store = InMemoryStore::new(Metric::Cosine);
        store.initialize("test").await.unwrap();
        store
            .add_document("a", "connection pool setup", Metadata::new())
            .await
            .unwrap();
        store
            .add_document("b", "unrelated content", Metadata::new())
            .await
            .unwrap();

        let retrieval = search(&store, &DisabledProvider, &lexical_config(), "connection pool")
            .await
            .unwrap();
        assert_eq!(retrieval.results.len(), 1);
        assert_eq!(retrieval.results[0].id, "a");
        assert!(retrieval.confidence > 0.0);
    }

    #[tokio::test]
    async fn test_search_no_hits_is_zero_confidence() {
        let store = InMemoryStore::new(Metric::Cosine);
        store.initialize("test").await.unwrap();

        let retrieval = search(&store, &DisabledProvider, &lexical_config(), "anything")
            .await
            .unwrap();
        assert!(retrieval.is_empty());
        assert_eq!(retrieval.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_ask_empty_retrieval_skips_provider() {
        let store = InMemoryStore::new(Metric::Cosine);
        store.initialize("test").await.unwrap();

        // DisabledProvider would error if complete were called
        let answer = ask(&store, &DisabledProvider, &lexical_config(), "anything")
            .await
            .unwrap();
        assert!(answer.text.is_empty());
        assert!(answer.retrieval.is_empty());
    }

    #[test]
    fn test_build_prompt_includes_ids_and_content() {
        let results = vec![SearchResult {
            id: "auth.rs#0".to_string(),
            score: 0.9,
            content: "fn check_token() {}".to_string(),
            metadata: Metadata::new(),
        }];
        let prompt = build_prompt("how is auth done", &results);
        assert!(prompt.contains("Question: how is auth done"));
        assert!(prompt.contains("[auth.rs#0]"));
        assert!(prompt.contains("fn check_token() {}"));
    }
}
