//! Query-expansion producer.
//!
//! Rewrites a search query into alternate phrasings via the chat provider,
//! so the retriever can fan out across several formulations of the same
//! question. Expansion is best-effort: any provider failure degrades to the
//! bare query rather than failing the search.

use tracing::warn;

use quarry_core::models::QueryExpansion;

use crate::provider::AiProvider;

const EXPANSION_SYSTEM_PROMPT: &str = "You rewrite code-search queries. Given a query, produce \
    alternate phrasings that would match relevant source code: synonyms, related API names, and \
    likely identifier spellings. Output one phrasing per line, nothing else.";

/// Expand `query` into up to `max_terms` alternate phrasings.
///
/// Returns a bare expansion (original query only) when the provider fails
/// or produces nothing usable.
pub async fn expand_query(
    provider: &dyn AiProvider,
    query: &str,
    max_terms: usize,
) -> QueryExpansion {
    if max_terms == 0 {
        return QueryExpansion::bare(query);
    }

    match provider.complete(EXPANSION_SYSTEM_PROMPT, query).await {
        Ok(raw) => QueryExpansion {
            original_query: query.to_string(),
            expanded_terms: parse_expansion_terms(&raw, query, max_terms),
        },
        Err(err) => {
            warn!(error = %err, "query expansion failed, using bare query");
            QueryExpansion::bare(query)
        }
    }
}

/// Parse the provider's reply into expansion terms.
///
/// One term per line; list markers and surrounding whitespace are stripped,
/// blank lines and echoes of the original query are dropped, and the result
/// is capped at `max_terms`.
pub fn parse_expansion_terms(raw: &str, original: &str, max_terms: usize) -> Vec<String> {
    let original_lower = original.to_lowercase();
    let mut terms = Vec::new();

    for line in raw.lines() {
        let term = strip_list_marker(line.trim()).trim_matches('"');

        if term.is_empty() || term.to_lowercase() == original_lower {
            continue;
        }
        if terms.iter().any(|t: &String| t.eq_ignore_ascii_case(term)) {
            continue;
        }
        terms.push(term.to_string());
        if terms.len() == max_terms {
            break;
        }
    }

    terms
}

/// Strip a leading bullet (`-`, `*`, `•`) or numbered marker (`1.`, `12)`)
/// from a line. A bare digit run is content, not a marker: `2fa login`
/// passes through untouched.
fn strip_list_marker(line: &str) -> &str {
    if let Some(rest) = line.strip_prefix(['-', '*', '•']) {
        return rest.trim_start();
    }
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        if let Some(rest) = line[digits..].strip_prefix(['.', ')']) {
            return rest.trim_start();
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strips_markers_and_caps() {
        let raw = "- auth middleware\n1. login handler\n* session validation\ntoken refresh\nrate limiting";
        let terms = parse_expansion_terms(raw, "how does auth work", 3);
        assert_eq!(
            terms,
            vec!["auth middleware", "login handler", "session validation"]
        );
    }

    #[test]
    fn test_parse_drops_blank_lines_and_echoes() {
        let raw = "\nhow does auth work\n\nauthentication flow\n";
        let terms = parse_expansion_terms(raw, "how does auth work", 4);
        assert_eq!(terms, vec!["authentication flow"]);
    }

    #[test]
    fn test_parse_dedups_case_insensitive() {
        let raw = "Login Handler\nlogin handler\nsession check";
        let terms = parse_expansion_terms(raw, "auth", 4);
        assert_eq!(terms, vec!["Login Handler", "session check"]);
    }

    #[test]
    fn test_parse_keeps_digit_leading_terms() {
        let raw = "2fa login\n1. oauth2 flow\n12) token rotation\n401 handler";
        let terms = parse_expansion_terms(raw, "auth", 4);
        assert_eq!(
            terms,
            vec!["2fa login", "oauth2 flow", "token rotation", "401 handler"]
        );
    }

    #[test]
    fn test_parse_quoted_terms() {
        let raw = "\"connection pool\"\n\"retry logic\"";
        let terms = parse_expansion_terms(raw, "db", 4);
        assert_eq!(terms, vec!["connection pool", "retry logic"]);
    }

    #[tokio::test]
    async fn test_expand_degrades_on_provider_failure() {
        let provider = crate::provider::DisabledProvider;
        let expansion = expand_query(&provider, "find the chunker", 4).await;
        assert_eq!(expansion.original_query, "find the chunker");
        assert!(expansion.expanded_terms.is_empty());
    }

    #[tokio::test]
    async fn test_expand_zero_terms_skips_provider() {
        let provider = crate::provider::DisabledProvider;
        let expansion = expand_query(&provider, "anything", 0).await;
        assert!(expansion.expanded_terms.is_empty());
    }
}
