//! Core data models shared by the store port and the retriever.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single metadata value: a closed sum of the scalar types that
/// filter-equality is defined over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Number(f64),
    String(String),
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        MetadataValue::String(v.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        MetadataValue::String(v)
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        MetadataValue::Number(v)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        MetadataValue::Number(v as f64)
    }
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        MetadataValue::Bool(v)
    }
}

/// Document metadata: a flat string-keyed mapping used only for
/// equality filtering, never for similarity.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// A stored unit of content, addressed by a caller-supplied, globally
/// unique id. A document without a vector participates in lexical search
/// but not vector search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
}

impl Document {
    pub fn new(id: impl Into<String>, content: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            metadata,
            vector: None,
        }
    }

    pub fn with_vector(mut self, vector: Vec<f32>) -> Self {
        self.vector = Some(vector);
        self
    }
}

/// A scored search hit. Scores from the same query are comparable as
/// "higher is more relevant"; their absolute range depends on the metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub score: f32,
    pub content: String,
    pub metadata: Metadata,
}

/// A user query plus zero or more alternate phrasings produced upstream.
///
/// The retrieval engine treats each term as an independent query to fan
/// out and merge, with the original query taking priority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryExpansion {
    pub original_query: String,
    #[serde(default)]
    pub expanded_terms: Vec<String>,
}

impl QueryExpansion {
    /// An expansion-free query: just the original phrasing.
    pub fn bare(query: impl Into<String>) -> Self {
        Self {
            original_query: query.into(),
            expanded_terms: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_value_json_shapes() {
        let mut meta = Metadata::new();
        meta.insert("lang".into(), "rust".into());
        meta.insert("lines".into(), 42i64.into());
        meta.insert("test".into(), true.into());

        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains("\"lang\":\"rust\""));
        assert!(json.contains("\"lines\":42"));
        assert!(json.contains("\"test\":true"));

        let back: Metadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn test_metadata_value_equality() {
        assert_eq!(MetadataValue::from("js"), MetadataValue::from("js"));
        assert_ne!(MetadataValue::from("js"), MetadataValue::from("py"));
        assert_ne!(MetadataValue::from(1i64), MetadataValue::from(true));
    }

    #[test]
    fn test_document_without_vector_serializes_compactly() {
        let doc = Document::new("a", "body", Metadata::new());
        let json = serde_json::to_string(&doc).unwrap();
        assert!(!json.contains("vector"));
    }
}
