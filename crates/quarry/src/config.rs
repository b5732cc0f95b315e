//! TOML configuration parsing and validation.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::Deserialize;

use quarry_core::retrieve::RetrievalParams;
use quarry_core::vector::Metric;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// `"memory"` or `"sqlite"`.
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Database file path; required for the sqlite backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Similarity metric: `cosine`, `euclidean`, or `dot`.
    #[serde(default = "default_metric")]
    pub metric: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: None,
            metric: default_metric(),
        }
    }
}

fn default_backend() -> String {
    "memory".to_string()
}
fn default_metric() -> String {
    "cosine".to_string()
}

impl StoreConfig {
    pub fn metric(&self) -> Result<Metric> {
        Metric::from_str(&self.metric).map_err(Into::into)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            overlap: default_overlap(),
        }
    }
}

fn default_max_chars() -> usize {
    2000
}
fn default_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_max_sources")]
    pub max_sources: usize,
    #[serde(default = "default_per_term_limit")]
    pub per_term_limit: usize,
    #[serde(default = "default_max_expansion_terms")]
    pub max_expansion_terms: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_sources: default_max_sources(),
            per_term_limit: default_per_term_limit(),
            max_expansion_terms: default_max_expansion_terms(),
        }
    }
}

fn default_max_sources() -> usize {
    8
}
fn default_per_term_limit() -> usize {
    10
}
fn default_max_expansion_terms() -> usize {
    4
}

impl RetrievalConfig {
    pub fn params(&self) -> RetrievalParams {
        RetrievalParams {
            max_expansion_terms: self.max_expansion_terms,
            per_term_limit: self.per_term_limit,
            max_sources: self.max_sources,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `"disabled"` or `"openai"` (any OpenAI-compatible API).
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Chat model used for query expansion and answer synthesis.
    #[serde(default)]
    pub chat_model: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            chat_model: None,
            api_base: default_api_base(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default = "default_exclude_globs")]
    pub exclude_globs: Vec<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            exclude_globs: default_exclude_globs(),
        }
    }
}

fn default_include_globs() -> Vec<String> {
    ["**/*.rs", "**/*.py", "**/*.ts", "**/*.js", "**/*.go", "**/*.md", "**/*.txt"]
        .map(String::from)
        .to_vec()
}

fn default_exclude_globs() -> Vec<String> {
    ["**/target/**", "**/node_modules/**", "**/.git/**"]
        .map(String::from)
        .to_vec()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate store
    match config.store.backend.as_str() {
        "memory" => {}
        "sqlite" => {
            if config.store.path.is_none() {
                anyhow::bail!("store.path is required when store.backend is 'sqlite'");
            }
        }
        other => anyhow::bail!("Unknown store backend: '{}'. Use memory or sqlite.", other),
    }
    config
        .store
        .metric()
        .with_context(|| "Invalid store.metric")?;

    // Validate chunking
    if config.chunking.max_chars == 0 {
        anyhow::bail!("chunking.max_chars must be > 0");
    }
    if config.chunking.overlap >= config.chunking.max_chars {
        anyhow::bail!("chunking.overlap must be smaller than chunking.max_chars");
    }

    // Validate retrieval
    if config.retrieval.max_sources < 1 {
        anyhow::bail!("retrieval.max_sources must be >= 1");
    }
    if config.retrieval.per_term_limit < 1 {
        anyhow::bail!("retrieval.per_term_limit must be >= 1");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if config.embedding.is_enabled() {
        if config.embedding.batch_size < 1 {
            anyhow::bail!("embedding.batch_size must be >= 1");
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn test_defaults() {
        let f = write_config("");
        let cfg = load_config(f.path()).unwrap();
        assert_eq!(cfg.store.backend, "memory");
        assert_eq!(cfg.chunking.max_chars, 2000);
        assert!(!cfg.embedding.is_enabled());
    }

    #[test]
    fn test_sqlite_requires_path() {
        let f = write_config("[store]\nbackend = \"sqlite\"\n");
        let err = load_config(f.path()).unwrap_err();
        assert!(err.to_string().contains("store.path"));
    }

    #[test]
    fn test_unknown_metric_rejected() {
        let f = write_config("[store]\nmetric = \"manhattan\"\n");
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn test_overlap_must_be_below_max_chars() {
        let f = write_config("[chunking]\nmax_chars = 100\noverlap = 100\n");
        let err = load_config(f.path()).unwrap_err();
        assert!(err.to_string().contains("overlap"));
    }

    #[test]
    fn test_enabled_embedding_requires_model_and_dims() {
        let f = write_config("[embedding]\nprovider = \"openai\"\n");
        assert!(load_config(f.path()).is_err());

        let f = write_config(
            "[embedding]\nprovider = \"openai\"\nmodel = \"text-embedding-3-small\"\ndims = 1536\n",
        );
        let cfg = load_config(f.path()).unwrap();
        assert!(cfg.embedding.is_enabled());
    }
}
