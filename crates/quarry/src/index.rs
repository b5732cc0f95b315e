//! Filesystem indexing pipeline.
//!
//! Walks a directory tree, splits matching files into line-boundary chunks,
//! optionally embeds them in batches, and upserts everything through the
//! store port. Re-indexing is incremental: files whose content hash is
//! unchanged are skipped, and stale chunks from a previous, longer version
//! of a file are deleted.
//!
//! Chunk ids are `<relative path>#<chunk index>`, so re-indexing a file
//! overwrites its chunks in place.

use std::path::Path;

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use quarry_core::chunk::chunk_text;
use quarry_core::models::{Document, Metadata, MetadataValue};
use quarry_core::store::DocumentStore;

use crate::config::Config;
use crate::provider::AiProvider;

/// Counters reported after an indexing run.
#[derive(Debug, Default)]
pub struct IndexSummary {
    /// Files indexed (chunked and written).
    pub files: usize,
    /// Files skipped because their content hash was unchanged.
    pub skipped: usize,
    /// Chunks written to the store.
    pub chunks: usize,
    /// Chunks that received an embedding.
    pub embedded: usize,
}

/// Index every matching file under `root` into `store`.
///
/// Embedding is inline and non-fatal: if a batch fails, its chunks are
/// stored without vectors and remain lexically searchable.
pub async fn index_directory(
    store: &dyn DocumentStore,
    provider: &dyn AiProvider,
    config: &Config,
    root: &Path,
) -> Result<IndexSummary> {
    let include = build_globset(&config.index.include_globs)?;
    let exclude = build_globset(&config.index.exclude_globs)?;

    let mut summary = IndexSummary::default();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_path_buf();
        if !include.is_match(&rel) || exclude.is_match(&rel) {
            continue;
        }

        let content = match std::fs::read_to_string(entry.path()) {
            Ok(content) => content,
            Err(err) => {
                // Binary or unreadable file
                debug!(path = %rel.display(), error = %err, "skipping unreadable file");
                continue;
            }
        };

        let rel_str = rel.to_string_lossy().replace('\\', "/");
        match index_file(store, provider, config, &rel_str, &content).await? {
            FileOutcome::Indexed { chunks, embedded } => {
                summary.files += 1;
                summary.chunks += chunks;
                summary.embedded += embedded;
            }
            FileOutcome::Unchanged => summary.skipped += 1,
        }
    }

    info!(
        files = summary.files,
        skipped = summary.skipped,
        chunks = summary.chunks,
        embedded = summary.embedded,
        "indexing complete"
    );
    Ok(summary)
}

enum FileOutcome {
    Indexed { chunks: usize, embedded: usize },
    Unchanged,
}

async fn index_file(
    store: &dyn DocumentStore,
    provider: &dyn AiProvider,
    config: &Config,
    rel_path: &str,
    content: &str,
) -> Result<FileOutcome> {
    let hash = content_hash(content);
    let first_id = chunk_id(rel_path, 0);

    // Unchanged file: the hash stored on chunk 0 still matches.
    let previous_chunks = match store.get(&first_id).await? {
        Some(existing) => {
            if metadata_str(&existing.metadata, "sha256") == Some(hash.as_str()) {
                return Ok(FileOutcome::Unchanged);
            }
            metadata_usize(&existing.metadata, "chunks")
        }
        None => None,
    };

    let chunks = chunk_text(content, config.chunking.max_chars, config.chunking.overlap);
    let total = chunks.len();

    // Embed inline, best-effort. A failed batch leaves those chunks
    // lexical-only.
    let mut vectors: Vec<Option<Vec<f32>>> = vec![None; total];
    let mut embedded = 0;
    if config.embedding.is_enabled() && total > 0 {
        for (batch_idx, batch) in chunks.chunks(config.embedding.batch_size).enumerate() {
            let start = batch_idx * config.embedding.batch_size;
            match provider.embed_batch(batch).await {
                Ok(batch_vectors) => {
                    // The response must pair one vector with each input; a
                    // mismatched count is a malformed response and the batch
                    // stays lexical-only, like any other embedding failure.
                    if batch_vectors.len() != batch.len() {
                        warn!(
                            path = rel_path,
                            expected = batch.len(),
                            got = batch_vectors.len(),
                            "embedding response count mismatch, storing without vectors"
                        );
                        continue;
                    }
                    for (offset, vector) in batch_vectors.into_iter().enumerate() {
                        vectors[start + offset] = Some(vector);
                        embedded += 1;
                    }
                }
                Err(err) => {
                    warn!(path = rel_path, error = %err, "embedding batch failed, storing without vectors");
                }
            }
        }
    }

    let indexed_at = chrono::Utc::now().to_rfc3339();
    let docs: Vec<Document> = chunks
        .iter()
        .zip(vectors)
        .enumerate()
        .map(|(idx, (chunk, vector))| {
            let mut doc = Document::new(
                chunk_id(rel_path, idx),
                chunk,
                chunk_metadata(rel_path, idx, total, &hash, &indexed_at),
            );
            doc.vector = vector;
            doc
        })
        .collect();
    store
        .add_documents(docs)
        .await
        .with_context(|| format!("Failed to store chunks for {}", rel_path))?;

    // The file shrank: remove chunks past the new count.
    if let Some(previous) = previous_chunks {
        if previous > total {
            let stale: Vec<String> = (total..previous).map(|i| chunk_id(rel_path, i)).collect();
            store.delete_many(&stale).await?;
        }
    }

    Ok(FileOutcome::Indexed {
        chunks: total,
        embedded,
    })
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

fn chunk_id(rel_path: &str, idx: usize) -> String {
    format!("{}#{}", rel_path, idx)
}

fn chunk_metadata(
    rel_path: &str,
    idx: usize,
    total: usize,
    hash: &str,
    indexed_at: &str,
) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("path".to_string(), rel_path.into());
    metadata.insert("chunk".to_string(), (idx as i64).into());
    metadata.insert("chunks".to_string(), (total as i64).into());
    metadata.insert("sha256".to_string(), hash.into());
    metadata.insert("indexed_at".to_string(), indexed_at.into());
    metadata
}

fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn metadata_str<'a>(metadata: &'a Metadata, key: &str) -> Option<&'a str> {
    match metadata.get(key) {
        Some(MetadataValue::String(s)) => Some(s.as_str()),
        _ => None,
    }
}

fn metadata_usize(metadata: &Metadata, key: &str) -> Option<usize> {
    match metadata.get(key) {
        Some(MetadataValue::Number(n)) if *n >= 0.0 => Some(*n as usize),
        _ => None,
    }
}
