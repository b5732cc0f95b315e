//! # Quarry
//!
//! **A local-first code-context indexing and retrieval engine for AI tools.**
//!
//! Quarry indexes source files into a pluggable document/vector store,
//! answers natural-language queries about them through hybrid (lexical +
//! vector) retrieval with query expansion, and can synthesize an answer
//! from the retrieved context via an AI provider.
//!
//! ## Data Flow
//!
//! 1. The **indexing pipeline** ([`index`]) walks a directory, splits files
//!    with the line-boundary chunker, optionally embeds chunks via the
//!    **provider** ([`provider`]), and upserts them through the
//!    [`DocumentStore`](quarry_core::store::DocumentStore) port.
//! 2. At query time, the **expansion producer** ([`expand`]) rewrites the
//!    query into alternate phrasings, and the core **hybrid retriever**
//!    ([`quarry_core::retrieve`]) fans out across the terms, deduplicates,
//!    and ranks.
//! 3. Results are exposed via the **CLI** (`qry`), which prints ranked
//!    sources and an overall confidence, or a synthesized answer.
//!
//! ## Store Backends
//!
//! | Backend | Persistence | Module |
//! |---------|-------------|--------|
//! | `memory` | None (reference backend) | `quarry_core::store::memory` |
//! | `sqlite` | SQLite file, WAL mode | [`sqlite_store`] |
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | SQLite connection pool with WAL mode |
//! | [`migrate`] | Database schema migration (idempotent) |
//! | [`sqlite_store`] | SQLite implementation of the store port |
//! | [`provider`] | Embedding/completion provider over an OpenAI-compatible API |
//! | [`expand`] | Query-expansion producer |
//! | [`index`] | Filesystem indexing pipeline: walk → chunk → embed → store |
//! | [`ask`] | Search and answer front end over the core retriever |

pub mod ask;
pub mod config;
pub mod db;
pub mod expand;
pub mod index;
pub mod migrate;
pub mod provider;
pub mod sqlite_store;

pub use quarry_core::models::{Document, Metadata, MetadataValue, QueryExpansion, SearchResult};
pub use quarry_core::retrieve::{Embedder, Retrieval, RetrievalParams};
pub use quarry_core::store::DocumentStore;
