//! # Quarry CLI (`qry`)
//!
//! The `qry` binary is the primary interface for Quarry. It provides
//! commands for store initialization, directory indexing, search, answer
//! synthesis, and store maintenance.
//!
//! ## Usage
//!
//! ```bash
//! qry --config ./config/quarry.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `qry init` | Create the store and run schema migrations |
//! | `qry index <dir>` | Index source files under a directory |
//! | `qry search "<query>"` | Retrieve ranked sources for a query |
//! | `qry ask "<query>"` | Answer a question from indexed content |
//! | `qry get <id>` | Retrieve a stored chunk by id |
//! | `qry count` | Print the number of stored chunks |
//! | `qry clear` | Delete every stored chunk |

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use quarry::config::{self, Config};
use quarry::provider::create_provider;
use quarry::sqlite_store::SqliteStore;
use quarry::{ask, db, index, DocumentStore};

use quarry_core::store::memory::InMemoryStore;

/// Quarry CLI — a local-first code-context indexing and retrieval engine
/// for AI tools.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/quarry.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "qry",
    about = "Quarry — a local-first code-context indexing and retrieval engine for AI tools",
    version,
    long_about = "Quarry indexes source files into a document/vector store, retrieves \
    relevant chunks through hybrid (lexical + semantic) search with query expansion, \
    and can synthesize answers from the retrieved context via an AI provider."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/quarry.toml`. Store, chunking, retrieval, and
    /// embedding settings are read from this file.
    #[arg(long, global = true, default_value = "./config/quarry.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the store.
    ///
    /// For the sqlite backend this creates the database file and runs the
    /// schema migration. This command is idempotent.
    Init,

    /// Index source files under a directory.
    ///
    /// Walks the directory, chunks matching files, optionally embeds the
    /// chunks, and upserts them. Re-running skips unchanged files.
    Index {
        /// Root directory to index.
        dir: PathBuf,
    },

    /// Retrieve ranked sources for a query.
    ///
    /// With an embedding provider configured this runs hybrid retrieval
    /// over the expanded query; otherwise it falls back to lexical search.
    Search {
        /// The search query string.
        query: String,
    },

    /// Answer a question from indexed content.
    ///
    /// Retrieves relevant chunks and synthesizes an answer with the
    /// configured chat model. Requires an embedding provider.
    Ask {
        /// The question to answer.
        query: String,
    },

    /// Retrieve a stored chunk by id.
    ///
    /// Chunk ids have the form `<relative path>#<index>`.
    Get {
        /// Chunk id.
        id: String,
    },

    /// Print the number of stored chunks.
    Count,

    /// Delete every stored chunk.
    Clear,
}

/// Build the configured store backend and initialize it.
async fn open_store(cfg: &Config) -> Result<Arc<dyn DocumentStore>> {
    let metric = cfg.store.metric()?;
    let store: Arc<dyn DocumentStore> = match cfg.store.backend.as_str() {
        "sqlite" => {
            let path = cfg
                .store
                .path
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("store.path is required for the sqlite backend"))?;
            let pool = db::connect(path).await?;
            Arc::new(SqliteStore::new(pool, metric))
        }
        _ => Arc::new(InMemoryStore::new(metric)),
    };
    store.initialize("quarry").await?;
    Ok(store)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    let store = open_store(&cfg).await?;
    let provider = create_provider(&cfg.embedding)?;

    match cli.command {
        Commands::Init => {
            println!("Store initialized successfully.");
        }
        Commands::Index { dir } => {
            let summary = index::index_directory(store.as_ref(), provider.as_ref(), &cfg, &dir)
                .await?;
            println!(
                "Indexed {} files ({} skipped): {} chunks, {} embedded.",
                summary.files, summary.skipped, summary.chunks, summary.embedded
            );
        }
        Commands::Search { query } => {
            let retrieval = ask::search(store.as_ref(), provider.as_ref(), &cfg, &query).await?;
            if retrieval.is_empty() {
                println!("No results.");
            } else {
                for (i, result) in retrieval.results.iter().enumerate() {
                    println!("{}. [{:.3}] {}", i + 1, result.score, result.id);
                    println!("   {}", snippet(&result.content));
                }
                println!("\nConfidence: {:.2}", retrieval.confidence);
                if !retrieval.dropped_terms.is_empty() {
                    println!("Dropped terms: {}", retrieval.dropped_terms.join(", "));
                }
            }
        }
        Commands::Ask { query } => {
            let answer = ask::ask(store.as_ref(), provider.as_ref(), &cfg, &query).await?;
            if answer.retrieval.is_empty() {
                println!("No results.");
            } else {
                println!("{}", answer.text);
                println!("\nSources (confidence {:.2}):", answer.retrieval.confidence);
                for result in &answer.retrieval.results {
                    println!("  [{:.3}] {}", result.score, result.id);
                }
            }
        }
        Commands::Get { id } => match store.get(&id).await? {
            Some(doc) => {
                println!("id: {}", doc.id);
                for (key, value) in &doc.metadata {
                    println!("{}: {}", key, serde_json::to_string(value)?);
                }
                println!(
                    "vector: {}",
                    doc.vector
                        .as_ref()
                        .map_or("none".to_string(), |v| format!("{} dims", v.len()))
                );
                println!("\n{}", doc.content);
            }
            None => {
                println!("Not found: {}", id);
                std::process::exit(1);
            }
        },
        Commands::Count => {
            println!("{}", store.count().await?);
        }
        Commands::Clear => {
            store.clear().await?;
            println!("Store cleared.");
        }
    }

    Ok(())
}

/// First line of a chunk, truncated for terminal display.
fn snippet(content: &str) -> String {
    let line = content.lines().next().unwrap_or_default();
    let mut out: String = line.chars().take(96).collect();
    if out.len() < line.len() {
        out.push('…');
    }
    out
}
