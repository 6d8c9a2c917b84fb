//! # RAG Assistant CLI (`rag`)
//!
//! The `rag` binary is the primary interface for the retrieval pipeline. It
//! provides commands for index construction, question answering, retrieval
//! evaluation, staleness inspection, and starting the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! rag --config ./config/rag.toml --sources ./config/sources.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rag ingest` | Build (or rebuild) the index from the source list |
//! | `rag ask "<question>"` | Retrieve sources and answer a question |
//! | `rag eval <evalset.json>` | Score retrieval quality against labeled questions |
//! | `rag status` | Show manifest fingerprints and staleness |
//! | `rag serve` | Start the HTTP question-answering server |
//!
//! ## Examples
//!
//! ```bash
//! # Build the index
//! rag ingest
//!
//! # Ask, sources only (no answer model required)
//! rag ask "What is chunk overlap for?" --sources-only
//!
//! # Evaluate retrieval at k=3
//! rag eval ./eval/questions.json --k 3
//! ```

mod answer;
mod chunk;
mod config;
mod embedding;
mod error;
mod eval;
mod ingest;
mod loaders;
mod manifest;
mod models;
mod query;
mod retrieve;
mod server;
mod sources;
mod store;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// RAG assistant CLI — a staleness-aware retrieval pipeline with a built-in
/// evaluation harness.
///
/// All commands accept `--config` (runtime settings) and `--sources` (the
/// corpus definition). See `config/rag.example.toml` and
/// `config/sources.example.toml`.
#[derive(Parser)]
#[command(
    name = "rag",
    about = "RAG assistant — staleness-aware retrieval with source deduplication and eval harness",
    version,
    long_about = "Builds a chunked, embedded index over web pages, Wikipedia articles, and PDFs; \
    answers questions against it with per-source deduplicated citations; tracks index staleness \
    via content and parameter fingerprints; and scores retrieval quality (Precision@K, Recall@K, \
    MRR) against a labeled question set."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rag.toml")]
    config: PathBuf,

    /// Path to the source list (TOML). Fingerprinted for staleness tracking.
    #[arg(long, global = true, default_value = "./config/sources.toml")]
    sources: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Build (or rebuild) the index from the source list.
    ///
    /// Loads every configured source, chunks and embeds the text, writes the
    /// vector store, and commits a fresh manifest. A rebuild is a total
    /// replacement of the previous index.
    Ingest,

    /// Ask a question against the index.
    ///
    /// Retrieves the top-k chunks, deduplicates them to one entry per
    /// source, and (when an answer model is configured) generates a
    /// grounded answer. Warns when the index is stale.
    Ask {
        /// The question to answer.
        question: String,

        /// Number of chunks to retrieve (defaults to `retrieval.k` in config).
        #[arg(long)]
        k: Option<usize>,

        /// Print the ranked sources only, skipping answer generation.
        #[arg(long)]
        sources_only: bool,
    },

    /// Evaluate retrieval quality against a labeled question set.
    ///
    /// Reads a JSON array of `{question, relevant_docs}` records, runs each
    /// question through retrieval, and reports Precision@K, Recall@K, and
    /// MRR. Read-only: re-running against an unchanged index reproduces
    /// identical numbers.
    Eval {
        /// Path to the eval set (JSON).
        evalset: PathBuf,

        /// Number of chunks to retrieve per question (defaults to `retrieval.k`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Show index status: fingerprints, build time, chunk count, staleness.
    Status,

    /// Start the HTTP question-answering server.
    ///
    /// Binds to the address configured in `[server].bind` and serves
    /// `POST /ask` and `GET /health`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = config::load_settings(&cli.config)?;

    match cli.command {
        Commands::Ingest => {
            ingest::run_ingest(&settings, &cli.sources).await?;
        }
        Commands::Ask {
            question,
            k,
            sources_only,
        } => {
            retrieve::run_ask(&settings, &cli.sources, &question, k, sources_only).await?;
        }
        Commands::Eval { evalset, k } => {
            eval::run_eval(&settings, &evalset, k).await?;
        }
        Commands::Status => {
            run_status(&settings, &cli.sources).await?;
        }
        Commands::Serve => {
            server::run_server(&settings, &cli.sources).await?;
        }
    }

    Ok(())
}

/// Implementation of `rag status`.
async fn run_status(settings: &config::Settings, sources_path: &PathBuf) -> anyhow::Result<()> {
    println!("Index directory: {}", settings.index.dir.display());

    match manifest::load_manifest(&settings.index.dir)? {
        Some(m) => {
            println!("  sources:    {}", &m.source_fingerprint[..16]);
            println!("  parameters: {}", &m.param_fingerprint[..16]);
            println!("  built at:   {}", m.built_at.to_rfc3339());
        }
        None => println!("  no manifest (index has never been built)"),
    }

    let store = store::open_store(settings).await?;
    println!("  chunks:     {} ({} store)", store.count().await?, store.kind());

    let source_list = sources::load_sources(sources_path)?;
    match manifest::current_staleness(settings, &source_list, sources_path)? {
        Some(reason) => println!("  status:     STALE — {}", reason),
        None => println!("  status:     fresh"),
    }
    Ok(())
}
