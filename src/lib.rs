//! # RAG Assistant
//!
//! A staleness-aware retrieval pipeline with source deduplication and a
//! built-in evaluation harness.
//!
//! Documents (web pages, Wikipedia articles, PDFs) are split into
//! overlapping fixed-size chunks, embedded, and written to a vector store
//! together with a manifest fingerprinting the source list and ingestion
//! parameters. At query time the retriever searches the store, collapses
//! overlapping hits to one entry per logical source, and optionally feeds
//! the chunks to an answer model. The evaluator scores retrieval quality
//! (Precision@K, Recall@K, MRR) against a labeled question set.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌─────────────┐
//! │   Loaders    │──▶│   Pipeline    │──▶│ Vector store │
//! │ URL/Wiki/PDF │   │ Chunk+Embed  │   │ flat/sqlite  │
//! └──────────────┘   └──────┬───────┘   └──────┬──────┘
//!                           │ manifest          │
//!                           ▼                   ▼
//!                    ┌────────────┐      ┌────────────┐
//!                    │ Staleness  │      │ Retrieve + │
//!                    │  tracking  │      │   dedupe   │
//!                    └────────────┘      └─────┬──────┘
//!                                              │
//!                              ┌───────────────┼──────────────┐
//!                              ▼               ▼              ▼
//!                         ┌─────────┐    ┌──────────┐   ┌──────────┐
//!                         │   CLI   │    │   HTTP   │   │   Eval   │
//!                         │  (rag)  │    │  (/ask)  │   │ harness  │
//!                         └─────────┘    └──────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rag ingest                          # build the index
//! rag status                          # fingerprints + staleness
//! rag ask "What is X?" --sources-only
//! rag eval ./eval/questions.json
//! rag serve                           # HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types |
//! | [`sources`] | Source-list parsing and canonical entries |
//! | [`loaders`] | URL, Wikipedia, and PDF document loading |
//! | [`chunk`] | Overlapping-window chunker |
//! | [`embedding`] | Embedding capability and backends |
//! | [`store`] | Vector store capability and backends |
//! | [`manifest`] | Fingerprints and staleness detection |
//! | [`ingest`] | Index construction |
//! | [`query`] | Query cleanup, classification, and expansion |
//! | [`retrieve`] | Search and source deduplication |
//! | [`eval`] | Retrieval-quality metrics |
//! | [`answer`] | Answer generation |
//! | [`server`] | HTTP API |

pub mod answer;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod eval;
pub mod ingest;
pub mod loaders;
pub mod manifest;
pub mod models;
pub mod query;
pub mod retrieve;
pub mod server;
pub mod sources;
pub mod store;
