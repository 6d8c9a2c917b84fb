//! Error taxonomy for the retrieval pipeline.
//!
//! Configuration and build failures are fatal and propagate unchanged to the
//! top-level caller. Staleness and degraded retrieval are advisory conditions
//! carried on results, not errors.

use thiserror::Error;

/// Errors produced by the core pipeline components.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Invalid configuration (e.g. chunk overlap >= chunk size).
    /// Raised before any I/O.
    #[error("configuration error: {0}")]
    Config(String),

    /// Embedding or store-write failure mid-build. The build is aborted and
    /// the previous manifest/index are left untouched.
    ///
    /// Display carries no cause text; the cause is reachable through
    /// `source()` so chain-walking formatters print it exactly once.
    #[error("index build failed")]
    Build(#[source] anyhow::Error),

    /// Vector store failure outside a build (query time).
    #[error("vector store error")]
    Store(#[source] anyhow::Error),

    /// Embedding capability failure outside a build (query time).
    #[error("embedding error")]
    Embedding(#[source] anyhow::Error),
}
