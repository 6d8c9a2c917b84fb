//! Index construction: load, chunk, embed, store, commit manifest.
//!
//! A build is a total replacement — the target store is cleared before any
//! writes so old and new embeddings never mix. The manifest is committed
//! last, only after the store has persisted, so a failed or interrupted
//! build leaves the previous manifest in place and the index reads as stale
//! rather than silently wrong.

use std::path::Path;
use tracing::{info, warn};

use crate::chunk::chunk_document;
use crate::config::Settings;
use crate::embedding::{create_embedder, Embedder};
use crate::error::PipelineError;
use crate::manifest::{
    compute_param_fingerprint, compute_source_fingerprint, save_manifest, IndexManifest,
    IndexParams,
};
use crate::models::{Chunk, Document};
use crate::sources::SourceList;
use crate::store::{open_store, VectorStore};
use crate::{loaders, sources};

/// What a completed build produced.
#[derive(Debug)]
pub struct BuildSummary {
    pub manifest: IndexManifest,
    pub documents: usize,
    pub chunks: usize,
}

/// Build (or rebuild) the index over `documents`, writing through the given
/// embedder and store. Callers own backend construction (and document
/// loading), so the builder itself is testable against any implementation
/// of the two capabilities.
pub async fn build_index(
    settings: &Settings,
    source_list: &SourceList,
    documents: &[Document],
    embedder: &dyn Embedder,
    store: &dyn VectorStore,
) -> Result<BuildSummary, PipelineError> {
    if source_list.is_empty() {
        warn!("source list is empty; building an empty index");
    }

    let mut chunks: Vec<Chunk> = Vec::new();
    for doc in documents {
        chunks.extend(chunk_document(
            doc,
            settings.chunking.chunk_size,
            settings.chunking.chunk_overlap,
        )?);
    }
    info!(chunks = chunks.len(), "documents chunked");

    store.clear().await.map_err(PipelineError::Build)?;
    embed_and_store(embedder, store, &chunks, settings.embedding.batch_size).await?;

    // Persist the index before committing the manifest: a crash between the
    // two leaves the old manifest, so the index reads as stale, never as
    // fresh-but-partial.
    store.persist().await.map_err(PipelineError::Build)?;

    let manifest = IndexManifest {
        source_fingerprint: compute_source_fingerprint(&source_list.canonical_entries()),
        param_fingerprint: compute_param_fingerprint(&IndexParams::from_settings(settings)),
        built_at: chrono::Utc::now(),
    };
    save_manifest(&settings.index.dir, &manifest).map_err(PipelineError::Build)?;

    info!(
        documents = documents.len(),
        chunks = chunks.len(),
        "index build complete"
    );

    Ok(BuildSummary {
        manifest,
        documents: documents.len(),
        chunks: chunks.len(),
    })
}

async fn embed_and_store(
    embedder: &dyn Embedder,
    store: &dyn VectorStore,
    chunks: &[Chunk],
    batch_size: usize,
) -> Result<(), PipelineError> {
    let batch_size = batch_size.max(1);
    let mut done = 0usize;

    for batch in chunks.chunks(batch_size) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder.embed(&texts).await.map_err(PipelineError::Build)?;

        if vectors.len() != batch.len() {
            return Err(PipelineError::Build(anyhow::anyhow!(
                "embedder returned {} vectors for {} inputs",
                vectors.len(),
                batch.len()
            )));
        }

        for (chunk, vector) in batch.iter().zip(vectors.iter()) {
            store
                .upsert(chunk, vector)
                .await
                .map_err(PipelineError::Build)?;
        }

        done += batch.len();
        info!(embedded = done, total = chunks.len(), "embedding progress");
    }

    Ok(())
}

/// CLI entry point for `rag ingest`.
pub async fn run_ingest(settings: &Settings, sources_path: &Path) -> anyhow::Result<()> {
    let source_list = sources::load_sources(sources_path)?;
    let embedder = create_embedder(&settings.embedding)?;
    let store = open_store(settings).await?;

    let documents = loaders::load_all(&source_list).await?;
    info!(documents = documents.len(), "documents loaded");

    let summary = build_index(settings, &source_list, &documents, &*embedder, &*store).await?;

    println!(
        "Indexed {} documents ({} chunks) into {}",
        summary.documents,
        summary.chunks,
        settings.index.dir.display()
    );
    println!("  sources:    {}", &summary.manifest.source_fingerprint[..16]);
    println!("  parameters: {}", &summary.manifest.param_fingerprint[..16]);
    println!("  built at:   {}", summary.manifest.built_at.to_rfc3339());
    Ok(())
}
