//! Query-time retrieval: vector search plus source-level deduplication.
//!
//! The store returns up to `k` chunk hits; several may come from the same
//! logical source (overlapping windows of one page score alike). The
//! deduplicator collapses them to at most one [`RankedSource`] per
//! `source_id`, keeping the best score, and never tops the list back up —
//! fewer distinct sources than requested is reported as degraded, not
//! papered over.

use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

use crate::answer::create_generator;
use crate::config::Settings;
use crate::embedding::{create_embedder, embed_query, Embedder};
use crate::error::PipelineError;
use crate::manifest::current_staleness;
use crate::models::{RankedSource, RetrievalHit};
use crate::query::process_query;
use crate::sources::load_sources;
use crate::store::{open_store, VectorStore};

/// Result of one retrieval: raw chunk hits plus the deduplicated
/// source-level view.
#[derive(Debug)]
pub struct Retrieval {
    /// Raw hits in store order (similarity desc), fed to answer generation.
    pub hits: Vec<RetrievalHit>,
    /// One entry per distinct source, in winning-hit order.
    pub sources: Vec<RankedSource>,
    pub requested_k: usize,
}

impl Retrieval {
    /// True when deduplication left fewer distinct sources than were asked
    /// for. Advisory, like staleness.
    pub fn is_degraded(&self) -> bool {
        self.sources.len() < self.requested_k
    }
}

/// Collapse chunk hits to one [`RankedSource`] per `source_id`.
///
/// The best (highest) score among a source's hits wins; on an exact score
/// tie the hit with the lexicographically smaller chunk id represents the
/// source. Output order follows the position of each source's winning hit
/// in the input, so the strongest sources stay first.
pub fn dedupe_hits(hits: &[RetrievalHit]) -> Vec<RankedSource> {
    // source_id -> index of its winning hit
    let mut winners: HashMap<&str, usize> = HashMap::new();

    for (i, hit) in hits.iter().enumerate() {
        match winners.get(hit.chunk.source_id.as_str()) {
            None => {
                winners.insert(&hit.chunk.source_id, i);
            }
            Some(&w) => {
                let cur = &hits[w];
                let better = hit.raw_score > cur.raw_score
                    || (hit.raw_score == cur.raw_score
                        && hit.chunk.chunk_id < cur.chunk.chunk_id);
                if better {
                    winners.insert(&hit.chunk.source_id, i);
                }
            }
        }
    }

    let mut indices: Vec<usize> = winners.into_values().collect();
    indices.sort_unstable();

    indices
        .into_iter()
        .map(|i| {
            let chunk = &hits[i].chunk;
            RankedSource {
                source_id: chunk.source_id.clone(),
                source_type: chunk.source_type,
                name: chunk.name.clone(),
                title: chunk.title.clone(),
                page: chunk.page,
                best_score: hits[i].raw_score,
            }
        })
        .collect()
}

/// Embed the (already processed) query and search the store.
pub async fn retrieve(
    embedder: &dyn Embedder,
    store: &dyn VectorStore,
    query: &str,
    k: usize,
) -> Result<Retrieval, PipelineError> {
    let vector = embed_query(embedder, query)
        .await
        .map_err(PipelineError::Embedding)?;
    let hits = store.search(&vector, k).await.map_err(PipelineError::Store)?;
    let sources = dedupe_hits(&hits);
    Ok(Retrieval {
        hits,
        sources,
        requested_k: k,
    })
}

/// CLI entry point for `rag ask`.
pub async fn run_ask(
    settings: &Settings,
    sources_path: &Path,
    question: &str,
    k: Option<usize>,
    sources_only: bool,
) -> anyhow::Result<()> {
    let source_list = load_sources(sources_path)?;
    if let Some(reason) = current_staleness(settings, &source_list, sources_path)? {
        warn!(reason = %reason, "index is stale");
        eprintln!("warning: index may be stale: {}", reason);
    }

    let k = k.unwrap_or(settings.retrieval.k);
    let generator = create_generator(&settings.model)?;
    let expand = settings.query.expand && settings.model.is_enabled();
    let processed = process_query(&*generator, question, expand).await;
    if processed.cleaned.is_empty() {
        anyhow::bail!("Question is empty");
    }
    debug!(
        kind = ?processed.kind,
        keywords = ?processed.keywords,
        expanded = %processed.expanded,
        "query processed"
    );

    let embedder = create_embedder(&settings.embedding)?;
    let store = open_store(settings).await?;
    let retrieval = retrieve(&*embedder, &*store, &processed.expanded, k).await?;

    if retrieval.sources.is_empty() {
        println!("No results. Is the index built? Try `rag ingest`.");
        return Ok(());
    }
    if retrieval.is_degraded() {
        eprintln!(
            "note: {} distinct sources for k={} (overlapping chunks deduplicated)",
            retrieval.sources.len(),
            retrieval.requested_k
        );
    }

    if !sources_only && settings.model.is_enabled() {
        let answer = generator.generate(&processed.cleaned, &retrieval.hits).await?;
        println!("{}\n", answer);
        println!("Sources:");
    }

    println!("{}", serde_json::to_string_pretty(&retrieval.sources)?);
    Ok(())
}
