//! End-to-end pipeline tests over the library API: chunk → embed → store →
//! retrieve → dedupe → evaluate, with the deterministic hash embedder and
//! the flat store so everything runs offline.

use std::collections::HashSet;

use rag_assistant::chunk::chunk_document;
use rag_assistant::embedding::{Embedder, HashEmbedder};
use rag_assistant::eval::{evaluate, evaluate_predictions};
use rag_assistant::manifest::{
    check_staleness, compute_param_fingerprint, compute_source_fingerprint, IndexManifest,
    IndexParams,
};
use rag_assistant::models::{Chunk, Document, EvalQuestion, SourceType};
use rag_assistant::retrieve::retrieve;
use rag_assistant::store::{FlatStore, VectorStore};

const CHUNK_SIZE: usize = 1000;
const CHUNK_OVERLAP: usize = 150;

fn doc(source_id: &str, text: String) -> Document {
    Document {
        source_id: source_id.to_string(),
        source_type: SourceType::Url,
        title: None,
        name: None,
        page: None,
        text,
    }
}

/// Two-document corpus: doc1 yields 2 chunks at size=1000/overlap=150,
/// doc2 yields 1.
fn corpus() -> Vec<Document> {
    vec![
        doc("doc1", "alpha bravo charlie ".repeat(60)), // 1200 chars
        doc("doc2", "delta echo foxtrot ".repeat(15)),  // 285 chars
    ]
}

async fn build_flat_index(dir: &std::path::Path, docs: &[Document]) -> (FlatStore, Vec<Chunk>) {
    let store = FlatStore::open(dir).unwrap();
    let embedder = HashEmbedder::with_dims(64);

    let mut all_chunks = Vec::new();
    for d in docs {
        all_chunks.extend(chunk_document(d, CHUNK_SIZE, CHUNK_OVERLAP).unwrap());
    }
    let texts: Vec<String> = all_chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = embedder.embed(&texts).await.unwrap();
    for (chunk, vector) in all_chunks.iter().zip(vectors.iter()) {
        store.upsert(chunk, vector).await.unwrap();
    }
    store.persist().await.unwrap();
    (store, all_chunks)
}

#[tokio::test]
async fn test_two_document_corpus_chunk_counts() {
    let dir = tempfile::tempdir().unwrap();
    let (store, chunks) = build_flat_index(dir.path(), &corpus()).await;

    let doc1_chunks: Vec<_> = chunks.iter().filter(|c| c.source_id == "doc1").collect();
    let doc2_chunks: Vec<_> = chunks.iter().filter(|c| c.source_id == "doc2").collect();
    assert_eq!(doc1_chunks.len(), 2);
    assert_eq!(doc2_chunks.len(), 1);
    assert_eq!(store.count().await.unwrap(), 3);

    // Second window starts at stride = size - overlap
    assert_eq!(doc1_chunks[1].offset, 850);
}

#[tokio::test]
async fn test_retrieval_dedupes_overlapping_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let docs = corpus();
    let (store, _) = build_flat_index(dir.path(), &docs).await;
    let embedder = HashEmbedder::with_dims(64);

    // Query with doc2's exact chunk text: hash embeddings make it rank first.
    let query = "delta echo foxtrot ".repeat(15);
    let retrieval = retrieve(&embedder, &store, &query, 3).await.unwrap();

    assert_eq!(retrieval.hits.len(), 3);
    // doc1's two chunks collapse to one RankedSource
    assert_eq!(retrieval.sources.len(), 2);
    assert_eq!(retrieval.sources[0].source_id, "doc2");
    assert!((retrieval.sources[0].best_score - 1.0).abs() < 1e-5);
    assert!(retrieval.is_degraded());

    let ids: HashSet<_> = retrieval.sources.iter().map(|s| s.source_id.as_str()).collect();
    assert_eq!(ids.len(), retrieval.sources.len());
}

#[tokio::test]
async fn test_rebuild_reproduces_identical_index() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let docs = corpus();

    let (_, chunks_a) = build_flat_index(dir_a.path(), &docs).await;
    let (_, chunks_b) = build_flat_index(dir_b.path(), &docs).await;
    assert_eq!(chunks_a, chunks_b);

    let index_a = std::fs::read_to_string(dir_a.path().join("index.json")).unwrap();
    let index_b = std::fs::read_to_string(dir_b.path().join("index.json")).unwrap();
    assert_eq!(index_a, index_b);
}

#[test]
fn test_fingerprints_stable_until_inputs_change() {
    let entries = vec!["url:https://a.example".to_string(), "pdf:doc1.pdf".to_string()];
    let params = IndexParams {
        chunk_size: CHUNK_SIZE,
        chunk_overlap: CHUNK_OVERLAP,
        embedding_model: "hash:64".to_string(),
        store_kind: "flat".to_string(),
    };

    let source_fp = compute_source_fingerprint(&entries);
    let param_fp = compute_param_fingerprint(&params);

    // Unchanged inputs reproduce the fingerprints
    assert_eq!(source_fp, compute_source_fingerprint(&entries));
    assert_eq!(param_fp, compute_param_fingerprint(&params));

    let manifest = IndexManifest {
        source_fingerprint: source_fp.clone(),
        param_fingerprint: param_fp.clone(),
        built_at: chrono::Utc::now(),
    };
    assert_eq!(check_staleness(&source_fp, &param_fp, None, Some(&manifest)), None);

    // Editing a source entry flips staleness before any rebuild
    let edited = vec!["url:https://a.example/v2".to_string(), "pdf:doc1.pdf".to_string()];
    let edited_fp = compute_source_fingerprint(&edited);
    assert_ne!(edited_fp, source_fp);
    assert!(check_staleness(&edited_fp, &param_fp, None, Some(&manifest)).is_some());
}

#[tokio::test]
async fn test_eval_end_to_end_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let docs = corpus();
    let (store, _) = build_flat_index(dir.path(), &docs).await;
    let embedder = HashEmbedder::with_dims(64);

    let questions = vec![
        EvalQuestion {
            question: "delta echo foxtrot ".repeat(15),
            relevant_docs: vec!["doc2".to_string()],
        },
        EvalQuestion {
            question: "unrelated question".to_string(),
            relevant_docs: vec!["doc1".to_string()],
        },
    ];

    let run = |questions: &[EvalQuestion]| {
        let store = &store;
        let embedder = &embedder;
        let questions = questions.to_vec();
        async move {
            evaluate(&questions, |q| async move {
                let r = retrieve(embedder, store, &q, 3).await?;
                Ok(r.sources.into_iter().map(|s| s.source_id).collect())
            })
            .await
            .unwrap()
        }
    };

    let first = run(&questions).await;
    let second = run(&questions).await;
    assert_eq!(first, second);

    // doc2's exact text query must put doc2 at rank 1
    assert!(first.mrr >= 0.5);
    assert_eq!(first.questions_evaluated, 2);
}

#[test]
fn test_eval_worked_example() {
    // predicted [A, B, C], relevant {B} at k=3
    let questions = vec![EvalQuestion {
        question: "q".to_string(),
        relevant_docs: vec!["B".to_string()],
    }];
    let predictions = vec![vec!["A".to_string(), "B".to_string(), "C".to_string()]];
    let report = evaluate_predictions(&questions, &predictions);
    assert!((report.precision_at_k - 1.0 / 3.0).abs() < 1e-12);
    assert!((report.recall_at_k - 1.0).abs() < 1e-12);
    assert!((report.mrr - 0.5).abs() < 1e-12);
}
