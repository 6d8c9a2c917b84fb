//! Core data types flowing through the ingestion, retrieval, and
//! evaluation pipeline.

use serde::{Deserialize, Serialize};

/// Kind of source a document was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Url,
    Wiki,
    Pdf,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Url => "url",
            SourceType::Wiki => "wiki",
            SourceType::Pdf => "pdf",
        }
    }
}

/// Normalized document produced by a loader.
///
/// Identity is `(source_id, page)` — two documents with the same `source_id`
/// but different pages are distinct (one PDF page each, for example).
#[derive(Debug, Clone)]
pub struct Document {
    pub source_id: String,
    pub source_type: SourceType,
    pub title: Option<String>,
    /// Display name (e.g. PDF file name). Not part of identity.
    pub name: Option<String>,
    pub page: Option<i64>,
    pub text: String,
}

/// An overlapping window of a document's text, the unit of embedding and
/// retrieval. Immutable once written; owned by the index it was written into.
///
/// `chunk_id` is deterministic (SHA-256 of `(source_id, page, ordinal)`), so
/// re-chunking identical input yields identical ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub source_id: String,
    pub source_type: SourceType,
    pub title: Option<String>,
    pub name: Option<String>,
    pub page: Option<i64>,
    /// Character offset of the window start within the document text.
    pub offset: usize,
    /// Position of this chunk within its document, starting at 0.
    pub ordinal: i64,
    pub text: String,
}

/// A single raw hit from the vector store, in canonical polarity
/// (higher score = more similar). Transient; never persisted.
#[derive(Debug, Clone)]
pub struct RetrievalHit {
    pub chunk: Chunk,
    pub raw_score: f64,
}

/// Deduplicated, per-logical-source view of retrieval results.
///
/// At most one `RankedSource` per `source_id` per response, carrying the
/// best score among its constituent hits.
#[derive(Debug, Clone, Serialize)]
pub struct RankedSource {
    #[serde(rename = "source")]
    pub source_id: String,
    #[serde(rename = "type")]
    pub source_type: SourceType,
    pub name: Option<String>,
    pub title: Option<String>,
    pub page: Option<i64>,
    #[serde(rename = "score")]
    pub best_score: f64,
}

/// A labeled evaluation question: the query plus the set of source ids a
/// good retriever should surface for it.
#[derive(Debug, Clone, Deserialize)]
pub struct EvalQuestion {
    pub question: String,
    pub relevant_docs: Vec<String>,
}

/// Aggregate retrieval-quality metrics for one evaluation run.
///
/// Derived, never mutated; re-running against an unchanged index and eval
/// set reproduces bit-identical values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvalReport {
    pub precision_at_k: f64,
    pub recall_at_k: f64,
    pub mrr: f64,
    /// Questions included in the aggregates.
    pub questions_evaluated: usize,
    /// Questions with an empty relevant set, excluded from the aggregates
    /// and reported as a note.
    pub questions_skipped_no_relevant: usize,
}
