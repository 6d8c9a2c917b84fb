//! Fixed-size overlapping window chunker.
//!
//! Walks document text in a single forward pass, emitting windows of
//! `chunk_size` characters (or the remainder, if shorter) and advancing by
//! `chunk_size - chunk_overlap` each step. Chunking is deterministic:
//! identical `(text, size, overlap)` always yields byte-identical chunk
//! boundaries and ordinals, independent of locale or platform, so
//! re-ingestion with unchanged inputs produces an unchanged index.
//!
//! Each chunk receives a deterministic id derived from its document identity
//! and ordinal. Text normalization happens upstream in the loaders; this
//! module is a pure function over its inputs.

use sha2::{Digest, Sha256};

use crate::error::PipelineError;
use crate::models::{Chunk, Document};

/// Split a document's text into overlapping windows.
///
/// Windows are `size` characters long except possibly the last; neighboring
/// windows overlap by exactly `overlap` characters. Boundaries fall on
/// `char` boundaries so multi-byte text never splits inside a code point.
///
/// # Errors
///
/// `overlap >= size` (or `size == 0`) is a configuration error and fails
/// fast — it is never silently clamped.
pub fn chunk_document(doc: &Document, size: usize, overlap: usize) -> Result<Vec<Chunk>, PipelineError> {
    if size == 0 {
        return Err(PipelineError::Config("chunk_size must be > 0".to_string()));
    }
    if overlap >= size {
        return Err(PipelineError::Config(format!(
            "chunk_overlap ({}) must be < chunk_size ({})",
            overlap, size
        )));
    }

    let chars: Vec<char> = doc.text.chars().collect();
    if chars.is_empty() {
        return Ok(Vec::new());
    }

    let stride = size - overlap;
    let mut chunks = Vec::new();
    let mut p = 0usize;
    let mut ordinal = 0i64;

    while p < chars.len() {
        let end = (p + size).min(chars.len());
        let text: String = chars[p..end].iter().collect();
        chunks.push(make_chunk(doc, p, ordinal, text));
        ordinal += 1;
        p += stride;
    }

    Ok(chunks)
}

fn make_chunk(doc: &Document, offset: usize, ordinal: i64, text: String) -> Chunk {
    Chunk {
        chunk_id: chunk_id(&doc.source_id, doc.page, ordinal),
        source_id: doc.source_id.clone(),
        source_type: doc.source_type,
        title: doc.title.clone(),
        name: doc.name.clone(),
        page: doc.page,
        offset,
        ordinal,
        text,
    }
}

/// Deterministic chunk id: SHA-256 over `(source_id, page, ordinal)`.
fn chunk_id(source_id: &str, page: Option<i64>, ordinal: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_id.as_bytes());
    hasher.update([0u8]);
    match page {
        Some(p) => hasher.update(p.to_le_bytes()),
        None => hasher.update(b"none"),
    }
    hasher.update([0u8]);
    hasher.update(ordinal.to_le_bytes());
    format!("{:x}", hasher.finalize())
}
