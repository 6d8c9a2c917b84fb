//! Index manifest: fingerprints, staleness detection, and atomic persistence.
//!
//! The manifest is the sole authority for staleness decisions. It is written
//! only after a fully successful build, via temp-file-and-rename in the index
//! directory, so a crash between index write and manifest write leaves the
//! previous manifest intact — a partially written index is never marked fresh.
//!
//! Staleness is advisory: callers surface a warning and keep answering
//! queries against a stale index.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::config::Settings;
use crate::sources::{self, SourceList};

pub const MANIFEST_FILE: &str = "manifest.json";

/// Persisted metadata describing how and when an index was built.
/// One per index; read-only after a successful build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    /// Hash of the full source-list contents (identities + locations).
    pub source_fingerprint: String,
    /// Hash of chunk size, overlap, embedding-model id, and store kind.
    pub param_fingerprint: String,
    pub built_at: DateTime<Utc>,
}

/// Ingestion parameters covered by the parameter fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexParams {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub embedding_model: String,
    pub store_kind: String,
}

impl IndexParams {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            chunk_size: settings.chunking.chunk_size,
            chunk_overlap: settings.chunking.chunk_overlap,
            embedding_model: settings.embedding.model_id(),
            store_kind: settings.store.kind.clone(),
        }
    }
}

/// Why an index is considered stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleReason {
    /// No manifest exists next to the index.
    MissingManifest,
    /// The source list's fingerprinted content changed.
    SourcesChanged,
    /// Chunking, embedding, or store parameters changed.
    ParamsChanged,
    /// The sources file was modified after the last build. Conservative
    /// backstop for edits the content fingerprint intentionally ignores
    /// (e.g. reordering entries).
    SourcesFileNewer,
}

impl std::fmt::Display for StaleReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StaleReason::MissingManifest => write!(f, "no index manifest found — run `rag ingest`"),
            StaleReason::SourcesChanged => write!(f, "source list changed since the last build"),
            StaleReason::ParamsChanged => {
                write!(f, "chunking/embedding/store parameters changed since the last build")
            }
            StaleReason::SourcesFileNewer => {
                write!(f, "sources file was modified after the last build")
            }
        }
    }
}

/// Stable hash over the source list's canonical entries. Entries are sorted
/// first so incidental ordering in the file does not change the fingerprint.
pub fn compute_source_fingerprint(entries: &[String]) -> String {
    let mut sorted: Vec<&str> = entries.iter().map(String::as_str).collect();
    sorted.sort_unstable();

    let mut hasher = Sha256::new();
    for entry in sorted {
        hasher.update(entry.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

/// Stable hash over the ingestion parameter tuple.
pub fn compute_param_fingerprint(params: &IndexParams) -> String {
    let mut hasher = Sha256::new();
    hasher.update(params.chunk_size.to_le_bytes());
    hasher.update(params.chunk_overlap.to_le_bytes());
    hasher.update(params.embedding_model.as_bytes());
    hasher.update([0u8]);
    hasher.update(params.store_kind.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Pure staleness decision. Returns the first reason that applies, `None`
/// when the index is fresh. Printing/logging is the caller's business.
pub fn check_staleness(
    source_fingerprint: &str,
    param_fingerprint: &str,
    sources_modified: Option<DateTime<Utc>>,
    manifest: Option<&IndexManifest>,
) -> Option<StaleReason> {
    let manifest = match manifest {
        Some(m) => m,
        None => return Some(StaleReason::MissingManifest),
    };

    if manifest.source_fingerprint != source_fingerprint {
        return Some(StaleReason::SourcesChanged);
    }
    if manifest.param_fingerprint != param_fingerprint {
        return Some(StaleReason::ParamsChanged);
    }
    if let Some(mtime) = sources_modified {
        if mtime > manifest.built_at {
            return Some(StaleReason::SourcesFileNewer);
        }
    }
    None
}

/// Staleness of the configured index with respect to a sources file on disk.
pub fn current_staleness(
    settings: &Settings,
    sources: &SourceList,
    sources_path: &Path,
) -> Result<Option<StaleReason>> {
    let source_fp = compute_source_fingerprint(&sources.canonical_entries());
    let param_fp = compute_param_fingerprint(&IndexParams::from_settings(settings));
    let manifest = load_manifest(&settings.index.dir)?;
    Ok(check_staleness(
        &source_fp,
        &param_fp,
        sources::sources_modified_at(sources_path),
        manifest.as_ref(),
    ))
}

pub fn manifest_path(index_dir: &Path) -> PathBuf {
    index_dir.join(MANIFEST_FILE)
}

/// Read the manifest next to the index, if one exists.
pub fn load_manifest(index_dir: &Path) -> Result<Option<IndexManifest>> {
    let path = manifest_path(index_dir);
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
    let manifest: IndexManifest =
        serde_json::from_str(&content).with_context(|| "Failed to parse manifest")?;
    Ok(Some(manifest))
}

/// Atomically persist the manifest: write to a temp file in the same
/// directory, then rename over the final path.
pub fn save_manifest(index_dir: &Path, manifest: &IndexManifest) -> Result<()> {
    std::fs::create_dir_all(index_dir)?;
    let path = manifest_path(index_dir);
    let tmp = index_dir.join(format!("{}.tmp", MANIFEST_FILE));

    let json = serde_json::to_string_pretty(manifest)?;
    std::fs::write(&tmp, json)
        .with_context(|| format!("Failed to write manifest: {}", tmp.display()))?;
    std::fs::rename(&tmp, &path)
        .with_context(|| format!("Failed to commit manifest: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn params() -> IndexParams {
        IndexParams {
            chunk_size: 1000,
            chunk_overlap: 150,
            embedding_model: "hash:64".to_string(),
            store_kind: "flat".to_string(),
        }
    }

    fn manifest(source_fp: &str, param_fp: &str) -> IndexManifest {
        IndexManifest {
            source_fingerprint: source_fp.to_string(),
            param_fingerprint: param_fp.to_string(),
            built_at: Utc::now(),
        }
    }

    #[test]
    fn test_source_fingerprint_ignores_order() {
        let a = compute_source_fingerprint(&["url:a".to_string(), "url:b".to_string()]);
        let b = compute_source_fingerprint(&["url:b".to_string(), "url:a".to_string()]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_source_fingerprint_detects_content_change() {
        let a = compute_source_fingerprint(&["url:a".to_string()]);
        let b = compute_source_fingerprint(&["url:a2".to_string()]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_param_fingerprint_covers_each_field() {
        let base = compute_param_fingerprint(&params());

        let mut p = params();
        p.chunk_size = 800;
        assert_ne!(compute_param_fingerprint(&p), base);

        let mut p = params();
        p.chunk_overlap = 0;
        assert_ne!(compute_param_fingerprint(&p), base);

        let mut p = params();
        p.embedding_model = "openai:text-embedding-3-small".to_string();
        assert_ne!(compute_param_fingerprint(&p), base);

        let mut p = params();
        p.store_kind = "sqlite".to_string();
        assert_ne!(compute_param_fingerprint(&p), base);
    }

    #[test]
    fn test_missing_manifest_is_stale() {
        let reason = check_staleness("fp", "fp", None, None);
        assert_eq!(reason, Some(StaleReason::MissingManifest));
    }

    #[test]
    fn test_matching_manifest_is_fresh() {
        let m = manifest("sfp", "pfp");
        assert_eq!(check_staleness("sfp", "pfp", None, Some(&m)), None);
    }

    #[test]
    fn test_fingerprint_mismatch_is_stale() {
        let m = manifest("sfp", "pfp");
        assert_eq!(
            check_staleness("other", "pfp", None, Some(&m)),
            Some(StaleReason::SourcesChanged)
        );
        assert_eq!(
            check_staleness("sfp", "other", None, Some(&m)),
            Some(StaleReason::ParamsChanged)
        );
    }

    #[test]
    fn test_newer_sources_file_is_stale() {
        let m = manifest("sfp", "pfp");
        let newer = m.built_at + Duration::seconds(5);
        assert_eq!(
            check_staleness("sfp", "pfp", Some(newer), Some(&m)),
            Some(StaleReason::SourcesFileNewer)
        );
        // Equal or older mtime does not trip the backstop
        assert_eq!(check_staleness("sfp", "pfp", Some(m.built_at), Some(&m)), None);
    }

    #[test]
    fn test_manifest_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_manifest(dir.path()).unwrap().is_none());

        let m = manifest("sfp", "pfp");
        save_manifest(dir.path(), &m).unwrap();
        let loaded = load_manifest(dir.path()).unwrap().unwrap();
        assert_eq!(loaded, m);
    }
}
