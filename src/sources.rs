//! The source list: which documents the corpus is built from.
//!
//! Parsed from a TOML file kept separate from the main settings so that the
//! corpus definition can change (and be fingerprinted) independently of
//! runtime configuration.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SourceList {
    #[serde(default)]
    pub web_urls: Vec<String>,
    #[serde(default)]
    pub wikipedia: Vec<WikipediaSource>,
    #[serde(default)]
    pub pdf_files: Vec<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WikipediaSource {
    pub query: String,
    #[serde(default = "default_lang")]
    pub lang: String,
}

fn default_lang() -> String {
    "en".to_string()
}

impl SourceList {
    pub fn is_empty(&self) -> bool {
        self.web_urls.is_empty() && self.wikipedia.is_empty() && self.pdf_files.is_empty()
    }

    /// Canonical entry strings for fingerprinting: identities and locations
    /// only, never incidental formatting. The fingerprint sorts these, so
    /// reordering entries in the file does not count as a content change
    /// (the file-mtime backstop covers that case).
    pub fn canonical_entries(&self) -> Vec<String> {
        let mut entries = Vec::new();
        for url in &self.web_urls {
            entries.push(format!("url:{}", url.trim()));
        }
        for wiki in &self.wikipedia {
            entries.push(format!("wiki:{}:{}", wiki.lang.trim(), wiki.query.trim()));
        }
        for path in &self.pdf_files {
            entries.push(format!("pdf:{}", path.display()));
        }
        entries
    }
}

pub fn load_sources(path: &Path) -> Result<SourceList> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read sources file: {}", path.display()))?;
    let sources: SourceList =
        toml::from_str(&content).with_context(|| "Failed to parse sources file")?;
    Ok(sources)
}

/// Last-modified time of the sources file, if it exists.
pub fn sources_modified_at(path: &Path) -> Option<DateTime<Utc>> {
    let mtime = std::fs::metadata(path).ok()?.modified().ok()?;
    Some(DateTime::<Utc>::from(mtime))
}
