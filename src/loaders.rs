//! Document loaders for web URLs, Wikipedia articles, and local PDFs.
//!
//! Thin I/O with consistent metadata: every loaded [`Document`] carries a
//! stable `source_id`, its [`SourceType`], and (for PDFs) a page number.
//! A failing source is logged and skipped — one broken URL never aborts an
//! ingestion run. Text normalization happens here, upstream of the chunker.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::models::{Document, SourceType};
use crate::sources::{SourceList, WikipediaSource};

const FETCH_TIMEOUT_SECS: u64 = 30;

/// Load every configured source, tolerating per-source failures.
pub async fn load_all(sources: &SourceList) -> Result<Vec<Document>> {
    let mut docs = Vec::new();
    docs.extend(load_from_urls(&sources.web_urls).await);
    docs.extend(load_from_wikipedia(&sources.wikipedia).await);
    docs.extend(load_from_pdfs(&sources.pdf_files));
    info!(documents = docs.len(), "loaded all sources");
    Ok(docs)
}

/// Fetch web pages; `source_id` is the URL itself.
pub async fn load_from_urls(urls: &[String]) -> Vec<Document> {
    let mut docs = Vec::new();
    for url in urls {
        match fetch_url(url).await {
            Ok(doc) => docs.push(doc),
            Err(e) => warn!(url = %url, error = %e, "failed to load URL, skipping"),
        }
    }
    docs
}

async fn fetch_url(url: &str) -> Result<Document> {
    debug!(url = %url, "fetching URL");
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
        .build()?;
    let response = client.get(url).send().await?.error_for_status()?;
    let html = response.text().await?;

    let title = extract_title(&html);
    let text = clean_text(&strip_html(&html));
    if text.is_empty() {
        return Err(anyhow!("page contained no extractable text"));
    }

    Ok(Document {
        source_id: url.to_string(),
        source_type: SourceType::Url,
        title,
        name: None,
        page: None,
        text,
    })
}

/// Fetch Wikipedia article extracts via the MediaWiki API;
/// `source_id` is `Wikipedia:<query>`.
pub async fn load_from_wikipedia(items: &[WikipediaSource]) -> Vec<Document> {
    let mut docs = Vec::new();
    for item in items {
        match fetch_wikipedia(item).await {
            Ok(doc) => docs.push(doc),
            Err(e) => {
                warn!(query = %item.query, error = %e, "failed to load Wikipedia article, skipping")
            }
        }
    }
    docs
}

async fn fetch_wikipedia(item: &WikipediaSource) -> Result<Document> {
    debug!(query = %item.query, lang = %item.lang, "fetching Wikipedia article");
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
        .build()?;

    let api = format!("https://{}.wikipedia.org/w/api.php", item.lang);
    let response = client
        .get(&api)
        .query(&[
            ("action", "query"),
            ("prop", "extracts"),
            ("explaintext", "1"),
            ("redirects", "1"),
            ("format", "json"),
            ("titles", item.query.as_str()),
        ])
        .send()
        .await?
        .error_for_status()?;

    let json: serde_json::Value = response.json().await?;
    let pages = json
        .pointer("/query/pages")
        .and_then(|p| p.as_object())
        .ok_or_else(|| anyhow!("unexpected Wikipedia API response"))?;

    let page = pages
        .values()
        .next()
        .ok_or_else(|| anyhow!("no page in Wikipedia API response"))?;
    let extract = page
        .get("extract")
        .and_then(|e| e.as_str())
        .ok_or_else(|| anyhow!("article has no extract (missing page?)"))?;
    let title = page.get("title").and_then(|t| t.as_str()).map(String::from);

    let text = clean_text(extract);
    if text.is_empty() {
        return Err(anyhow!("article extract was empty"));
    }

    Ok(Document {
        source_id: format!("Wikipedia:{}", item.query),
        source_type: SourceType::Wiki,
        title,
        name: None,
        page: None,
        text,
    })
}

/// Extract text from local PDFs, one [`Document`] per page;
/// `source_id` is the resolved file path.
pub fn load_from_pdfs(paths: &[PathBuf]) -> Vec<Document> {
    let mut docs = Vec::new();
    for path in paths {
        if !path.exists() {
            warn!(path = %path.display(), "PDF not found, skipping");
            continue;
        }
        match load_pdf(path) {
            Ok(pages) => docs.extend(pages),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to load PDF, skipping"),
        }
    }
    docs
}

fn load_pdf(path: &Path) -> Result<Vec<Document>> {
    debug!(path = %path.display(), "extracting PDF text");
    let text = pdf_extract::extract_text(path)
        .map_err(|e| anyhow!("PDF extraction failed: {}", e))?;

    let source_id = std::fs::canonicalize(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .context("PDF path has no file name")?;

    // pdf-extract separates pages with form feeds
    let mut docs = Vec::new();
    for (i, page_text) in text.split('\u{c}').enumerate() {
        let cleaned = clean_text(page_text);
        if cleaned.is_empty() {
            continue;
        }
        docs.push(Document {
            source_id: source_id.clone(),
            source_type: SourceType::Pdf,
            title: None,
            name: Some(name.clone()),
            page: Some(i as i64),
            text: cleaned,
        });
    }

    if docs.is_empty() {
        return Err(anyhow!("PDF contained no extractable text"));
    }
    Ok(docs)
}

// ============ Text normalization ============

/// Normalize whitespace: CRLF to LF, runs of blank lines to one blank line,
/// runs of spaces/tabs to a single space, trimmed.
pub fn clean_text(text: &str) -> String {
    let text = text.replace("\r\n", "\n");

    let mut out = String::with_capacity(text.len());
    let mut newlines = 0usize;
    let mut spaces = false;

    for ch in text.chars() {
        match ch {
            '\n' => {
                newlines += 1;
                spaces = false;
                if newlines <= 2 {
                    out.push('\n');
                }
            }
            ' ' | '\t' => {
                if !spaces {
                    out.push(' ');
                    spaces = true;
                }
            }
            _ => {
                newlines = 0;
                spaces = false;
                out.push(ch);
            }
        }
    }

    out.trim().to_string()
}

/// Strip HTML down to visible text: drops tags plus `<script>`/`<style>`
/// contents, decodes the common entities. Crude by design — web loading is
/// thin I/O, not a rendering engine.
pub fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len() / 2);
    // ASCII lowering keeps byte offsets aligned with the original
    let lower = html.to_ascii_lowercase();
    let mut skip_until: Option<&'static str> = None;
    let mut in_tag = false;

    for (i, ch) in html.char_indices() {
        if let Some(end_tag) = skip_until {
            if ch == '<' && lower[i..].starts_with(end_tag) {
                skip_until = None;
                in_tag = true;
            }
            continue;
        }

        match ch {
            '<' => {
                if lower[i..].starts_with("<script") {
                    skip_until = Some("</script");
                } else if lower[i..].starts_with("<style") {
                    skip_until = Some("</style");
                } else {
                    in_tag = true;
                    // Block-level tags become line breaks so words don't fuse
                    if lower[i..].starts_with("<p")
                        || lower[i..].starts_with("<br")
                        || lower[i..].starts_with("<div")
                        || lower[i..].starts_with("<li")
                        || lower[i..].starts_with("<h")
                    {
                        out.push('\n');
                    }
                }
            }
            '>' => {
                if in_tag {
                    in_tag = false;
                } else {
                    out.push(ch);
                }
            }
            _ if in_tag => {}
            _ => out.push(ch),
        }
    }

    out.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

fn extract_title(html: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let start = lower.find("<title")?;
    let open_end = html[start..].find('>')? + start + 1;
    let close = lower[open_end..].find("</title>")? + open_end;
    let title = clean_text(&html[open_end..close]);
    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}
