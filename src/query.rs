//! Query pre-processing: cleanup, classification, keywords, and optional
//! model-backed expansion.
//!
//! Cleanup, classification, and keyword extraction are pure string work.
//! Expansion asks the configured answer model to rewrite the query into a
//! more retrieval-friendly form; if the call fails, the original cleaned
//! query is used so a flaky model never blocks retrieval.

use tracing::warn;

use crate::answer::AnswerGenerator;

const EXPAND_SYSTEM_PROMPT: &str = "Rewrite the user's query into a clearer and more detailed \
research-oriented form. Reply with the rewritten query only, no preamble.";

/// Coarse intent of a question. Checked in order: a query mentioning both
/// "process" and "why" reads as procedural.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Procedural,
    Conceptual,
    Factual,
    Generic,
}

/// A query after pre-processing: what the user typed (cleaned), what gets
/// embedded (expanded), and the derived intent and content words.
#[derive(Debug, Clone)]
pub struct ProcessedQuery {
    pub cleaned: String,
    pub expanded: String,
    pub kind: QueryKind,
    pub keywords: Vec<String>,
}

/// Normalize a raw query: collapse whitespace, trim, strip control chars.
pub fn clean_query(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut spaces = false;
    for ch in raw.chars() {
        if ch.is_control() {
            continue;
        }
        if ch.is_whitespace() {
            if !spaces && !out.is_empty() {
                out.push(' ');
                spaces = true;
            }
        } else {
            spaces = false;
            out.push(ch);
        }
    }
    out.trim().to_string()
}

/// Classify a question by the phrases it contains.
pub fn classify_query(query: &str) -> QueryKind {
    let lower = query.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));

    if has(&["steps", "process", "how to"]) {
        QueryKind::Procedural
    } else if has(&["why", "how", "explain", "describe"]) {
        QueryKind::Conceptual
    } else if has(&["when", "where", "who", "what", "which"]) {
        QueryKind::Factual
    } else {
        QueryKind::Generic
    }
}

/// Content words of the query: lowercase, stopwords removed, deduplicated
/// in first-seen order.
pub fn extract_keywords(query: &str) -> Vec<String> {
    const STOPWORDS: &[&str] = &[
        "a", "an", "the", "is", "are", "was", "were", "be", "been", "do", "does", "did", "what",
        "which", "who", "whom", "how", "when", "where", "why", "can", "could", "should", "would",
        "of", "in", "on", "at", "to", "for", "with", "and", "or", "not", "between", "about", "it",
        "its", "this", "that", "i", "you", "we", "they",
    ];

    let mut seen = Vec::new();
    for word in query.split_whitespace() {
        let cleaned: String = word
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '-')
            .collect::<String>()
            .to_lowercase();
        if cleaned.is_empty() || STOPWORDS.contains(&cleaned.as_str()) {
            continue;
        }
        if !seen.contains(&cleaned) {
            seen.push(cleaned);
        }
    }
    seen
}

/// Rewrite a query through the answer model. Falls back to the input
/// unchanged when the model call fails.
pub async fn expand_query(generator: &dyn AnswerGenerator, query: &str) -> String {
    match generator.complete(EXPAND_SYSTEM_PROMPT, query).await {
        Ok(rewritten) => {
            let rewritten = clean_query(&rewritten);
            if rewritten.is_empty() {
                query.to_string()
            } else {
                rewritten
            }
        }
        Err(e) => {
            warn!(error = %e, "query expansion failed; using original query");
            query.to_string()
        }
    }
}

/// Clean, classify, and extract keywords; when `expand` is set, additionally
/// rewrite the cleaned query through the answer model.
pub async fn process_query(
    generator: &dyn AnswerGenerator,
    raw: &str,
    expand: bool,
) -> ProcessedQuery {
    let cleaned = clean_query(raw);
    let kind = classify_query(&cleaned);
    let keywords = extract_keywords(&cleaned);

    let expanded = if expand && !cleaned.is_empty() {
        expand_query(generator, &cleaned).await
    } else {
        cleaned.clone()
    };

    ProcessedQuery {
        cleaned,
        expanded,
        kind,
        keywords,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{bail, Result};
    use async_trait::async_trait;

    struct FixedGenerator(&'static str);

    #[async_trait]
    impl AnswerGenerator for FixedGenerator {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl AnswerGenerator for FailingGenerator {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
            bail!("model unavailable")
        }
    }

    #[test]
    fn test_clean_query() {
        assert_eq!(clean_query("  what   is\tRAG?\n"), "what is RAG?");
        assert_eq!(clean_query(""), "");
        assert_eq!(clean_query("\u{1}ok\u{2}"), "ok");
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify_query("What are the steps to build an index?"), QueryKind::Procedural);
        assert_eq!(classify_query("Explain vector embeddings"), QueryKind::Conceptual);
        assert_eq!(classify_query("When was Rust released?"), QueryKind::Factual);
        assert_eq!(classify_query("retrieval augmented generation"), QueryKind::Generic);
        // "how to" reads as procedural even though "how" alone is conceptual
        assert_eq!(classify_query("how to chunk documents"), QueryKind::Procedural);
    }

    #[test]
    fn test_extract_keywords() {
        let kw = extract_keywords("What is the difference between RAG and fine-tuning?");
        assert_eq!(kw, vec!["difference", "rag", "fine-tuning"]);
    }

    #[tokio::test]
    async fn test_expansion_uses_model_rewrite() {
        let generator = FixedGenerator("detailed chunking overview");
        let processed = process_query(&generator, "What  is chunking?", true).await;
        assert_eq!(processed.cleaned, "What is chunking?");
        assert_eq!(processed.expanded, "detailed chunking overview");
        assert_eq!(processed.kind, QueryKind::Factual);
    }

    #[tokio::test]
    async fn test_expansion_falls_back_on_model_failure() {
        let processed = process_query(&FailingGenerator, "What is chunking?", true).await;
        assert_eq!(processed.expanded, "What is chunking?");
    }

    #[tokio::test]
    async fn test_expansion_disabled_only_cleans() {
        let generator = FixedGenerator("should not be used");
        let processed = process_query(&generator, "What  is chunking?", false).await;
        assert_eq!(processed.expanded, "What is chunking?");
    }

    #[tokio::test]
    async fn test_blank_rewrite_keeps_original() {
        let generator = FixedGenerator("   ");
        let processed = process_query(&generator, "What is chunking?", true).await;
        assert_eq!(processed.expanded, "What is chunking?");
    }
}
