//! Answer generation: the [`AnswerGenerator`] trait and its backends.
//!
//! Generation is strictly downstream of retrieval — backends receive the
//! already-retrieved context and never influence which chunks were chosen.
//! The **openai** backend uses the chat completions API; **ollama** talks to
//! a local Ollama daemon; **disabled** errors with a pointer at the config.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::config::ModelConfig;
use crate::models::RetrievalHit;

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant that answers questions using only the \
provided context. If the context does not contain the answer, say you don't know rather than \
guessing. Cite the sources you used by their source id.";

/// Capability interface for turning a question plus retrieved context into
/// prose.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Raw completion: system prompt + user prompt in, text out.
    async fn complete(&self, system: &str, user: &str) -> Result<String>;

    /// Answer a question grounded in retrieved chunks.
    async fn generate(&self, question: &str, hits: &[RetrievalHit]) -> Result<String> {
        let context = format_context(hits);
        let user = format!("Context:\n{}\n\nQuestion: {}", context, question);
        self.complete(SYSTEM_PROMPT, &user).await
    }
}

/// Render retrieved chunks as a context block, one section per chunk,
/// labeled with its source id.
pub fn format_context(hits: &[RetrievalHit]) -> String {
    hits.iter()
        .map(|h| format!("[source: {}]\n{}", h.chunk.source_id, h.chunk.text))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

/// Instantiate the configured generation backend.
pub fn create_generator(config: &ModelConfig) -> Result<Box<dyn AnswerGenerator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledGenerator)),
        "openai" => Ok(Box::new(OpenAiGenerator::new(config)?)),
        "ollama" => Ok(Box::new(OllamaGenerator::new(config)?)),
        other => bail!("Unknown model provider: {}", other),
    }
}

// ============ Disabled ============

pub struct DisabledGenerator;

#[async_trait]
impl AnswerGenerator for DisabledGenerator {
    async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
        bail!("Answer model is disabled. Set [model] provider in config, or use --sources-only.")
    }
}

// ============ OpenAI ============

/// Chat-completions backend. Requires `OPENAI_API_KEY`.
pub struct OpenAiGenerator {
    model: String,
    temperature: f64,
    timeout_secs: u64,
}

impl OpenAiGenerator {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("model.model required for OpenAI provider"))?;
        if std::env::var("OPENAI_API_KEY").is_err() {
            bail!("OPENAI_API_KEY environment variable not set");
        }
        Ok(Self {
            model,
            temperature: config.temperature,
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl AnswerGenerator for OpenAiGenerator {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let api_key =
            std::env::var("OPENAI_API_KEY").map_err(|_| anyhow!("OPENAI_API_KEY not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()?;

        debug!(model = %self.model, "calling OpenAI chat completions");
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        });

        let response = client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("OpenAI API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        json.pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(|s| s.trim().to_string())
            .ok_or_else(|| anyhow!("Invalid OpenAI response: missing message content"))
    }
}

// ============ Ollama ============

/// Local-model backend against an Ollama daemon.
pub struct OllamaGenerator {
    model: String,
    base_url: String,
    temperature: f64,
    timeout_secs: u64,
}

impl OllamaGenerator {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("model.model required for Ollama provider"))?;
        Ok(Self {
            model,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            temperature: config.temperature,
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl AnswerGenerator for OllamaGenerator {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()?;

        debug!(model = %self.model, url = %self.base_url, "calling Ollama");
        let body = serde_json::json!({
            "model": self.model,
            "system": system,
            "prompt": user,
            "stream": false,
            "options": {"temperature": self.temperature},
        });

        let response = client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Ollama error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        json.get("response")
            .and_then(|r| r.as_str())
            .map(|s| s.trim().to_string())
            .ok_or_else(|| anyhow!("Invalid Ollama response: missing response field"))
    }
}
