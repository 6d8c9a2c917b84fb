use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub index: IndexConfig,
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Directory holding the persisted index and its manifest.
    pub dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub chunk_overlap: usize,
}

fn default_overlap() -> usize {
    0
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { k: default_k() }
    }
}

fn default_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

impl EmbeddingConfig {
    /// Stable identifier used in the parameter fingerprint. Derivable from
    /// configuration alone so staleness checks never need a live provider.
    pub fn model_id(&self) -> String {
        match self.provider.as_str() {
            "openai" => format!("openai:{}", self.model.as_deref().unwrap_or("")),
            "hash" => format!("hash:{}", self.dims.unwrap_or(0)),
            other => other.to_string(),
        }
    }
}

fn default_embedding_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Vector store backend: "flat" (single JSON file) or "sqlite".
    #[serde(default = "default_store_kind")]
    pub kind: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: default_store_kind(),
        }
    }
}

fn default_store_kind() -> String {
    "flat".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    /// Answer-generation backend: "disabled", "openai", or "ollama".
    #[serde(default = "default_model_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Base URL for the Ollama backend.
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_model_provider(),
            model: None,
            temperature: default_temperature(),
            base_url: default_ollama_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ModelConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_model_provider() -> String {
    "disabled".to_string()
}
fn default_temperature() -> f64 {
    0.0
}
fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct QueryConfig {
    /// Rewrite queries through the answer model before retrieval. Requires
    /// an enabled `[model]` provider; retrieval falls back to the original
    /// query if the rewrite call fails.
    #[serde(default)]
    pub expand: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

pub fn load_settings(path: &Path) -> Result<Settings> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let settings: Settings =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate chunking — fail fast, never silently clamp
    if settings.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if settings.chunking.chunk_overlap >= settings.chunking.chunk_size {
        anyhow::bail!(
            "chunking.chunk_overlap ({}) must be < chunking.chunk_size ({})",
            settings.chunking.chunk_overlap,
            settings.chunking.chunk_size
        );
    }

    if settings.retrieval.k == 0 {
        anyhow::bail!("retrieval.k must be >= 1");
    }

    // Validate embedding
    match settings.embedding.provider.as_str() {
        "disabled" => {}
        "openai" => {
            if settings.embedding.model.is_none() {
                anyhow::bail!("embedding.model must be specified when provider is 'openai'");
            }
            if settings.embedding.dims.is_none() || settings.embedding.dims == Some(0) {
                anyhow::bail!("embedding.dims must be > 0 when provider is 'openai'");
            }
        }
        "hash" => {
            if settings.embedding.dims.is_none() || settings.embedding.dims == Some(0) {
                anyhow::bail!("embedding.dims must be > 0 when provider is 'hash'");
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or hash.",
            other
        ),
    }

    match settings.store.kind.as_str() {
        "flat" | "sqlite" => {}
        other => anyhow::bail!(
            "Unknown store kind: '{}'. Must be flat or sqlite.",
            other
        ),
    }

    match settings.model.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown model provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    Ok(settings)
}
