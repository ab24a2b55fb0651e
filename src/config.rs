use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{DocChatError, Result};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    500
}
fn default_chunk_overlap() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Base directory for staged uploads; each session gets a subdirectory.
    #[serde(default = "default_temp_base")]
    pub temp_base: PathBuf,
    /// Base directory for vector indexes; each session gets a subdirectory.
    #[serde(default = "default_index_base")]
    pub index_base: PathBuf,
    /// When false, both bases are used directly with no per-session
    /// subdirectories (single-tenant mode).
    #[serde(default = "default_use_session_dirs")]
    pub use_session_dirs: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            temp_base: default_temp_base(),
            index_base: default_index_base(),
            use_session_dirs: default_use_session_dirs(),
        }
    }
}

fn default_temp_base() -> PathBuf {
    PathBuf::from("data")
}
fn default_index_base() -> PathBuf {
    PathBuf::from("index_store")
}
fn default_use_session_dirs() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Number of chunks handed to the LLM per question.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// One of `openai`, `ollama`, or `fake`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Base URL override (OpenAI-compatible gateways, remote Ollama).
    #[serde(default)]
    pub url: Option<String>,
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
            provider: default_embedding_provider(),
            model: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "fake".to_string()
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
pub struct LlmConfig {
    /// One of `openai`, `ollama`, or `fake`.
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Base URL override (OpenAI-compatible gateways, remote Ollama).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: None,
            url: None,
            max_retries: default_max_retries(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_llm_provider() -> String {
    "fake".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    120
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

impl Config {
    /// Reject settings that would make the pipeline misbehave at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            return Err(DocChatError::Config(
                "chunking.chunk_size must be > 0".to_string(),
            ));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(DocChatError::Config(format!(
                "chunking.chunk_overlap ({}) must be < chunking.chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if self.retrieval.top_k == 0 {
            return Err(DocChatError::Config(
                "retrieval.top_k must be >= 1".to_string(),
            ));
        }

        match self.embedding.provider.as_str() {
            "openai" | "ollama" => {
                if self.embedding.model.as_deref().unwrap_or("").is_empty() {
                    return Err(DocChatError::Config(format!(
                        "embedding.model must be set when provider is '{}'",
                        self.embedding.provider
                    )));
                }
            }
            "fake" => {}
            other => {
                return Err(DocChatError::Config(format!(
                    "unknown embedding provider: '{}'. Must be openai, ollama, or fake.",
                    other
                )));
            }
        }

        match self.llm.provider.as_str() {
            "openai" | "ollama" => {
                if self.llm.model.as_deref().unwrap_or("").is_empty() {
                    return Err(DocChatError::Config(format!(
                        "llm.model must be set when provider is '{}'",
                        self.llm.provider
                    )));
                }
            }
            "fake" => {}
            other => {
                return Err(DocChatError::Config(format!(
                    "unknown llm provider: '{}'. Must be openai, ollama, or fake.",
                    other
                )));
            }
        }

        if self.embedding.batch_size == 0 {
            return Err(DocChatError::Config(
                "embedding.batch_size must be >= 1".to_string(),
            ));
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        DocChatError::Config(format!("failed to read config file {}: {}", path.display(), e))
    })?;

    let config: Config = toml::from_str(&content).map_err(|e| {
        DocChatError::Config(format!("failed to parse config file {}: {}", path.display(), e))
    })?;

    config.validate()?;
    Ok(config)
}

/// Load the config file if present, otherwise fall back to built-in defaults.
///
/// The defaults run fully offline (fake providers), so a fresh checkout works
/// without any configuration.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.is_file() {
        load_config(path)
    } else {
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }
}
