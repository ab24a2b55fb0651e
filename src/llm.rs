//! Chat completion service abstraction and implementations.
//!
//! The retrieval layer composes a prompt out of retrieved chunks and hands it
//! to a [`CompletionService`]:
//! - **[`OpenAiCompleter`]** — `POST {url}/v1/chat/completions`.
//! - **[`OllamaCompleter`]** — `POST {url}/api/chat` with streaming disabled.
//! - **[`FakeCompleter`]** — canned reply; no network. Default provider so
//!   the whole stack runs offline out of the box.
//!
//! Retry behavior matches the embedding clients: 429/5xx and network errors
//! back off and retry, other 4xx fail immediately. Failures surface as
//! [`DocChatError::Llm`].

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{DocChatError, Result};

/// Capability interface for turning a prompt into an answer.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Model identifier for logging (e.g. `"gpt-4o-mini"`).
    fn model_name(&self) -> &str;

    /// Generate a completion for a single user prompt.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

impl std::fmt::Debug for dyn CompletionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionService")
            .field("model", &self.model_name())
            .finish_non_exhaustive()
    }
}

/// Instantiate the completer named by the configuration.
pub fn create_completer(config: &LlmConfig) -> Result<Arc<dyn CompletionService>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiCompleter::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaCompleter::new(config)?)),
        "fake" => Ok(Arc::new(FakeCompleter::default())),
        other => Err(DocChatError::Config(format!(
            "unknown llm provider: '{}'. Must be openai, ollama, or fake.",
            other
        ))),
    }
}

// ============ OpenAI-compatible provider ============

/// Completer backed by an OpenAI-compatible chat completions API.
///
/// Requires the `OPENAI_API_KEY` environment variable. The base URL can be
/// overridden in config to point at a compatible gateway.
pub struct OpenAiCompleter {
    model: String,
    url: String,
    api_key: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OpenAiCompleter {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config.model.clone().ok_or_else(|| {
            DocChatError::Config("llm.model required for openai provider".to_string())
        })?;
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            DocChatError::Config("OPENAI_API_KEY environment variable not set".to_string())
        })?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com".to_string());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DocChatError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            model,
            url,
            api_key,
            client,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl CompletionService for OpenAiCompleter {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "user", "content": prompt }
            ],
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(format!("{}/v1/chat/completions", self.url))
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await.map_err(|e| {
                            DocChatError::Llm(format!("invalid chat response: {}", e))
                        })?;
                        return parse_openai_completion(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(DocChatError::Llm(format!(
                            "chat API error {}: {}",
                            status, body_text
                        )));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    return Err(DocChatError::Llm(format!(
                        "chat API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(DocChatError::Llm(format!("chat request failed: {}", e)));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| DocChatError::Llm("completion failed after retries".into())))
    }
}

/// Parse `choices[0].message.content` of an OpenAI chat completions response.
fn parse_openai_completion(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| DocChatError::Llm("invalid chat response: missing content".to_string()))
}

// ============ Ollama provider ============

/// Completer backed by a local Ollama instance (default url
/// `http://localhost:11434`). Streaming is disabled so the reply arrives as
/// one JSON object.
pub struct OllamaCompleter {
    model: String,
    url: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OllamaCompleter {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config.model.clone().ok_or_else(|| {
            DocChatError::Config("llm.model required for ollama provider".to_string())
        })?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DocChatError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            model,
            url,
            client,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl CompletionService for OllamaCompleter {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "user", "content": prompt }
            ],
            "stream": false,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(format!("{}/api/chat", self.url))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await.map_err(|e| {
                            DocChatError::Llm(format!("invalid Ollama response: {}", e))
                        })?;
                        return parse_ollama_completion(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(DocChatError::Llm(format!(
                            "Ollama API error {}: {}",
                            status, body_text
                        )));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    return Err(DocChatError::Llm(format!(
                        "Ollama API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(DocChatError::Llm(format!(
                        "Ollama connection error (is Ollama running at {}?): {}",
                        self.url, e
                    )));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| DocChatError::Llm("Ollama completion failed after retries".into())))
    }
}

fn parse_ollama_completion(json: &serde_json::Value) -> Result<String> {
    json.get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            DocChatError::Llm("invalid Ollama response: missing message content".to_string())
        })
}

// ============ Deterministic fake ============

/// Offline completer that returns a fixed reply whatever the prompt.
#[derive(Debug, Clone)]
pub struct FakeCompleter {
    reply: String,
}

impl FakeCompleter {
    pub fn with_reply(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
        }
    }
}

impl Default for FakeCompleter {
    fn default() -> Self {
        Self::with_reply("This is a canned answer.")
    }
}

#[async_trait]
impl CompletionService for FakeCompleter {
    fn model_name(&self) -> &str {
        "fake"
    }

    async fn complete(&self, _prompt: &str) -> Result<String> {
        Ok(self.reply.clone())
    }
}
