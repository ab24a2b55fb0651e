//! Error taxonomy for the ingestion and retrieval pipeline.
//!
//! Every failure is tagged with a kind so callers can branch without string
//! matching:
//!
//! | Variant | Meaning | Retry the call? |
//! |---------|---------|-----------------|
//! | [`Config`](DocChatError::Config) | Invalid settings or an uncreatable base directory | no — fix configuration |
//! | [`Staging`](DocChatError::Staging) | Unsafe filename, unsupported file type, temp-file I/O, empty upload set | no — fix the input |
//! | [`Extract`](DocChatError::Extract) | A staged file could not be parsed into text | yes — the whole ingestion call is safe to re-run |
//! | [`Embedding`](DocChatError::Embedding) | Embedding provider failed after retries | yes — dedup makes the retry cheap |
//! | [`Llm`](DocChatError::Llm) | Completion provider failed after retries | yes |
//! | [`Storage`](DocChatError::Storage) | Index/ledger file read, write, or parse failure | depends on the cause |
//! | [`IndexNotFound`](DocChatError::IndexNotFound) | An index directory expected to exist is absent | no |
//! | [`NotReady`](DocChatError::NotReady) | Retriever used before it was loaded | no — load first |
//!
//! The `Display` output of every variant is a flat, human-readable message
//! safe to hand to external callers; paths and session ids are embedded in
//! the message rather than exposed as stack traces.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DocChatError>;

#[derive(Debug, Error)]
pub enum DocChatError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("staging failed: {0}")]
    Staging(String),

    #[error("document extraction failed: {0}")]
    Extract(String),

    #[error("embedding request failed: {0}")]
    Embedding(String),

    #[error("completion request failed: {0}")]
    Llm(String),

    #[error("storage failure at {path}: {message}")]
    Storage { path: PathBuf, message: String },

    #[error("no index found at {path}")]
    IndexNotFound { path: PathBuf },

    #[error("retriever not initialized for session {session_id}")]
    NotReady { session_id: String },
}

impl DocChatError {
    /// Shorthand for a [`Storage`](DocChatError::Storage) error carrying the
    /// offending path.
    pub fn storage(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        DocChatError::Storage {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Whether re-running the failed ingestion call is a sensible response.
    ///
    /// Dedup makes a full re-ingest idempotent, so provider and extraction
    /// failures are safe to retry; configuration and input errors are not.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DocChatError::Extract(_) | DocChatError::Embedding(_) | DocChatError::Llm(_)
        )
    }
}
