//! Core data models used throughout doc-chat.
//!
//! These types represent the uploads, documents, chunks, and search results
//! that flow through the ingestion and retrieval pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Free-form string tags carried by documents and chunks.
///
/// A `BTreeMap` keeps serialized output stable across runs, which matters
/// because chunk metadata ends up in persisted index and ledger files.
pub type Metadata = BTreeMap<String, String>;

/// Metadata key holding the original filename a chunk came from.
pub const SOURCE_KEY: &str = "source";

/// One uploaded file presented to the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

/// A parsed source document before splitting.
#[derive(Debug, Clone)]
pub struct Document {
    pub text: String,
    pub metadata: Metadata,
}

impl Document {
    /// Build a document whose metadata records the given source name.
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert(SOURCE_KEY.to_string(), source.into());
        Self {
            text: text.into(),
            metadata,
        }
    }
}

/// A bounded slice of document text carried with its metadata.
///
/// Chunks are immutable once produced by the chunker and inherit their
/// document's metadata unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub metadata: Metadata,
}

impl Chunk {
    pub fn new(text: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            text: text.into(),
            metadata,
        }
    }

    /// The original filename this chunk came from, or `""` when untagged.
    pub fn source(&self) -> &str {
        self.metadata
            .get(SOURCE_KEY)
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// A scored result returned by a retriever.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub text: String,
    pub metadata: Metadata,
    pub score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_records_source() {
        let doc = Document::new("body", "notes.txt");
        assert_eq!(doc.metadata.get(SOURCE_KEY).map(String::as_str), Some("notes.txt"));
    }

    #[test]
    fn test_chunk_source_falls_back_to_empty() {
        let chunk = Chunk::new("text", Metadata::new());
        assert_eq!(chunk.source(), "");
    }
}
