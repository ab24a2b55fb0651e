//! Ingestion pipeline orchestration.
//!
//! Coordinates the full upload flow: staging → extraction → chunking →
//! embedding → index update. Phases run in order and the first failure
//! aborts the call; nothing is retried here because dedup makes re-invoking
//! the whole pipeline safe and cheap.
//!
//! The index mutation (embed, append, record, persist) runs under the
//! per-directory lock from [`crate::index`], so concurrent uploads into the
//! same session serialize while separate sessions proceed in parallel.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::chunk::split_documents;
use crate::config::Config;
use crate::embedding::EmbeddingService;
use crate::error::{DocChatError, Result};
use crate::extract::extract_text;
use crate::index::{directory_lock, Retriever, VectorIndexManager};
use crate::models::{Document, Upload};
use crate::session::{generate_session_id, resolve_dirs};

/// What one ingestion run produced.
#[derive(Debug)]
pub struct IngestOutcome {
    pub session_id: String,
    pub files_staged: usize,
    pub chunks_total: usize,
    /// Net-new chunks actually embedded and persisted; `0` for a re-upload.
    pub chunks_added: usize,
    pub retriever: Retriever,
}

/// Coordinates uploads into per-session vector indexes.
pub struct ChatIngestor {
    config: Config,
    embedder: Arc<dyn EmbeddingService>,
}

impl ChatIngestor {
    pub fn new(config: Config, embedder: Arc<dyn EmbeddingService>) -> Self {
        Self { config, embedder }
    }

    /// Run the whole pipeline for one batch of uploads.
    ///
    /// Pass an existing `session_id` to add to that session's index, or
    /// `None` to allocate a fresh session. Safe to re-invoke after a
    /// failure: already-indexed chunks are skipped by fingerprint.
    pub async fn ingest_files(
        &self,
        session_id: Option<&str>,
        files: &[Upload],
    ) -> Result<IngestOutcome> {
        if files.is_empty() {
            return Err(DocChatError::Staging("no files to ingest".to_string()));
        }

        let session_id = match session_id {
            Some(id) => id.to_string(),
            None => generate_session_id(),
        };
        let (temp_dir, index_dir) = resolve_dirs(
            &session_id,
            &self.config.storage.temp_base,
            &self.config.storage.index_base,
            self.config.storage.use_session_dirs,
        )?;

        debug!(session_id = %session_id, files = files.len(), "staging uploads");
        let staged = stage_files(&temp_dir, files)?;

        let documents = load_documents(&staged)?;
        let chunks = split_documents(
            &documents,
            self.config.chunking.chunk_size,
            self.config.chunking.chunk_overlap,
        )?;
        if chunks.is_empty() {
            return Err(DocChatError::Extract(format!(
                "no text content found in {} uploaded file(s)",
                files.len()
            )));
        }
        debug!(session_id = %session_id, chunks = chunks.len(), "documents split");

        let lock = directory_lock(&index_dir);
        let _guard = lock.lock().await;

        let mut manager =
            VectorIndexManager::load_or_create(&index_dir, Arc::clone(&self.embedder), None, None)
                .await?;
        let chunks_added = manager.add_documents(&chunks).await?;
        let retriever = manager.as_retriever(self.config.retrieval.top_k);

        info!(
            session_id = %session_id,
            files = staged.len(),
            chunks = chunks.len(),
            added = chunks_added,
            "ingestion complete"
        );

        Ok(IngestOutcome {
            session_id,
            files_staged: staged.len(),
            chunks_total: chunks.len(),
            chunks_added,
            retriever,
        })
    }

    /// CLI entry: read local files and run them through the same pipeline.
    pub async fn ingest_paths(
        &self,
        session_id: Option<&str>,
        paths: &[PathBuf],
    ) -> Result<IngestOutcome> {
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let filename = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.to_string())
                .ok_or_else(|| {
                    DocChatError::Staging(format!("unusable path: {}", path.display()))
                })?;
            let bytes = fs::read(path).map_err(|e| {
                DocChatError::Staging(format!("cannot read {}: {}", path.display(), e))
            })?;
            files.push(Upload::new(filename, bytes));
        }
        self.ingest_files(session_id, &files).await
    }
}

/// Write each upload into the session temp directory under its sanitized
/// original filename. Returns the staged paths in input order.
fn stage_files(temp_dir: &Path, files: &[Upload]) -> Result<Vec<PathBuf>> {
    let mut staged = Vec::with_capacity(files.len());
    for upload in files {
        let name = sanitize_filename(&upload.filename)?;
        let path = temp_dir.join(&name);
        // Write-then-rename so a concurrent upload into the same session
        // never exposes a half-written file to the extraction step.
        let tmp = temp_dir.join(format!(".{}.{}.tmp", name, Uuid::new_v4().simple()));
        fs::write(&tmp, &upload.bytes)
            .map_err(|e| DocChatError::Staging(format!("failed to stage {}: {}", name, e)))?;
        fs::rename(&tmp, &path)
            .map_err(|e| DocChatError::Staging(format!("failed to stage {}: {}", name, e)))?;
        debug!(file = %name, bytes = upload.bytes.len(), "staged upload");
        staged.push(path);
    }
    Ok(staged)
}

/// Reduce a client-supplied filename to its final path component.
///
/// Uploads name their files however they like; only the basename is
/// honored, so `../../etc/passwd` stages as `passwd` inside the temp
/// directory and nothing escapes it. Names with no usable component are
/// rejected outright.
fn sanitize_filename(filename: &str) -> Result<String> {
    let name = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");
    if name.is_empty() {
        return Err(DocChatError::Staging(format!(
            "unusable filename: {:?}",
            filename
        )));
    }
    if name != filename {
        debug!(original = %filename, staged = %name, "flattened upload filename");
    }
    Ok(name.to_string())
}

/// Parse every staged file into a document tagged with its source filename.
fn load_documents(staged: &[PathBuf]) -> Result<Vec<Document>> {
    let mut documents = Vec::with_capacity(staged.len());
    for path in staged {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let bytes = fs::read(path).map_err(|e| DocChatError::storage(path, e))?;
        let text = extract_text(&name, &bytes)?;
        documents.push(Document::new(text, name));
    }
    Ok(documents)
}
