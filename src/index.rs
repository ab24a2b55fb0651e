//! On-disk vector index, one per session directory.
//!
//! [`VectorIndexManager`] owns the pair of files that make up an index:
//!
//! - `index.json` — the vectors themselves, with chunk text and metadata
//! - `ledger.jsonl` — fingerprints of everything indexed (see [`crate::ledger`])
//!
//! Every mutation goes through [`VectorIndexManager::add_documents`], which
//! deduplicates against the ledger, embeds only net-new chunks, and persists
//! both files before updating in-memory state. The index file is always
//! written first: a crash between the two writes leaves index entries the
//! ledger has not recorded, and the load path rolls that forward by
//! re-recording them. The pair therefore never diverges in a way a reload
//! cannot repair.
//!
//! Reads go through [`Retriever`], an immutable snapshot handle that stays
//! valid (and unchanged) while later uploads grow the index.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, OnceLock};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};

use crate::embedding::{cosine_similarity, EmbeddingService};
use crate::error::{DocChatError, Result};
use crate::ledger::{fingerprint, Ledger};
use crate::models::{Chunk, Metadata, SearchHit};

/// File holding the persisted vectors inside an index directory.
pub const INDEX_FILE: &str = "index.json";

/// Bumped when the persisted layout changes incompatibly.
const INDEX_VERSION: u32 = 1;

/// One indexed chunk: everything needed to score and return it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub fingerprint: String,
    pub text: String,
    pub metadata: Metadata,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedIndex {
    version: u32,
    dims: usize,
    entries: Vec<IndexEntry>,
}

// ============ Index manager ============

/// Owner of a single on-disk vector index and its fingerprint ledger.
#[derive(Debug)]
pub struct VectorIndexManager {
    index_dir: PathBuf,
    embedder: Arc<dyn EmbeddingService>,
    entries: Vec<IndexEntry>,
    ledger: Ledger,
    dims: Option<usize>,
}

impl VectorIndexManager {
    /// Load the index at `index_dir`, creating the directory (and an empty
    /// index) if nothing is there yet.
    ///
    /// Optional seed texts are added through the same dedup path as
    /// [`Self::add_documents`], so seeding an existing index is a no-op for
    /// texts it already contains. `seed_metadatas`, when given, must be
    /// parallel to `seed_texts`.
    pub async fn load_or_create(
        index_dir: impl Into<PathBuf>,
        embedder: Arc<dyn EmbeddingService>,
        seed_texts: Option<Vec<String>>,
        seed_metadatas: Option<Vec<Metadata>>,
    ) -> Result<Self> {
        let index_dir = index_dir.into();
        fs::create_dir_all(&index_dir).map_err(|e| DocChatError::storage(&index_dir, e))?;

        let mut manager = Self::open_at(&index_dir, embedder)?;

        if let Some(texts) = seed_texts {
            let metadatas = match seed_metadatas {
                Some(m) if m.len() != texts.len() => {
                    return Err(DocChatError::Config(format!(
                        "{} seed metadata entries for {} seed texts",
                        m.len(),
                        texts.len()
                    )));
                }
                Some(m) => m,
                None => vec![Metadata::new(); texts.len()],
            };
            let chunks: Vec<Chunk> = texts
                .into_iter()
                .zip(metadatas)
                .map(|(text, metadata)| Chunk::new(text, metadata))
                .collect();
            manager.add_documents(&chunks).await?;
        }

        Ok(manager)
    }

    /// Open an index that must already exist.
    ///
    /// This is the retrieval path: it never creates directories or files, and
    /// a missing index file means the session was never ingested (or its
    /// storage is gone), reported as [`DocChatError::IndexNotFound`].
    pub fn open_existing(
        index_dir: impl Into<PathBuf>,
        embedder: Arc<dyn EmbeddingService>,
    ) -> Result<Self> {
        let index_dir = index_dir.into();
        if !index_dir.join(INDEX_FILE).exists() {
            return Err(DocChatError::IndexNotFound { path: index_dir });
        }
        Self::open_at(&index_dir, embedder)
    }

    fn open_at(index_dir: &Path, embedder: Arc<dyn EmbeddingService>) -> Result<Self> {
        let (entries, dims) = match read_index(index_dir)? {
            Some(persisted) => {
                let dims = (persisted.dims > 0).then_some(persisted.dims);
                (persisted.entries, dims)
            }
            None => (Vec::new(), None),
        };

        let mut ledger = Ledger::load(index_dir)?;

        // Roll forward after a crash between the index write and the ledger
        // write: any persisted entry the ledger has not seen gets recorded
        // now, restoring the index ⇔ ledger invariant.
        let mut healed = 0usize;
        for entry in &entries {
            if ledger.record(entry.fingerprint.clone(), entry.metadata.clone()) {
                healed += 1;
            }
        }
        if healed > 0 {
            ledger.persist()?;
            info!(
                index_dir = %index_dir.display(),
                healed, "reconciled ledger with persisted index"
            );
        }

        Ok(Self {
            index_dir: index_dir.to_path_buf(),
            embedder,
            entries,
            ledger,
            dims,
        })
    }

    /// Embed and append every chunk not already in the index.
    ///
    /// Returns how many chunks were actually added. Chunks whose fingerprint
    /// is already in the ledger (or repeats within the batch) are skipped
    /// without contacting the embedding service; a fully-duplicate call
    /// returns `Ok(0)` near-instantly. On any error the in-memory and
    /// persisted state both remain as they were before the call.
    pub async fn add_documents(&mut self, chunks: &[Chunk]) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let mut seen: HashSet<String> = HashSet::new();
        let mut fresh: Vec<(String, &Chunk)> = Vec::new();
        for chunk in chunks {
            let fp = fingerprint(chunk.source(), &chunk.text);
            if self.ledger.contains(&fp) || seen.contains(&fp) {
                continue;
            }
            seen.insert(fp.clone());
            fresh.push((fp, chunk));
        }

        let added = fresh.len();
        let skipped = chunks.len() - added;
        if fresh.is_empty() {
            debug!(
                index_dir = %self.index_dir.display(),
                skipped, "all chunks already indexed"
            );
            return Ok(0);
        }

        let texts: Vec<String> = fresh.iter().map(|(_, c)| c.text.clone()).collect();
        let embeddings = self.embedder.embed_documents(&texts).await?;

        if embeddings.len() != fresh.len() {
            return Err(DocChatError::Embedding(format!(
                "embedding service returned {} vectors for {} texts",
                embeddings.len(),
                fresh.len()
            )));
        }
        let dims = match self.dims.or_else(|| embeddings.first().map(|e| e.len())) {
            Some(d) if d > 0 => d,
            _ => {
                return Err(DocChatError::Embedding(
                    "embedding service returned empty vectors".to_string(),
                ));
            }
        };
        for embedding in &embeddings {
            if embedding.len() != dims {
                return Err(DocChatError::Embedding(format!(
                    "embedding dimension {} does not match index dimension {}",
                    embedding.len(),
                    dims
                )));
            }
        }

        // Stage the next state without touching `self`, persist index then
        // ledger, and only then commit. If anything fails (or the future is
        // dropped at the embed await above), memory still matches the last
        // persisted snapshot and the call can simply be retried.
        let mut entries = self.entries.clone();
        let mut ledger = self.ledger.clone();
        for ((fp, chunk), embedding) in fresh.iter().zip(embeddings) {
            ledger.record(fp.clone(), chunk.metadata.clone());
            entries.push(IndexEntry {
                fingerprint: fp.clone(),
                text: chunk.text.clone(),
                metadata: chunk.metadata.clone(),
                embedding,
            });
        }

        let next = PersistedIndex {
            version: INDEX_VERSION,
            dims,
            entries,
        };
        write_index(&self.index_dir, &next)?;
        ledger.persist()?;

        self.entries = next.entries;
        self.ledger = ledger;
        self.dims = Some(dims);

        info!(
            index_dir = %self.index_dir.display(),
            added, skipped,
            model = self.embedder.model_name(),
            "chunks added to index"
        );
        Ok(added)
    }

    /// Snapshot handle for similarity search over the current entries.
    ///
    /// The snapshot is immutable: adds that happen after this call are not
    /// visible through it (take a fresh retriever to see them), so readers
    /// never observe a half-applied update.
    pub fn as_retriever(&self, top_k: usize) -> Retriever {
        Retriever {
            entries: Arc::new(self.entries.clone()),
            embedder: Arc::clone(&self.embedder),
            top_k: top_k.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }
}

fn read_index(index_dir: &Path) -> Result<Option<PersistedIndex>> {
    let path = index_dir.join(INDEX_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(&path).map_err(|e| DocChatError::storage(&path, e))?;
    let persisted: PersistedIndex = serde_json::from_str(&raw)
        .map_err(|e| DocChatError::storage(&path, format!("corrupt index file: {}", e)))?;
    if persisted.version != INDEX_VERSION {
        return Err(DocChatError::storage(
            &path,
            format!(
                "unsupported index version {} (expected {})",
                persisted.version, INDEX_VERSION
            ),
        ));
    }
    Ok(Some(persisted))
}

/// Write the index file atomically: serialize to a sibling temp file, then
/// rename over the real one.
fn write_index(index_dir: &Path, index: &PersistedIndex) -> Result<()> {
    let path = index_dir.join(INDEX_FILE);
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string(index).map_err(|e| DocChatError::storage(&path, e))?;
    fs::write(&tmp, json).map_err(|e| DocChatError::storage(&tmp, e))?;
    fs::rename(&tmp, &path).map_err(|e| DocChatError::storage(&path, e))?;
    Ok(())
}

// ============ Retriever ============

/// Read-only similarity search over a point-in-time snapshot of an index.
///
/// Cheap to clone and safe to share across tasks; holds no lock.
#[derive(Clone)]
pub struct Retriever {
    entries: Arc<Vec<IndexEntry>>,
    embedder: Arc<dyn EmbeddingService>,
    top_k: usize,
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("entries", &self.entries.len())
            .field("top_k", &self.top_k)
            .finish_non_exhaustive()
    }
}

impl Retriever {
    /// Return the `top_k` most similar chunks to `query`, best first.
    ///
    /// Ties break on fingerprint so the order is stable across runs. An
    /// empty index yields an empty result rather than an error.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        if self.entries.is_empty() {
            return Ok(Vec::new());
        }

        let query_vec = self.embedder.embed_query(query).await?;

        let mut scored: Vec<(f32, &IndexEntry)> = self
            .entries
            .iter()
            .map(|entry| (cosine_similarity(&query_vec, &entry.embedding), entry))
            .collect();
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.1.fingerprint.cmp(&b.1.fingerprint))
        });
        scored.truncate(self.top_k);

        Ok(scored
            .into_iter()
            .map(|(score, entry)| SearchHit {
                text: entry.text.clone(),
                metadata: entry.metadata.clone(),
                score,
            })
            .collect())
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============ Per-directory write lock ============

static INDEX_LOCKS: OnceLock<StdMutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>> = OnceLock::new();

/// Process-wide mutation lock for one index directory.
///
/// Writers hold this across the whole embed→append→record→persist sequence,
/// so concurrent uploads into the same session serialize while different
/// sessions proceed in parallel. Paths are compared as given (the directory
/// may not exist yet, so no canonicalization); callers must resolve them
/// through the same configuration for the keys to match.
pub fn directory_lock(index_dir: &Path) -> Arc<AsyncMutex<()>> {
    let locks = INDEX_LOCKS.get_or_init(|| StdMutex::new(HashMap::new()));
    let mut map = match locks.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    Arc::clone(
        map.entry(index_dir.to_path_buf())
            .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
    )
}
