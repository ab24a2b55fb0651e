//! Content-addressed fingerprint ledger.
//!
//! The ledger is the dedup gate in front of a vector index: it maps the
//! fingerprint of every indexed chunk to that chunk's metadata, persisted as
//! line-delimited JSON (`ledger.jsonl`) inside the index directory. A chunk
//! is in the index if and only if its fingerprint is in the ledger, which is
//! what makes re-ingesting the same documents a no-op.
//!
//! Fingerprints are SHA-256 over the chunk's source name plus its
//! whitespace-normalized text, so re-extraction jitter (line wrapping,
//! indentation) does not defeat dedup, while the same boilerplate paragraph
//! in two different files stays retrievable under both sources.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::error::{DocChatError, Result};
use crate::models::Metadata;

/// Ledger filename inside an index directory.
pub const LEDGER_FILE: &str = "ledger.jsonl";

/// Compute the dedup fingerprint for a chunk of text.
///
/// Deterministic: the same source and normalized text always produce the
/// same fingerprint, regardless of when or where it is computed.
pub fn fingerprint(source: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(b"\n");
    hasher.update(normalize(text).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Collapse runs of whitespace to single spaces and trim the ends.
fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// One persisted ledger line.
#[derive(Debug, Serialize, Deserialize)]
struct LedgerRecord {
    fingerprint: String,
    #[serde(default)]
    metadata: Metadata,
}

/// Persisted set of fingerprints for one index directory.
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
    entries: BTreeMap<String, Metadata>,
}

impl Ledger {
    /// Read the ledger for `index_dir`, or start an empty one if the
    /// directory has no ledger file yet (first run, or an index written
    /// before ledgers existed).
    pub fn load(index_dir: &Path) -> Result<Self> {
        let path = index_dir.join(LEDGER_FILE);
        let mut entries = BTreeMap::new();

        if path.is_file() {
            let file = fs::File::open(&path).map_err(|e| DocChatError::storage(&path, e))?;
            for line in BufReader::new(file).lines() {
                let line = line.map_err(|e| DocChatError::storage(&path, e))?;
                if line.trim().is_empty() {
                    continue;
                }
                let record: LedgerRecord = serde_json::from_str(&line).map_err(|e| {
                    DocChatError::storage(&path, format!("malformed ledger line: {}", e))
                })?;
                entries.insert(record.fingerprint, record.metadata);
            }
        }

        Ok(Self { path, entries })
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        self.entries.contains_key(fingerprint)
    }

    /// Insert a fingerprint if absent. Returns whether it was newly
    /// inserted; re-recording a known fingerprint is a silent no-op.
    pub fn record(&mut self, fingerprint: String, metadata: Metadata) -> bool {
        match self.entries.entry(fingerprint) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(metadata);
                true
            }
            std::collections::btree_map::Entry::Occupied(_) => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write all entries to a temp file in the index directory, then rename
    /// it over `ledger.jsonl` so readers never observe a partial file.
    pub fn persist(&self) -> Result<()> {
        let tmp = self.path.with_extension("jsonl.tmp");
        {
            let file = fs::File::create(&tmp).map_err(|e| DocChatError::storage(&tmp, e))?;
            let mut writer = std::io::BufWriter::new(file);
            for (fingerprint, metadata) in &self.entries {
                let record = LedgerRecord {
                    fingerprint: fingerprint.clone(),
                    metadata: metadata.clone(),
                };
                let line = serde_json::to_string(&record)
                    .map_err(|e| DocChatError::storage(&self.path, e))?;
                writeln!(writer, "{}", line).map_err(|e| DocChatError::storage(&tmp, e))?;
            }
            writer.flush().map_err(|e| DocChatError::storage(&tmp, e))?;
        }
        fs::rename(&tmp, &self.path).map_err(|e| DocChatError::storage(&self.path, e))?;
        Ok(())
    }
}
