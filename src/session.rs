//! Session identity, per-session directories, and conversation history.
//!
//! A session ties three things together under one id:
//! - a temp directory where uploads are staged,
//! - an index directory holding the session's vector index,
//! - an in-memory conversation history ([`SessionStore`]).
//!
//! Ids look like `session_20250312_143055_K7Q2M9KW` — sortable by creation
//! time with a random tail wide enough that collisions are a non-issue even
//! under concurrent allocation. Directories are never deleted here; cleanup
//! belongs to the operator.

use chrono::Local;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use crate::error::{DocChatError, Result};

// ============ Session ids ============

/// Allocate a fresh session identifier.
///
/// Format: `session_<YYYYMMDD>_<HHMMSS>_<8 random base36 chars>`. Randomness
/// comes from a v4 UUID per call, so concurrent callers need no shared
/// counter.
pub fn generate_session_id() -> String {
    let now = Local::now();
    format!(
        "session_{}_{}",
        now.format("%Y%m%d_%H%M%S"),
        short_token(8)
    )
}

/// Uppercase base36 token drawn from a fresh v4 UUID. Eight chars carry
/// ~41 bits, comfortably collision-free at the scale of sessions.
fn short_token(width: usize) -> String {
    const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    let mut value = Uuid::new_v4().as_u128();
    (0..width)
        .map(|_| {
            let c = ALPHABET[(value % 36) as usize] as char;
            value /= 36;
            c
        })
        .collect()
}

// ============ Directory resolution ============

/// Resolve (and create) the temp and index directories for a session.
///
/// With `use_session_dirs` both are `<base>/<session_id>`; without it the
/// bases are used directly, giving a single shared index for every caller
/// (single-tenant mode). Re-resolving an existing session is a no-op.
/// Creation failures are configuration problems (bad base path, read-only
/// filesystem) and fail immediately.
pub fn resolve_dirs(
    session_id: &str,
    temp_base: &Path,
    index_base: &Path,
    use_session_dirs: bool,
) -> Result<(PathBuf, PathBuf)> {
    let (temp_dir, index_dir) = if use_session_dirs {
        (temp_base.join(session_id), index_base.join(session_id))
    } else {
        (temp_base.to_path_buf(), index_base.to_path_buf())
    };

    for dir in [&temp_dir, &index_dir] {
        fs::create_dir_all(dir).map_err(|e| {
            DocChatError::Config(format!(
                "cannot create session directory {}: {}",
                dir.display(),
                e
            ))
        })?;
    }

    Ok((temp_dir, index_dir))
}

/// Path a session's index lives at, computed the same way as
/// [`resolve_dirs`] but without touching the filesystem.
///
/// The retrieval path uses this: a session that was never ingested must stay
/// absent on disk, not gain an empty directory as a side effect of being
/// asked about.
pub fn index_dir_for(session_id: &str, index_base: &Path, use_session_dirs: bool) -> PathBuf {
    if use_session_dirs {
        index_base.join(session_id)
    } else {
        index_base.to_path_buf()
    }
}

// ============ Conversation history ============

/// One message in a session's conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatTurn {
    pub role: String,
    pub text: String,
}

impl ChatTurn {
    pub const USER: &'static str = "user";
    pub const ASSISTANT: &'static str = "assistant";

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Self::USER.to_string(),
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Self::ASSISTANT.to_string(),
            text: text.into(),
        }
    }
}

/// Shared map of known sessions and their conversation history.
///
/// Handed by handle into whatever serves requests; nothing here is global.
/// Knowing a session and having an index for it are separate facts — a
/// session registers at upload time, before its index exists.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, Vec<ChatTurn>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a session known, with empty history. Re-registering keeps any
    /// existing history.
    pub fn register(&self, session_id: &str) {
        let mut sessions = self.write_lock();
        sessions.entry(session_id.to_string()).or_default();
    }

    pub fn is_known(&self, session_id: &str) -> bool {
        self.read_lock().contains_key(session_id)
    }

    /// Snapshot of a session's history; `None` for unknown sessions.
    pub fn history(&self, session_id: &str) -> Option<Vec<ChatTurn>> {
        self.read_lock().get(session_id).cloned()
    }

    /// Append a question/answer pair to a session's history, registering the
    /// session if needed.
    pub fn append_exchange(&self, session_id: &str, question: &str, answer: &str) {
        let mut sessions = self.write_lock();
        let history = sessions.entry(session_id.to_string()).or_default();
        history.push(ChatTurn::user(question));
        history.push(ChatTurn::assistant(answer));
    }

    pub fn len(&self) -> usize {
        self.read_lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_lock().is_empty()
    }

    fn read_lock(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Vec<ChatTurn>>> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_lock(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Vec<ChatTurn>>> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_session_ids_are_unique_and_well_formed() {
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            let id = generate_session_id();

            let parts: Vec<&str> = id.split('_').collect();
            assert_eq!(parts.len(), 4, "unexpected shape: {}", id);
            assert_eq!(parts[0], "session");
            assert_eq!(parts[1].len(), 8);
            assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
            assert_eq!(parts[2].len(), 6);
            assert!(parts[2].chars().all(|c| c.is_ascii_digit()));
            assert_eq!(parts[3].len(), 8);
            assert!(parts[3]
                .chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));

            assert!(seen.insert(id), "duplicate session id generated");
        }
    }

    #[test]
    fn test_resolve_dirs_isolates_sessions() {
        let base = tempfile::tempdir().unwrap();
        let temp_base = base.path().join("data");
        let index_base = base.path().join("index_store");

        let (temp_a, index_a) = resolve_dirs("session_a", &temp_base, &index_base, true).unwrap();
        let (temp_b, index_b) = resolve_dirs("session_b", &temp_base, &index_base, true).unwrap();

        assert_ne!(temp_a, temp_b);
        assert_ne!(index_a, index_b);
        assert!(temp_a.ends_with("session_a"));
        assert!(index_b.ends_with("session_b"));
        assert!(temp_a.is_dir() && index_a.is_dir());
        assert!(temp_b.is_dir() && index_b.is_dir());
    }

    #[test]
    fn test_resolve_dirs_is_idempotent() {
        let base = tempfile::tempdir().unwrap();
        let temp_base = base.path().join("data");
        let index_base = base.path().join("index_store");

        let first = resolve_dirs("session_x", &temp_base, &index_base, true).unwrap();
        let second = resolve_dirs("session_x", &temp_base, &index_base, true).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_index_dir_for_matches_resolve_dirs() {
        let base = tempfile::tempdir().unwrap();
        let temp_base = base.path().join("data");
        let index_base = base.path().join("index_store");

        let (_, resolved) = resolve_dirs("session_y", &temp_base, &index_base, true).unwrap();
        assert_eq!(index_dir_for("session_y", &index_base, true), resolved);

        // And it must not create anything on its own.
        let phantom = index_dir_for("session_never", &index_base, true);
        assert!(!phantom.exists());
    }

    #[test]
    fn test_resolve_dirs_shared_mode_ignores_session_id() {
        let base = tempfile::tempdir().unwrap();
        let temp_base = base.path().join("data");
        let index_base = base.path().join("index_store");

        let (temp_dir, index_dir) =
            resolve_dirs("whatever", &temp_base, &index_base, false).unwrap();
        assert_eq!(temp_dir, temp_base);
        assert_eq!(index_dir, index_base);
    }

    #[test]
    fn test_store_registers_and_tracks_history() {
        let store = SessionStore::new();
        assert!(!store.is_known("s1"));
        assert!(store.history("s1").is_none());

        store.register("s1");
        assert!(store.is_known("s1"));
        assert_eq!(store.history("s1").unwrap().len(), 0);

        store.append_exchange("s1", "hello?", "hi.");
        let history = store.history("s1").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], ChatTurn::user("hello?"));
        assert_eq!(history[1], ChatTurn::assistant("hi."));

        // Re-registering must not wipe history.
        store.register("s1");
        assert_eq!(store.history("s1").unwrap().len(), 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_clones_share_state() {
        let store = SessionStore::new();
        let clone = store.clone();
        clone.register("shared");
        assert!(store.is_known("shared"));
    }
}
