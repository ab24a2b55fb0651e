//! Conversational retrieval: question + history + retrieved chunks → answer.
//!
//! [`ConversationalRag`] glues a [`Retriever`] snapshot to a
//! [`CompletionService`]. It holds no session state of its own — history
//! lives in [`crate::session::SessionStore`] and is passed in per call — so
//! one instance per request is cheap and there is nothing global to clean up.

use std::sync::Arc;

use crate::config::Config;
use crate::embedding::EmbeddingService;
use crate::error::{DocChatError, Result};
use crate::index::{Retriever, VectorIndexManager};
use crate::llm::CompletionService;
use crate::models::{SearchHit, SOURCE_KEY};
use crate::session::{index_dir_for, ChatTurn, SessionStore};

/// Retrieval-augmented answering over one session's index.
#[derive(Debug)]
pub struct ConversationalRag {
    retriever: Retriever,
    completer: Arc<dyn CompletionService>,
}

impl ConversationalRag {
    pub fn new(retriever: Retriever, completer: Arc<dyn CompletionService>) -> Self {
        Self {
            retriever,
            completer,
        }
    }

    /// Load the chain for an existing session from its on-disk index.
    ///
    /// Nothing is created on disk. A missing index means one of two things:
    /// the session is known to the store but its ingestion has not persisted
    /// yet ([`DocChatError::NotReady`]), or nobody has heard of it at all
    /// ([`DocChatError::IndexNotFound`]).
    pub fn for_session(
        config: &Config,
        embedder: Arc<dyn EmbeddingService>,
        completer: Arc<dyn CompletionService>,
        store: &SessionStore,
        session_id: &str,
    ) -> Result<Self> {
        let index_dir = index_dir_for(
            session_id,
            &config.storage.index_base,
            config.storage.use_session_dirs,
        );

        let manager = match VectorIndexManager::open_existing(&index_dir, embedder) {
            Ok(manager) => manager,
            Err(DocChatError::IndexNotFound { .. }) if store.is_known(session_id) => {
                return Err(DocChatError::NotReady {
                    session_id: session_id.to_string(),
                });
            }
            Err(e) => return Err(e),
        };

        Ok(Self::new(
            manager.as_retriever(config.retrieval.top_k),
            completer,
        ))
    }

    /// Answer `question` using the session's documents and prior turns.
    pub async fn invoke(&self, question: &str, history: &[ChatTurn]) -> Result<String> {
        let hits = self.retriever.search(question).await?;
        let prompt = build_prompt(question, &hits, history);
        self.completer.complete(&prompt).await
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }
}

/// Assemble the completion prompt: instructions, retrieved context tagged
/// with its source file, the conversation so far, then the question.
fn build_prompt(question: &str, hits: &[SearchHit], history: &[ChatTurn]) -> String {
    let mut prompt = String::from(
        "Use the following context to answer the question. \
         If the answer is not in the context, say you don't know.\n\n",
    );

    prompt.push_str("Context:\n");
    if hits.is_empty() {
        prompt.push_str("(no matching documents)\n");
    }
    for hit in hits {
        let source = hit.metadata.get(SOURCE_KEY).map(String::as_str).unwrap_or("unknown");
        prompt.push_str(&format!("[source: {}]\n{}\n\n", source, hit.text));
    }

    if !history.is_empty() {
        prompt.push_str("Conversation so far:\n");
        for turn in history {
            prompt.push_str(&format!("{}: {}\n", turn.role, turn.text));
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!("Question: {}\nAnswer:", question));
    prompt
}
