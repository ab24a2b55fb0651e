//! End-to-end ingestion tests: staging, extraction, chunking, embedding,
//! and fingerprint-deduplicated persistence, all under temp directories.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use doc_chat::config::Config;
use doc_chat::embedding::{EmbeddingService, FakeEmbedder};
use doc_chat::error::{DocChatError, Result};
use doc_chat::index::{VectorIndexManager, INDEX_FILE};
use doc_chat::ingest::ChatIngestor;
use doc_chat::ledger::LEDGER_FILE;
use doc_chat::models::Upload;
use doc_chat::session::index_dir_for;

fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.storage.temp_base = root.join("data");
    config.storage.index_base = root.join("index_store");
    config
}

fn fake_ingestor(config: &Config) -> ChatIngestor {
    ChatIngestor::new(config.clone(), Arc::new(FakeEmbedder::default()))
}

/// Embedder that always fails, for exercising the no-partial-state path.
struct FailingEmbedder;

#[async_trait]
impl EmbeddingService for FailingEmbedder {
    fn model_name(&self) -> &str {
        "failing"
    }

    async fn embed_documents(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(DocChatError::Embedding("provider unavailable".to_string()))
    }
}

/// Minimal single-page PDF containing the given phrase, with a correct
/// xref table so `pdf-extract` can parse it.
fn minimal_pdf_with_text(phrase: &str) -> Vec<u8> {
    let stream = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET\n", phrase);
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(
        format!("4 0 obj << /Length {} >> stream\n{}endstream endobj\n", stream.len(), stream)
            .as_bytes(),
    );
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

#[tokio::test]
async fn test_ingest_creates_session_layout() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let ingestor = fake_ingestor(&config);

    let files = vec![
        Upload::new("notes.txt", b"Rust ownership notes for the reading group.".to_vec()),
        Upload::new("plan.md", b"# Plan\n\nShip the ingestion pipeline this week.".to_vec()),
    ];
    let outcome = ingestor.ingest_files(None, &files).await.unwrap();

    assert!(
        outcome.session_id.starts_with("session_"),
        "unexpected session id: {}",
        outcome.session_id
    );
    assert_eq!(outcome.files_staged, 2);
    assert!(outcome.chunks_total > 0);
    assert_eq!(outcome.chunks_added, outcome.chunks_total);

    // Uploads staged under their original names in the session temp dir
    let temp_dir = tmp.path().join("data").join(&outcome.session_id);
    assert!(temp_dir.join("notes.txt").is_file());
    assert!(temp_dir.join("plan.md").is_file());

    // Both persisted artifacts exist in the session index dir
    let index_dir = index_dir_for(&outcome.session_id, &config.storage.index_base, true);
    assert!(index_dir.join(INDEX_FILE).is_file());
    assert!(index_dir.join(LEDGER_FILE).is_file());
}

#[tokio::test]
async fn test_reingest_same_files_adds_nothing() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let ingestor = fake_ingestor(&config);

    let files = vec![Upload::new(
        "report.txt",
        b"Quarterly findings: retrieval latency dropped by half.".to_vec(),
    )];

    let first = ingestor.ingest_files(None, &files).await.unwrap();
    assert!(first.chunks_added > 0, "first ingest should add chunks");

    let second = ingestor
        .ingest_files(Some(&first.session_id), &files)
        .await
        .unwrap();
    assert_eq!(second.session_id, first.session_id);
    assert_eq!(
        second.chunks_added, 0,
        "re-uploading identical content must add zero chunks"
    );
    assert_eq!(second.chunks_total, first.chunks_total);
}

#[tokio::test]
async fn test_ingest_accumulates_across_uploads() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let ingestor = fake_ingestor(&config);

    let first = ingestor
        .ingest_files(None, &[Upload::new("a.txt", b"alpha topic".to_vec())])
        .await
        .unwrap();
    let second = ingestor
        .ingest_files(
            Some(&first.session_id),
            &[Upload::new("b.txt", b"beta topic".to_vec())],
        )
        .await
        .unwrap();
    assert!(second.chunks_added > 0, "new file should add new chunks");

    let index_dir = index_dir_for(&first.session_id, &config.storage.index_base, true);
    let manager =
        VectorIndexManager::open_existing(&index_dir, Arc::new(FakeEmbedder::default())).unwrap();
    assert_eq!(manager.len(), first.chunks_added + second.chunks_added);
    assert_eq!(manager.ledger().len(), manager.len());
}

#[tokio::test]
async fn test_failed_embedding_leaves_no_index() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let broken = ChatIngestor::new(config.clone(), Arc::new(FailingEmbedder));

    let files = vec![Upload::new("doc.txt", b"content that never embeds".to_vec())];
    let err = broken
        .ingest_files(Some("session_fixed"), &files)
        .await
        .unwrap_err();
    assert!(matches!(err, DocChatError::Embedding(_)), "got {:?}", err);

    // Nothing persisted: a later open must report the index as absent
    let index_dir = index_dir_for("session_fixed", &config.storage.index_base, true);
    assert!(!index_dir.join(INDEX_FILE).exists());

    // Retrying the same session with a working embedder succeeds cleanly
    let retry = fake_ingestor(&config)
        .ingest_files(Some("session_fixed"), &files)
        .await
        .unwrap();
    assert!(retry.chunks_added > 0);
    assert!(index_dir.join(INDEX_FILE).is_file());
}

#[tokio::test]
async fn test_concurrent_ingest_same_session_dedups() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let ingestor = Arc::new(fake_ingestor(&config));

    let files = vec![Upload::new(
        "shared.txt",
        b"one chunk of text both callers race to index".to_vec(),
    )];

    let a = {
        let ingestor = Arc::clone(&ingestor);
        let files = files.clone();
        tokio::spawn(async move { ingestor.ingest_files(Some("session_race"), &files).await })
    };
    let b = {
        let ingestor = Arc::clone(&ingestor);
        let files = files.clone();
        tokio::spawn(async move { ingestor.ingest_files(Some("session_race"), &files).await })
    };

    let a = a.await.unwrap().unwrap();
    let b = b.await.unwrap().unwrap();

    // Whichever caller got the directory lock first adds the chunks; the
    // other sees the fingerprints already recorded and adds zero.
    assert_eq!(
        a.chunks_added + b.chunks_added,
        a.chunks_total,
        "the same content must be persisted exactly once"
    );

    let index_dir = index_dir_for("session_race", &config.storage.index_base, true);
    let manager =
        VectorIndexManager::open_existing(&index_dir, Arc::new(FakeEmbedder::default())).unwrap();
    assert_eq!(manager.len(), a.chunks_total);
}

#[tokio::test]
async fn test_ingest_paths_reads_local_files() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let ingestor = fake_ingestor(&config);

    let files_dir = tmp.path().join("files");
    fs::create_dir_all(&files_dir).unwrap();
    let txt = files_dir.join("guide.txt");
    fs::write(&txt, "Deployment guide: roll forward, never back.").unwrap();
    let pdf = files_dir.join("summary.pdf");
    fs::write(&pdf, minimal_pdf_with_text("retrieval summary findings")).unwrap();

    let outcome = ingestor.ingest_paths(None, &[txt, pdf]).await.unwrap();
    assert_eq!(outcome.files_staged, 2);
    assert!(outcome.chunks_added >= 2, "each file should yield a chunk");

    // The PDF text survived extraction and is retrievable
    let hits = outcome
        .retriever
        .search("retrieval summary findings")
        .await
        .unwrap();
    assert!(
        hits.iter().any(|h| {
            h.metadata.get("source").map(String::as_str) == Some("summary.pdf")
                && h.text.contains("retrieval summary findings")
        }),
        "expected the PDF chunk among the hits"
    );
}

#[tokio::test]
async fn test_ingest_missing_path_is_staging_error() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let ingestor = fake_ingestor(&config);

    let missing = tmp.path().join("nope.txt");
    let err = ingestor.ingest_paths(None, &[missing]).await.unwrap_err();
    assert!(matches!(err, DocChatError::Staging(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_index_survives_restart() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());

    let session_id = {
        let ingestor = fake_ingestor(&config);
        let files = vec![Upload::new("kept.txt", b"text that must survive".to_vec())];
        ingestor.ingest_files(None, &files).await.unwrap().session_id
    };

    // Fresh ingestor simulates a process restart; dedup state must persist
    let again = fake_ingestor(&config)
        .ingest_files(
            Some(&session_id),
            &[Upload::new("kept.txt", b"text that must survive".to_vec())],
        )
        .await
        .unwrap();
    assert_eq!(again.chunks_added, 0, "dedup must survive a restart");
}
