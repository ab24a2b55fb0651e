//! HTTP API tests over a real socket: multipart upload, session-scoped
//! chat, and the flat `{"detail": ...}` error contract.

use std::sync::Arc;

use reqwest::multipart::{Form, Part};
use serde_json::Value;
use tempfile::TempDir;

use doc_chat::config::Config;
use doc_chat::embedding::FakeEmbedder;
use doc_chat::llm::FakeCompleter;
use doc_chat::server::{app, AppState};
use doc_chat::session::ChatTurn;

/// Bind the app to an ephemeral port and serve it in the background.
///
/// The `TempDir` keeps the session storage alive for the test's duration.
async fn spawn_app() -> (TempDir, String, AppState) {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::default();
    config.storage.temp_base = tmp.path().join("data");
    config.storage.index_base = tmp.path().join("index_store");

    let state = AppState::with_providers(
        config,
        Arc::new(FakeEmbedder::default()),
        Arc::new(FakeCompleter::with_reply("stubbed answer")),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (tmp, format!("http://{}", addr), state)
}

async fn upload(base: &str, files: &[(&str, &[u8])]) -> reqwest::Response {
    let mut form = Form::new();
    for (name, bytes) in files {
        form = form.part("files", Part::bytes(bytes.to_vec()).file_name(name.to_string()));
    }
    reqwest::Client::new()
        .post(format!("{}/upload", base))
        .multipart(form)
        .send()
        .await
        .unwrap()
}

async fn chat(base: &str, session_id: &str, message: &str) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("{}/chat", base))
        .json(&serde_json::json!({ "session_id": session_id, "message": message }))
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_health_reports_ok() {
    let (_tmp, base, _state) = spawn_app().await;

    let resp = reqwest::get(format!("{}/health", base)).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_upload_indexes_files() {
    let (_tmp, base, _state) = spawn_app().await;

    let resp = upload(
        &base,
        &[
            ("notes.txt", b"the quarterly meeting moved to thursday".as_slice()),
            ("todo.md", b"# Todo\n\n- review the retrieval tests".as_slice()),
        ],
    )
    .await;
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["indexed"], true);
    let session_id = body["session_id"].as_str().unwrap();
    assert!(
        session_id.starts_with("session_"),
        "unexpected session id: {}",
        session_id
    );
}

#[tokio::test]
async fn test_upload_without_files_is_422() {
    let (_tmp, base, _state) = spawn_app().await;

    // A multipart body with no `files` parts at all
    let form = Form::new().text("note", "not a file");
    let resp = reqwest::Client::new()
        .post(format!("{}/upload", base))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 422);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["detail"], "No files provided");
}

#[tokio::test]
async fn test_upload_unsupported_type_is_500() {
    let (_tmp, base, _state) = spawn_app().await;

    let resp = upload(&base, &[("tool.exe", b"MZ\x90\x00".as_slice())]).await;
    assert_eq!(resp.status(), 500);

    let body: Value = resp.json().await.unwrap();
    let detail = body["detail"].as_str().unwrap();
    assert!(
        detail.contains("unsupported"),
        "expected unsupported-type detail, got: {}",
        detail
    );
}

#[tokio::test]
async fn test_chat_unknown_session_is_400() {
    let (_tmp, base, _state) = spawn_app().await;

    let resp = chat(&base, "session_bogus", "hello?").await;
    assert_eq!(resp.status(), 400);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["detail"], "Invalid or expired session_id");
}

#[tokio::test]
async fn test_chat_registered_but_unindexed_session_is_400() {
    let (_tmp, base, state) = spawn_app().await;

    // Known to the session store but its index never finished ingesting
    state.sessions().register("session_ghost");
    let resp = chat(&base, "session_ghost", "anyone there?").await;
    assert_eq!(resp.status(), 400);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["detail"], "Invalid or expired session_id");
}

#[tokio::test]
async fn test_chat_blank_message_is_400() {
    let (_tmp, base, _state) = spawn_app().await;

    let resp = upload(&base, &[("doc.txt", b"some indexed text".as_slice())]).await;
    let session_id = resp.json::<Value>().await.unwrap()["session_id"]
        .as_str()
        .unwrap()
        .to_string();

    let resp = chat(&base, &session_id, "   ").await;
    assert_eq!(resp.status(), 400);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["detail"], "Message cannot be empty");
}

#[tokio::test]
async fn test_chat_round_trip_appends_history() {
    let (_tmp, base, state) = spawn_app().await;

    let resp = upload(&base, &[("facts.txt", b"the sky reads blue today".as_slice())]).await;
    assert_eq!(resp.status(), 200);
    let session_id = resp.json::<Value>().await.unwrap()["session_id"]
        .as_str()
        .unwrap()
        .to_string();

    let resp = chat(&base, &session_id, "what color is the sky?").await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["answer"], "stubbed answer");

    // Exactly one user and one assistant turn recorded, in order
    let history = state.sessions().history(&session_id).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, ChatTurn::USER);
    assert_eq!(history[0].text, "what color is the sky?");
    assert_eq!(history[1].role, ChatTurn::ASSISTANT);
    assert_eq!(history[1].text, "stubbed answer");

    // A second exchange appends two more turns
    let resp = chat(&base, &session_id, "and tomorrow?").await;
    assert_eq!(resp.status(), 200);
    assert_eq!(state.sessions().history(&session_id).unwrap().len(), 4);
}

#[tokio::test]
async fn test_upload_then_adding_to_same_session() {
    let (_tmp, base, _state) = spawn_app().await;

    let resp = upload(&base, &[("one.txt", b"first document".as_slice())]).await;
    let first = resp.json::<Value>().await.unwrap()["session_id"]
        .as_str()
        .unwrap()
        .to_string();

    // Each upload without a session id allocates a fresh session
    let resp = upload(&base, &[("two.txt", b"second document".as_slice())]).await;
    let second = resp.json::<Value>().await.unwrap()["session_id"]
        .as_str()
        .unwrap()
        .to_string();
    assert_ne!(first, second, "uploads must not share sessions");
}
