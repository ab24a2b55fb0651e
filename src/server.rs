//! HTTP API for uploads and document chat.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/upload` | Multipart upload (`files` parts); ingests into a new session |
//! | `POST` | `/chat` | JSON `{ session_id, message }`; answers from that session's documents |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! Every error response is a flat JSON body:
//!
//! ```json
//! { "detail": "Invalid or expired session_id" }
//! ```
//!
//! Client mistakes (blank message, unknown or not-yet-ready session) map to
//! 400, an upload with no files to 422, everything else to 500. The detail
//! string is always an error's `Display` output — never a debug dump.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser frontend can
//! be served from anywhere.

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::embedding::{create_embedder, EmbeddingService};
use crate::error::DocChatError;
use crate::ingest::ChatIngestor;
use crate::llm::{create_completer, CompletionService};
use crate::models::Upload;
use crate::rag::ConversationalRag;
use crate::session::SessionStore;

/// Largest request body accepted (uploads included).
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Shared application state passed to all route handlers via Axum's `State`
/// extractor.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    ingestor: Arc<ChatIngestor>,
    embedder: Arc<dyn EmbeddingService>,
    completer: Arc<dyn CompletionService>,
    sessions: SessionStore,
}

impl AppState {
    /// Build state with providers selected by the configuration.
    pub fn new(config: Config) -> crate::error::Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let completer = create_completer(&config.llm)?;
        Ok(Self::with_providers(config, embedder, completer))
    }

    /// Build state with explicit provider implementations. Tests inject
    /// fakes here; production goes through [`AppState::new`].
    pub fn with_providers(
        config: Config,
        embedder: Arc<dyn EmbeddingService>,
        completer: Arc<dyn CompletionService>,
    ) -> Self {
        let ingestor = Arc::new(ChatIngestor::new(config.clone(), Arc::clone(&embedder)));
        Self {
            config: Arc::new(config),
            ingestor,
            embedder,
            completer,
            sessions: SessionStore::new(),
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }
}

/// Build the router. Split out of [`run_server`] so tests can serve the same
/// app on an ephemeral port.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/upload", post(handle_upload))
        .route("/chat", post(handle_chat))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server on the configured bind address and serve until the
/// process is terminated.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let state = AppState::new(config)?;
    let app = app(state);

    println!("doc-chat server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

/// JSON error body, a single flat human-readable string.
#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct ApiError {
    status: StatusCode,
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            detail: self.detail,
        });
        (self.status, body).into_response()
    }
}

fn bad_request(detail: impl Into<String>) -> ApiError {
    ApiError {
        status: StatusCode::BAD_REQUEST,
        detail: detail.into(),
    }
}

fn unprocessable(detail: impl Into<String>) -> ApiError {
    ApiError {
        status: StatusCode::UNPROCESSABLE_ENTITY,
        detail: detail.into(),
    }
}

fn server_error(detail: impl Into<String>) -> ApiError {
    ApiError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        detail: detail.into(),
    }
}

/// Map pipeline errors onto the HTTP contract. A missing or not-yet-ready
/// index reads as an invalid session to clients; everything else is a
/// server-side failure reported with the error's flat message.
fn classify(err: DocChatError) -> ApiError {
    match err {
        DocChatError::IndexNotFound { .. } | DocChatError::NotReady { .. } => {
            bad_request("Invalid or expired session_id")
        }
        other => {
            tracing::error!(error = %other, "request failed");
            server_error(other.to_string())
        }
    }
}

// ============ POST /upload ============

/// JSON response body for a successful upload.
#[derive(Serialize)]
struct UploadResponse {
    indexed: bool,
    session_id: String,
}

/// Handler for `POST /upload`.
///
/// Collects every multipart part named `files`, runs the ingestion pipeline
/// into a fresh session, and registers the session for chat.
async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(e.to_string()))?
    {
        if field.name() != Some("files") {
            continue;
        }
        let filename = field.file_name().unwrap_or("").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(e.to_string()))?;
        files.push(Upload::new(filename, bytes.to_vec()));
    }

    if files.is_empty() {
        return Err(unprocessable("No files provided"));
    }

    let outcome = state
        .ingestor
        .ingest_files(None, &files)
        .await
        .map_err(classify)?;
    state.sessions.register(&outcome.session_id);

    Ok(Json(UploadResponse {
        indexed: true,
        session_id: outcome.session_id,
    }))
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    session_id: String,
    message: String,
}

/// JSON response body for a successful chat turn.
#[derive(Serialize)]
struct ChatResponse {
    answer: String,
}

/// Handler for `POST /chat`.
///
/// Loads the session's retriever from disk, answers with retrieved context
/// plus the stored conversation history, then appends the new exchange to
/// that history.
async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let message = req.message.trim();
    if message.is_empty() {
        return Err(bad_request("Message cannot be empty"));
    }

    let rag = ConversationalRag::for_session(
        &state.config,
        Arc::clone(&state.embedder),
        Arc::clone(&state.completer),
        &state.sessions,
        &req.session_id,
    )
    .map_err(classify)?;

    let history = state.sessions.history(&req.session_id).unwrap_or_default();
    let answer = rag.invoke(message, &history).await.map_err(classify)?;

    state.sessions.append_exchange(&req.session_id, message, &answer);

    Ok(Json(ChatResponse { answer }))
}

// ============ GET /health ============

/// JSON response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// Handler for `GET /health`. Used by load balancers and monitoring.
async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
