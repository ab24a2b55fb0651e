//! # Doc Chat CLI (`docchat`)
//!
//! The `docchat` binary is the primary interface for Doc Chat. It provides
//! commands for one-shot document ingestion, querying an existing session
//! from the command line, and starting the HTTP API server.
//!
//! ## Usage
//!
//! ```bash
//! docchat --config ./config/docchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docchat serve` | Start the upload/chat HTTP server |
//! | `docchat ingest <files...>` | Ingest local files into a session index |
//! | `docchat query <session> "<question>"` | Ask one question against a session |
//!
//! ## Examples
//!
//! ```bash
//! # Ingest two files into a fresh session (prints the session id)
//! docchat ingest notes.md report.pdf
//!
//! # Add more files to the same session later
//! docchat ingest appendix.docx --session session_20250401_101500_K3F9Q2ZD
//!
//! # Ask a question against an ingested session
//! docchat query session_20250401_101500_K3F9Q2ZD "What does the report conclude?"
//!
//! # Start the HTTP API on the configured bind address
//! docchat serve
//!
//! # Override the bind address for a one-off run
//! docchat serve --bind 0.0.0.0:9000
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use doc_chat::config;
use doc_chat::embedding::create_embedder;
use doc_chat::ingest::ChatIngestor;
use doc_chat::llm::create_completer;
use doc_chat::rag::ConversationalRag;
use doc_chat::server;
use doc_chat::session::SessionStore;

/// Doc Chat CLI — session-scoped document ingestion and conversational
/// retrieval over local vector indexes.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docchat.example.toml` for a full example. A missing
/// config file falls back to built-in defaults with fake providers, so the
/// binary works offline out of the box.
#[derive(Parser)]
#[command(
    name = "docchat",
    about = "Doc Chat — session-scoped document ingestion and conversational retrieval",
    version,
    long_about = "Doc Chat ingests uploaded documents (txt, md, pdf, docx) into per-session \
    vector indexes on local disk, deduplicating re-uploads by content fingerprint, and answers \
    questions over the indexed text via a retrieval-augmented chat exposed as a CLI and an HTTP API."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/docchat.toml`. Chunking, storage, retrieval,
    /// embedding, LLM, and server settings are read from this file; if it
    /// does not exist, built-in defaults apply.
    #[arg(long, global = true, default_value = "./config/docchat.toml")]
    config: PathBuf,

    /// Enable debug-level logging (overridden by `RUST_LOG`).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server.
    ///
    /// Serves `POST /upload` (multipart file ingestion), `POST /chat`
    /// (session-scoped question answering), and `GET /health` on the
    /// address configured in `[server].bind`.
    Serve {
        /// Bind address override (e.g. `0.0.0.0:9000`).
        #[arg(long)]
        bind: Option<String>,
    },

    /// Ingest local files into a session index.
    ///
    /// Stages each file, extracts its text, chunks and embeds it, and
    /// persists the vectors under the session's index directory. Prints
    /// the session id and the number of net-new chunks; re-ingesting the
    /// same files adds zero.
    Ingest {
        /// Files to ingest (txt, md, pdf, docx).
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Add to an existing session instead of creating a new one.
        #[arg(long)]
        session: Option<String>,
    },

    /// Ask one question against an ingested session.
    ///
    /// Loads the session's on-disk index, retrieves the most relevant
    /// chunks, and prints the model's answer. Fails if the session has
    /// no completed ingestion.
    Query {
        /// Session id printed by a previous `ingest` run.
        session_id: String,

        /// The question to answer.
        question: String,
    },
}

/// Route `tracing` output to stderr, honouring `RUST_LOG` when set.
fn init_logging(verbose: bool) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    // Ignore the error if a subscriber is already installed.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut cfg = config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(addr) = bind {
                cfg.server.bind = addr;
            }
            server::run_server(cfg).await?;
        }
        Commands::Ingest { files, session } => {
            let embedder = create_embedder(&cfg.embedding)?;
            let ingestor = ChatIngestor::new(cfg, embedder);
            let outcome = ingestor.ingest_paths(session.as_deref(), &files).await?;

            println!("session: {}", outcome.session_id);
            println!("files staged: {}", outcome.files_staged);
            println!(
                "chunks added: {} (of {} total)",
                outcome.chunks_added, outcome.chunks_total
            );
            if outcome.chunks_added == 0 {
                println!("all content was already indexed for this session");
            }
        }
        Commands::Query {
            session_id,
            question,
        } => {
            let embedder = create_embedder(&cfg.embedding)?;
            let completer = create_completer(&cfg.llm)?;
            // One-shot invocation: no prior conversation to carry.
            let store = SessionStore::new();
            let rag =
                ConversationalRag::for_session(&cfg, embedder, completer, &store, &session_id)?;
            let answer = rag.invoke(&question, &[]).await?;
            println!("{}", answer);
        }
    }

    Ok(())
}
