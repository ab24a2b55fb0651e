//! # Doc Chat
//!
//! Session-scoped document ingestion and conversational retrieval over
//! local vector indexes.
//!
//! Doc Chat ingests uploaded documents (txt, md, pdf, docx) into a
//! per-session vector index on local disk, deduplicating re-uploads by
//! content fingerprint, and answers questions over the indexed text via
//! retrieval-augmented chat. The same pipeline backs a CLI and an HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌─────────────────┐
//! │ Uploads  │──▶│   Pipeline    │──▶│  Session index  │
//! │ txt/pdf/ │   │ Stage+Extract │   │ index.json +    │
//! │ md/docx  │   │ Chunk+Embed   │   │ ledger.jsonl    │
//! └──────────┘   └───────────────┘   └────────┬────────┘
//!                                             │
//!                            ┌────────────────┤
//!                            ▼                ▼
//!                      ┌──────────┐     ┌──────────┐
//!                      │   CLI    │     │   HTTP   │
//!                      │(docchat) │     │upload/chat│
//!                      └──────────┘     └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docchat ingest notes.md report.pdf      # index files, prints session id
//! docchat query <session> "What changed?" # one-shot question
//! docchat serve                           # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy shared by every layer |
//! | [`models`] | Core data types |
//! | [`extract`] | Text extraction per file format |
//! | [`chunk`] | Overlapping text chunking |
//! | [`ledger`] | Content-fingerprint dedup ledger |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | On-disk vector index and retriever |
//! | [`session`] | Session ids, directories, chat history |
//! | [`ingest`] | Upload-to-index pipeline |
//! | [`llm`] | Completion provider abstraction |
//! | [`rag`] | Retrieval-augmented chat chain |
//! | [`server`] | Upload/chat HTTP server |

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod ledger;
pub mod llm;
pub mod models;
pub mod rag;
pub mod server;
pub mod session;
