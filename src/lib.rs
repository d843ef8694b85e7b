//! # Local RAG
//!
//! A local-first retrieval-augmented chat pipeline over uploaded documents.
//!
//! Documents are parsed, chunked, embedded by a locally served model and
//! kept in an in-memory vector index for the life of a session. Each
//! question is condensed against the conversation so far, grounded in the
//! closest chunks, and answered by a streaming chat model.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌─────────────┐
//! │   Uploads   │──▶│    Loader    │──▶│ VectorIndex │
//! │ txt/md/pdf  │   │ Chunk+Embed  │   │  (memory)   │
//! └─────────────┘   └──────────────┘   └──────┬──────┘
//!                                             │
//!       question + history ──▶ ┌──────────────┴┐
//!                              │   RagChain    │──▶ streamed answer
//!                              └───────┬───────┘
//!                                      ▼
//!                              ┌───────────────┐
//!                              │ ModelProvider │
//!                              │   (Ollama)    │
//!                              └───────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ragchat models                                   # list served models
//! ragchat ask --model llama3 --file notes.md "What changed in v2?"
//! ragchat chat --model llama3 --file guide.pdf     # interactive session
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`extract`] | Text extraction for txt, Markdown, PDF and DOCX |
//! | [`chunk`] | Text chunking |
//! | [`provider`] | Model provider abstraction and model handles |
//! | [`ollama`] | Ollama HTTP provider |
//! | [`catalog`] | Model catalog listing |
//! | [`index`] | In-memory vector index |
//! | [`loader`] | Upload staging and index builds |
//! | [`chain`] | Condense, retrieve, and stream answers |
//! | [`session`] | Per-session model, index and history |
//! | [`logging`] | `tracing` subscriber setup |

pub mod catalog;
pub mod chain;
pub mod chunk;
pub mod config;
pub mod error;
pub mod extract;
pub mod index;
pub mod loader;
pub mod logging;
pub mod models;
pub mod ollama;
pub mod provider;
pub mod session;

pub use error::{RagError, Result};
pub use session::{IndexOutcome, PendingAnswer, Session, SessionState};
