//! # edgequake-pdfchat
//!
//! Chat with a PDF. The document's text is extracted page by page and
//! embedded in the system prompt of every request, so each answer from an
//! OpenAI-compatible chat endpoint is grounded in what the document says.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF bytes
//!  │
//!  ├─ 1. Extract   pdfium text segments, page 1..N (spawn_blocking)
//!  ├─ 2. Assemble  "--- Page n ---" delimiters, page count from delimiters
//!  ├─ 3. Session   confirmation turn, append-only history, pending flag
//!  ├─ 4. Prompt    file name + pages + date + full text as system message
//!  └─ 5. Complete  POST chat/completions, map every outcome to a reply turn
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdfchat::{ChatConfig, Session, Reply};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Endpoint and key come from PDFCHAT_API_URL / PDFCHAT_API_KEY per request.
//!     let session = Session::new(ChatConfig::default());
//!
//!     let bytes = std::fs::read("report.pdf")?;
//!     session.ingest_document(bytes, "report.pdf").await;
//!
//!     if let Reply::Appended(turn) = session.send_user_turn("What is this about?").await? {
//!         println!("{}", turn.content());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfchat` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod conversation;
pub mod document;
pub mod error;
pub mod observer;
pub mod pipeline;
pub mod prompts;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ChatConfig, ChatConfigBuilder, Endpoint, GroundingPolicy};
pub use conversation::{ConversationStore, Role, Turn, TurnId};
pub use document::{DisplayHandle, DisplayRegistry, DocumentContext, DocumentSummary};
pub use error::{CompletionError, PdfChatError};
pub use observer::{NoopObserver, ObserverHandle, SessionObserver};
pub use pipeline::extract::{ExtractedText, PdfiumExtractor, TextExtractor};
pub use pipeline::input::{load_input, LoadedDocument};
pub use pipeline::llm::{ChatBackend, CompletionOutcome, HttpChatClient};
pub use session::{IngestOutcome, Reply, Session, SessionId, SessionSnapshot};
