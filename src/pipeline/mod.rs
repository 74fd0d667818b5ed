//! Pipeline stages feeding a chat session.
//!
//! Each submodule implements exactly one step, so each is testable on its
//! own and can be swapped (another extraction engine, another endpoint)
//! without touching the session.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ normalize ──▶ (session) ──▶ llm
//! (path/URL)  (pdfium)   (cleanup)    (prompt)     (HTTP)
//! ```
//!
//! 1. [`input`]: read a local file or download a URL; check `%PDF` magic
//! 2. [`extract`]: pull text segments page by page; runs in `spawn_blocking`
//!    because pdfium is not async-safe
//! 3. [`normalize`]: fold each page onto one clean line so page delimiters
//!    stay unambiguous
//! 4. [`llm`]: one chat-completion request per user message; the only
//!    stage with network I/O besides URL input

pub mod extract;
pub mod input;
pub mod llm;
pub mod normalize;
