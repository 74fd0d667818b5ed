//! Error types for the edgequake-pdfchat library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`PdfChatError`] is **fatal for the operation**: the document cannot be
//!   read, the input is not a PDF, or a session entry point refused to run
//!   (empty message, no document, request already in flight).
//!
//! * [`CompletionError`] is **recoverable**: one completion request failed
//!   (missing credential, HTTP error, malformed body). The session never
//!   propagates these; it turns each one into an assistant reply so the
//!   conversation always stays usable.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdfchat library.
#[derive(Debug, Error)]
pub enum PdfChatError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// The bytes were read but do not start with the PDF magic.
    #[error("'{name}' is not a PDF document\nFirst bytes: {magic:?}")]
    NotAPdf { name: String, magic: [u8; 4] },

    // ── Extraction errors ─────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt, encrypted, or otherwise unparseable.
    #[error("PDF could not be parsed: {detail}")]
    InvalidPdf { detail: String },

    /// A page was present in the page tree but its text layer could not be read.
    #[error("Text extraction failed for page {page}: {detail}")]
    PageUnreadable { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install pdfium system-wide, or set PDFIUM_LIB_PATH=/path/to/libpdfium\n\
(a file, or the directory containing it).\n"
    )]
    PdfiumBindingFailed(String),

    // ── Session preconditions ─────────────────────────────────────────────
    /// The message was empty or whitespace-only.
    #[error("Message is empty")]
    EmptyMessage,

    /// No document has been ingested in this session.
    #[error("No document is loaded; ingest a PDF first")]
    NoDocument,

    /// A previous message is still waiting for its reply.
    #[error("A reply is still pending; wait for it before sending another message")]
    RequestPending,

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PdfChatError {
    /// `true` for the failures a [`crate::pipeline::extract::TextExtractor`] can raise.
    pub fn is_extraction_error(&self) -> bool {
        matches!(
            self,
            PdfChatError::InvalidPdf { .. }
                | PdfChatError::PageUnreadable { .. }
                | PdfChatError::PdfiumBindingFailed(_)
                | PdfChatError::Internal(_)
        )
    }

    /// `true` when a session entry point refused to run.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            PdfChatError::EmptyMessage | PdfChatError::NoDocument | PdfChatError::RequestPending
        )
    }
}

/// A failed completion request.
///
/// Never returned from [`crate::session::Session::send_user_turn`]; the
/// session converts it into an assistant turn via
/// [`crate::prompts::completion_failure_message`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompletionError {
    /// Credential or endpoint address is absent. No request was made.
    #[error("Completion endpoint is not configured: {missing} is not set")]
    Configuration { missing: String },

    /// The endpoint answered with a non-success HTTP status.
    #[error("Completion endpoint returned HTTP {status}")]
    Transport { status: u16 },

    /// The request never received a status (DNS, connect, TLS, timeout).
    #[error("Completion request failed: {detail}")]
    Network { detail: String },

    /// The body arrived but is not a chat-completion response.
    #[error("Malformed completion response: {detail}")]
    Parse { detail: String },
}
