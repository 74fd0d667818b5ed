//! Text extraction: turn PDF bytes into page-delimited plain text.
//!
//! ## Delimiter scheme
//!
//! Every page `n` (1-based) is emitted as
//!
//! ```text
//! --- Page n ---
//! <page text on one line>
//! ```
//!
//! Page text is folded onto a single line by
//! [`crate::pipeline::normalize::clean_page_text`], so a delimiter can only
//! ever come from [`assemble_pages`]. That is what makes
//! [`count_page_markers`] a faithful page count: the document's own declared
//! page count is never consulted.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is a C++ library with thread-local state; calling it from a Tokio
//! worker would stall the executor. [`extract_document`] moves the whole
//! extraction onto the blocking pool.

use crate::config::PDFIUM_LIB_PATH_ENV;
use crate::error::PdfChatError;
use crate::pipeline::normalize::clean_page_text;
use once_cell::sync::Lazy;
use pdfium_render::prelude::*;
use regex::Regex;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Produces the raw text of every page, in page order.
///
/// Implementations return one entry per page (an empty string for a page
/// without a text layer) and fail only when the document cannot be parsed or
/// a page cannot be read. A document with zero pages is `Ok(vec![])`.
pub trait TextExtractor: Send + Sync {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<String>, PdfChatError>;
}

/// Result of a successful extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    /// All pages, normalised, each preceded by its delimiter line.
    pub text: String,
    /// Number of delimiter lines in `text`.
    pub page_count: usize,
}

/// Extract and assemble a document on the blocking pool.
pub async fn extract_document(
    extractor: Arc<dyn TextExtractor>,
    bytes: Arc<[u8]>,
) -> Result<ExtractedText, PdfChatError> {
    let pages = tokio::task::spawn_blocking(move || extractor.extract_pages(&bytes))
        .await
        .map_err(|e| PdfChatError::Internal(format!("Extraction task panicked: {}", e)))??;

    let cleaned: Vec<String> = pages.iter().map(|p| clean_page_text(p)).collect();
    let text = assemble_pages(&cleaned);
    let page_count = count_page_markers(&text);
    debug_assert_eq!(page_count, cleaned.len());
    info!("Extracted {} pages ({} chars)", page_count, text.len());

    Ok(ExtractedText { text, page_count })
}

// ── Delimiter scheme ─────────────────────────────────────────────────────────

static RE_PAGE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^--- Page [0-9]+ ---$").unwrap());

/// The delimiter line for 1-based page `n`.
pub fn page_marker(n: usize) -> String {
    format!("--- Page {} ---", n)
}

/// Join page texts into one string, each page preceded by its delimiter.
pub fn assemble_pages<S: AsRef<str>>(pages: &[S]) -> String {
    let mut out = String::new();
    for (i, page) in pages.iter().enumerate() {
        out.push_str(&page_marker(i + 1));
        out.push('\n');
        out.push_str(page.as_ref());
        out.push('\n');
    }
    out
}

/// Count delimiter lines in assembled text.
pub fn count_page_markers(text: &str) -> usize {
    RE_PAGE_MARKER.find_iter(text).count()
}

/// Recover the page texts from assembled text (inverse of [`assemble_pages`]).
pub fn split_pages(text: &str) -> Vec<&str> {
    let starts: Vec<_> = RE_PAGE_MARKER.find_iter(text).collect();
    starts
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let body_start = (m.end() + 1).min(text.len());
            let body_end = starts.get(i + 1).map_or(text.len(), |next| next.start());
            text[body_start..body_end]
                .strip_suffix('\n')
                .unwrap_or(&text[body_start..body_end])
        })
        .collect()
}

/// Join a page's text fragments with a single space, in content-stream order.
pub fn join_fragments<I, S>(fragments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for (i, fragment) in fragments.into_iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(fragment.as_ref());
    }
    out
}

// ── pdfium backend ───────────────────────────────────────────────────────────

/// [`TextExtractor`] backed by pdfium via `pdfium-render`.
///
/// A fresh binding is made per document; pdfium is initialised on the
/// blocking thread that does the work and torn down when it finishes.
#[derive(Debug, Clone, Default)]
pub struct PdfiumExtractor {
    library_path: Option<PathBuf>,
}

impl PdfiumExtractor {
    /// Bind to the library named by `PDFIUM_LIB_PATH`, else the system library.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind to an explicit library file, or a directory containing it.
    pub fn with_library_path(path: impl Into<PathBuf>) -> Self {
        Self {
            library_path: Some(path.into()),
        }
    }

    /// `true` if a pdfium library can be bound right now.
    pub fn is_available(&self) -> bool {
        self.bind().is_ok()
    }

    fn bind(&self) -> Result<Pdfium, PdfChatError> {
        let configured = self
            .library_path
            .clone()
            .or_else(|| std::env::var_os(PDFIUM_LIB_PATH_ENV).map(PathBuf::from));

        let bindings = match configured {
            Some(path) => {
                let lib = if path.is_dir() {
                    Pdfium::pdfium_platform_library_name_at_path(&path)
                } else {
                    path
                };
                debug!("Binding pdfium from {}", lib.display());
                Pdfium::bind_to_library(&lib)
            }
            None => Pdfium::bind_to_system_library(),
        };

        bindings
            .map(Pdfium::new)
            .map_err(|e| PdfChatError::PdfiumBindingFailed(e.to_string()))
    }
}

impl TextExtractor for PdfiumExtractor {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<String>, PdfChatError> {
        let pdfium = self.bind()?;

        let document = pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| PdfChatError::InvalidPdf {
                detail: format!("{:?}", e),
            })?;

        let pages = document.pages();
        let total = pages.len();
        debug!("PDF loaded: {} pages", total);

        let mut out = Vec::with_capacity(total as usize);
        for idx in 0..total {
            let page_num = idx as usize + 1;
            let page = pages.get(idx).map_err(|e| PdfChatError::PageUnreadable {
                page: page_num,
                detail: format!("{:?}", e),
            })?;
            let text = page.text().map_err(|e| PdfChatError::PageUnreadable {
                page: page_num,
                detail: format!("{:?}", e),
            })?;

            let fragments: Vec<String> = text.segments().iter().map(|s| s.text()).collect();
            debug!("Page {}: {} text segments", page_num, fragments.len());
            out.push(join_fragments(&fragments));
        }

        Ok(out)
    }
}
