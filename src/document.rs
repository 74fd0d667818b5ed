//! The ingested document and the handle the presentation layer renders from.
//!
//! A [`DocumentContext`] is an immutable snapshot of one successful
//! extraction. It owns a [`DisplayHandle`]: a revocable reference to the
//! original upload bytes held in a [`DisplayRegistry`], the same way a
//! browser hands out `blob:` URLs for a file until they are revoked.
//!
//! Releasing is explicit. [`DocumentContext::release`] consumes the context,
//! so a handle cannot be revoked twice; the session calls it whenever the
//! context is replaced or reset.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};
use uuid::Uuid;

/// Opaque reference to uploaded bytes, resolvable through a [`DisplayRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisplayHandle {
    id: Uuid,
}

impl DisplayHandle {
    /// URL-style name for the handle, e.g. `blob:pdfchat/6f1c…`.
    pub fn url(&self) -> String {
        format!("blob:pdfchat/{}", self.id)
    }
}

impl fmt::Display for DisplayHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

/// Table of live upload buffers keyed by [`DisplayHandle`].
///
/// Cheap to clone; clones share the same table, so the presentation layer
/// can hold one while the session registers and revokes handles.
#[derive(Debug, Clone, Default)]
pub struct DisplayRegistry {
    entries: Arc<Mutex<HashMap<Uuid, Arc<[u8]>>>>,
}

impl DisplayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `bytes` and return a new handle for them.
    pub fn register(&self, bytes: impl Into<Arc<[u8]>>) -> DisplayHandle {
        let id = Uuid::new_v4();
        let bytes = bytes.into();
        debug!(handle = %id, len = bytes.len(), "display handle registered");
        self.lock().insert(id, bytes);
        DisplayHandle { id }
    }

    /// Bytes behind `handle`, or None once it has been revoked.
    pub fn resolve(&self, handle: &DisplayHandle) -> Option<Arc<[u8]>> {
        self.lock().get(&handle.id).cloned()
    }

    /// Release the bytes behind `handle`. Returns false if it was not live.
    pub fn revoke(&self, handle: &DisplayHandle) -> bool {
        let removed = self.lock().remove(&handle.id).is_some();
        if removed {
            debug!(handle = %handle.id, "display handle revoked");
        } else {
            warn!(handle = %handle.id, "revoke on a handle that is not live");
        }
        removed
    }

    /// Number of handles registered and not yet revoked.
    pub fn live_handles(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Arc<[u8]>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Immutable snapshot of one ingested document.
#[derive(Debug, PartialEq, Eq)]
pub struct DocumentContext {
    source_name: String,
    extracted_text: String,
    page_count: usize,
    ingested_at: DateTime<Utc>,
    display_handle: DisplayHandle,
}

impl DocumentContext {
    pub(crate) fn new(
        source_name: impl Into<String>,
        extracted_text: String,
        page_count: usize,
        display_handle: DisplayHandle,
    ) -> Self {
        Self {
            source_name: source_name.into(),
            extracted_text,
            page_count,
            ingested_at: Utc::now(),
            display_handle,
        }
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn extracted_text(&self) -> &str {
        &self.extracted_text
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn ingested_at(&self) -> DateTime<Utc> {
        self.ingested_at
    }

    /// Ingestion date rendered in local time with a `chrono` format string.
    pub fn ingested_date(&self, format: &str) -> String {
        self.ingested_at
            .with_timezone(&Local)
            .format(format)
            .to_string()
    }

    pub fn display_handle(&self) -> &DisplayHandle {
        &self.display_handle
    }

    /// Metadata-only view for the presentation layer.
    pub fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            source_name: self.source_name.clone(),
            page_count: self.page_count,
            ingested_at: self.ingested_at,
            display_handle: self.display_handle.clone(),
            text_len: self.extracted_text.chars().count(),
        }
    }

    /// Revoke the display handle and drop the context.
    pub(crate) fn release(self, registry: &DisplayRegistry) {
        registry.revoke(&self.display_handle);
    }
}

/// What the UI needs to render a document header, without the full text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub source_name: String,
    pub page_count: usize,
    pub ingested_at: DateTime<Utc>,
    pub display_handle: DisplayHandle,
    /// Extracted text length in characters.
    pub text_len: usize,
}
