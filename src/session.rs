//! The session: one document, one conversation, three mutating entry points.
//!
//! [`Session`] owns the current [`DocumentContext`] (if any) and the
//! [`ConversationStore`], and is the only thing that changes them:
//!
//! * [`Session::ingest_document`]: extract a PDF, replace the document and
//!   restart the conversation with a single confirmation (or failure) turn.
//! * [`Session::send_user_turn`]: append the user's message immediately,
//!   ask the backend, append exactly one assistant reply.
//! * [`Session::reset`]: drop the document and every turn.
//!
//! ## Concurrency
//!
//! All entry points take `&self`. State sits behind a mutex that is never
//! held across an `.await`, so a UI can read the conversation (and see the
//! user's own message) while a reply is in flight. `pending` admits one
//! request at a time; a second `send_user_turn` is rejected, not queued.
//!
//! ## Stale replies
//!
//! Every reset and every ingestion bumps an epoch. A reply (or an extraction)
//! that finishes under an older epoch than it started with is dropped on the
//! floor and reported as [`Reply::Stale`] / [`IngestOutcome::Stale`]; it never
//! lands in the new conversation.

use crate::config::ChatConfig;
use crate::conversation::{ConversationStore, Turn};
use crate::document::{DisplayRegistry, DocumentContext, DocumentSummary};
use crate::error::PdfChatError;
use crate::observer::{NoopObserver, ObserverHandle};
use crate::pipeline::extract::{extract_document, PdfiumExtractor, TextExtractor};
use crate::pipeline::llm::{ChatBackend, HttpChatClient};
use crate::prompts::{
    build_system_prompt, completion_failure_message, ingest_confirmation, select_history,
    GENERIC_FAILURE_MESSAGE, INGEST_FAILURE_MESSAGE,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Identity of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// How an ingestion settled.
#[derive(Debug)]
pub enum IngestOutcome {
    /// The document is now current; the conversation holds its confirmation turn.
    Loaded { page_count: usize },
    /// Extraction failed; the conversation holds a failure turn and any
    /// previous document is still current.
    Failed(PdfChatError),
    /// The session was reset or re-ingested while this extraction ran; its
    /// result was discarded.
    Stale,
}

impl IngestOutcome {
    pub fn is_loaded(&self) -> bool {
        matches!(self, IngestOutcome::Loaded { .. })
    }
}

/// How an accepted `send_user_turn` settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The assistant turn that was appended (a real answer or a failure explanation).
    Appended(Turn),
    /// The session was reset or re-ingested while waiting; the reply was discarded.
    Stale,
}

/// Read-only, serialisable view of the whole session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub turns: Vec<Turn>,
    pub pending: bool,
    pub loading: bool,
    pub document: Option<DocumentSummary>,
}

#[derive(Default)]
struct SessionState {
    document: Option<DocumentContext>,
    conversation: ConversationStore,
    /// Ingestions in progress.
    loading: usize,
    epoch: u64,
}

/// A document-grounded chat session.
pub struct Session {
    id: SessionId,
    config: ChatConfig,
    extractor: Arc<dyn TextExtractor>,
    backend: Arc<dyn ChatBackend>,
    registry: DisplayRegistry,
    observer: ObserverHandle,
    state: Mutex<SessionState>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("turns", &state.conversation.len())
            .field("pending", &state.conversation.pending())
            .field("loading", &(state.loading > 0))
            .field(
                "document",
                &state.document.as_ref().map(DocumentContext::source_name),
            )
            .finish()
    }
}

impl Session {
    /// A session using pdfium for extraction and HTTP for completions.
    pub fn new(config: ChatConfig) -> Self {
        let backend = Arc::new(HttpChatClient::new(config.clone()));
        Self::with_components(config, Arc::new(PdfiumExtractor::new()), backend)
    }

    /// A session with explicit extraction and completion backends.
    pub fn with_components(
        config: ChatConfig,
        extractor: Arc<dyn TextExtractor>,
        backend: Arc<dyn ChatBackend>,
    ) -> Self {
        Self {
            id: SessionId(Uuid::new_v4()),
            config,
            extractor,
            backend,
            registry: DisplayRegistry::new(),
            observer: Arc::new(NoopObserver),
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn with_observer(mut self, observer: ObserverHandle) -> Self {
        self.observer = observer;
        self
    }

    /// Register display handles in a registry shared with the presentation layer.
    pub fn with_registry(mut self, registry: DisplayRegistry) -> Self {
        self.registry = registry;
        self
    }

    // ── Read accessors ───────────────────────────────────────────────────

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn registry(&self) -> &DisplayRegistry {
        &self.registry
    }

    pub fn turns(&self) -> Vec<Turn> {
        self.lock().conversation.turns().to_vec()
    }

    pub fn turn_count(&self) -> usize {
        self.lock().conversation.len()
    }

    pub fn pending(&self) -> bool {
        self.lock().conversation.pending()
    }

    pub fn loading(&self) -> bool {
        self.lock().loading > 0
    }

    pub fn has_document(&self) -> bool {
        self.lock().document.is_some()
    }

    pub fn document(&self) -> Option<DocumentSummary> {
        self.lock().document.as_ref().map(DocumentContext::summary)
    }

    /// Run `f` against the current document without cloning its text.
    ///
    /// The session lock is held while `f` runs; do not call back into the
    /// session from inside it.
    pub fn with_document<R>(&self, f: impl FnOnce(Option<&DocumentContext>) -> R) -> R {
        f(self.lock().document.as_ref())
    }

    /// The system prompt the next message would be sent with.
    pub fn system_prompt(&self) -> String {
        build_system_prompt(self.lock().document.as_ref(), &self.config)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.lock();
        SessionSnapshot {
            id: self.id,
            turns: state.conversation.turns().to_vec(),
            pending: state.conversation.pending(),
            loading: state.loading > 0,
            document: state.document.as_ref().map(DocumentContext::summary),
        }
    }

    // ── Entry points ─────────────────────────────────────────────────────

    /// Extract `bytes` and make them the session's document.
    ///
    /// The caller is expected to have checked that the bytes are a PDF (see
    /// [`crate::pipeline::input`]). Extraction failures are not returned as
    /// errors: they restart the conversation with a failure turn and leave
    /// any previous document in place.
    ///
    /// Ingestions are not queued. If two overlap, the one started last wins
    /// and the earlier one settles as [`IngestOutcome::Stale`] whenever it
    /// finishes. A reply still in flight when an ingestion starts is
    /// discarded.
    pub async fn ingest_document(
        &self,
        bytes: impl Into<Arc<[u8]>>,
        source_name: &str,
    ) -> IngestOutcome {
        let bytes: Arc<[u8]> = bytes.into();
        info!(session = %self.id, "Ingesting '{}' ({} bytes)", source_name, bytes.len());

        let start_epoch = {
            let mut state = self.lock();
            state.loading += 1;
            state.epoch += 1;
            state.epoch
        };
        let _loading = LoadingGuard { session: self };
        self.observer.on_loading_changed(true);

        let result = extract_document(self.extractor.clone(), bytes.clone()).await;

        let (turn, outcome, replaced, was_pending) = {
            let mut state = self.lock();
            if state.epoch != start_epoch {
                warn!(session = %self.id, "Discarding extraction of '{}': session changed", source_name);
                return IngestOutcome::Stale;
            }
            state.epoch += 1;
            let was_pending = state.conversation.pending();

            match result {
                Ok(extracted) => {
                    let page_count = extracted.page_count;
                    let handle = self.registry.register(bytes);
                    let ctx =
                        DocumentContext::new(source_name, extracted.text, page_count, handle);
                    let replaced = state.document.replace(ctx);
                    let turn = Turn::assistant(ingest_confirmation(source_name, page_count));
                    state.conversation.reset_to(turn.clone());
                    info!(session = %self.id, "Loaded '{}': {} pages", source_name, page_count);
                    (turn, IngestOutcome::Loaded { page_count }, replaced, was_pending)
                }
                Err(e) => {
                    warn!(session = %self.id, "Failed to ingest '{}': {}", source_name, e);
                    let turn = Turn::assistant(INGEST_FAILURE_MESSAGE);
                    state.conversation.reset_to(turn.clone());
                    (turn, IngestOutcome::Failed(e), None, was_pending)
                }
            }
        };

        if let Some(previous) = replaced {
            debug!(session = %self.id, "Releasing previous document '{}'", previous.source_name());
            previous.release(&self.registry);
        }
        if was_pending {
            self.observer.on_pending_changed(false);
        }
        self.observer.on_turn_appended(&turn);
        outcome
    }

    /// Send a user message and wait for the assistant's reply.
    ///
    /// Rejected with [`PdfChatError::EmptyMessage`], [`PdfChatError::NoDocument`]
    /// or [`PdfChatError::RequestPending`] without touching the conversation.
    /// Otherwise the user turn is visible immediately, and exactly one
    /// assistant turn follows it whatever the backend does.
    pub async fn send_user_turn(&self, content: &str) -> Result<Reply, PdfChatError> {
        if content.trim().is_empty() {
            return Err(PdfChatError::EmptyMessage);
        }

        let (system_prompt, history, epoch, user_turn) = {
            let mut state = self.lock();
            if state.document.is_none() {
                return Err(PdfChatError::NoDocument);
            }
            if state.conversation.pending() {
                debug!(session = %self.id, "Rejecting message: reply pending");
                return Err(PdfChatError::RequestPending);
            }

            let system_prompt = build_system_prompt(state.document.as_ref(), &self.config);
            let history =
                select_history(state.conversation.turns(), &self.config.grounding).to_vec();
            let user_turn = Turn::user(content);
            state.conversation.push(user_turn.clone());
            state.conversation.set_pending(true);
            (system_prompt, history, state.epoch, user_turn)
        };
        self.observer.on_turn_appended(&user_turn);
        self.observer.on_pending_changed(true);

        let mut guard = PendingGuard {
            session: self,
            epoch,
            armed: true,
        };

        debug!(
            session = %self.id,
            "Requesting reply ({} history turns, prompt {} chars)",
            history.len(),
            system_prompt.len()
        );
        let reply_text = match self.backend.complete(&system_prompt, &history, content).await {
            Ok(text) => text,
            Err(e) => {
                warn!(session = %self.id, "Reply failed: {}", e);
                completion_failure_message(&e)
            }
        };

        guard.armed = false;
        let reply = Turn::assistant(reply_text);
        if self.settle(epoch, reply.clone()) {
            Ok(Reply::Appended(reply))
        } else {
            warn!(session = %self.id, "Discarding stale reply: session changed while waiting");
            Ok(Reply::Stale)
        }
    }

    /// Drop the document and every turn, whatever is in flight.
    ///
    /// An in-flight reply is not cancelled; when it arrives it is discarded.
    pub fn reset(&self) {
        let (previous, was_pending) = {
            let mut state = self.lock();
            state.epoch += 1;
            let was_pending = state.conversation.pending();
            state.conversation.clear();
            (state.document.take(), was_pending)
        };

        if let Some(ctx) = previous {
            ctx.release(&self.registry);
        }
        info!(session = %self.id, "Session reset");
        self.observer.on_reset();
        if was_pending {
            self.observer.on_pending_changed(false);
        }
    }

    // ── Internals ────────────────────────────────────────────────────────

    /// Append `reply` and clear `pending` if the session is still at `epoch`.
    fn settle(&self, epoch: u64, reply: Turn) -> bool {
        {
            let mut state = self.lock();
            if state.epoch != epoch {
                return false;
            }
            state.conversation.push(reply.clone());
            state.conversation.set_pending(false);
        }
        self.observer.on_turn_appended(&reply);
        self.observer.on_pending_changed(false);
        true
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(ctx) = state.document.take() {
            ctx.release(&self.registry);
        }
    }
}

/// Clears the loading count on every exit path of `ingest_document`.
struct LoadingGuard<'a> {
    session: &'a Session,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        let still_loading = {
            let mut state = self.session.lock();
            state.loading = state.loading.saturating_sub(1);
            state.loading > 0
        };
        if !still_loading {
            self.session.observer.on_loading_changed(false);
        }
    }
}

/// Settles a reply that never arrived because the send future was dropped
/// or the backend panicked.
struct PendingGuard<'a> {
    session: &'a Session,
    epoch: u64,
    armed: bool,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!(session = %self.session.id, "Reply abandoned before completion");
            self.session
                .settle(self.epoch, Turn::assistant(GENERIC_FAILURE_MESSAGE));
        }
    }
}
