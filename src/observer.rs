//! Observer trait for session state changes.
//!
//! Attach an [`Arc<dyn SessionObserver>`] with
//! [`crate::session::Session::with_observer`] to be told when turns are
//! appended or flags flip. A terminal UI can drive a spinner from
//! `on_pending_changed`; a web front-end can forward every event to a socket.
//! The session works the same with or without one.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdfchat::{SessionObserver, Turn};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct CountingObserver {
//!     appended: AtomicUsize,
//! }
//!
//! impl SessionObserver for CountingObserver {
//!     fn on_turn_appended(&self, _turn: &Turn) {
//!         self.appended.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//! ```

use crate::conversation::Turn;
use std::sync::Arc;

/// Receives session events.
///
/// Callbacks run synchronously on the task that caused the change, after the
/// session's internal lock has been released, so they may read the session
/// back. All methods default to no-ops.
pub trait SessionObserver: Send + Sync {
    /// A turn was appended (including synthesized confirmation/failure turns).
    fn on_turn_appended(&self, turn: &Turn) {
        let _ = turn;
    }

    /// The in-flight flag changed.
    fn on_pending_changed(&self, pending: bool) {
        let _ = pending;
    }

    /// The ingestion flag changed.
    fn on_loading_changed(&self, loading: bool) {
        let _ = loading;
    }

    /// The conversation was emptied and the document discarded.
    fn on_reset(&self) {}
}

/// The default observer.
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

/// Convenience alias matching the type stored in [`crate::session::Session`].
pub type ObserverHandle = Arc<dyn SessionObserver>;
