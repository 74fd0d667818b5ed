//! Session behaviour over the public API.
//!
//! Extraction and completion are replaced by in-process fakes so these tests
//! need neither pdfium nor a network endpoint.

use async_trait::async_trait;
use edgequake_pdfchat::pipeline::llm::CompletionOutcome;
use edgequake_pdfchat::prompts::{GENERIC_FAILURE_MESSAGE, INGEST_FAILURE_MESSAGE};
use edgequake_pdfchat::{
    ChatBackend, ChatConfig, CompletionError, DisplayRegistry, IngestOutcome, PdfChatError, Reply,
    Role, Session, SessionObserver, TextExtractor, Turn,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

// ── Test doubles ─────────────────────────────────────────────────────────────

/// Returns fixed page texts, or fails, for any input.
struct FakeExtractor {
    pages: Result<Vec<&'static str>, ()>,
}

impl FakeExtractor {
    fn pages(pages: Vec<&'static str>) -> Arc<Self> {
        Arc::new(Self { pages: Ok(pages) })
    }

    fn broken() -> Arc<Self> {
        Arc::new(Self { pages: Err(()) })
    }
}

impl TextExtractor for FakeExtractor {
    fn extract_pages(&self, _bytes: &[u8]) -> Result<Vec<String>, PdfChatError> {
        match &self.pages {
            Ok(p) => Ok(p.iter().map(|s| s.to_string()).collect()),
            Err(()) => Err(PdfChatError::InvalidPdf {
                detail: "trailer not found".into(),
            }),
        }
    }
}

/// Blocks on [`SLOW`] bytes until released; any other input extracts at once.
struct GatedExtractor {
    started: Notify,
    release: Mutex<mpsc::Receiver<()>>,
}

const SLOW: &[u8] = b"%PDF-1.7 slow";

impl GatedExtractor {
    fn new() -> (Arc<Self>, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        let extractor = Arc::new(Self {
            started: Notify::new(),
            release: Mutex::new(rx),
        });
        (extractor, tx)
    }
}

impl TextExtractor for GatedExtractor {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<String>, PdfChatError> {
        if bytes == SLOW {
            self.started.notify_one();
            let _ = self.release.lock().unwrap().recv();
            return Ok(vec!["slow page".into()]);
        }
        Ok(vec!["fast one".into(), "fast two".into()])
    }
}

/// What the backend was asked.
#[derive(Debug, Clone)]
struct Call {
    system_prompt: String,
    history: Vec<(Role, String)>,
    new_user_content: String,
}

/// Replays queued outcomes and records every call.
#[derive(Default)]
struct ScriptedBackend {
    outcomes: Mutex<VecDeque<CompletionOutcome>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedBackend {
    fn new(outcomes: Vec<CompletionOutcome>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn complete(
        &self,
        system_prompt: &str,
        history: &[Turn],
        new_user_content: &str,
    ) -> CompletionOutcome {
        self.calls.lock().unwrap().push(Call {
            system_prompt: system_prompt.to_string(),
            history: history
                .iter()
                .map(|t| (t.role(), t.content().to_string()))
                .collect(),
            new_user_content: new_user_content.to_string(),
        });
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("default reply".to_string()))
    }
}

/// Blocks every call until `release` is notified.
struct GatedBackend {
    gate: Notify,
    calls: AtomicUsize,
}

impl GatedBackend {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            gate: Notify::new(),
            calls: AtomicUsize::new(0),
        })
    }

    fn release(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl ChatBackend for GatedBackend {
    async fn complete(&self, _s: &str, _h: &[Turn], _n: &str) -> CompletionOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.gate.notified().await;
        Ok("late reply".to_string())
    }
}

#[derive(Default)]
struct EventLog(Mutex<Vec<String>>);

impl SessionObserver for EventLog {
    fn on_turn_appended(&self, turn: &Turn) {
        self.0
            .lock()
            .unwrap()
            .push(format!("turn:{}", turn.role().as_str()));
    }

    fn on_pending_changed(&self, pending: bool) {
        self.0.lock().unwrap().push(format!("pending:{pending}"));
    }

    fn on_loading_changed(&self, loading: bool) {
        self.0.lock().unwrap().push(format!("loading:{loading}"));
    }

    fn on_reset(&self) {
        self.0.lock().unwrap().push("reset".to_string());
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

const PDF: &[u8] = b"%PDF-1.7 fake";

fn three_pages() -> Arc<FakeExtractor> {
    FakeExtractor::pages(vec!["A", "B", "C"])
}

fn session_with(extractor: Arc<dyn TextExtractor>, backend: Arc<dyn ChatBackend>) -> Session {
    Session::with_components(ChatConfig::default(), extractor, backend)
}

async fn wait_until_pending(session: &Session) {
    for _ in 0..1000 {
        if session.pending() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("session never became pending");
}

// ── Ingestion ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn ingest_three_page_document() {
    let session = session_with(three_pages(), ScriptedBackend::new(vec![]));

    let outcome = session.ingest_document(PDF, "laporan.pdf").await;
    assert!(matches!(outcome, IngestOutcome::Loaded { page_count: 3 }));

    let doc = session.document().expect("document present");
    assert_eq!(doc.page_count, 3);
    assert_eq!(doc.source_name, "laporan.pdf");
    session.with_document(|ctx| {
        assert_eq!(
            ctx.unwrap().extracted_text(),
            "--- Page 1 ---\nA\n--- Page 2 ---\nB\n--- Page 3 ---\nC\n"
        );
    });

    let turns = session.turns();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].role(), Role::Assistant);
    assert!(turns[0].content().contains('3'));
    assert!(turns[0].content().contains("laporan.pdf"));
    assert!(!session.loading());
}

#[tokio::test]
async fn ingest_failure_leaves_single_failure_turn() {
    let session = session_with(FakeExtractor::broken(), ScriptedBackend::new(vec![]));

    let outcome = session.ingest_document(PDF, "broken.pdf").await;
    match outcome {
        IngestOutcome::Failed(e) => assert!(e.is_extraction_error()),
        other => panic!("expected failure, got {other:?}"),
    }
    let turns = session.turns();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].content(), INGEST_FAILURE_MESSAGE);
    assert!(!session.has_document());
    assert!(!session.loading());
}

#[tokio::test]
async fn ingest_failure_keeps_previous_document() {
    struct FlipFlop(AtomicUsize);
    impl TextExtractor for FlipFlop {
        fn extract_pages(&self, _b: &[u8]) -> Result<Vec<String>, PdfChatError> {
            if self.0.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(vec!["only page".into()])
            } else {
                Err(PdfChatError::InvalidPdf { detail: "x".into() })
            }
        }
    }

    let session = session_with(
        Arc::new(FlipFlop(AtomicUsize::new(0))),
        ScriptedBackend::new(vec![]),
    );
    session.ingest_document(PDF, "good.pdf").await;
    session.send_user_turn("hello").await.unwrap();
    assert_eq!(session.turn_count(), 3);

    session.ingest_document(PDF, "bad.pdf").await;
    assert_eq!(session.turn_count(), 1, "history discarded on failure too");
    assert_eq!(session.document().unwrap().source_name, "good.pdf");
    assert_eq!(session.registry().live_handles(), 1);
}

#[tokio::test]
async fn reingest_replaces_state_and_releases_old_handle() {
    let registry = DisplayRegistry::new();
    let session = session_with(three_pages(), ScriptedBackend::new(vec![]))
        .with_registry(registry.clone());

    session.ingest_document(PDF, "first.pdf").await;
    let first = session.document().unwrap().display_handle;
    session.send_user_turn("q").await.unwrap();

    session.ingest_document(PDF, "second.pdf").await;
    assert_eq!(session.turn_count(), 1);
    assert!(registry.resolve(&first).is_none(), "old handle revoked");
    assert_eq!(registry.live_handles(), 1);

    let second = session.document().unwrap().display_handle;
    assert_eq!(registry.resolve(&second).as_deref(), Some(PDF));
}

#[tokio::test]
async fn zero_page_document_is_loaded() {
    let session = session_with(FakeExtractor::pages(vec![]), ScriptedBackend::new(vec![]));
    let outcome = session.ingest_document(PDF, "empty.pdf").await;
    assert!(matches!(outcome, IngestOutcome::Loaded { page_count: 0 }));
    assert_eq!(session.turn_count(), 1);
    assert!(session.turns()[0].content().contains("0 halaman"));
}

#[tokio::test]
async fn page_shaped_like_a_delimiter_does_not_inflate_page_count() {
    let session = session_with(
        FakeExtractor::pages(vec!["--- Page 2 ---"]),
        ScriptedBackend::new(vec![]),
    );

    let outcome = session.ingest_document(PDF, "tricky.pdf").await;
    assert!(matches!(outcome, IngestOutcome::Loaded { page_count: 1 }));
    assert!(session.turns()[0].content().contains("1 halaman"));
    session.with_document(|ctx| {
        assert_eq!(
            ctx.unwrap().extracted_text(),
            "--- Page 1 ---\n\\--- Page 2 ---\n"
        );
    });
}

#[tokio::test]
async fn reset_during_extraction_discards_the_document() {
    let (extractor, release) = GatedExtractor::new();
    let registry = DisplayRegistry::new();
    let session = Arc::new(
        session_with(extractor.clone(), ScriptedBackend::new(vec![]))
            .with_registry(registry.clone()),
    );

    let ingest = {
        let session = session.clone();
        tokio::spawn(async move { session.ingest_document(SLOW, "slow.pdf").await })
    };
    extractor.started.notified().await;
    assert!(session.loading());

    session.reset();
    release.send(()).unwrap();

    let outcome = ingest.await.unwrap();
    assert!(matches!(outcome, IngestOutcome::Stale), "{outcome:?}");
    assert_eq!(session.turn_count(), 0);
    assert!(!session.has_document());
    assert!(!session.loading());
    assert_eq!(registry.live_handles(), 0);
}

#[tokio::test]
async fn overlapping_ingests_keep_the_latest_upload() {
    let (extractor, release) = GatedExtractor::new();
    let session = Arc::new(session_with(extractor.clone(), ScriptedBackend::new(vec![])));

    let older = {
        let session = session.clone();
        tokio::spawn(async move { session.ingest_document(SLOW, "older.pdf").await })
    };
    extractor.started.notified().await;

    let newer = session.ingest_document(PDF, "newer.pdf").await;
    assert!(matches!(newer, IngestOutcome::Loaded { page_count: 2 }));
    assert!(session.loading(), "older extraction still running");

    release.send(()).unwrap();
    let outcome = older.await.unwrap();
    assert!(matches!(outcome, IngestOutcome::Stale), "{outcome:?}");

    assert_eq!(session.document().unwrap().source_name, "newer.pdf");
    let turns = session.turns();
    assert_eq!(turns.len(), 1);
    assert!(turns[0].content().contains("newer.pdf"));
    assert!(!session.loading());
    assert_eq!(session.registry().live_handles(), 1);
}

// ── Sending ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn send_success_appends_user_then_assistant() {
    let backend = ScriptedBackend::new(vec![Ok("It is about X.".into())]);
    let session = session_with(three_pages(), backend.clone());
    session.ingest_document(PDF, "laporan.pdf").await;

    let reply = session.send_user_turn("What is this about?").await.unwrap();

    let turns = session.turns();
    assert_eq!(turns.len(), 3);
    assert_eq!(turns[1].role(), Role::User);
    assert_eq!(turns[1].content(), "What is this about?");
    assert_eq!(turns[2].role(), Role::Assistant);
    assert_eq!(turns[2].content(), "It is about X.");
    assert_eq!(reply, Reply::Appended(turns[2].clone()));
    assert!(!session.pending());
}

#[tokio::test]
async fn backend_sees_prior_history_and_grounding_prompt() {
    let backend = ScriptedBackend::new(vec![Ok("one".into()), Ok("two".into())]);
    let session = session_with(three_pages(), backend.clone());
    session.ingest_document(PDF, "laporan.pdf").await;

    session.send_user_turn("first?").await.unwrap();
    session.send_user_turn("second?").await.unwrap();

    let calls = backend.calls();
    assert_eq!(calls.len(), 2);

    assert_eq!(calls[0].history.len(), 1);
    assert_eq!(calls[0].new_user_content, "first?");

    let second = &calls[1];
    assert_eq!(second.new_user_content, "second?");
    let roles: Vec<Role> = second.history.iter().map(|(r, _)| *r).collect();
    assert_eq!(roles, [Role::Assistant, Role::User, Role::Assistant]);
    assert!(
        second.history.iter().all(|(_, c)| c != "second?"),
        "new message is not duplicated into history"
    );

    assert!(second.system_prompt.contains("File Name: laporan.pdf"));
    assert!(second.system_prompt.contains("Number of Pages: 3"));
    assert!(second
        .system_prompt
        .contains("--- Page 1 ---\nA\n--- Page 2 ---\nB\n--- Page 3 ---\nC\n"));
}

#[tokio::test]
async fn transport_failure_still_appends_reply() {
    let backend = ScriptedBackend::new(vec![
        Ok("It is about X.".into()),
        Err(CompletionError::Transport { status: 500 }),
    ]);
    let session = session_with(three_pages(), backend);
    session.ingest_document(PDF, "laporan.pdf").await;

    session.send_user_turn("ok?").await.unwrap();
    let before = session.turn_count();
    session.send_user_turn("and now?").await.unwrap();

    let turns = session.turns();
    assert_eq!(turns.len(), before + 2);
    let reply = turns.last().unwrap();
    assert_eq!(reply.role(), Role::Assistant);
    assert_ne!(reply.content(), "It is about X.");
    assert!(reply.content().contains("500"));
    assert!(!session.pending());
}

#[tokio::test]
async fn every_failure_kind_adds_exactly_two_turns() {
    let failures = vec![
        CompletionError::Configuration {
            missing: "PDFCHAT_API_KEY".into(),
        },
        CompletionError::Transport { status: 429 },
        CompletionError::Network {
            detail: "connection refused".into(),
        },
        CompletionError::Parse {
            detail: "expected value".into(),
        },
    ];
    let backend = ScriptedBackend::new(failures.iter().cloned().map(Err).collect());
    let session = session_with(three_pages(), backend);
    session.ingest_document(PDF, "laporan.pdf").await;

    let mut replies = Vec::new();
    for (i, _) in failures.iter().enumerate() {
        let before = session.turn_count();
        session.send_user_turn(&format!("q{i}")).await.unwrap();
        assert_eq!(session.turn_count(), before + 2);
        assert!(!session.pending());
        replies.push(session.turns().last().unwrap().content().to_string());
    }

    assert!(replies[0].contains("PDFCHAT_API_KEY"));
    assert_ne!(replies[0], replies[1], "config vs server errors differ");
    assert_eq!(replies[3], GENERIC_FAILURE_MESSAGE);
}

#[tokio::test]
async fn empty_message_is_rejected_without_request() {
    let backend = ScriptedBackend::new(vec![]);
    let session = session_with(three_pages(), backend.clone());
    session.ingest_document(PDF, "laporan.pdf").await;

    for blank in ["", "   ", "\n\t"] {
        let err = session.send_user_turn(blank).await.unwrap_err();
        assert!(matches!(err, PdfChatError::EmptyMessage));
    }
    assert_eq!(session.turn_count(), 1);
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn send_without_document_is_rejected() {
    let backend = ScriptedBackend::new(vec![]);
    let session = session_with(three_pages(), backend.clone());
    let err = session.send_user_turn("hello").await.unwrap_err();
    assert!(matches!(err, PdfChatError::NoDocument));
    assert_eq!(session.turn_count(), 0);
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn second_send_while_pending_is_rejected() {
    let backend = GatedBackend::new();
    let session = Arc::new(session_with(three_pages(), backend.clone()));
    session.ingest_document(PDF, "laporan.pdf").await;

    let first = {
        let session = session.clone();
        tokio::spawn(async move { session.send_user_turn("first").await })
    };
    wait_until_pending(&session).await;

    // The user's own message is visible before the reply arrives.
    let turns = session.turns();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[1].content(), "first");

    let err = session.send_user_turn("second").await.unwrap_err();
    assert!(matches!(err, PdfChatError::RequestPending));
    assert_eq!(session.turn_count(), 2);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);

    backend.release();
    let reply = first.await.unwrap().unwrap();
    assert!(matches!(reply, Reply::Appended(_)));
    assert_eq!(session.turn_count(), 3);
    assert!(!session.pending());
}

#[tokio::test]
async fn dropped_send_still_settles_the_turn() {
    let backend = GatedBackend::new();
    let session = session_with(three_pages(), backend);
    session.ingest_document(PDF, "laporan.pdf").await;

    let res = tokio::time::timeout(Duration::from_millis(50), session.send_user_turn("slow?")).await;
    assert!(res.is_err(), "backend never answers");

    assert!(!session.pending());
    let turns = session.turns();
    assert_eq!(turns.len(), 3);
    assert_eq!(turns[2].content(), GENERIC_FAILURE_MESSAGE);
}

// ── Reset and stale replies ──────────────────────────────────────────────────

#[tokio::test]
async fn reset_clears_everything_from_any_state() {
    let registry = DisplayRegistry::new();
    let session = session_with(three_pages(), ScriptedBackend::new(vec![]))
        .with_registry(registry.clone());

    session.reset();
    assert_eq!(session.turn_count(), 0);
    assert!(!session.has_document());

    session.ingest_document(PDF, "laporan.pdf").await;
    session.send_user_turn("q").await.unwrap();
    session.reset();
    assert_eq!(session.turn_count(), 0);
    assert!(session.document().is_none());
    assert!(!session.pending());
    assert_eq!(registry.live_handles(), 0);
}

#[tokio::test]
async fn reply_arriving_after_reset_is_discarded() {
    let backend = GatedBackend::new();
    let session = Arc::new(session_with(three_pages(), backend.clone()));
    session.ingest_document(PDF, "laporan.pdf").await;

    let pending = {
        let session = session.clone();
        tokio::spawn(async move { session.send_user_turn("question").await })
    };
    wait_until_pending(&session).await;

    session.reset();
    assert_eq!(session.turn_count(), 0);
    assert!(!session.pending());

    backend.release();
    let reply = pending.await.unwrap().unwrap();
    assert_eq!(reply, Reply::Stale);
    assert_eq!(session.turn_count(), 0);
    assert!(!session.pending());
}

#[tokio::test]
async fn reply_arriving_after_reingest_does_not_leak_into_new_conversation() {
    let backend = GatedBackend::new();
    let session = Arc::new(session_with(three_pages(), backend.clone()));
    session.ingest_document(PDF, "old.pdf").await;

    let pending = {
        let session = session.clone();
        tokio::spawn(async move { session.send_user_turn("about old?").await })
    };
    wait_until_pending(&session).await;

    session.ingest_document(PDF, "new.pdf").await;
    assert_eq!(session.turn_count(), 1);
    assert!(!session.pending(), "new conversation starts idle");

    backend.release();
    assert_eq!(pending.await.unwrap().unwrap(), Reply::Stale);
    let turns = session.turns();
    assert_eq!(turns.len(), 1);
    assert!(turns[0].content().contains("new.pdf"));
}

// ── Observer ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn observer_sees_events_in_order() {
    let log = Arc::new(EventLog::default());
    let session = session_with(three_pages(), ScriptedBackend::new(vec![]))
        .with_observer(log.clone());

    session.ingest_document(PDF, "laporan.pdf").await;
    session.send_user_turn("q").await.unwrap();
    session.reset();

    let events = log.0.lock().unwrap().clone();
    assert_eq!(
        events,
        [
            "loading:true",
            "turn:assistant",
            "loading:false",
            "turn:user",
            "pending:true",
            "turn:assistant",
            "pending:false",
            "reset",
        ]
    );
}

#[tokio::test]
async fn snapshot_reflects_state() {
    let session = session_with(three_pages(), ScriptedBackend::new(vec![]));
    session.ingest_document(PDF, "laporan.pdf").await;
    let snap = session.snapshot();
    assert_eq!(snap.id, session.id());
    assert_eq!(snap.turns.len(), 1);
    assert!(!snap.pending && !snap.loading);
    assert_eq!(snap.document.unwrap().page_count, 3);
}

#[tokio::test]
async fn history_window_limits_what_is_sent() {
    let backend = ScriptedBackend::new(vec![]);
    let config = ChatConfig::builder().max_history_turns(2).build().unwrap();
    let session = Session::with_components(config, three_pages(), backend.clone());
    session.ingest_document(PDF, "laporan.pdf").await;

    for q in ["a", "b", "c"] {
        session.send_user_turn(q).await.unwrap();
    }
    let last = backend.calls().pop().unwrap();
    assert_eq!(last.history.len(), 2);
    assert_eq!(last.history[0].1, "b");
    assert_eq!(session.turn_count(), 7, "stored history is never trimmed");
}
