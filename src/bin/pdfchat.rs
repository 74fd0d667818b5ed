//! CLI binary for edgequake-pdfchat.
//!
//! A thin terminal front-end over the library: load a PDF, then chat about
//! it line by line. All conversation state lives in [`Session`]; this file
//! only renders it.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdfchat::config::DEFAULT_MODEL;
use edgequake_pdfchat::{
    load_input, ChatConfig, HttpChatClient, IngestOutcome, PdfiumExtractor, Reply, Role, Session,
    SessionObserver, TextExtractor,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── Spinner observer using indicatif ─────────────────────────────────────────

/// Shows a spinner while a document is extracted or a reply is pending.
struct SpinnerObserver {
    bar: Mutex<Option<ProgressBar>>,
}

impl SpinnerObserver {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            bar: Mutex::new(None),
        })
    }

    fn start(&self, message: &'static str) {
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        let bar = ProgressBar::new_spinner();
        bar.set_style(style);
        bar.set_message(message);
        bar.enable_steady_tick(Duration::from_millis(80));
        if let Some(old) = self.slot().replace(bar) {
            old.finish_and_clear();
        }
    }

    fn stop(&self) {
        if let Some(bar) = self.slot().take() {
            bar.finish_and_clear();
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<ProgressBar>> {
        self.bar.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SessionObserver for SpinnerObserver {
    fn on_pending_changed(&self, pending: bool) {
        if pending {
            self.start("Thinking…");
        } else {
            self.stop();
        }
    }

    fn on_loading_changed(&self, loading: bool) {
        if loading {
            self.start("Extracting text…");
        } else {
            self.stop();
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Chat interactively about a local file
  pdfchat report.pdf

  # Ask one question and exit
  pdfchat report.pdf --ask "Summarise section 2"

  # Several questions, answers in English, JSON transcript on stdout
  pdfchat paper.pdf --language English --ask "Who are the authors?" --ask "What is the main result?" --json

  # Download from a URL
  pdfchat https://arxiv.org/pdf/1706.03762.pdf

INTERACTIVE COMMANDS:
  /open <path|url>   load another document (replaces the conversation)
  /reset             forget the document and the conversation
  /info              show the current document
  /quit              exit

ENVIRONMENT VARIABLES:
  PDFCHAT_API_URL    chat/completions endpoint, e.g. https://openrouter.ai/api/v1/chat/completions
  PDFCHAT_API_KEY    bearer token for the endpoint
  PDFCHAT_MODEL      override the model ID
  PDFIUM_LIB_PATH    path to libpdfium (file or directory) if not installed system-wide

  PDFCHAT_API_URL and PDFCHAT_API_KEY are read on every message, not at startup.
"#;

/// Chat with a PDF document using any OpenAI-compatible endpoint.
#[derive(Parser, Debug)]
#[command(
    name = "pdfchat",
    version,
    about = "Chat with a PDF document using any OpenAI-compatible endpoint",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL. Optional in interactive mode.
    input: Option<String>,

    /// Model ID sent with every request.
    #[arg(long, env = "PDFCHAT_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Response-length cap per reply.
    #[arg(long, env = "PDFCHAT_MAX_TOKENS", default_value_t = 2000)]
    max_tokens: u32,

    /// Endpoint URL. Default: PDFCHAT_API_URL, read per request.
    #[arg(long)]
    api_url: Option<String>,

    /// Bearer token. Default: PDFCHAT_API_KEY, read per request.
    #[arg(long)]
    api_key: Option<String>,

    /// Language the assistant answers in.
    #[arg(long, env = "PDFCHAT_LANGUAGE", default_value = "Indonesian")]
    language: String,

    /// Embed at most this many characters of document text per request.
    #[arg(long, env = "PDFCHAT_MAX_DOCUMENT_CHARS")]
    max_document_chars: Option<usize>,

    /// Send at most this many previous turns per request.
    #[arg(long, env = "PDFCHAT_MAX_HISTORY_TURNS")]
    max_history_turns: Option<usize>,

    /// Ask this question and exit (repeatable). Skips interactive mode.
    #[arg(long)]
    ask: Vec<String>,

    /// Print the final session snapshot as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Path to libpdfium (file or directory).
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// HTTP download timeout in seconds for URL inputs.
    #[arg(long, env = "PDFCHAT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Per-request timeout in seconds for the completion endpoint.
    #[arg(long, env = "PDFCHAT_REQUEST_TIMEOUT")]
    request_timeout: Option<u64>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFCHAT_VERBOSE")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Library INFO logs would interleave with the chat; keep them to
    // warnings unless asked.
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli)?;
    let extractor: Arc<dyn TextExtractor> = match cli.pdfium_lib {
        Some(ref path) => Arc::new(PdfiumExtractor::with_library_path(path)),
        None => Arc::new(PdfiumExtractor::new()),
    };
    let backend = Arc::new(HttpChatClient::new(config.clone()));
    let session = Session::with_components(config, extractor, backend)
        .with_observer(SpinnerObserver::new());

    if let Some(ref input) = cli.input {
        open(&session, input, cli.download_timeout).await;
    }

    if !cli.ask.is_empty() {
        for question in &cli.ask {
            eprintln!("{} {}", bold("you>"), question);
            send(&session, question).await;
        }
    } else {
        repl(&session, cli.download_timeout).await?;
    }

    if cli.json {
        let json = serde_json::to_string_pretty(&session.snapshot())
            .context("Failed to serialise session")?;
        println!("{json}");
    }

    Ok(())
}

/// Map CLI args to `ChatConfig`.
fn build_config(cli: &Cli) -> Result<ChatConfig> {
    let mut builder = ChatConfig::builder()
        .model(cli.model.clone())
        .max_tokens(cli.max_tokens)
        .response_language(cli.language.clone());

    if let Some(ref url) = cli.api_url {
        builder = builder.api_url(url.clone());
    }
    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key.clone());
    }
    if let Some(n) = cli.max_document_chars {
        builder = builder.max_document_chars(n);
    }
    if let Some(n) = cli.max_history_turns {
        builder = builder.max_history_turns(n);
    }
    if let Some(secs) = cli.request_timeout {
        builder = builder.request_timeout_secs(secs);
    }

    builder.build().context("Invalid configuration")
}

async fn repl(session: &Session, download_timeout: u64) -> Result<()> {
    eprintln!(
        "{} {}",
        cyan("◆"),
        dim("Type a question, /open <file>, /reset, /info or /quit.")
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("{} ", bold("you>"));
        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let line = line.trim();

        match line.split_once(' ').map_or((line, ""), |(c, rest)| (c, rest.trim())) {
            ("/quit" | "/exit", _) => break,
            ("/reset", _) => {
                session.reset();
                eprintln!("{} {}", green("✔"), "Session cleared.");
            }
            ("/info", _) => print_info(session),
            ("/open", "") => eprintln!("{} usage: /open <path|url>", red("✘")),
            ("/open", target) => open(session, target, download_timeout).await,
            ("", _) => {}
            _ => send(session, line).await,
        }
    }
    Ok(())
}

async fn open(session: &Session, input: &str, download_timeout: u64) {
    let doc = match load_input(input, download_timeout).await {
        Ok(doc) => doc,
        Err(e) => {
            eprintln!("{} {}", red("✘"), e);
            return;
        }
    };

    let outcome = session.ingest_document(doc.bytes, &doc.name).await;
    if let IngestOutcome::Failed(ref e) = outcome {
        tracing::debug!("ingest failure detail: {}", e);
    }
    print_last_assistant(session);
}

async fn send(session: &Session, question: &str) {
    match session.send_user_turn(question).await {
        Ok(Reply::Appended(turn)) => print_assistant(turn.content()),
        Ok(Reply::Stale) => eprintln!("{}", dim("(reply discarded: session changed)")),
        Err(e) => eprintln!("{} {}", red("✘"), e),
    }
}

fn print_last_assistant(session: &Session) {
    if let Some(turn) = session.turns().last() {
        if turn.role() == Role::Assistant {
            print_assistant(turn.content());
        }
    }
}

fn print_assistant(content: &str) {
    println!("{} {}\n", cyan("assistant>"), content);
}

fn print_info(session: &Session) {
    match session.document() {
        Some(doc) => {
            eprintln!("File:         {}", doc.source_name);
            eprintln!("Pages:        {}", doc.page_count);
            eprintln!("Characters:   {}", doc.text_len);
            eprintln!("Loaded:       {}", doc.ingested_at.to_rfc3339());
            eprintln!("Turns:        {}", session.turn_count());
        }
        None => eprintln!("{}", dim("No document loaded.")),
    }
}
