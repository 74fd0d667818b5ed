//! Configuration types for a document chat session.
//!
//! Everything a [`crate::session::Session`] needs to know about the remote
//! completion endpoint and about prompt assembly lives in [`ChatConfig`],
//! built via its [`ChatConfigBuilder`].
//!
//! The credential and the endpoint URL are the exception: unless set
//! explicitly on the builder they are read from the environment on every
//! request (see [`ChatConfig::resolve_endpoint`]), so rotating a key or
//! pointing the process at another endpoint takes effect on the next message
//! without rebuilding the session.

use crate::error::{CompletionError, PdfChatError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Environment variable holding the bearer credential.
pub const API_KEY_ENV: &str = "PDFCHAT_API_KEY";

/// Environment variable holding the chat-completions endpoint URL.
pub const API_URL_ENV: &str = "PDFCHAT_API_URL";

/// Environment variable pointing at an existing pdfium library (file or directory).
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Default model identifier sent with every request.
pub const DEFAULT_MODEL: &str = "deepseek/deepseek-chat-v3-0324:free";

/// Configuration for a document chat session.
///
/// # Example
/// ```rust
/// use edgequake_pdfchat::ChatConfig;
///
/// let config = ChatConfig::builder()
///     .model("openai/gpt-4.1-mini")
///     .max_tokens(1024)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_tokens, 1024);
/// ```
#[derive(Clone)]
pub struct ChatConfig {
    /// Model identifier, e.g. `"deepseek/deepseek-chat-v3-0324:free"`.
    pub model: String,

    /// Response-length cap sent as `max_tokens`. Default: 2000.
    pub max_tokens: u32,

    /// Value of the `X-Title` header. Default: `"PDF Chat App"`.
    pub app_title: String,

    /// Value of the `HTTP-Referer` header. Default: `"http://localhost"`.
    pub referer: String,

    /// Language the assistant is told to answer in. Default: `"Indonesian"`.
    pub response_language: String,

    /// `chrono` format string for the ingestion date in the prompt.
    /// Default: `"%-d/%-m/%Y"` (the `id-ID` short date).
    pub date_format: String,

    /// Optional limits on what goes into each request. Default: none.
    pub grounding: GroundingPolicy,

    /// Explicit bearer credential. If None, read from [`API_KEY_ENV`] per request.
    pub api_key: Option<String>,

    /// Explicit endpoint URL. If None, read from [`API_URL_ENV`] per request.
    pub api_url: Option<String>,

    /// Per-request timeout in seconds. If None, a request runs until the
    /// server answers or the connection drops.
    pub request_timeout_secs: Option<u64>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 2000,
            app_title: "PDF Chat App".to_string(),
            referer: "http://localhost".to_string(),
            response_language: "Indonesian".to_string(),
            date_format: "%-d/%-m/%Y".to_string(),
            grounding: GroundingPolicy::default(),
            api_key: None,
            api_url: None,
            request_timeout_secs: None,
        }
    }
}

impl fmt::Debug for ChatConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatConfig")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("app_title", &self.app_title)
            .field("referer", &self.referer)
            .field("response_language", &self.response_language)
            .field("date_format", &self.date_format)
            .field("grounding", &self.grounding)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_url", &self.api_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl ChatConfig {
    /// Create a new builder for `ChatConfig`.
    pub fn builder() -> ChatConfigBuilder {
        ChatConfigBuilder {
            config: Self::default(),
        }
    }

    /// Resolve the endpoint URL and credential for one request.
    ///
    /// Explicit values win; otherwise the environment is consulted *now*.
    /// Blank values count as missing. The URL is checked first so a process
    /// with neither set reports the endpoint, which is the more fundamental gap.
    pub fn resolve_endpoint(&self) -> Result<Endpoint, CompletionError> {
        let url = pick(self.api_url.as_deref(), API_URL_ENV).ok_or_else(|| {
            CompletionError::Configuration {
                missing: API_URL_ENV.to_string(),
            }
        })?;
        let api_key = pick(self.api_key.as_deref(), API_KEY_ENV).ok_or_else(|| {
            CompletionError::Configuration {
                missing: API_KEY_ENV.to_string(),
            }
        })?;
        Ok(Endpoint { url, api_key })
    }
}

fn pick(explicit: Option<&str>, env_key: &str) -> Option<String> {
    explicit
        .map(str::to_string)
        .or_else(|| std::env::var(env_key).ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// A resolved endpoint: where to POST and which bearer token to carry.
#[derive(Clone)]
pub struct Endpoint {
    pub url: String,
    pub api_key: String,
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("url", &self.url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Builder for [`ChatConfig`].
#[derive(Debug)]
pub struct ChatConfigBuilder {
    config: ChatConfig,
}

impl ChatConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn app_title(mut self, title: impl Into<String>) -> Self {
        self.config.app_title = title.into();
        self
    }

    pub fn referer(mut self, referer: impl Into<String>) -> Self {
        self.config.referer = referer.into();
        self
    }

    pub fn response_language(mut self, language: impl Into<String>) -> Self {
        self.config.response_language = language.into();
        self
    }

    pub fn date_format(mut self, format: impl Into<String>) -> Self {
        self.config.date_format = format.into();
        self
    }

    pub fn grounding(mut self, policy: GroundingPolicy) -> Self {
        self.config.grounding = policy;
        self
    }

    pub fn max_document_chars(mut self, n: usize) -> Self {
        self.config.grounding.max_document_chars = Some(n);
        self
    }

    pub fn max_history_turns(mut self, n: usize) -> Self {
        self.config.grounding.max_history_turns = Some(n);
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_url = Some(url.into());
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = Some(secs);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ChatConfig, PdfChatError> {
        let c = &self.config;
        if c.model.trim().is_empty() {
            return Err(PdfChatError::InvalidConfig("Model must not be empty".into()));
        }
        if c.max_tokens == 0 {
            return Err(PdfChatError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.grounding.max_document_chars == Some(0) {
            return Err(PdfChatError::InvalidConfig(
                "max_document_chars must be ≥ 1 when set".into(),
            ));
        }
        if c.grounding.max_history_turns == Some(0) {
            return Err(PdfChatError::InvalidConfig(
                "max_history_turns must be ≥ 1 when set".into(),
            ));
        }
        if c.request_timeout_secs == Some(0) {
            return Err(PdfChatError::InvalidConfig(
                "request_timeout_secs must be ≥ 1 when set".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Optional caps on how much document text and history each request carries.
///
/// Both default to `None`: the whole document and the whole conversation are
/// sent with every message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingPolicy {
    /// Embed at most this many characters of extracted text.
    pub max_document_chars: Option<usize>,
    /// Send at most this many of the most recent turns as history.
    pub max_history_turns: Option<usize>,
}

impl GroundingPolicy {
    /// `true` when nothing is cut.
    pub fn is_full(&self) -> bool {
        self.max_document_chars.is_none() && self.max_history_turns.is_none()
    }
}
