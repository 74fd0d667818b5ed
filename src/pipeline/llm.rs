//! Chat completion: one request/response cycle against the remote endpoint.
//!
//! The session talks to a [`ChatBackend`]; [`HttpChatClient`] is the real
//! one, speaking the OpenAI-compatible `chat/completions` wire format (as
//! served by OpenRouter and friends).
//!
//! ## Message Layout
//!
//! The request contains (in order):
//! 1. **System message**: the grounding prompt from [`crate::prompts`]
//! 2. **History**: every prior turn, role for role
//! 3. **User message**: the new question
//!
//! ## Outcomes
//!
//! A call yields the reply text or exactly one [`CompletionError`]. There is
//! no retry: a failure is final for that message and the session turns it
//! into an explanatory reply.

use crate::config::ChatConfig;
use crate::conversation::Turn;
use crate::error::CompletionError;
use crate::prompts::EMPTY_REPLY_FALLBACK;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Reply text, or why there is none.
pub type CompletionOutcome = Result<String, CompletionError>;

/// Executes one completion request.
///
/// `history` is the conversation as it stood *before* `new_user_content`;
/// implementations must not expect the new message to appear in it.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        history: &[Turn],
        new_user_content: &str,
    ) -> CompletionOutcome;
}

// ── Wire types ───────────────────────────────────────────────────────────────

/// Body of a `chat/completions` POST.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    pub max_tokens: u32,
}

/// One `{role, content}` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: String,
    pub content: String,
}

impl WireMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Build the request body: system, then history, then the new user message.
pub fn build_request(
    config: &ChatConfig,
    system_prompt: &str,
    history: &[Turn],
    new_user_content: &str,
) -> ChatCompletionRequest {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(WireMessage::new("system", system_prompt));
    messages.extend(
        history
            .iter()
            .map(|t| WireMessage::new(t.role().as_str(), t.content())),
    );
    messages.push(WireMessage::new("user", new_user_content));

    ChatCompletionRequest {
        model: config.model.clone(),
        messages,
        max_tokens: config.max_tokens,
    }
}

/// Interpret a success-status body.
///
/// Only the first choice is consulted. A missing or blank `message.content`
/// becomes [`EMPTY_REPLY_FALLBACK`]; no choices at all, or a body that is not
/// a completion response, is a [`CompletionError::Parse`].
pub fn parse_response(body: &str) -> CompletionOutcome {
    let parsed: ChatCompletionResponse =
        serde_json::from_str(body).map_err(|e| CompletionError::Parse {
            detail: e.to_string(),
        })?;

    let first = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| CompletionError::Parse {
            detail: "response has no choices".to_string(),
        })?;

    let content = first
        .message
        .and_then(|m| m.content)
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| EMPTY_REPLY_FALLBACK.to_string());
    Ok(content)
}

// ── HTTP client ──────────────────────────────────────────────────────────────

/// [`ChatBackend`] that POSTs to an OpenAI-compatible endpoint.
///
/// Endpoint URL and bearer credential are resolved from the config (or the
/// environment) on every call, so a missing credential surfaces as
/// [`CompletionError::Configuration`] on that call and not before.
#[derive(Debug, Clone)]
pub struct HttpChatClient {
    http: reqwest::Client,
    config: ChatConfig,
}

impl HttpChatClient {
    pub fn new(config: ChatConfig) -> Self {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder.build().unwrap_or_else(|e| {
            warn!("Falling back to default HTTP client: {}", e);
            reqwest::Client::new()
        });
        Self { http, config }
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }
}

#[async_trait]
impl ChatBackend for HttpChatClient {
    async fn complete(
        &self,
        system_prompt: &str,
        history: &[Turn],
        new_user_content: &str,
    ) -> CompletionOutcome {
        let endpoint = self.config.resolve_endpoint()?;
        let body = build_request(&self.config, system_prompt, history, new_user_content);

        let start = Instant::now();
        debug!(
            "POST {} ({} messages, system prompt {} chars)",
            endpoint.url,
            body.messages.len(),
            system_prompt.len()
        );

        let response = self
            .http
            .post(&endpoint.url)
            .bearer_auth(&endpoint.api_key)
            .header("Content-Type", "application/json")
            .header("HTTP-Referer", &self.config.referer)
            .header("X-Title", &self.config.app_title)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!("Completion request failed: {}", e);
                CompletionError::Network {
                    detail: e.to_string(),
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!("Completion endpoint returned HTTP {}", status.as_u16());
            return Err(CompletionError::Transport {
                status: status.as_u16(),
            });
        }

        let text = response.text().await.map_err(|e| CompletionError::Parse {
            detail: format!("failed to read body: {}", e),
        })?;

        let outcome = parse_response(&text);
        match &outcome {
            Ok(reply) => debug!(
                "Completion ok: {} chars in {:?}",
                reply.len(),
                start.elapsed()
            ),
            Err(e) => warn!("{}", e),
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_layout_system_history_user() {
        let config = ChatConfig::default();
        let history = vec![Turn::assistant("welcome"), Turn::user("q1"), Turn::assistant("a1")];
        let req = build_request(&config, "SYS", &history, "q2");

        let roles: Vec<&str> = req.messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, ["system", "assistant", "user", "assistant", "user"]);
        assert_eq!(req.messages[0].content, "SYS");
        assert_eq!(req.messages[4].content, "q2");
        assert_eq!(req.max_tokens, 2000);
        assert_eq!(req.model, config.model);
    }

    #[test]
    fn request_serialises_to_expected_json() {
        let req = build_request(&ChatConfig::default(), "s", &[], "hi");
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["messages"][1]["role"], "user");
        assert_eq!(v["messages"][1]["content"], "hi");
        assert_eq!(v["max_tokens"], 2000);
    }

    #[test]
    fn parse_first_choice() {
        let body = r#"{"choices":[{"message":{"content":"It is about X."}},{"message":{"content":"ignored"}}]}"#;
        assert_eq!(parse_response(body).unwrap(), "It is about X.");
    }

    #[test]
    fn parse_empty_content_uses_fallback() {
        let body = r#"{"choices":[{"message":{"content":""}}]}"#;
        assert_eq!(parse_response(body).unwrap(), EMPTY_REPLY_FALLBACK);
        let body = r#"{"choices":[{"message":{}}]}"#;
        assert_eq!(parse_response(body).unwrap(), EMPTY_REPLY_FALLBACK);
        let body = r#"{"choices":[{}]}"#;
        assert_eq!(parse_response(body).unwrap(), EMPTY_REPLY_FALLBACK);
    }

    #[test]
    fn parse_rejects_malformed_bodies() {
        assert!(matches!(
            parse_response("<html>oops</html>"),
            Err(CompletionError::Parse { .. })
        ));
        assert!(matches!(
            parse_response(r#"{"choices":[]}"#),
            Err(CompletionError::Parse { .. })
        ));
        assert!(matches!(
            parse_response(r#"{"error":{"message":"quota"}}"#),
            Err(CompletionError::Parse { .. })
        ));
    }

    #[tokio::test]
    async fn missing_configuration_fails_before_network() {
        let _guard = crate::config::tests::ENV_LOCK
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        std::env::remove_var(crate::config::API_URL_ENV);
        std::env::remove_var(crate::config::API_KEY_ENV);

        let client = HttpChatClient::new(ChatConfig::default());
        let err = client.complete("s", &[], "hi").await.unwrap_err();
        assert!(matches!(err, CompletionError::Configuration { .. }));
    }
}
