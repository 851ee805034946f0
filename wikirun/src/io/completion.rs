//! Text-generation service boundary.
//!
//! The [`CompletionClient`] trait decouples deciders from the actual model
//! backend (an OpenAI-compatible `/chat/completions` endpoint). Tests use
//! scripted clients that return predetermined responses without a network.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::core::conversation::ChatMessage;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Parameters for one completion call.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub model: &'a str,
    pub api_base: &'a str,
    pub messages: &'a [ChatMessage],
    /// Sampling seed, forwarded when set.
    pub seed: Option<u64>,
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("build HTTP client")]
    Client(#[source] reqwest::Error),
    #[error("request to {url} timed out")]
    Timeout {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("request to {url} failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("completion endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("decode completion response")]
    Decode(#[source] reqwest::Error),
    #[error("completion response has no message content")]
    EmptyResponse,
}

impl CompletionError {
    /// Transport failures, timeouts, rate limiting and server errors are
    /// worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            CompletionError::Transport { .. } | CompletionError::Timeout { .. } => true,
            CompletionError::Status { status, .. } => *status == 429 || *status >= 500,
            CompletionError::Client(_)
            | CompletionError::Decode(_)
            | CompletionError::EmptyResponse => false,
        }
    }
}

/// Abstraction over chat-completion backends.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Send the conversation and return the assistant's text.
    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, CompletionError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Client for OpenAI-compatible chat completions.
///
/// Every call is bounded by `request_timeout`, so a service that accepts the
/// connection and never answers surfaces as [`CompletionError::Timeout`].
#[derive(Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl OpenAiClient {
    pub fn new(
        api_key: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, CompletionError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT.min(request_timeout))
            .timeout(request_timeout)
            .build()
            .map_err(CompletionError::Client)?;
        Ok(Self { client, api_key })
    }

    /// Read the bearer token from `OPENAI_API_KEY`, if set.
    pub fn from_env(request_timeout: Duration) -> Result<Self, CompletionError> {
        let api_key = std::env::var(API_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty());
        Self::new(api_key, request_timeout)
    }
}

fn transport_error(url: &str, source: reqwest::Error) -> CompletionError {
    let url = url.to_string();
    if source.is_timeout() {
        CompletionError::Timeout { url, source }
    } else {
        CompletionError::Transport { url, source }
    }
}

pub fn completions_url(api_base: &str) -> String {
    format!("{}/chat/completions", api_base.trim_end_matches('/'))
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    #[instrument(skip_all, fields(model = request.model, messages = request.messages.len()))]
    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, CompletionError> {
        let url = completions_url(request.api_base);
        let body = ChatRequest {
            model: request.model,
            messages: request.messages,
            seed: request.seed,
        };

        let mut builder = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder
            .send()
            .await
            .map_err(|source| transport_error(&url, source))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|source| {
            if source.is_timeout() {
                transport_error(&url, source)
            } else {
                CompletionError::Decode(source)
            }
        })?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(CompletionError::EmptyResponse)?;
        debug!(bytes = content.len(), "completion received");
        Ok(content)
    }
}

/// Bounded retry schedule for [`RetryingClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before retry `n` is `base_delay * n`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Retries retryable failures of the wrapped client with linear backoff.
pub struct RetryingClient<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C> RetryingClient<C> {
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<C: CompletionClient> CompletionClient for RetryingClient<C> {
    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, CompletionError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.inner.complete(request).await {
                Ok(text) => return Ok(text),
                Err(err) if attempt < max_attempts && err.is_retryable() => {
                    let delay = self.policy.base_delay.saturating_mul(attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "completion failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FlakyClient {
        failures: Mutex<Vec<CompletionError>>,
        calls: Mutex<u32>,
    }

    impl FlakyClient {
        fn new(failures: Vec<CompletionError>) -> Self {
            Self {
                failures: Mutex::new(failures),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().expect("calls")
        }
    }

    #[async_trait]
    impl CompletionClient for FlakyClient {
        async fn complete(&self, _: &CompletionRequest<'_>) -> Result<String, CompletionError> {
            *self.calls.lock().expect("calls") += 1;
            let mut failures = self.failures.lock().expect("failures");
            if failures.is_empty() {
                Ok("<answer>1</answer>".to_string())
            } else {
                Err(failures.remove(0))
            }
        }
    }

    fn status(code: u16) -> CompletionError {
        CompletionError::Status {
            status: code,
            body: String::new(),
        }
    }

    fn request(messages: &[ChatMessage]) -> CompletionRequest<'_> {
        CompletionRequest {
            model: "m",
            api_base: DEFAULT_API_BASE,
            messages,
            seed: None,
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::ZERO,
        }
    }

    #[test]
    fn retryable_classification() {
        assert!(status(429).is_retryable());
        assert!(status(503).is_retryable());
        assert!(!status(400).is_retryable());
        assert!(!CompletionError::EmptyResponse.is_retryable());
    }

    #[test]
    fn completions_url_trims_trailing_slash() {
        assert_eq!(
            completions_url("http://localhost:8000/v1/"),
            "http://localhost:8000/v1/chat/completions"
        );
    }

    #[test]
    fn request_omits_unset_seed() {
        let messages = vec![ChatMessage::user("hi")];
        let body = ChatRequest {
            model: "m",
            messages: &messages,
            seed: None,
        };
        let json = serde_json::to_value(&body).expect("json");
        assert!(json.get("seed").is_none());
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let client = RetryingClient::new(
            FlakyClient::new(vec![status(503), status(429)]),
            fast_policy(3),
        );
        let messages = vec![ChatMessage::user("hi")];
        let text = client.complete(&request(&messages)).await.expect("completes");
        assert_eq!(text, "<answer>1</answer>");
        assert_eq!(client.inner.calls(), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let client = RetryingClient::new(
            FlakyClient::new(vec![status(500), status(500), status(500)]),
            fast_policy(2),
        );
        let messages = vec![ChatMessage::user("hi")];
        let err = client.complete(&request(&messages)).await.unwrap_err();
        assert!(matches!(err, CompletionError::Status { status: 500, .. }));
        assert_eq!(client.inner.calls(), 2);
    }

    #[tokio::test]
    async fn silent_service_times_out_and_is_retried() {
        // Accepted by the kernel backlog, never answered.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let api_base = format!("http://{}/v1", listener.local_addr().expect("addr"));
        let inner = OpenAiClient::new(None, Duration::from_millis(200)).expect("client");
        let client = RetryingClient::new(inner, fast_policy(2));
        let messages = vec![ChatMessage::user("hi")];
        let request = CompletionRequest {
            api_base: &api_base,
            ..request(&messages)
        };

        let err = tokio::time::timeout(Duration::from_secs(5), client.complete(&request))
            .await
            .expect("completion gave up before the guard")
            .unwrap_err();
        assert!(matches!(err, CompletionError::Timeout { .. }), "{err:?}");
        assert!(err.is_retryable());
        drop(listener);
    }

    #[tokio::test]
    async fn does_not_retry_client_errors() {
        let client = RetryingClient::new(FlakyClient::new(vec![status(401)]), fast_policy(5));
        let messages = vec![ChatMessage::user("hi")];
        assert!(client.complete(&request(&messages)).await.is_err());
        assert_eq!(client.inner.calls(), 1);
    }
}
