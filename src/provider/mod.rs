//! Upstream AI service clients.
//!
//! Handlers only see the [`CompletionClient`] and [`SpeechClient`] traits, so
//! the real reqwest-backed clients can be swapped for fakes in tests.

mod completion;
mod speech;

pub use completion::OpenAiCompatClient;
pub use speech::HumeClient;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use reqwest::StatusCode;

use crate::proxy::types::CompletionRequest;

/// Incremental text fragments from a streaming completion.
pub type FragmentStream = BoxStream<'static, Result<String, ProviderError>>;

/// Audio chunks from a synthesis call, in playback order.
pub type AudioStream = BoxStream<'static, Result<Bytes, ProviderError>>;

/// Case-insensitive markers of a rate-limit or quota failure in error text.
pub const RATE_LIMIT_MARKERS: &[&str] = &["rate", "limit", "quota", "exceeded", "429", "403"];

/// Longest upstream error body kept in an error message.
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Failure of a single upstream call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    /// Quota or rate-limit exhaustion; the only class that triggers key failover.
    #[error("rate limited: {message}")]
    RateLimited {
        status: Option<u16>,
        message: String,
    },

    /// Timeouts, connection failures, upstream 5xx.
    #[error("upstream unavailable: {0}")]
    Transient(String),

    /// Anything that will not succeed on another attempt.
    #[error("upstream failure: {0}")]
    Fatal(String),
}

impl ProviderError {
    /// Build an error from a non-success upstream status and its body.
    ///
    /// The status decides when it can; otherwise the body is checked for
    /// rate-limit markers.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = format!("status {}: {}", status.as_u16(), truncate_body(body));

        if matches!(status.as_u16(), 429 | 403) || mentions_rate_limit(body) {
            return ProviderError::RateLimited {
                status: Some(status.as_u16()),
                message,
            };
        }

        if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
            ProviderError::Transient(message)
        } else {
            ProviderError::Fatal(message)
        }
    }

    /// Short classification label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::RateLimited { .. } => "rate_limited",
            ProviderError::Transient(_) => "transient",
            ProviderError::Fatal(_) => "fatal",
        }
    }

    /// The message without the classification prefix.
    pub fn detail(&self) -> &str {
        match self {
            ProviderError::RateLimited { message, .. } => message,
            ProviderError::Transient(message) | ProviderError::Fatal(message) => message,
        }
    }

    /// Whether this failure should be treated as rate/quota exhaustion.
    ///
    /// Structured `RateLimited` errors always qualify; other variants qualify
    /// when their message carries one of [`RATE_LIMIT_MARKERS`].
    pub fn is_rate_limited(&self) -> bool {
        match self {
            ProviderError::RateLimited { .. } => true,
            other => mentions_rate_limit(other.detail()),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            return ProviderError::from_status(status, &e.to_string());
        }
        if e.is_timeout() {
            ProviderError::Transient(format!("timed out: {}", e))
        } else if e.is_connect() {
            ProviderError::Transient(format!("connection failed: {}", e))
        } else if e.is_decode() {
            ProviderError::Fatal(format!("malformed response: {}", e))
        } else {
            ProviderError::Transient(e.to_string())
        }
    }
}

/// Case-insensitive check of `text` against [`RATE_LIMIT_MARKERS`].
pub fn mentions_rate_limit(text: &str) -> bool {
    let lower = text.to_lowercase();
    RATE_LIMIT_MARKERS
        .iter()
        .any(|marker| lower.contains(marker))
}

fn truncate_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX_ERROR_BODY_CHARS {
        return trimmed.to_string();
    }
    let mut cut: String = trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect();
    cut.push_str("...");
    cut
}

/// A hosted chat-completion service.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Wait for the full response and return its text.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError>;

    /// Start a streaming completion.
    ///
    /// An `Err` here means the upstream refused the request before any
    /// fragment was produced.
    async fn stream(&self, request: &CompletionRequest) -> Result<FragmentStream, ProviderError>;
}

/// A hosted text-to-speech service bound to one credential.
#[async_trait]
pub trait SpeechClient: Send + Sync {
    /// Start synthesizing `text`; the returned stream yields audio chunks.
    async fn synthesize(&self, text: &str) -> Result<AudioStream, ProviderError>;
}
