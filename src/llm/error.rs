//! Error taxonomy for calls to the text-generation endpoint.
//!
//! Every failure is either **terminal** (stops the whole run) or
//! **retryable** (backoff, then another attempt).  The split is decided by
//! [`LlmError::is_terminal`]; rate limiting depends on the configured
//! [`RateLimitPolicy`].

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::config::RateLimitPolicy;

// ---------------------------------------------------------------------------
// LlmError
// ---------------------------------------------------------------------------

/// Errors that can occur during a generation request.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LlmError {
    /// Credential rejected (HTTP 401/403).
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Unknown model or endpoint (HTTP 404).
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// HTTP 429.  `retry_after` comes from the `Retry-After` header.
    #[error("rate limit exceeded: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    /// Could not connect, or the connection dropped mid-stream.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The request did not complete within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// HTTP 5xx.
    #[error("server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    /// Anything else: unexpected status, malformed envelope, provider error
    /// event inside the stream.
    #[error("unexpected LLM response: {0}")]
    Other(String),
}

impl LlmError {
    /// Map a non-success HTTP status and its body to an error variant.
    pub fn from_status(status: u16, body: &str, retry_after: Option<Duration>) -> Self {
        let message = summarize_body(body);
        match status {
            401 | 403 => LlmError::Auth(message),
            404 => LlmError::ModelNotFound(message),
            429 => LlmError::RateLimited {
                message,
                retry_after,
            },
            500..=599 => LlmError::Server { status, message },
            _ => LlmError::Other(format!("HTTP {status}: {message}")),
        }
    }

    /// Whether this failure must abort the run instead of being retried.
    pub fn is_terminal(&self, rate_limit: RateLimitPolicy) -> bool {
        match self {
            LlmError::Auth(_) | LlmError::ModelNotFound(_) => true,
            LlmError::RateLimited { .. } => rate_limit == RateLimitPolicy::Abort,
            _ => false,
        }
    }

    pub fn cause(&self) -> FailureCause {
        match self {
            LlmError::Auth(_) => FailureCause::Auth,
            LlmError::ModelNotFound(_) => FailureCause::NotFound,
            LlmError::RateLimited { .. } => FailureCause::RateLimit,
            LlmError::Connection(_) => FailureCause::Connection,
            LlmError::Timeout => FailureCause::Timeout,
            LlmError::Server { .. } => FailureCause::Server,
            LlmError::Other(_) => FailureCause::Other,
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::Timeout
        } else if let Some(status) = e.status() {
            LlmError::from_status(status.as_u16(), &e.to_string(), None)
        } else if e.is_connect() || e.is_request() || e.is_body() {
            LlmError::Connection(e.to_string())
        } else {
            LlmError::Other(e.to_string())
        }
    }
}

/// Keep error bodies short enough for a status line.
fn summarize_body(body: &str) -> String {
    const MAX_CHARS: usize = 300;

    // Prefer the OpenAI-style `{"error": {"message": ...}}` message.
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v["error"]["message"]
                .as_str()
                .or_else(|| v["error"].as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string());

    if message.chars().count() > MAX_CHARS {
        let cut: String = message.chars().take(MAX_CHARS).collect();
        format!("{cut}...")
    } else {
        message
    }
}

// ---------------------------------------------------------------------------
// FailureCause
// ---------------------------------------------------------------------------

/// Coarse failure class, used to pick a backoff interval and for status text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureCause {
    Auth,
    NotFound,
    RateLimit,
    Connection,
    Timeout,
    Server,
    Other,
}

impl FailureCause {
    pub fn label(self) -> &'static str {
        match self {
            FailureCause::Auth => "authentication",
            FailureCause::NotFound => "model not found",
            FailureCause::RateLimit => "rate limit",
            FailureCause::Connection => "connection",
            FailureCause::Timeout => "timeout",
            FailureCause::Server => "server",
            FailureCause::Other => "unexpected",
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
