//! Generation client: one prompt in, one complete response text out.
//!
//! [`GenerationClient`] wraps any [`ChatBackend`] and adds what a single
//! request does not handle: bounded attempts, per-cause backoff, terminal
//! error detection and cooperative cancellation.  Cancellation is observed
//! before each request, while connecting, at every chunk boundary and during
//! backoff waits, all by polling the run's flag.

use std::time::Duration;

use futures::StreamExt;

use crate::config::{BackoffConfig, GenerationConfig, RateLimitPolicy};
use crate::llm::backend::ChatBackend;
use crate::llm::error::{FailureCause, LlmError};
use crate::llm::prompt::Prompt;
use crate::pipeline::{EventSink, RunState, StatusEvent};

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Attempt ceiling and backoff schedule for one prompt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub poll_interval: Duration,
    pub backoff: BackoffConfig,
    pub rate_limit: RateLimitPolicy,
}

impl RetryPolicy {
    pub fn from_config(config: &GenerationConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            poll_interval: config.poll_interval(),
            backoff: config.backoff.clone(),
            rate_limit: config.rate_limit,
        }
    }

    /// Wait before the attempt after `attempt` failed with `err`.
    ///
    /// The per-cause base grows linearly with the attempt number and is
    /// capped at `backoff.max_secs`.  A server-supplied `Retry-After` is a
    /// lower bound on the result.
    pub fn delay_for(&self, err: &LlmError, attempt: u32) -> Duration {
        let b = &self.backoff;
        let base = match err.cause() {
            FailureCause::Connection => b.connection_secs,
            FailureCause::Timeout => b.timeout_secs,
            FailureCause::Server => b.server_secs,
            FailureCause::RateLimit => b.rate_limit_secs,
            _ => b.other_secs,
        };
        let computed = Duration::from_secs(base.saturating_mul(u64::from(attempt)))
            .min(Duration::from_secs(b.max_secs));

        match err {
            LlmError::RateLimited {
                retry_after: Some(after),
                ..
            } => computed.max(*after),
            _ => computed,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&GenerationConfig::default())
    }
}

// ---------------------------------------------------------------------------
// GenerationClient
// ---------------------------------------------------------------------------

/// Outcome of [`GenerationClient::generate`] that is not a terminal error.
#[derive(Debug, Clone, PartialEq)]
pub enum Generation {
    /// The full response text.
    Text(String),
    /// Cancellation was observed; any partial text was discarded.
    Cancelled,
    /// Every attempt failed with a retryable error.
    Exhausted,
}

/// Result of one attempt that did not fail.
enum Attempt {
    Text(String),
    Cancelled,
}

pub struct GenerationClient<B: ChatBackend> {
    backend: B,
    policy: RetryPolicy,
}

impl<B: ChatBackend> GenerationClient<B> {
    pub fn new(backend: B, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    /// Obtain the full response text for `prompt`.
    ///
    /// Returns `Err` only for terminal failures (see
    /// [`LlmError::is_terminal`]); retryable failures that outlast the
    /// attempt ceiling yield [`Generation::Exhausted`].
    pub async fn generate(
        &self,
        prompt: &Prompt,
        run: &RunState,
        events: &dyn EventSink,
    ) -> Result<Generation, LlmError> {
        let max_attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            if run.is_cancelled() {
                events.status(StatusEvent::Cancelled);
                return Ok(Generation::Cancelled);
            }

            run.record_attempt();
            events.status(StatusEvent::Connecting {
                endpoint: self.backend.endpoint().to_string(),
                attempt,
                max_attempts,
            });
            events.status(StatusEvent::ModelSelected {
                model: self.backend.model().to_string(),
            });
            events.status(StatusEvent::PromptCompiled {
                chars: prompt.char_len(),
                keys: prompt.keys().len(),
            });

            let err = match self.attempt(prompt, run, events).await {
                Ok(Attempt::Text(text)) => return Ok(Generation::Text(text)),
                Ok(Attempt::Cancelled) => {
                    events.status(StatusEvent::Cancelled);
                    return Ok(Generation::Cancelled);
                }
                Err(err) => err,
            };

            if err.is_terminal(self.policy.rate_limit) {
                log::error!("client: terminal failure: {err}");
                events.status(StatusEvent::TerminalError {
                    message: err.to_string(),
                });
                return Err(err);
            }

            log::warn!("client: attempt {attempt}/{max_attempts} failed: {err}");
            events.status(StatusEvent::AttemptFailed {
                cause: err.cause(),
                message: err.to_string(),
                attempt,
                max_attempts,
            });

            if attempt == max_attempts {
                break;
            }

            let delay = self.policy.delay_for(&err, attempt);
            events.status(StatusEvent::Retrying {
                delay_secs: delay.as_secs(),
                next_attempt: attempt + 1,
                max_attempts,
            });
            if !run.sleep_unless_cancelled(delay, self.policy.poll_interval).await {
                events.status(StatusEvent::Cancelled);
                return Ok(Generation::Cancelled);
            }
        }

        events.status(StatusEvent::RetriesExhausted {
            attempts: max_attempts,
        });
        Ok(Generation::Exhausted)
    }

    /// One request: connect, then accumulate the streamed body.
    async fn attempt(
        &self,
        prompt: &Prompt,
        run: &RunState,
        events: &dyn EventSink,
    ) -> Result<Attempt, LlmError> {
        let poll = self.policy.poll_interval;

        let mut stream = tokio::select! {
            opened = self.backend.open_stream(prompt) => opened?,
            _ = run.cancelled(poll) => return Ok(Attempt::Cancelled),
        };
        events.status(StatusEvent::Streaming);

        let mut text = String::new();
        loop {
            let chunk = tokio::select! {
                chunk = stream.next() => chunk,
                _ = run.cancelled(poll) => return Ok(Attempt::Cancelled),
            };
            let Some(chunk) = chunk else { break };
            if run.is_cancelled() {
                return Ok(Attempt::Cancelled);
            }
            text.push_str(&chunk?);
        }

        events.status(StatusEvent::Received { bytes: text.len() });
        Ok(Attempt::Text(text))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PromptConfig;
    use crate::llm::{CharacterContext, Language, PromptCompiler};
    use crate::pipeline::RecordingSink;
    use crate::test_support::{keys, Reply, ScriptedBackend};
    use futures::stream;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            poll_interval: Duration::from_millis(5),
            backoff: BackoffConfig {
                connection_secs: 0,
                timeout_secs: 0,
                server_secs: 0,
                rate_limit_secs: 0,
                other_secs: 0,
                max_secs: 0,
            },
            rate_limit: RateLimitPolicy::Retry,
        }
    }

    fn prompt() -> Prompt {
        PromptCompiler::new(
            CharacterContext::new("Mira", "A cheerful shopkeeper."),
            Language::English,
            PromptConfig::default(),
        )
        .compile(&keys(&["greeting_1"]), None)
    }

    #[tokio::test]
    async fn concatenates_chunks() {
        let backend = ScriptedBackend::new([Reply::Chunks(vec![
            "{\"a\":".into(),
            " \"b\"}".into(),
        ])]);
        let client = GenerationClient::new(backend, fast_policy());
        let run = RunState::new();
        let sink = RecordingSink::new();

        let out = client.generate(&prompt(), &run, &sink).await.unwrap();
        assert_eq!(out, Generation::Text("{\"a\": \"b\"}".into()));
        assert_eq!(run.attempts(), 1);
        assert!(sink
            .statuses()
            .contains(&StatusEvent::Received { bytes: 10 }));
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let backend = ScriptedBackend::new([
            Reply::Fail(LlmError::Timeout),
            Reply::Fail(LlmError::Connection("reset".into())),
            Reply::text("ok"),
        ]);
        let client = GenerationClient::new(backend.clone(), fast_policy());
        let run = RunState::new();
        let sink = RecordingSink::new();

        let out = client.generate(&prompt(), &run, &sink).await.unwrap();
        assert_eq!(out, Generation::Text("ok".into()));
        assert_eq!(backend.calls(), 3);

        let retries = sink
            .statuses()
            .into_iter()
            .filter(|s| matches!(s, StatusEvent::Retrying { .. }))
            .count();
        assert_eq!(retries, 2);
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let backend = ScriptedBackend::new((0..5).map(|_| {
            Reply::Fail(LlmError::Server {
                status: 502,
                message: "bad gateway".into(),
            })
        }));
        let client = GenerationClient::new(backend.clone(), fast_policy());
        let run = RunState::new();
        let sink = RecordingSink::new();

        let out = client.generate(&prompt(), &run, &sink).await.unwrap();
        assert_eq!(out, Generation::Exhausted);
        assert_eq!(backend.calls(), 3);
        assert!(sink
            .statuses()
            .contains(&StatusEvent::RetriesExhausted { attempts: 3 }));
    }

    #[tokio::test]
    async fn auth_failure_is_terminal_without_retry() {
        let backend = ScriptedBackend::new([Reply::Fail(LlmError::Auth("bad key".into()))]);
        let client = GenerationClient::new(backend.clone(), fast_policy());
        let run = RunState::new();
        let sink = RecordingSink::new();

        let err = client.generate(&prompt(), &run, &sink).await.unwrap_err();
        assert!(matches!(err, LlmError::Auth(_)));
        assert_eq!(backend.calls(), 1);

        let statuses = sink.statuses();
        assert!(!statuses
            .iter()
            .any(|s| matches!(s, StatusEvent::Retrying { .. })));
        let terminal = statuses
            .iter()
            .filter(|s| matches!(s, StatusEvent::TerminalError { .. }))
            .count();
        assert_eq!(terminal, 1);
    }

    #[tokio::test]
    async fn rate_limit_abort_policy_is_terminal() {
        let backend = ScriptedBackend::new([Reply::Fail(LlmError::RateLimited {
            message: "slow down".into(),
            retry_after: None,
        })]);
        let policy = RetryPolicy {
            rate_limit: RateLimitPolicy::Abort,
            ..fast_policy()
        };
        let client = GenerationClient::new(backend, policy);

        let err = client
            .generate(&prompt(), &RunState::new(), &RecordingSink::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn rate_limit_is_retried_by_default() {
        let backend = ScriptedBackend::new([
            Reply::Fail(LlmError::RateLimited {
                message: "slow down".into(),
                retry_after: Some(Duration::from_millis(50)),
            }),
            Reply::text("ok"),
        ]);
        let client = GenerationClient::new(backend.clone(), fast_policy());
        let run = RunState::new();
        let sink = RecordingSink::new();

        let started = std::time::Instant::now();
        let out = client.generate(&prompt(), &run, &sink).await.unwrap();
        assert_eq!(out, Generation::Text("ok".into()));
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(backend.calls(), 2);
        assert_eq!(run.attempts(), 2);

        let statuses = sink.statuses();
        assert!(statuses.iter().any(|s| matches!(
            s,
            StatusEvent::AttemptFailed {
                cause: FailureCause::RateLimit,
                attempt: 1,
                ..
            }
        )));
        assert!(statuses.contains(&StatusEvent::Retrying {
            delay_secs: 0,
            next_attempt: 2,
            max_attempts: 3,
        }));
        assert!(!statuses
            .iter()
            .any(|s| matches!(s, StatusEvent::TerminalError { .. })));
    }

    #[tokio::test]
    async fn mid_stream_error_is_retried() {
        let broken: TextStreamItems = vec![
            Ok("{\"a\"".into()),
            Err(LlmError::Connection("eof".into())),
        ];
        let backend = ScriptedBackend::new([
            Reply::Stream(stream::iter(broken).boxed()),
            Reply::text("{\"a\": \"b\"}"),
        ]);
        let client = GenerationClient::new(backend, fast_policy());

        let out = client
            .generate(&prompt(), &RunState::new(), &RecordingSink::new())
            .await
            .unwrap();
        assert_eq!(out, Generation::Text("{\"a\": \"b\"}".into()));
    }

    type TextStreamItems = Vec<Result<String, LlmError>>;

    #[tokio::test]
    async fn cancel_before_request_sends_nothing() {
        let backend = ScriptedBackend::new([Reply::text("ok")]);
        let client = GenerationClient::new(backend.clone(), fast_policy());
        let run = RunState::new();
        run.cancel();

        let out = client.generate(&prompt(), &run, &RecordingSink::new()).await.unwrap();
        assert_eq!(out, Generation::Cancelled);
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn cancel_mid_stream_discards_partial_text() {
        let run = RunState::new();
        let handle = run.cancel_handle();

        // First chunk arrives, then the stream stalls forever.
        let stalled = stream::once(async { Ok::<_, LlmError>("{\"a\": \"par".to_string()) })
            .chain(stream::pending())
            .boxed();
        let backend = ScriptedBackend::new([Reply::Stream(stalled)]);
        let client = GenerationClient::new(backend, fast_policy());

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            handle.cancel();
        });

        let out = tokio::time::timeout(
            Duration::from_secs(2),
            client.generate(&prompt(), &run, &RecordingSink::new()),
        )
        .await
        .expect("cancellation should end the stream promptly")
        .unwrap();
        assert_eq!(out, Generation::Cancelled);
    }

    #[tokio::test]
    async fn cancel_during_backoff_returns_promptly() {
        let backend = ScriptedBackend::new([Reply::Fail(LlmError::Server {
            status: 500,
            message: "boom".into(),
        })]);
        let policy = RetryPolicy {
            poll_interval: Duration::from_millis(10),
            backoff: BackoffConfig {
                server_secs: 30,
                max_secs: 60,
                ..BackoffConfig::default()
            },
            ..fast_policy()
        };
        let client = GenerationClient::new(backend.clone(), policy);
        let run = RunState::new();
        let handle = run.cancel_handle();
        let sink = RecordingSink::new();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            handle.cancel();
        });

        let started = std::time::Instant::now();
        let out = client.generate(&prompt(), &run, &sink).await.unwrap();
        assert_eq!(out, Generation::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(backend.calls(), 1);
        assert!(sink.statuses().contains(&StatusEvent::Retrying {
            delay_secs: 30,
            next_attempt: 2,
            max_attempts: 3,
        }));
    }

    #[test]
    fn backoff_scales_and_caps() {
        let policy = RetryPolicy {
            backoff: BackoffConfig::default(),
            ..fast_policy()
        };
        let timeout = LlmError::Timeout;
        assert_eq!(policy.delay_for(&timeout, 1), Duration::from_secs(10));
        assert_eq!(policy.delay_for(&timeout, 2), Duration::from_secs(20));
        assert_eq!(policy.delay_for(&timeout, 9), Duration::from_secs(60));

        let conn = LlmError::Connection("refused".into());
        assert_eq!(policy.delay_for(&conn, 1), Duration::from_secs(5));
    }

    #[test]
    fn retry_after_is_a_floor() {
        let policy = RetryPolicy {
            backoff: BackoffConfig::default(),
            ..fast_policy()
        };
        let err = LlmError::RateLimited {
            message: String::new(),
            retry_after: Some(Duration::from_secs(90)),
        };
        assert_eq!(policy.delay_for(&err, 1), Duration::from_secs(90));

        let err = LlmError::RateLimited {
            message: String::new(),
            retry_after: Some(Duration::from_secs(1)),
        };
        assert_eq!(policy.delay_for(&err, 1), Duration::from_secs(15));
    }
}
