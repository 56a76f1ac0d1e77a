//! Events emitted while a run executes.
//!
//! A run reports two kinds of event through an [`EventSink`]: human-readable
//! progress ([`StatusEvent`]) and resolved `(key, line)` pairs.  Sinks must
//! never block the run; the channel sink used by
//! [`spawn_run`](crate::pipeline::spawn_run) is unbounded.

use std::fmt;
use std::sync::Mutex;

use tokio::sync::mpsc::UnboundedSender;

use crate::catalog::TaskKey;
use crate::llm::FailureCause;

// ---------------------------------------------------------------------------
// StatusEvent
// ---------------------------------------------------------------------------

/// Progress notifications.  `Display` renders the status line shown to users.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    RunStarted {
        keys: usize,
        batches: usize,
    },
    BatchStarted {
        index: usize,
        total: usize,
        size: usize,
    },
    Connecting {
        endpoint: String,
        attempt: u32,
        max_attempts: u32,
    },
    ModelSelected {
        model: String,
    },
    PromptCompiled {
        chars: usize,
        keys: usize,
    },
    Streaming,
    Received {
        bytes: usize,
    },
    AttemptFailed {
        cause: FailureCause,
        message: String,
        attempt: u32,
        max_attempts: u32,
    },
    Retrying {
        delay_secs: u64,
        next_attempt: u32,
        max_attempts: u32,
    },
    RetriesExhausted {
        attempts: u32,
    },
    TerminalError {
        message: String,
    },
    BatchRetry {
        round: u32,
        max_rounds: u32,
        missing: usize,
    },
    KeyRetry {
        key: TaskKey,
        attempt: u32,
        max_attempts: u32,
    },
    KeyUnresolved {
        key: TaskKey,
    },
    BatchFinished {
        index: usize,
        resolved: usize,
        unresolved: usize,
    },
    Cancelled,
    RunFinished {
        resolved: usize,
        unresolved: usize,
        pending: usize,
    },
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusEvent::RunStarted { keys, batches } => {
                write!(f, "Starting run: {keys} keys in {batches} batches")
            }
            StatusEvent::BatchStarted { index, total, size } => {
                write!(f, "Batch {}/{total} ({size} keys)", index + 1)
            }
            StatusEvent::Connecting {
                endpoint,
                attempt,
                max_attempts,
            } => write!(
                f,
                "Connecting to {endpoint} (attempt {attempt}/{max_attempts})"
            ),
            StatusEvent::ModelSelected { model } => write!(f, "Using model: {model}"),
            StatusEvent::PromptCompiled { chars, keys } => {
                write!(f, "Prompt compiled: {chars} characters for {keys} keys")
            }
            StatusEvent::Streaming => f.write_str("Receiving response..."),
            StatusEvent::Received { bytes } => write!(f, "Response received: {bytes} bytes"),
            StatusEvent::AttemptFailed {
                cause,
                message,
                attempt,
                max_attempts,
            } => write!(
                f,
                "Attempt {attempt}/{max_attempts} failed ({cause}): {message}"
            ),
            StatusEvent::Retrying {
                delay_secs,
                next_attempt,
                max_attempts,
            } => write!(
                f,
                "Retrying in {delay_secs}s (attempt {next_attempt}/{max_attempts})"
            ),
            StatusEvent::RetriesExhausted { attempts } => {
                write!(f, "Giving up after {attempts} attempts")
            }
            StatusEvent::TerminalError { message } => write!(f, "Fatal error: {message}"),
            StatusEvent::BatchRetry {
                round,
                max_rounds,
                missing,
            } => write!(
                f,
                "Re-requesting {missing} missing keys (round {round}/{max_rounds})"
            ),
            StatusEvent::KeyRetry {
                key,
                attempt,
                max_attempts,
            } => write!(
                f,
                "Retrying {key} on its own (attempt {attempt}/{max_attempts})"
            ),
            StatusEvent::KeyUnresolved { key } => write!(f, "No line for {key}"),
            StatusEvent::BatchFinished {
                index,
                resolved,
                unresolved,
            } => write!(
                f,
                "Batch {} finished: {resolved} resolved, {unresolved} unresolved",
                index + 1
            ),
            StatusEvent::Cancelled => f.write_str("Cancelled"),
            StatusEvent::RunFinished {
                resolved,
                unresolved,
                pending,
            } => write!(
                f,
                "Run finished: {resolved} resolved, {unresolved} unresolved, {pending} pending"
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// RunEvent / EventSink
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Status(StatusEvent),
    /// A key received its line.  Emitted at most once per key.
    Resolved { key: TaskKey, text: String },
}

/// Receiver of run events.  `emit` must return promptly.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: RunEvent);

    fn status(&self, event: StatusEvent) {
        log::debug!("run: {event}");
        self.emit(RunEvent::Status(event));
    }

    fn resolved(&self, key: &TaskKey, text: &str) {
        log::debug!("run: resolved {key}");
        self.emit(RunEvent::Resolved {
            key: key.clone(),
            text: text.to_string(),
        });
    }
}

/// Forwards events into an unbounded channel.  Events sent after the
/// receiver is dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: UnboundedSender<RunEvent>,
}

impl ChannelSink {
    pub fn new(tx: UnboundedSender<RunEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: RunEvent) {
        let _ = self.tx.send(event);
    }
}

/// Keeps every event in memory, in order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<RunEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<RunEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn statuses(&self) -> Vec<StatusEvent> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                RunEvent::Status(s) => Some(s),
                RunEvent::Resolved { .. } => None,
            })
            .collect()
    }

    pub fn resolved_pairs(&self) -> Vec<(TaskKey, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                RunEvent::Resolved { key, text } => Some((key, text)),
                RunEvent::Status(_) => None,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: RunEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
