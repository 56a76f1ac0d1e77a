//! Background execution of a run.
//!
//! [`spawn_run`] starts a run on the tokio runtime and returns a
//! [`RunHandle`]: a lazy, single-pass sequence of [`RunEvent`]s plus a way to
//! cancel and to collect the final [`RunReport`].

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::llm::ChatBackend;

use super::events::{ChannelSink, RunEvent};
use super::report::RunReport;
use super::runner::{Generator, RunError, RunRequest};
use super::state::{CancelHandle, RunState};

/// Caller's side of a running generation.
pub struct RunHandle {
    events: mpsc::UnboundedReceiver<RunEvent>,
    cancel: CancelHandle,
    task: JoinHandle<Result<RunReport, RunError>>,
}

impl RunHandle {
    /// Next event, or `None` once the run has finished and every event has
    /// been delivered.
    pub async fn next_event(&mut self) -> Option<RunEvent> {
        self.events.recv().await
    }

    /// Request cancellation.  Idempotent; the run stops at its next check.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A cloneable handle for cancelling from elsewhere (e.g. a signal task).
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Wait for the run to end.  Undelivered events are dropped.
    pub async fn finish(self) -> Result<RunReport, RunError> {
        drop(self.events);
        self.task
            .await
            .map_err(|e| RunError::Internal(format!("run task failed: {e}")))?
    }
}

/// Start `request` on a background task.
pub fn spawn_run<B>(generator: Arc<Generator<B>>, request: RunRequest) -> RunHandle
where
    B: ChatBackend + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let state = RunState::new();
    let cancel = state.cancel_handle();

    let task = tokio::spawn(async move {
        let sink = ChannelSink::new(tx);
        generator.run(&request, &state, &sink).await
    });

    RunHandle {
        events: rx,
        cancel,
        task,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
