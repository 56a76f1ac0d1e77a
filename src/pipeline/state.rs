//! Batch phase machine and shared run state.
//!
//! [`BatchPhase`] tracks where the reconciler is inside one batch.
//! [`RunState`] is shared by everything executing a run: the cancellation
//! flag (set from outside through a [`CancelHandle`], polled inside) and the
//! attempt counter.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

// ---------------------------------------------------------------------------
// BatchPhase
// ---------------------------------------------------------------------------

/// Phases of one batch inside a run.
///
/// ```text
/// Dispatched ──response──▶ BatchRetry (missing keys, up to N rounds)
///                          ──still missing──▶ PerKeyRetry
///            ──all filled──▶ Complete
/// any phase ──cancel──▶ Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPhase {
    /// The initial request for the whole batch is in flight.
    Dispatched,

    /// Re-requesting the keys the previous response did not fill.
    BatchRetry { round: u32 },

    /// Requesting one leftover key at a time.
    PerKeyRetry,

    /// Every key is either resolved or given up on.
    Complete,

    /// Cancellation was observed before the batch finished.
    Cancelled,
}

impl BatchPhase {
    /// Short name used in log lines.
    ///
    /// ```
    /// use line_forge::pipeline::BatchPhase;
    ///
    /// assert_eq!(BatchPhase::PerKeyRetry.label(), "per-key retry");
    /// assert_eq!(BatchPhase::Cancelled.label(), "cancelled");
    /// ```
    pub fn label(&self) -> &'static str {
        match self {
            BatchPhase::Dispatched => "dispatched",
            BatchPhase::BatchRetry { .. } => "batch retry",
            BatchPhase::PerKeyRetry => "per-key retry",
            BatchPhase::Complete => "complete",
            BatchPhase::Cancelled => "cancelled",
        }
    }
}

// ---------------------------------------------------------------------------
// CancelHandle
// ---------------------------------------------------------------------------

/// Caller-side handle that requests cancellation of a run.
///
/// Cheap to clone.  Cancelling is idempotent and never blocks.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        if !self.flag.swap(true, Ordering::SeqCst) {
            log::info!("run: cancellation requested");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// RunState
// ---------------------------------------------------------------------------

/// State shared by the components executing one run.
#[derive(Debug, Default)]
pub struct RunState {
    cancel: CancelHandle,
    attempts: AtomicU32,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle that cancels this run.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Count one request attempt; returns the new total.
    pub fn record_attempt(&self) -> u32 {
        self.attempts.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Total request attempts made so far in this run.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Resolves once cancellation is observed, checking every `poll`.
    pub async fn cancelled(&self, poll: Duration) {
        while !self.is_cancelled() {
            tokio::time::sleep(poll).await;
        }
    }

    /// Sleep for `total` in `poll`-sized steps.  Returns `false` if the run
    /// was cancelled before the full interval elapsed.
    pub async fn sleep_unless_cancelled(&self, total: Duration, poll: Duration) -> bool {
        let deadline = Instant::now() + total;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            tokio::time::sleep(poll.min(deadline - now)).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
