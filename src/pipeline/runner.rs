//! Reconciliation loop: drives batches until every key is resolved or
//! given up on.
//!
//! # Batch flow
//!
//! ```text
//! Dispatched ── request(all batch keys) ──▶ parse ──▶ place
//!   └─▶ missing?  BatchRetry ×N ── request(missing keys only)
//!         └─▶ still missing?  PerKeyRetry ── request([key]) ×M per key
//!               └─▶ still missing?  key is unresolved
//! ```
//!
//! Cancellation is checked at the top of every round, and the generation
//! client also checks it while a request is in flight.

use indexmap::IndexSet;
use thiserror::Error;

use crate::catalog::{Batch, Catalog, CatalogError, Category, TaskKey};
use crate::config::{AppConfig, GenerationConfig, PromptConfig};
use crate::llm::{
    CharacterContext, ChatBackend, Generation, GenerationClient, Language, LlmError,
    PromptCompiler, RetryPolicy,
};
use crate::parse::parse_response;

use super::events::{EventSink, StatusEvent};
use super::report::{ResultMapping, RunReport};
use super::state::{BatchPhase, RunState};

// ---------------------------------------------------------------------------
// RunError
// ---------------------------------------------------------------------------

/// Failures that abort a run.  Everything else degrades to unresolved keys.
#[derive(Debug, Error)]
pub enum RunError {
    /// The endpoint rejected the credential or model; retrying cannot help.
    #[error("run aborted: {0}")]
    Terminal(#[source] LlmError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// The background task panicked or was aborted.
    #[error("internal error: {0}")]
    Internal(String),
}

// ---------------------------------------------------------------------------
// RunRequest
// ---------------------------------------------------------------------------

/// Everything one run needs besides the backend.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub catalog: Catalog,
    pub character: CharacterContext,
    pub language: Language,
    pub batch_size: usize,
    /// Focus every prompt on one category's guidelines.
    pub category_hint: Option<Category>,
}

impl RunRequest {
    /// A request using the configured language and batch size.
    pub fn new(catalog: Catalog, character: CharacterContext, config: &GenerationConfig) -> Self {
        Self {
            catalog,
            character,
            language: config.language.clone(),
            batch_size: config.batch_size,
            category_hint: None,
        }
    }
}

// ---------------------------------------------------------------------------
// ReconcilePolicy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilePolicy {
    /// Whole-batch re-requests restricted to the missing keys.
    pub batch_retry_rounds: u32,
    /// Single-key requests for each key still missing afterwards.
    pub per_key_attempts: u32,
}

impl ReconcilePolicy {
    pub fn from_config(config: &GenerationConfig) -> Self {
        Self {
            batch_retry_rounds: config.batch_retry_rounds,
            per_key_attempts: config.per_key_attempts,
        }
    }
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

/// How one batch ended.  `unresolved` holds the keys given up on, including
/// those that ran out of attempts before a cancellation.
enum BatchOutcome {
    Complete { unresolved: Vec<TaskKey> },
    Cancelled { unresolved: Vec<TaskKey> },
}

/// Per-run context threaded through the batch helpers.
struct RunContext<'a> {
    compiler: PromptCompiler,
    category_hint: Option<Category>,
    run: &'a RunState,
    events: &'a dyn EventSink,
}

/// Drives a catalog through the generation client.
///
/// One `Generator` can serve many runs; share it with `Arc` when runs are
/// started with [`spawn_run`](super::spawn_run).
pub struct Generator<B: ChatBackend> {
    client: GenerationClient<B>,
    prompt_policy: PromptConfig,
    reconcile: ReconcilePolicy,
}

impl<B: ChatBackend> Generator<B> {
    pub fn new(backend: B, config: &AppConfig) -> Self {
        Self::with_parts(
            GenerationClient::new(backend, RetryPolicy::from_config(&config.generation)),
            config.prompt.clone(),
            ReconcilePolicy::from_config(&config.generation),
        )
    }

    pub fn with_parts(
        client: GenerationClient<B>,
        prompt_policy: PromptConfig,
        reconcile: ReconcilePolicy,
    ) -> Self {
        Self {
            client,
            prompt_policy,
            reconcile,
        }
    }

    /// Execute one run to completion, cancellation or a terminal error.
    ///
    /// Resolved lines are emitted through `events` as they are placed, each
    /// key at most once, in resolution order.
    pub async fn run(
        &self,
        request: &RunRequest,
        run: &RunState,
        events: &dyn EventSink,
    ) -> Result<RunReport, RunError> {
        let batches = request.catalog.batches(request.batch_size)?;
        let ctx = RunContext {
            compiler: PromptCompiler::new(
                request.character.clone(),
                request.language.clone(),
                self.prompt_policy.clone(),
            ),
            category_hint: request.category_hint,
            run,
            events,
        };

        log::info!(
            "reconcile: {} keys in {} batches (language {})",
            request.catalog.len(),
            batches.len(),
            request.language
        );
        events.status(StatusEvent::RunStarted {
            keys: request.catalog.len(),
            batches: batches.len(),
        });

        let mut mapping = ResultMapping::new();
        let mut unresolved: Vec<TaskKey> = Vec::new();
        let mut completed = 0;
        let mut cancelled = false;

        for batch in &batches {
            if run.is_cancelled() {
                events.status(StatusEvent::Cancelled);
                cancelled = true;
                break;
            }
            events.status(StatusEvent::BatchStarted {
                index: batch.index,
                total: batches.len(),
                size: batch.len(),
            });

            match self.reconcile_batch(batch, &ctx, &mut mapping).await? {
                BatchOutcome::Complete {
                    unresolved: missing,
                } => {
                    events.status(StatusEvent::BatchFinished {
                        index: batch.index,
                        resolved: batch.len() - missing.len(),
                        unresolved: missing.len(),
                    });
                    unresolved.extend(missing);
                    completed += 1;
                }
                BatchOutcome::Cancelled {
                    unresolved: given_up,
                } => {
                    unresolved.extend(given_up);
                    cancelled = true;
                    break;
                }
            }
        }

        let unresolved_set: IndexSet<&TaskKey> = unresolved.iter().collect();
        let pending: Vec<TaskKey> = request
            .catalog
            .keys()
            .iter()
            .filter(|k| !mapping.contains(k) && !unresolved_set.contains(k))
            .cloned()
            .collect();

        let report = RunReport {
            resolved: mapping.into_inner(),
            unresolved,
            pending,
            cancelled,
            batches_total: batches.len(),
            batches_completed: completed,
            attempts: run.attempts(),
        };

        log::info!("reconcile: {}", report.summary());
        events.status(StatusEvent::RunFinished {
            resolved: report.resolved.len(),
            unresolved: report.unresolved.len(),
            pending: report.pending.len(),
        });
        Ok(report)
    }

    async fn reconcile_batch(
        &self,
        batch: &Batch,
        ctx: &RunContext<'_>,
        mapping: &mut ResultMapping,
    ) -> Result<BatchOutcome, RunError> {
        let mut phase = BatchPhase::Dispatched;
        log::debug!("reconcile: batch {} {}", batch.index + 1, phase.label());

        let Some(mut missing) = self.request_and_place(&batch.keys, ctx, mapping).await? else {
            return Ok(cancelled_batch(batch, Vec::new()));
        };

        let rounds = self.reconcile.batch_retry_rounds;
        for round in 1..=rounds {
            if missing.is_empty() {
                break;
            }
            if ctx.run.is_cancelled() {
                ctx.events.status(StatusEvent::Cancelled);
                return Ok(cancelled_batch(batch, Vec::new()));
            }
            phase = BatchPhase::BatchRetry { round };
            log::debug!(
                "reconcile: batch {} {} {round}",
                batch.index + 1,
                phase.label()
            );
            ctx.events.status(StatusEvent::BatchRetry {
                round,
                max_rounds: rounds,
                missing: missing.len(),
            });

            match self.request_and_place(&missing, ctx, mapping).await? {
                Some(still) => missing = still,
                None => return Ok(cancelled_batch(batch, Vec::new())),
            }
        }

        let mut unresolved = Vec::new();
        if !missing.is_empty() {
            phase = BatchPhase::PerKeyRetry;
            log::debug!("reconcile: batch {} {}", batch.index + 1, phase.label());
        }
        for key in missing {
            let mut filled = false;
            for attempt in 1..=self.reconcile.per_key_attempts {
                if ctx.run.is_cancelled() {
                    ctx.events.status(StatusEvent::Cancelled);
                    return Ok(cancelled_batch(batch, unresolved));
                }
                ctx.events.status(StatusEvent::KeyRetry {
                    key: key.clone(),
                    attempt,
                    max_attempts: self.reconcile.per_key_attempts,
                });

                match self.request_and_place(std::slice::from_ref(&key), ctx, mapping).await? {
                    Some(still) if still.is_empty() => {
                        filled = true;
                        break;
                    }
                    Some(_) => {}
                    None => return Ok(cancelled_batch(batch, unresolved)),
                }
            }
            if !filled {
                log::warn!("reconcile: giving up on {key}");
                ctx.events.status(StatusEvent::KeyUnresolved { key: key.clone() });
                unresolved.push(key);
            }
        }

        phase = BatchPhase::Complete;
        log::debug!("reconcile: batch {} {}", batch.index + 1, phase.label());
        Ok(BatchOutcome::Complete { unresolved })
    }

    /// Request lines for `keys`, place every usable one and return the keys
    /// still missing.  `None` means the run was cancelled.
    async fn request_and_place(
        &self,
        keys: &[TaskKey],
        ctx: &RunContext<'_>,
        mapping: &mut ResultMapping,
    ) -> Result<Option<Vec<TaskKey>>, RunError> {
        let prompt = ctx.compiler.compile(keys, ctx.category_hint);

        let text = match self
            .client
            .generate(&prompt, ctx.run, ctx.events)
            .await
            .map_err(RunError::Terminal)?
        {
            Generation::Text(text) => text,
            Generation::Cancelled => return Ok(None),
            // Nothing to parse; every key stays missing for the next tier.
            Generation::Exhausted => String::new(),
        };

        let parsed = parse_response(&text);
        let mut missing = Vec::new();
        for key in keys {
            if mapping.contains(key) {
                continue;
            }
            match parsed.get(key.as_str()) {
                Some(line) => {
                    if mapping.place(key, line) {
                        ctx.events.resolved(key, line);
                    }
                }
                None => missing.push(key.clone()),
            }
        }

        let ignored = parsed
            .keys()
            .filter(|k| !keys.iter().any(|key| key.as_str() == k.as_str()))
            .count();
        if ignored > 0 {
            log::debug!("reconcile: ignored {ignored} entries for keys not requested");
        }

        Ok(Some(missing))
    }
}

fn cancelled_batch(batch: &Batch, unresolved: Vec<TaskKey>) -> BatchOutcome {
    log::debug!(
        "reconcile: batch {} {}",
        batch.index + 1,
        BatchPhase::Cancelled.label()
    );
    BatchOutcome::Cancelled { unresolved }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
