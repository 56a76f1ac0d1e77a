//! Run orchestration: reconciliation, cancellation and progress events.
//!
//! # Architecture
//!
//! ```text
//! spawn_run(generator, request) ──▶ RunHandle
//!        │                           ├─ next_event()  (status + resolved lines)
//!        ▼                           ├─ cancel()
//! Generator::run()  ← tokio task     └─ finish() → RunReport
//!        │
//!        ├─ Catalog::batches()
//!        └─ per batch: GenerationClient::generate → parse_response → place
//!              └─ missing keys: batch rounds, then per-key attempts
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use line_forge::catalog::Catalog;
//! use line_forge::config::AppConfig;
//! use line_forge::llm::{ApiBackend, CharacterContext};
//! use line_forge::pipeline::{spawn_run, Generator, RunEvent, RunRequest};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let generator = Arc::new(Generator::new(ApiBackend::from_config(&config.llm), &config));
//!
//!     let catalog: Catalog = ["greeting_1", "tease_1"].into_iter().collect();
//!     let character = CharacterContext::new("Mira", "A cheerful shopkeeper.");
//!     let request = RunRequest::new(catalog, character, &config.generation);
//!
//!     let mut handle = spawn_run(generator, request);
//!     while let Some(event) = handle.next_event().await {
//!         if let RunEvent::Resolved { key, text } = event {
//!             println!("{key}: {text}");
//!         }
//!     }
//!     let report = handle.finish().await.unwrap();
//!     println!("{}", report.summary());
//! }
//! ```

pub mod events;
pub mod handle;
pub mod report;
pub mod runner;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use events::{ChannelSink, EventSink, RecordingSink, RunEvent, StatusEvent};
pub use handle::{spawn_run, RunHandle};
pub use report::{ResultMapping, RunReport};
pub use runner::{Generator, ReconcilePolicy, RunError, RunRequest};
pub use state::{BatchPhase, CancelHandle, RunState};
