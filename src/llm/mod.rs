//! Text generation against an OpenAI-compatible endpoint.
//!
//! This module provides:
//! * [`PromptCompiler`] / [`Prompt`]: character, language and key set in,
//!   system + user message out.
//! * [`CharacterContext`] / [`CharacterProvider`]: who is speaking.
//! * [`Language`]: target language and its addressing rules.
//! * [`ChatBackend`]: one streamed request; [`ApiBackend`] is the HTTP one.
//! * [`GenerationClient`]: retries, backoff and cancellation around a backend.
//! * [`LlmError`]: classified request failures.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use line_forge::catalog::TaskKey;
//! use line_forge::config::AppConfig;
//! use line_forge::llm::{
//!     ApiBackend, CharacterContext, Generation, GenerationClient, PromptCompiler, RetryPolicy,
//! };
//! use line_forge::pipeline::{RecordingSink, RunState};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let client = GenerationClient::new(
//!         ApiBackend::from_config(&config.llm),
//!         RetryPolicy::from_config(&config.generation),
//!     );
//!
//!     let compiler = PromptCompiler::new(
//!         CharacterContext::new("Mira", "A cheerful shopkeeper."),
//!         config.generation.language.clone(),
//!         config.prompt.clone(),
//!     );
//!     let prompt = compiler.compile(&[TaskKey::new("greeting_1")], None);
//!
//!     let sink = RecordingSink::new();
//!     if let Ok(Generation::Text(text)) = client.generate(&prompt, &RunState::new(), &sink).await {
//!         println!("{text}");
//!     }
//! }
//! ```

pub mod backend;
pub mod character;
pub mod client;
pub mod error;
pub mod language;
pub mod prompt;
pub mod sse;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use backend::{ApiBackend, ChatBackend, TextStream};
pub use character::{CharacterContext, CharacterProvider, FileCharacterProvider};
pub use client::{Generation, GenerationClient, RetryPolicy};
pub use error::{FailureCause, LlmError};
pub use language::Language;
pub use prompt::{Prompt, PromptCompiler, PromptDocument};
