//! Configuration module for line-forge.
//!
//! Provides `AppConfig` (top-level settings), sub-configs for the LLM
//! endpoint, the generation pipeline and the prompt policy, `AppPaths` for
//! cross-platform directories, and TOML persistence via `AppConfig::load` /
//! `AppConfig::save`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    AppConfig, BackoffConfig, GenerationConfig, LengthRange, LlmConfig, PromptConfig,
    RateLimitPolicy, API_KEY_ENV,
};
