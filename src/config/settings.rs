//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across tasks.
//! Every section is `#[serde(default)]`, so a partial `settings.toml` only
//! overrides the keys it names.

use std::fmt;
use std::time::Duration;

use anyhow::Result;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::catalog::Category;
use crate::llm::Language;

/// Environment variable that overrides `llm.api_key` when set and non-empty.
pub const API_KEY_ENV: &str = "LINE_FORGE_API_KEY";

// ---------------------------------------------------------------------------
// LlmConfig
// ---------------------------------------------------------------------------

/// Connection settings for the OpenAI-compatible chat endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL up to and including the API version segment.
    ///
    /// - Ollama (OpenAI mode): `http://localhost:11434/v1`
    /// - OpenAI: `https://api.openai.com/v1`
    ///
    /// Requests go to `{base_url}/chat/completions`.
    pub base_url: String,
    /// Bearer credential; `None` for local providers.
    pub api_key: Option<String>,
    /// Model identifier sent with every request.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Upper bound on generated tokens per request.
    pub max_tokens: u32,
    /// Longest wait for the next read, including between streamed chunks.
    pub timeout_secs: u64,
    /// TCP/TLS connect timeout.
    pub connect_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".into(),
            api_key: None,
            model: "qwen2.5:7b".into(),
            temperature: 0.8,
            max_tokens: 2048,
            timeout_secs: 60,
            connect_timeout_secs: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// RateLimitPolicy
// ---------------------------------------------------------------------------

/// How an HTTP 429 from the endpoint is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitPolicy {
    /// Back off (honouring `Retry-After`) and retry within the attempt budget.
    #[default]
    Retry,
    /// Abort the whole run, like an authentication failure.
    Abort,
}

// ---------------------------------------------------------------------------
// BackoffConfig
// ---------------------------------------------------------------------------

/// Base wait per failure cause.  The actual wait is `base × attempt`,
/// capped at `max_secs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub connection_secs: u64,
    pub timeout_secs: u64,
    pub server_secs: u64,
    pub rate_limit_secs: u64,
    /// Used for unclassified failures.
    pub other_secs: u64,
    pub max_secs: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            connection_secs: 5,
            timeout_secs: 10,
            server_secs: 15,
            rate_limit_secs: 15,
            other_secs: 5,
            max_secs: 60,
        }
    }
}

// ---------------------------------------------------------------------------
// GenerationConfig
// ---------------------------------------------------------------------------

/// Batching, retry and cancellation settings for a generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Keys per initial batch (>= 1).
    pub batch_size: usize,
    /// Default target language when the caller does not pick one.
    pub language: Language,
    /// Network attempts per prompt before giving up on it.
    pub max_attempts: u32,
    /// Whole-batch re-requests restricted to missing keys.
    pub batch_retry_rounds: u32,
    /// Single-key requests per key still missing after batch rounds.
    pub per_key_attempts: u32,
    /// Granularity of the cancellation poll during backoff waits.
    pub poll_interval_ms: u64,
    pub rate_limit: RateLimitPolicy,
    pub backoff: BackoffConfig,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            batch_size: 15,
            language: Language::Chinese,
            max_attempts: 3,
            batch_retry_rounds: 3,
            per_key_attempts: 2,
            poll_interval_ms: 500,
            rate_limit: RateLimitPolicy::default(),
            backoff: BackoffConfig::default(),
        }
    }
}

impl GenerationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

// ---------------------------------------------------------------------------
// LengthRange / PromptConfig
// ---------------------------------------------------------------------------

/// Inclusive character-count range stated in the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthRange {
    pub min: u32,
    pub max: u32,
}

impl LengthRange {
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }
}

impl fmt::Display for LengthRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{} characters", self.min, self.max)
    }
}

/// Length policy embedded in every prompt.
///
/// Ranges are instructions to the model only; generated text is not
/// measured or truncated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Range used when a key matches no category override.
    pub default_length: LengthRange,
    /// Overrides keyed by category name (`greeting`, `touch`, ...).
    pub length_by_category: IndexMap<String, LengthRange>,
}

impl Default for PromptConfig {
    fn default() -> Self {
        let length_by_category = Category::ALL
            .into_iter()
            .map(|cat| {
                let range = match cat {
                    Category::Greeting | Category::Reaction | Category::Tease => {
                        LengthRange::new(20, 50)
                    }
                    Category::Impact | Category::Touch => LengthRange::new(10, 30),
                    Category::Breath => LengthRange::new(5, 15),
                };
                (cat.as_str().to_string(), range)
            })
            .collect();

        Self {
            default_length: LengthRange::new(10, 50),
            length_by_category,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use line_forge::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub generation: GenerationConfig,
    pub prompt: PromptConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Replace `llm.api_key` with `value` when it is non-empty.
    pub fn override_api_key(&mut self, value: Option<String>) {
        if let Some(key) = value.filter(|k| !k.trim().is_empty()) {
            self.llm.api_key = Some(key.trim().to_string());
        }
    }

    /// Apply [`API_KEY_ENV`] from the process environment.
    pub fn apply_env(&mut self) {
        self.override_api_key(std::env::var(API_KEY_ENV).ok());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
