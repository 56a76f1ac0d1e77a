//! line-forge: batch generation of short character lines from an
//! OpenAI-compatible text-generation endpoint.
//!
//! * [`catalog`]: task keys, categories, catalog loading and batching.
//! * [`config`]: TOML settings and platform paths.
//! * [`llm`]: prompt compilation, the streaming backend and the retrying
//!   generation client.
//! * [`parse`]: repair of model output into a key → line mapping.
//! * [`pipeline`]: reconciliation loop, cancellation and run events.
//! * [`store`]: sinks for resolved lines.

pub mod catalog;
pub mod config;
pub mod llm;
pub mod parse;
pub mod pipeline;
pub mod store;

#[cfg(test)]
mod test_support;
