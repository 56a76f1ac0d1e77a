//! Scripted backend shared by the client and pipeline tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use crate::catalog::TaskKey;
use crate::llm::{ChatBackend, LlmError, Prompt, TextStream};

/// One scripted answer to `open_stream`.
pub enum Reply {
    /// Stream these chunks, then end.
    Chunks(Vec<String>),
    /// Fail before the first byte.
    Fail(LlmError),
    /// Hand out an arbitrary stream.
    Stream(TextStream),
}

impl Reply {
    pub fn text(text: &str) -> Self {
        Reply::Chunks(vec![text.to_string()])
    }

    /// A JSON object built from `pairs`, streamed in two halves.
    pub fn json(pairs: &[(&str, &str)]) -> Self {
        let map: serde_json::Map<String, serde_json::Value> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::from(*v)))
            .collect();
        let body = serde_json::Value::Object(map).to_string();
        let mid = body
            .char_indices()
            .nth(body.chars().count() / 2)
            .map_or(0, |(i, _)| i);
        Reply::Chunks(vec![body[..mid].to_string(), body[mid..].to_string()])
    }
}

#[derive(Default)]
struct Script {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<Vec<TaskKey>>>,
}

/// Answers requests from a queue; an exhausted queue answers `{}`.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    script: Arc<Script>,
}

impl ScriptedBackend {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        let backend = Self::default();
        backend.script.replies.lock().unwrap().extend(replies);
        backend
    }

    /// Keys of every prompt received, in order.
    pub fn requests(&self) -> Vec<Vec<TaskKey>> {
        self.script.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.script.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    fn endpoint(&self) -> &str {
        "scripted://test"
    }

    fn model(&self) -> &str {
        "scripted"
    }

    async fn open_stream(&self, prompt: &Prompt) -> Result<TextStream, LlmError> {
        self.script
            .requests
            .lock()
            .unwrap()
            .push(prompt.keys().to_vec());
        let reply = self.script.replies.lock().unwrap().pop_front();
        match reply.unwrap_or_else(|| Reply::text("{}")) {
            Reply::Chunks(chunks) => Ok(stream::iter(chunks.into_iter().map(Ok)).boxed()),
            Reply::Fail(err) => Err(err),
            Reply::Stream(stream) => Ok(stream),
        }
    }
}

pub fn keys(names: &[&str]) -> Vec<TaskKey> {
    names.iter().map(TaskKey::new).collect()
}
