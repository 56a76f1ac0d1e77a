//! Core `ChatBackend` trait and the `ApiBackend` implementation.
//!
//! `ApiBackend` talks to any OpenAI-compatible `/chat/completions` endpoint
//! (Ollama in OpenAI mode, OpenAI, Groq, LM Studio, vLLM, ...) with
//! `stream: true` and yields the response text as it arrives.  All
//! connection details come from [`LlmConfig`]; nothing is hardcoded.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};

use crate::config::LlmConfig;
use crate::llm::error::LlmError;
use crate::llm::prompt::Prompt;
use crate::llm::sse::{delta_text, SseDecoder};

/// Response text as a stream of chunks.  Chunk boundaries follow the network
/// and carry no meaning; a chunk may be empty.
pub type TextStream = BoxStream<'static, Result<String, LlmError>>;

// ---------------------------------------------------------------------------
// ChatBackend trait
// ---------------------------------------------------------------------------

/// One streamed request against a text-generation endpoint.
///
/// Implementors must be `Send + Sync` so a single backend can be shared by a
/// run executing on a background task.  Retry, backoff and cancellation live
/// in [`GenerationClient`](crate::llm::GenerationClient), not here.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Human-readable endpoint, for status events.
    fn endpoint(&self) -> &str;

    /// Model identifier, for status events.
    fn model(&self) -> &str;

    /// Send `prompt` and return the response text as a stream.  Errors before
    /// the first byte (status codes, connect failures) come back here;
    /// errors mid-body come back as stream items.
    async fn open_stream(&self, prompt: &Prompt) -> Result<TextStream, LlmError>;
}

// ---------------------------------------------------------------------------
// ApiBackend
// ---------------------------------------------------------------------------

/// Calls an OpenAI-compatible chat-completions endpoint.
///
/// The `Authorization: Bearer …` header is attached only when
/// `config.api_key` is a non-empty string, so local providers that need no
/// credential work unchanged.
pub struct ApiBackend {
    client: reqwest::Client,
    config: LlmConfig,
    url: String,
}

impl ApiBackend {
    /// Build an `ApiBackend` from application config.
    ///
    /// The HTTP client carries the connect timeout and a read timeout that
    /// restarts with every chunk, so a long stream that keeps producing is
    /// never cut off.  A default client is used if the builder fails.
    pub fn from_config(config: &LlmConfig) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .read_timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        let url = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));

        Self {
            client,
            config: config.clone(),
            url,
        }
    }

    /// Send a tiny non-streamed request to check credential, model and
    /// reachability before a run.  Returns the model's reply.
    pub async fn probe(&self) -> Result<String, LlmError> {
        log::info!(
            "backend: probing {} (model {})",
            self.url,
            self.config.model
        );

        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                { "role": "user", "content": "Hello, this is a connection test." }
            ],
            "stream": false,
            "max_tokens": 10
        });

        let response = self.send(&body).await?;
        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::Other(format!("failed to parse probe response: {e}")))?;

        let reply = delta_text(&json).unwrap_or_default().trim().to_string();
        log::info!("backend: probe succeeded");
        Ok(reply)
    }

    /// POST `body`, mapping non-success statuses to [`LlmError`].
    async fn send(&self, body: &serde_json::Value) -> Result<reqwest::Response, LlmError> {
        let mut req = self.client.post(&self.url).json(body);

        let key = self.config.api_key.as_deref().unwrap_or("");
        if !key.is_empty() {
            req = req.bearer_auth(key);
        }

        let response = req.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let text = response.text().await.unwrap_or_default();

        log::warn!("backend: HTTP {} from {}", status.as_u16(), self.url);
        Err(LlmError::from_status(status.as_u16(), &text, retry_after))
    }
}

#[async_trait]
impl ChatBackend for ApiBackend {
    fn endpoint(&self) -> &str {
        &self.url
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn open_stream(&self, prompt: &Prompt) -> Result<TextStream, LlmError> {
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": prompt.system() },
                { "role": "user",   "content": prompt.user()   }
            ],
            "stream": true,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens
        });

        let response = self.send(&body).await?;

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/json"));

        if is_json {
            // Some providers ignore `stream: true` and answer in one body.
            log::debug!("backend: non-streamed response");
            let json: serde_json::Value = response
                .json()
                .await
                .map_err(|e| LlmError::Other(format!("failed to parse response: {e}")))?;
            let text = delta_text(&json)
                .ok_or_else(|| LlmError::Other("response carried no message content".into()))?
                .to_string();
            return Ok(stream::once(async move { Ok(text) }).boxed());
        }

        Ok(sse_stream(response))
    }
}

/// Decode an SSE body into text chunks, flushing any unterminated last line.
fn sse_stream(response: reqwest::Response) -> TextStream {
    let body = response.bytes_stream().boxed();

    stream::unfold(
        (body, SseDecoder::default(), false),
        |(mut body, mut decoder, ended)| async move {
            if ended || decoder.is_done() {
                return None;
            }
            match body.next().await {
                Some(Ok(bytes)) => {
                    let item = decoder.feed(&bytes);
                    let ended = item.is_err();
                    Some((item, (body, decoder, ended)))
                }
                Some(Err(e)) => Some((Err(LlmError::from(e)), (body, decoder, true))),
                None => Some((decoder.finish(), (body, decoder, true))),
            }
        },
    )
    .boxed()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TaskKey;
    use crate::llm::{CharacterContext, Language, PromptCompiler};
    use crate::config::PromptConfig;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer, api_key: Option<&str>) -> LlmConfig {
        LlmConfig {
            base_url: format!("{}/v1", server.uri()),
            api_key: api_key.map(str::to_string),
            model: "test-model".into(),
            timeout_secs: 5,
            connect_timeout_secs: 2,
            ..LlmConfig::default()
        }
    }

    fn prompt() -> Prompt {
        let compiler = PromptCompiler::new(
            CharacterContext::new("Mira", "A cheerful shopkeeper."),
            Language::English,
            PromptConfig::default(),
        );
        compiler.compile(&[TaskKey::new("greeting_1")], None)
    }

    async fn collect(stream: TextStream) -> Result<String, LlmError> {
        let chunks: Vec<_> = stream.collect().await;
        let mut text = String::new();
        for chunk in chunks {
            text.push_str(&chunk?);
        }
        Ok(text)
    }

    fn sse_body(parts: &[&str]) -> String {
        let mut body = String::new();
        for part in parts {
            body.push_str(&format!(
                "data: {}\n\n",
                serde_json::json!({"choices": [{"delta": {"content": part}}]})
            ));
        }
        body.push_str("data: [DONE]\n\n");
        body
    }

    #[tokio::test]
    async fn streams_sse_deltas() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse_body(&["{\"greeting_1\": ", "\"hello\"}"])),
            )
            .mount(&server)
            .await;

        let backend = ApiBackend::from_config(&config_for(&server, None));
        let stream = backend.open_stream(&prompt()).await.unwrap();
        assert_eq!(
            collect(stream).await.unwrap(),
            "{\"greeting_1\": \"hello\"}"
        );
    }

    #[tokio::test]
    async fn accepts_non_streamed_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "{\"a\": \"b\"}"}}]
            })))
            .mount(&server)
            .await;

        let backend = ApiBackend::from_config(&config_for(&server, None));
        let stream = backend.open_stream(&prompt()).await.unwrap();
        assert_eq!(collect(stream).await.unwrap(), "{\"a\": \"b\"}");
    }

    #[tokio::test]
    async fn sends_bearer_token_when_configured() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse_body(&["ok"])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let backend = ApiBackend::from_config(&config_for(&server, Some("sk-test")));
        let stream = backend.open_stream(&prompt()).await.unwrap();
        assert_eq!(collect(stream).await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn unauthorized_maps_to_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad api key"))
            .mount(&server)
            .await;

        let backend = ApiBackend::from_config(&config_for(&server, Some("bad")));
        let err = backend.open_stream(&prompt()).await.err().unwrap();
        assert!(matches!(err, LlmError::Auth(_)));
    }

    #[tokio::test]
    async fn rate_limit_carries_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let backend = ApiBackend::from_config(&config_for(&server, None));
        let err = backend.open_stream(&prompt()).await.err().unwrap();
        assert_eq!(
            err,
            LlmError::RateLimited {
                message: String::new(),
                retry_after: Some(Duration::from_secs(7)),
            }
        );
    }

    #[tokio::test]
    async fn server_error_maps_to_server() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let backend = ApiBackend::from_config(&config_for(&server, None));
        let err = backend.open_stream(&prompt()).await.err().unwrap();
        assert!(matches!(err, LlmError::Server { status: 503, .. }));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_connection_error() {
        let config = LlmConfig {
            // Port 9 (discard) on localhost is closed in test environments.
            base_url: "http://127.0.0.1:9/v1".into(),
            connect_timeout_secs: 1,
            timeout_secs: 2,
            ..LlmConfig::default()
        };
        let backend = ApiBackend::from_config(&config);
        let err = backend.open_stream(&prompt()).await.err().unwrap();
        assert!(matches!(err, LlmError::Connection(_) | LlmError::Timeout));
    }

    #[tokio::test]
    async fn probe_returns_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": " Hi! "}}]
            })))
            .mount(&server)
            .await;

        let backend = ApiBackend::from_config(&config_for(&server, None));
        assert_eq!(backend.probe().await.unwrap(), "Hi!");
    }

    /// Serve one chunked SSE response, writing `parts` with `gap` between
    /// them.  Returns the base URL.
    async fn slow_sse_server(parts: Vec<String>, gap: Duration) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();

            // Read the request head and body before answering.
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    return;
                }
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let length = text[..head_end]
                        .lines()
                        .find_map(|l| {
                            let (name, value) = l.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if request.len() >= head_end + 4 + length {
                        break;
                    }
                }
            }

            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\n\
                      transfer-encoding: chunked\r\n\r\n",
                )
                .await
                .unwrap();
            for part in parts {
                tokio::time::sleep(gap).await;
                let chunk = format!("{:x}\r\n{part}\r\n", part.len());
                socket.write_all(chunk.as_bytes()).await.unwrap();
            }
            socket.write_all(b"0\r\n\r\n").await.unwrap();
            socket.flush().await.unwrap();
        });

        format!("http://{addr}/v1")
    }

    #[tokio::test]
    async fn steady_stream_outlives_timeout() {
        let mut parts: Vec<String> = (0..6)
            .map(|i| {
                format!(
                    "data: {}\n\n",
                    serde_json::json!({"choices": [{"delta": {"content": format!("c{i} ")}}]})
                )
            })
            .collect();
        parts.push("data: [DONE]\n\n".to_string());

        // Seven gaps of 300ms: well past the 1s timeout overall.
        let base_url = slow_sse_server(parts, Duration::from_millis(300)).await;
        let config = LlmConfig {
            base_url,
            timeout_secs: 1,
            connect_timeout_secs: 1,
            ..LlmConfig::default()
        };

        let backend = ApiBackend::from_config(&config);
        let stream = backend.open_stream(&prompt()).await.unwrap();
        assert_eq!(collect(stream).await.unwrap(), "c0 c1 c2 c3 c4 c5 ");
    }

    #[test]
    fn endpoint_joins_base_url() {
        let config = LlmConfig {
            base_url: "https://api.example.com/v1/".into(),
            ..LlmConfig::default()
        };
        let backend = ApiBackend::from_config(&config);
        assert_eq!(
            backend.endpoint(),
            "https://api.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn backend_is_object_safe() {
        let backend = ApiBackend::from_config(&LlmConfig::default());
        let _: Box<dyn ChatBackend> = Box::new(backend);
    }
}
