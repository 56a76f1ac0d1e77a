//! Incremental decoder for OpenAI-style server-sent events.
//!
//! Network chunks may split lines (and multi-byte characters) anywhere, so
//! bytes are buffered until a newline arrives.  Each `data:` line carries a
//! JSON chunk whose `choices[0].delta.content` is appended to the output;
//! `data: [DONE]` ends the stream.

use crate::llm::error::LlmError;

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    /// `true` once `[DONE]` has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed one network chunk; returns the text deltas it completed (may be
    /// empty).  A provider error event inside the stream becomes `Err`.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<String, LlmError> {
        self.buffer.extend_from_slice(bytes);

        let mut out = String::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            self.handle_line(line.trim_end_matches(['\r', '\n']), &mut out)?;
        }
        Ok(out)
    }

    /// Flush a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Result<String, LlmError> {
        let rest = std::mem::take(&mut self.buffer);
        let mut out = String::new();
        if !rest.is_empty() {
            let line = String::from_utf8_lossy(&rest);
            self.handle_line(line.trim_end_matches(['\r', '\n']), &mut out)?;
        }
        Ok(out)
    }

    fn handle_line(&mut self, line: &str, out: &mut String) -> Result<(), LlmError> {
        if self.done {
            return Ok(());
        }
        let Some(data) = line.strip_prefix("data:") else {
            // Comments (`:`), `event:`, `id:` and blank separators.
            return Ok(());
        };
        let data = data.trim();
        if data == "[DONE]" {
            self.done = true;
            return Ok(());
        }
        if data.is_empty() {
            return Ok(());
        }

        let json: serde_json::Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                log::debug!("sse: skipping non-JSON data line ({e}): {data}");
                return Ok(());
            }
        };

        if let Some(err) = json.get("error") {
            let message = err["message"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| err.to_string());
            return Err(LlmError::Other(format!("stream error event: {message}")));
        }

        if let Some(text) = delta_text(&json) {
            out.push_str(text);
        }
        Ok(())
    }
}

/// Text carried by one chunk, across the envelope shapes providers use.
pub(crate) fn delta_text(json: &serde_json::Value) -> Option<&str> {
    let choice = &json["choices"][0];
    choice["delta"]["content"]
        .as_str()
        .or_else(|| choice["message"]["content"].as_str())
        .or_else(|| choice["text"].as_str())
        .or_else(|| json["content"].as_str())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"delta": {"content": content}}]})
        )
    }

    #[test]
    fn decodes_deltas_and_done() {
        let mut dec = SseDecoder::default();
        let mut text = dec.feed(chunk("{\"greeting_1\":").as_bytes()).unwrap();
        text += &dec.feed(chunk(" \"hi\"}").as_bytes()).unwrap();
        text += &dec.feed(b"data: [DONE]\n\n").unwrap();
        assert_eq!(text, "{\"greeting_1\": \"hi\"}");
        assert!(dec.is_done());
    }

    #[test]
    fn lines_split_across_chunks() {
        let full = chunk("你好");
        let bytes = full.as_bytes();
        // Split inside the multi-byte characters.
        let (a, b) = bytes.split_at(bytes.len() / 2 + 1);

        let mut dec = SseDecoder::default();
        let first = dec.feed(a).unwrap();
        let second = dec.feed(b).unwrap();
        assert_eq!(first, "");
        assert_eq!(second, "你好");
    }

    #[test]
    fn ignores_comments_and_role_only_chunks() {
        let mut dec = SseDecoder::default();
        let role = "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n";
        let input = format!(": keep-alive\n\nevent: message\n{role}");
        let text = dec.feed(input.as_bytes()).unwrap();
        assert_eq!(text, "");
    }

    #[test]
    fn data_after_done_is_ignored() {
        let mut dec = SseDecoder::default();
        dec.feed(b"data: [DONE]\n").unwrap();
        assert_eq!(dec.feed(chunk("late").as_bytes()).unwrap(), "");
    }

    #[test]
    fn error_event_becomes_err() {
        let mut dec = SseDecoder::default();
        let err = dec
            .feed(b"data: {\"error\": {\"message\": \"overloaded\"}}\n")
            .unwrap_err();
        assert!(matches!(
            err,
            LlmError::Other(m) if m.contains("overloaded")
        ));
    }

    #[test]
    fn finish_flushes_unterminated_line() {
        let mut dec = SseDecoder::default();
        let line = chunk("tail");
        let unterminated = line.trim_end();
        assert_eq!(dec.feed(unterminated.as_bytes()).unwrap(), "");
        assert_eq!(dec.finish().unwrap(), "tail");
    }
}
