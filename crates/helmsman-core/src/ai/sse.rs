//! Server-sent events handling for chat-completions streams

use serde_json::Value;

/// A decoded SSE event relevant to chat completions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// Text fragment from `choices[0].delta.content`
    Delta(String),
    /// Provider-side error object embedded in the stream
    Error(String),
    /// `data: [DONE]`
    Done,
}

/// Accumulates raw body bytes and yields complete `data:` payloads.
///
/// Chunks may split lines (and UTF-8 sequences) anywhere, so bytes are held
/// until a newline arrives.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning the `data:` payloads completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut payloads = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            if let Some(data) = data_payload(&line) {
                payloads.push(data);
            }
        }
        payloads
    }

    /// Flush a trailing line with no final newline.
    pub fn finish(&mut self) -> Option<String> {
        let line = std::mem::take(&mut self.pending);
        data_payload(&line)
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim_end_matches(['\r', '\n']);
    let data = line.strip_prefix("data:")?;
    let data = data.strip_prefix(' ').unwrap_or(data);
    (!data.is_empty()).then(|| data.to_string())
}

/// Decode one `data:` payload. Unparseable payloads and keep-alives yield
/// `None`.
pub fn parse_event(data: &str) -> Option<SseEvent> {
    if data.trim() == "[DONE]" {
        return Some(SseEvent::Done);
    }
    let json: Value = serde_json::from_str(data).ok()?;
    if let Some(error) = json.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Some(SseEvent::Error(message));
    }
    json.pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .map(|text| SseEvent::Delta(text.to_string()))
}
