//! OpenAI-compatible chat-completions client
//!
//! Posts `stream: true` requests and forwards `choices[0].delta.content`
//! fragments as `StreamPart::TextDelta`.

use std::time::Instant;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::sse::{parse_event, SseEvent, SseLineBuffer};
use super::{Oracle, OracleError, OracleMessage, StreamPart};
use crate::constants;

/// Configuration for the HTTP oracle
#[derive(Debug, Clone)]
pub struct HttpOracleConfig {
    /// Base URL up to and including the API version, e.g. `https://api.openai.com/v1`
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f64,
    pub max_tokens: usize,
}

impl Default for HttpOracleConfig {
    fn default() -> Self {
        Self {
            base_url: constants::ai::DEFAULT_BASE_URL.to_string(),
            model: constants::ai::DEFAULT_MODEL.to_string(),
            api_key: None,
            temperature: constants::ai::DEFAULT_TEMPERATURE,
            max_tokens: constants::ai::MAX_OUTPUT_TOKENS,
        }
    }
}

impl HttpOracleConfig {
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

pub struct HttpOracle {
    http: reqwest::Client,
    config: HttpOracleConfig,
}

impl HttpOracle {
    pub fn new(config: HttpOracleConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &HttpOracleConfig {
        &self.config
    }

    fn request_body(&self, messages: &[OracleMessage]) -> serde_json::Value {
        json!({
            "model": self.config.model,
            "messages": messages,
            "stream": true,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        })
    }
}

#[async_trait]
impl Oracle for HttpOracle {
    async fn call_streaming(
        &self,
        messages: Vec<OracleMessage>,
        cancel: CancellationToken,
    ) -> Result<mpsc::UnboundedReceiver<StreamPart>, OracleError> {
        let call_start = Instant::now();
        let url = self.config.completions_url();
        info!(
            model = %self.config.model,
            messages = messages.len(),
            "Oracle call start"
        );

        let mut request = self.http.post(&url).json(&self.request_body(&messages));
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(OracleError::Request("cancelled before response".to_string()));
            }
            response = request.send() => response?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), "Oracle returned error status");
            return Err(OracleError::Http {
                status: status.as_u16(),
                body,
            });
        }
        debug!(
            elapsed_ms = call_start.elapsed().as_millis() as u64,
            "Oracle stream opened"
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let stream = response.bytes_stream();
        tokio::spawn(async move {
            tokio::pin!(stream);
            let mut buffer = SseLineBuffer::new();
            let mut chunk_count: u64 = 0;
            loop {
                let chunk = tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Oracle stream cancelled after {} chunks", chunk_count);
                        return;
                    }
                    chunk = stream.next() => chunk,
                };
                let Some(chunk) = chunk else { break };
                chunk_count += 1;
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        error!("Oracle read error at chunk #{}: {}", chunk_count, e);
                        let _ = tx.send(StreamPart::Error {
                            error: format!("read error: {}", e),
                        });
                        return;
                    }
                };
                for payload in buffer.push(&bytes) {
                    if forward(&tx, &payload) {
                        return;
                    }
                }
            }
            if let Some(payload) = buffer.finish() {
                if forward(&tx, &payload) {
                    return;
                }
            }
            warn!("Oracle stream ended without [DONE] after {} chunks", chunk_count);
            let _ = tx.send(StreamPart::Finish);
        });

        Ok(rx)
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}

/// Forward one payload; returns true when the stream is over.
fn forward(tx: &mpsc::UnboundedSender<StreamPart>, payload: &str) -> bool {
    match parse_event(payload) {
        Some(SseEvent::Delta(delta)) => {
            let _ = tx.send(StreamPart::TextDelta { delta });
            false
        }
        Some(SseEvent::Error(error)) => {
            let _ = tx.send(StreamPart::Error { error });
            true
        }
        Some(SseEvent::Done) => {
            let _ = tx.send(StreamPart::Finish);
            true
        }
        None => false,
    }
}
