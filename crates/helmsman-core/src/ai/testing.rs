//! Scripted oracle for tests

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{Oracle, OracleError, OracleMessage, StreamPart};

#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Stream the text in small fragments, then finish
    Text(String),
    /// Fail to open the stream
    OpenError(String),
    /// Stream some text, then an error fragment
    StreamError { partial: String, error: String },
    /// Open the stream and never produce anything
    Hang,
}

impl ScriptedReply {
    pub fn text(text: impl Into<String>) -> Self {
        ScriptedReply::Text(text.into())
    }
}

/// Replays queued replies in order and records every prompt it receives.
/// Once the queue is empty, `repeat` (if set) answers every further call.
pub struct ScriptedOracle {
    replies: Mutex<VecDeque<ScriptedReply>>,
    repeat: Option<ScriptedReply>,
    calls: Mutex<Vec<Vec<OracleMessage>>>,
    hung: Mutex<Vec<mpsc::UnboundedSender<StreamPart>>>,
}

impl ScriptedOracle {
    pub fn new(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            repeat: None,
            calls: Mutex::new(Vec::new()),
            hung: Mutex::new(Vec::new()),
        }
    }

    pub fn repeating(reply: ScriptedReply) -> Self {
        Self {
            repeat: Some(reply),
            ..Self::new(Vec::<ScriptedReply>::new())
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls(&self) -> Vec<Vec<OracleMessage>> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn call_streaming(
        &self,
        messages: Vec<OracleMessage>,
        _cancel: CancellationToken,
    ) -> Result<mpsc::UnboundedReceiver<StreamPart>, OracleError> {
        self.calls.lock().push(messages);
        let reply = self
            .replies
            .lock()
            .pop_front()
            .or_else(|| self.repeat.clone())
            .ok_or_else(|| OracleError::Request("script exhausted".to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        match reply {
            ScriptedReply::Text(text) => {
                send_fragments(&tx, &text);
                let _ = tx.send(StreamPart::Finish);
            }
            ScriptedReply::OpenError(error) => return Err(OracleError::Request(error)),
            ScriptedReply::StreamError { partial, error } => {
                send_fragments(&tx, &partial);
                let _ = tx.send(StreamPart::Error { error });
            }
            ScriptedReply::Hang => self.hung.lock().push(tx),
        }
        Ok(rx)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn send_fragments(tx: &mpsc::UnboundedSender<StreamPart>, text: &str) {
    let chars: Vec<char> = text.chars().collect();
    for chunk in chars.chunks(16) {
        let _ = tx.send(StreamPart::TextDelta {
            delta: chunk.iter().collect(),
        });
    }
}
