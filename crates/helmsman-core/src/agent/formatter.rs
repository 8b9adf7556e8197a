//! Result formatter: narrates a turn's results through the oracle
//!
//! Never fails. Whenever the oracle cannot produce a narrative the raw result
//! history is emitted instead, after whatever partial text already streamed.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::loop_events::TurnEvent;
use crate::ai::{Oracle, OracleMessage, StreamPart};
use crate::tools::ToolResult;

const FORMATTER_PROMPT: &str = "You report the outcome of Kubernetes cluster operations to an operator. \
Say what was attempted, what succeeded and what failed, using only the results provided. \
Be concise. Use plain text or short lists. Never claim an operation ran if it is not in the results.";

pub struct ResultFormatter {
    oracle: Arc<dyn Oracle>,
}

impl ResultFormatter {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self { oracle }
    }

    pub async fn format(
        &self,
        request: &str,
        summary: &str,
        history: &[ToolResult],
        cancel: &CancellationToken,
        events: &mpsc::UnboundedSender<TurnEvent>,
    ) {
        let messages = vec![
            OracleMessage::system(FORMATTER_PROMPT),
            OracleMessage::user(format!(
                "Request: {}\nPlan summary: {}\nResults:\n{}",
                request,
                if summary.is_empty() { "(none)" } else { summary },
                history_json(history)
            )),
        ];

        let mut rx = match self.oracle.call_streaming(messages, cancel.clone()).await {
            Ok(rx) => rx,
            Err(err) => {
                warn!(error = %err, "Formatter unavailable, emitting raw results");
                emit_raw(summary, history, false, events);
                return;
            }
        };

        let mut streamed = false;
        loop {
            let part = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Formatter cancelled");
                    break;
                }
                part = rx.recv() => part,
            };
            match part {
                Some(StreamPart::TextDelta { delta }) => {
                    streamed |= !delta.is_empty();
                    let _ = events.send(TurnEvent::TextDelta { delta });
                }
                Some(StreamPart::Error { error }) => {
                    warn!(error = %error, "Formatter stream failed");
                    break;
                }
                Some(StreamPart::Finish) | None => {
                    if streamed {
                        return;
                    }
                    break;
                }
            }
        }
        emit_raw(summary, history, streamed, events);
    }
}

fn history_json(history: &[ToolResult]) -> String {
    serde_json::to_string_pretty(history).unwrap_or_else(|_| "[]".to_string())
}

/// Structured fallback: the plan summary followed by the raw result list.
pub fn render_raw(summary: &str, history: &[ToolResult]) -> String {
    let mut out = String::new();
    if !summary.is_empty() {
        out.push_str(summary);
        out.push_str("\n\n");
    }
    if history.is_empty() {
        out.push_str("No operations were executed.");
    } else {
        let failed = history.iter().filter(|r| !r.ok).count();
        out.push_str(&format!(
            "{} operation(s), {} failed:\n{}",
            history.len(),
            failed,
            history_json(history)
        ));
    }
    out
}

fn emit_raw(
    summary: &str,
    history: &[ToolResult],
    after_partial: bool,
    events: &mpsc::UnboundedSender<TurnEvent>,
) {
    let mut delta = render_raw(summary, history);
    if after_partial {
        delta.insert_str(0, "\n\n");
    }
    let _ = events.send(TurnEvent::TextDelta { delta });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::testing::{ScriptedOracle, ScriptedReply};
    use crate::ai::OfflineOracle;
    use crate::tools::{Operation, ToolCall};
    use serde_json::json;

    fn history() -> Vec<ToolResult> {
        let ok = ToolCall::new(Operation::ListNamespaces, json!({}));
        let bad = ToolCall::new(Operation::ScaleDeployment, json!({"name": "web", "replicas": 50}));
        vec![
            ToolResult::success(&ok, json!({"items": [{"name": "default"}]})),
            ToolResult::failure(&bad, "replicas 50 exceed maximum 10"),
        ]
    }

    async fn run(oracle: Arc<dyn Oracle>, cancel: CancellationToken) -> String {
        let (tx, mut rx) = mpsc::unbounded_channel();
        ResultFormatter::new(oracle)
            .format("scale web", "Scale web", &history(), &cancel, &tx)
            .await;
        drop(tx);
        let mut text = String::new();
        while let Some(event) = rx.recv().await {
            if let TurnEvent::TextDelta { delta } = event {
                text.push_str(&delta);
            }
        }
        text
    }

    #[tokio::test]
    async fn streams_oracle_narrative() {
        let oracle = Arc::new(ScriptedOracle::new([ScriptedReply::text(
            "Listed 1 namespace. Scaling web failed: too many replicas.",
        )]));
        let text = run(oracle, CancellationToken::new()).await;
        assert_eq!(text, "Listed 1 namespace. Scaling web failed: too many replicas.");
    }

    #[tokio::test]
    async fn silent_oracle_yields_raw_dump() {
        let text = run(Arc::new(OfflineOracle), CancellationToken::new()).await;
        assert!(text.starts_with("Scale web\n\n2 operation(s), 1 failed:"));
        assert!(text.contains("replicas 50 exceed maximum 10"));
    }

    #[tokio::test]
    async fn stream_error_appends_raw_dump_after_partial_text() {
        let oracle = Arc::new(ScriptedOracle::new([ScriptedReply::StreamError {
            partial: "Listed one".to_string(),
            error: "connection reset".to_string(),
        }]));
        let text = run(oracle, CancellationToken::new()).await;
        assert!(text.starts_with("Listed one\n\nScale web"));
    }

    #[tokio::test]
    async fn open_failure_yields_raw_dump() {
        let oracle = Arc::new(ScriptedOracle::new([ScriptedReply::OpenError(
            "unreachable".to_string(),
        )]));
        let text = run(oracle, CancellationToken::new()).await;
        assert!(text.contains("2 operation(s), 1 failed"));
    }

    #[tokio::test]
    async fn cancelled_formatter_yields_raw_dump() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let oracle = Arc::new(ScriptedOracle::new([ScriptedReply::Hang]));
        let text = run(oracle, cancel).await;
        assert!(text.contains("2 operation(s), 1 failed"));
    }

    #[test]
    fn raw_dump_with_no_history() {
        assert_eq!(render_raw("", &[]), "No operations were executed.");
    }
}
