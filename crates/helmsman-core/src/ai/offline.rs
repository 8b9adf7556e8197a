//! Oracle used when no model endpoint is configured

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{Oracle, OracleError, OracleMessage, StreamPart};

/// Finishes every call immediately with no text. The planner then uses its
/// deterministic fallback and the formatter dumps raw results.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineOracle;

#[async_trait]
impl Oracle for OfflineOracle {
    async fn call_streaming(
        &self,
        _messages: Vec<OracleMessage>,
        _cancel: CancellationToken,
    ) -> Result<mpsc::UnboundedReceiver<StreamPart>, OracleError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(StreamPart::Finish);
        Ok(rx)
    }

    fn name(&self) -> &str {
        "offline"
    }
}
