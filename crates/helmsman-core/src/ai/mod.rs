//! Language-model oracle port and clients
//!
//! - `types` - Messages, stream parts, errors
//! - `client` - OpenAI-compatible chat-completions client over SSE
//! - `sse` - Line buffering and delta extraction for SSE bodies
//! - `offline` - Oracle that never answers, forcing deterministic fallbacks

pub mod client;
pub mod offline;
pub mod sse;
#[cfg(test)]
pub(crate) mod testing;
pub mod types;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use client::{HttpOracle, HttpOracleConfig};
pub use offline::OfflineOracle;
pub use types::{OracleError, OracleMessage, Role, StreamPart};

/// Text-in/text-out oracle with a streamed reply.
///
/// `Err` means the stream could not be opened. Once open, failures arrive as
/// `StreamPart::Error`. Implementations should stop producing parts when
/// `cancel` fires.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn call_streaming(
        &self,
        messages: Vec<OracleMessage>,
        cancel: CancellationToken,
    ) -> Result<mpsc::UnboundedReceiver<StreamPart>, OracleError>;

    /// Short label for logs
    fn name(&self) -> &str;
}
