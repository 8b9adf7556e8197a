//! Planner adapter: oracle round-trip, tolerant parse, deterministic fallback

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::fallback::fallback_plan;
use super::parser::{parse_plan, PlanParse};
use super::prompt::build_messages;
use super::types::{Plan, PlanningContext};
use crate::ai::{Oracle, OracleError, StreamPart};
use crate::tools::ToolResult;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanningError {
    #[error("planner unavailable: {0}")]
    Oracle(String),
    #[error("planning cancelled")]
    Cancelled,
    #[error("unable to understand request")]
    UnrecognizedRequest,
}

impl From<OracleError> for PlanningError {
    fn from(err: OracleError) -> Self {
        PlanningError::Oracle(err.to_string())
    }
}

pub struct PlannerAdapter {
    oracle: Arc<dyn Oracle>,
}

impl PlannerAdapter {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self { oracle }
    }

    /// Produce the next plan for `request` given this turn's results so far.
    pub async fn plan(
        &self,
        request: &str,
        ctx: &PlanningContext,
        history: &[ToolResult],
        cancel: &CancellationToken,
    ) -> Result<Plan, PlanningError> {
        let messages = build_messages(request, ctx, history);
        let start = Instant::now();
        let text = self.collect(messages, cancel).await?;
        debug!(
            oracle = self.oracle.name(),
            chars = text.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Planner reply received"
        );

        let parsed = if text.trim().is_empty() {
            PlanParse::Unparseable {
                reason: "empty reply".to_string(),
            }
        } else {
            parse_plan(&text)
        };

        match parsed {
            PlanParse::Parsed(plan) => Ok(plan),
            PlanParse::Recovered { plan, repairs } => {
                let repairs: Vec<String> = repairs.iter().map(ToString::to_string).collect();
                info!(repairs = %repairs.join(", "), "Recovered plan from malformed reply");
                Ok(plan)
            }
            PlanParse::Unparseable { reason } => {
                warn!(reason = %reason, "Planner reply unusable, using fallback planner");
                fallback_plan(request, ctx, history).ok_or(PlanningError::UnrecognizedRequest)
            }
        }
    }

    async fn collect(
        &self,
        messages: Vec<crate::ai::OracleMessage>,
        cancel: &CancellationToken,
    ) -> Result<String, PlanningError> {
        if cancel.is_cancelled() {
            return Err(PlanningError::Cancelled);
        }
        let mut rx = match self.oracle.call_streaming(messages, cancel.clone()).await {
            Ok(rx) => rx,
            Err(_) if cancel.is_cancelled() => return Err(PlanningError::Cancelled),
            Err(err) => {
                error!(oracle = self.oracle.name(), error = %err, "Planner call failed");
                return Err(err.into());
            }
        };

        let mut text = String::new();
        loop {
            let part = tokio::select! {
                _ = cancel.cancelled() => return Err(PlanningError::Cancelled),
                part = rx.recv() => part,
            };
            match part {
                Some(StreamPart::TextDelta { delta }) => text.push_str(&delta),
                Some(StreamPart::Error { error: message }) => {
                    error!(oracle = self.oracle.name(), error = %message, "Planner stream failed");
                    return Err(PlanningError::Oracle(message));
                }
                Some(StreamPart::Finish) | None => break,
            }
        }
        Ok(text)
    }
}
