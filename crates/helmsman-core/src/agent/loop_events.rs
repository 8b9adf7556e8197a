//! Event protocol for one conversational turn.
//!
//! `TurnEvent` is everything the orchestrator emits while handling a turn.
//! Front ends (the CLI REPL, tests) consume these and render them however
//! they like.

use serde::Serialize;

use crate::tools::{ToolCall, ToolResult};

/// Events emitted by the orchestrator during a turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    // ── Streaming ──────────────────────────────────────────────────────
    /// Narrative text from the result formatter.
    TextDelta { delta: String },

    // ── Planning ───────────────────────────────────────────────────────
    /// A plan was produced for this iteration.
    PlanProposed {
        iteration: usize,
        summary: String,
        tool_calls: Vec<ToolCall>,
        done: bool,
    },

    // ── Tool lifecycle ─────────────────────────────────────────────────
    /// A tool call is about to be dispatched.
    ToolExecuting { call: ToolCall },

    /// A tool call finished (successfully or not).
    ToolResult { result: ToolResult },

    // ── Interaction ────────────────────────────────────────────────────
    /// Mutating calls are queued; the turn is suspended until the operator
    /// replies with one of the triggers.
    ConfirmationRequired {
        summary: String,
        calls: Vec<ToolCall>,
        confirm_trigger: String,
        cancel_trigger: String,
    },

    /// Informational message (iteration cap, discarded pending action).
    Notice { message: String },

    /// The operator declined, or the turn was cancelled.
    Cancelled { message: String },

    /// The turn failed before any mutation.
    Error { message: String },

    // ── Lifecycle ──────────────────────────────────────────────────────
    /// Always the last event of a turn.
    Finished { outcome: TurnOutcome },
}

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    Completed,
    AwaitingConfirmation,
    Cancelled,
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn events_serialize_with_snake_case_tags() {
        let event = TurnEvent::Finished {
            outcome: TurnOutcome::AwaitingConfirmation,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "finished", "outcome": "awaiting_confirmation"})
        );
    }
}
