//! Helmsman core
//!
//! Turns free-text operator intent into a bounded, auditable sequence of
//! cluster operations. Read-only calls run eagerly; mutating calls always stop
//! at a human confirmation checkpoint.
//!
//! ## Layout
//! - `agent` - Orchestration loop, session store, result formatter, hooks
//! - `plan` - Planner adapter: oracle prompting, tolerant parsing, fallback
//! - `tools` - Operation classifier, typed requests, policy, dispatch
//! - `cluster` - Backend port and an in-memory implementation
//! - `ai` - Oracle port and streaming clients

pub mod agent;
pub mod ai;
pub mod cluster;
pub mod config;
pub mod constants;
pub mod paths;
pub mod plan;
pub mod tools;

pub use agent::{Orchestrator, SessionKey, TurnEvent, TurnOutcome, TurnRequest};
pub use config::HelmsmanConfig;
pub use plan::{Plan, PlanningContext};
pub use tools::{Operation, ToolCall, ToolResult};
