//! Agent: turn orchestration around the planner and the dispatcher
//!
//! - `orchestrator` - The bounded planning loop and confirmation state machine
//! - `session` - Pending confirmations and per-session turn locks
//! - `confirm` - Reply classification and confirmation prompts
//! - `formatter` - Narrative rendering of results with a raw fallback
//! - `hooks` - Pre/post dispatch hooks
//! - `loop_events` - Events emitted during a turn

pub mod confirm;
pub mod formatter;
pub mod hooks;
pub mod loop_events;
pub mod orchestrator;
pub mod session;

pub use formatter::ResultFormatter;
pub use hooks::{
    HookResult, LoggingHook, PostDispatchHook, PreDispatchHook, ProtectedNamespaceHook,
    ReadOnlyHook,
};
pub use loop_events::{TurnEvent, TurnOutcome};
pub use orchestrator::{Orchestrator, OrchestratorConfig, TurnRequest, UnmatchedReplyPolicy};
pub use session::{PendingAction, SessionKey, SessionStore};
