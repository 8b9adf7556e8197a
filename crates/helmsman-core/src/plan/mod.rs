//! Planning: free text to a `Plan` of tool calls
//!
//! - `types` - `Plan` and `PlanningContext`
//! - `prompt` - Instruction contract sent to the oracle
//! - `repair` - Text repairs for almost-JSON replies
//! - `parser` - Strict-then-tolerant parsing into `PlanParse`
//! - `fallback` - Deterministic keyword planner
//! - `planner` - Adapter tying the above to an oracle

pub mod fallback;
pub mod parser;
pub mod planner;
pub mod prompt;
pub mod repair;
pub mod types;

pub use parser::{parse_plan, PlanParse};
pub use planner::{PlannerAdapter, PlanningError};
pub use repair::Repair;
pub use types::{Plan, PlanningContext};
