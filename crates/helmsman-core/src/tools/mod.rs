//! Cluster operations exposed to the planner
//!
//! - `operation` - Closed set of operation identifiers and the read-only/mutating table
//! - `types` - `ToolCall` / `ToolResult` exchanged with the planner and formatter
//! - `request` - Typed, validated backend requests built from call arguments
//! - `policy` - Namespace, image and replica limits
//! - `projection` - Compact per-kind views of list results
//! - `dispatch` - Single entry point that turns a call into exactly one result

pub mod dispatch;
pub mod operation;
pub mod policy;
pub mod projection;
pub mod request;
pub mod types;

pub use dispatch::ToolDispatcher;
pub use operation::{Operation, UnknownOperation};
pub use policy::PolicyViolation;
pub use request::{ArgsError, ClusterRequest, ListOptions, ResourceKind};
pub use types::{ToolCall, ToolResult};
