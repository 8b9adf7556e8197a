//! Tool call and result types shared by the planner, dispatcher and formatter

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::operation::Operation;

/// One proposed action: an operation identifier plus its arguments.
///
/// `tool` is kept as the raw identifier the planner produced. Unknown or
/// malformed identifiers are not rejected until execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl ToolCall {
    pub fn new(operation: Operation, args: Value) -> Self {
        let args = match args {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            tool: operation.as_str().to_string(),
            args,
        }
    }

    /// Parsed operation, if the identifier is known.
    pub fn operation(&self) -> Option<Operation> {
        self.tool.parse().ok()
    }

    /// Whether executing this call requires confirmation.
    ///
    /// Unknown identifiers never reach the backend, so they are treated as
    /// read-only and fail immediately at dispatch.
    pub fn is_mutating(&self) -> bool {
        self.operation().is_some_and(Operation::is_mutating)
    }

    /// `name(key=value, ...)` rendering used in confirmation prompts.
    pub fn describe(&self) -> String {
        let args = self
            .args
            .iter()
            .map(|(key, value)| match value {
                Value::String(s) => format!("{}={}", key, s),
                other => format!("{}={}", key, other),
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}({})", self.tool, args)
    }
}

/// Outcome of executing one tool call. Created once, never mutated.
///
/// Serialized as `{tool, args, ok, result}` on success and
/// `{tool, args, ok, error}` on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool: String,
    pub args: Map<String, Value>,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(call: &ToolCall, payload: Value) -> Self {
        Self {
            tool: call.tool.clone(),
            args: call.args.clone(),
            ok: true,
            result: Some(payload),
            error: None,
        }
    }

    pub fn failure(call: &ToolCall, message: impl std::fmt::Display) -> Self {
        Self {
            tool: call.tool.clone(),
            args: call.args.clone(),
            ok: false,
            result: None,
            error: Some(message.to_string()),
        }
    }

    /// Error text for failed results.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn payload(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn operation(&self) -> Option<Operation> {
        self.tool.parse().ok()
    }
}
