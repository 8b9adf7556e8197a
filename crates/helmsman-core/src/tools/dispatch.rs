//! Tool dispatch: one call in, exactly one result out
//!
//! Every failure mode (unknown identifier, bad arguments, policy violation,
//! hook block, backend error) becomes a failed `ToolResult`. Nothing here
//! returns an error to the orchestration loop.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use super::policy;
use super::projection::project_list;
use super::request::ClusterRequest;
use super::types::{ToolCall, ToolResult};
use crate::agent::hooks::{HookResult, PostDispatchHook, PreDispatchHook};
use crate::cluster::ClusterBackend;
use crate::plan::PlanningContext;

/// Executes planner tool calls against a cluster backend with hook support
#[derive(Clone)]
pub struct ToolDispatcher {
    backend: Arc<dyn ClusterBackend>,
    /// Pre-dispatch hooks (run before each backend call)
    pre_hooks: Vec<Arc<dyn PreDispatchHook>>,
    /// Post-dispatch hooks (run after each backend call)
    post_hooks: Vec<Arc<dyn PostDispatchHook>>,
}

impl ToolDispatcher {
    pub fn new(backend: Arc<dyn ClusterBackend>) -> Self {
        Self {
            backend,
            pre_hooks: Vec::new(),
            post_hooks: Vec::new(),
        }
    }

    pub fn add_pre_hook(&mut self, hook: Arc<dyn PreDispatchHook>) {
        self.pre_hooks.push(hook);
    }

    pub fn add_post_hook(&mut self, hook: Arc<dyn PostDispatchHook>) {
        self.post_hooks.push(hook);
    }

    pub fn with_pre_hook(mut self, hook: Arc<dyn PreDispatchHook>) -> Self {
        self.add_pre_hook(hook);
        self
    }

    pub fn with_post_hook(mut self, hook: Arc<dyn PostDispatchHook>) -> Self {
        self.add_post_hook(hook);
        self
    }

    /// Execute one tool call
    pub async fn execute(&self, call: &ToolCall, ctx: &PlanningContext) -> ToolResult {
        let operation = match call.tool.parse::<super::Operation>() {
            Ok(op) => op,
            Err(err) => {
                warn!(tool = %call.tool, "Rejected unknown operation");
                return ToolResult::failure(call, err);
            }
        };

        let request = match ClusterRequest::from_args(operation, &call.args, ctx) {
            Ok(request) => request,
            Err(err) => {
                debug!(tool = %operation, error = %err, "Invalid tool arguments");
                return ToolResult::failure(call, err);
            }
        };

        if let Err(violation) = policy::enforce(&request, ctx) {
            warn!(tool = %operation, violation = %violation, "Policy blocked request");
            return ToolResult::failure(call, violation);
        }

        for hook in &self.pre_hooks {
            match hook.before_dispatch(&request, ctx).await {
                HookResult::Continue => {}
                HookResult::Block { reason } => {
                    tracing::info!(tool = %operation, reason = %reason, "Pre-hook blocked dispatch");
                    return ToolResult::failure(call, format!("blocked: {}", reason));
                }
            }
        }

        let start = Instant::now();
        let result = match self.backend.execute(&request).await {
            Ok(payload) => {
                let payload = match &request {
                    ClusterRequest::List { kind, .. } => project_list(kind, &payload),
                    _ => payload,
                };
                ToolResult::success(call, payload)
            }
            Err(err) => ToolResult::failure(call, err),
        };
        let duration = start.elapsed();

        for hook in &self.post_hooks {
            let _ = hook.after_dispatch(&request, &result, duration).await;
        }

        result
    }
}
