//! Hook system for cluster dispatch
//!
//! Hooks run after argument validation and policy checks, immediately
//! around the backend call.
//!
//! ## Built-in Hooks
//! - `ReadOnlyHook` - Blocks every mutating request while read-only mode is on
//! - `ProtectedNamespaceHook` - Blocks mutations in `kube-*` system namespaces
//! - `LoggingHook` - Logs every backend call with timing
//!
//! ## Custom Hooks
//! Implement `PreDispatchHook` or `PostDispatchHook` for custom behavior.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::plan::PlanningContext;
use crate::tools::{ClusterRequest, ToolResult};

static SYSTEM_NAMESPACE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^kube-[a-z0-9-]+$").unwrap());

/// Result of a hook execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookResult {
    /// Continue with execution (no changes)
    Continue,
    /// Block execution with a reason
    Block { reason: String },
}

/// Hook called before a request reaches the backend
#[async_trait]
pub trait PreDispatchHook: Send + Sync {
    async fn before_dispatch(&self, request: &ClusterRequest, ctx: &PlanningContext)
        -> HookResult;
}

/// Hook called after the backend returns
///
/// Sees the final (projected) result. The return value is currently ignored.
#[async_trait]
pub trait PostDispatchHook: Send + Sync {
    async fn after_dispatch(
        &self,
        request: &ClusterRequest,
        result: &ToolResult,
        duration: Duration,
    ) -> HookResult;
}

// ============================================================================
// Built-in Hooks
// ============================================================================

/// Blocks mutating requests while enabled. Can be toggled at runtime.
#[derive(Debug, Default)]
pub struct ReadOnlyHook {
    enabled: AtomicBool,
}

impl ReadOnlyHook {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PreDispatchHook for ReadOnlyHook {
    async fn before_dispatch(
        &self,
        request: &ClusterRequest,
        _ctx: &PlanningContext,
    ) -> HookResult {
        if !self.is_enabled() || !request.is_mutating() {
            return HookResult::Continue;
        }
        let operation = request.operation();
        tracing::info!(tool = %operation, "Read-only mode blocked mutating request");
        HookResult::Block {
            reason: format!("'{}' is blocked in read-only mode", operation),
        }
    }
}

/// Refuses mutations inside cluster system namespaces, even when an operator
/// has put one in the allow-set for inspection.
pub struct ProtectedNamespaceHook;

impl ProtectedNamespaceHook {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ProtectedNamespaceHook {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PreDispatchHook for ProtectedNamespaceHook {
    async fn before_dispatch(
        &self,
        request: &ClusterRequest,
        _ctx: &PlanningContext,
    ) -> HookResult {
        if !request.is_mutating() {
            return HookResult::Continue;
        }
        match request.target_namespace() {
            Some(ns) if SYSTEM_NAMESPACE_PATTERN.is_match(ns) => {
                tracing::warn!(
                    tool = %request.operation(),
                    namespace = ns,
                    "Protected namespace hook blocked mutation"
                );
                HookResult::Block {
                    reason: format!("namespace '{}' is a protected system namespace", ns),
                }
            }
            _ => HookResult::Continue,
        }
    }
}

/// Logging hook that logs all backend calls
pub struct LoggingHook;

impl LoggingHook {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LoggingHook {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PostDispatchHook for LoggingHook {
    async fn after_dispatch(
        &self,
        request: &ClusterRequest,
        result: &ToolResult,
        duration: Duration,
    ) -> HookResult {
        tracing::info!(
            tool = %request.operation(),
            namespace = request.target_namespace().unwrap_or("-"),
            duration_ms = duration.as_millis() as u64,
            ok = result.ok,
            "Cluster request completed"
        );
        HookResult::Continue
    }
}
