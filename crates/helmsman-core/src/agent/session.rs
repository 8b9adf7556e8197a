//! Per-session confirmation state
//!
//! Process-lifetime and in-memory only. Each session holds at most one
//! pending action, and turns within one session are serialized through a
//! per-key lock.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::plan::Plan;
use crate::tools::{ToolCall, ToolResult};

/// Identifies one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for SessionKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// Mutating calls awaiting an explicit yes/no from the operator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingAction {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub originating_request: String,
    pub plan: Plan,
    /// Mutating calls only, in the order the plan listed them
    pub pending_tool_calls: Vec<ToolCall>,
    /// Results gathered in this turn before suspension
    pub prior_results: Vec<ToolResult>,
}

impl PendingAction {
    pub fn new(
        originating_request: impl Into<String>,
        plan: Plan,
        pending_tool_calls: Vec<ToolCall>,
        prior_results: Vec<ToolResult>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            originating_request: originating_request.into(),
            plan,
            pending_tool_calls,
            prior_results,
        }
    }
}

#[derive(Default)]
pub struct SessionStore {
    pending: DashMap<SessionKey, PendingAction>,
    turn_locks: DashMap<SessionKey, Arc<Mutex<()>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &SessionKey) -> Option<PendingAction> {
        self.pending.get(key).map(|entry| entry.value().clone())
    }

    /// Store `action`, replacing any previous pending action for `key`.
    pub fn put(&self, key: &SessionKey, action: PendingAction) {
        debug!(session = %key, action = %action.id, "Storing pending action");
        self.pending.insert(key.clone(), action);
    }

    pub fn delete(&self, key: &SessionKey) -> Option<PendingAction> {
        self.pending.remove(key).map(|(_, action)| action)
    }

    pub fn has_pending(&self, key: &SessionKey) -> bool {
        self.pending.contains_key(key)
    }

    /// Lock held for the full duration of a turn in this session.
    pub fn turn_lock(&self, key: &SessionKey) -> Arc<Mutex<()>> {
        self.turn_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    /// Forget `key`'s turn lock once no turn holds or awaits it. Callers
    /// drop their own handle first.
    pub fn release_turn_lock(&self, key: &SessionKey) {
        self.turn_locks
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Sessions currently tracked by a turn lock.
    pub fn active_turn_locks(&self) -> usize {
        self.turn_locks.len()
    }
}
