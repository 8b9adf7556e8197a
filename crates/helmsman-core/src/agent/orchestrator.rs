//! Orchestrator: the bounded plan / classify / execute / confirm loop.
//!
//! One call to `handle_turn` handles one user turn for one session. A turn
//! either resolves the session's pending confirmation or runs the planning
//! loop:
//!
//! ```text
//!   plan ─► partition ─► run read-only calls ─┬─► mutating? ─► PendingAction (suspend)
//!    ▲                                        ├─► done?     ─► format (finish)
//!    └────────────────────────────────────────┘   else continue (≤ max_iterations)
//! ```
//!
//! Mutating calls run only from a confirmed `PendingAction`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::confirm::{classify_reply, ReplyIntent};
use super::formatter::ResultFormatter;
use super::loop_events::{TurnEvent, TurnOutcome};
use super::session::{PendingAction, SessionKey, SessionStore};
use crate::constants::agent::{CANCEL_TRIGGER, CONFIRM_TRIGGER, MAX_ITERATIONS};
use crate::plan::{PlannerAdapter, PlanningContext, PlanningError};
use crate::tools::{ToolCall, ToolDispatcher, ToolResult};

/// What to do with a pending confirmation when the reply is neither
/// affirmative nor negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnmatchedReplyPolicy {
    /// Discard the pending action (with a notice) and plan the new text.
    #[default]
    Abandon,
    /// Keep the pending action and ask again.
    Reprompt,
}

/// Configuration for an orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_iterations: usize,
    pub unmatched_reply: UnmatchedReplyPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_iterations: MAX_ITERATIONS,
            unmatched_reply: UnmatchedReplyPolicy::default(),
        }
    }
}

/// One user turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRequest {
    pub session: SessionKey,
    pub text: String,
}

impl TurnRequest {
    pub fn new(session: impl Into<SessionKey>, text: impl Into<String>) -> Self {
        Self {
            session: session.into(),
            text: text.into(),
        }
    }
}

pub struct Orchestrator {
    planner: PlannerAdapter,
    dispatcher: ToolDispatcher,
    formatter: ResultFormatter,
    sessions: SessionStore,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        planner: PlannerAdapter,
        dispatcher: ToolDispatcher,
        formatter: ResultFormatter,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            planner,
            dispatcher,
            formatter,
            sessions: SessionStore::new(),
            config,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Handle a turn on a spawned task.
    ///
    /// The receiver yields every event of the turn and closes after
    /// `TurnEvent::Finished`.
    pub fn run_turn(
        self: Arc<Self>,
        request: TurnRequest,
        ctx: PlanningContext,
        cancel: CancellationToken,
    ) -> mpsc::UnboundedReceiver<TurnEvent> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            self.handle_turn(request, &ctx, cancel, &event_tx).await;
        });
        event_rx
    }

    /// Handle one turn. Turns of the same session run strictly one after
    /// another; `Finished` is always the last event sent.
    pub async fn handle_turn(
        &self,
        request: TurnRequest,
        ctx: &PlanningContext,
        cancel: CancellationToken,
        events: &mpsc::UnboundedSender<TurnEvent>,
    ) -> TurnOutcome {
        let lock = self.sessions.turn_lock(&request.session);
        let guard = lock.lock().await;

        tracing::info!(session = %request.session, "Turn started");
        let outcome = self.resolve_turn(&request, ctx, &cancel, events).await;
        tracing::info!(session = %request.session, outcome = ?outcome, "Turn finished");

        drop(guard);
        drop(lock);
        self.sessions.release_turn_lock(&request.session);

        let _ = events.send(TurnEvent::Finished { outcome });
        outcome
    }

    async fn resolve_turn(
        &self,
        request: &TurnRequest,
        ctx: &PlanningContext,
        cancel: &CancellationToken,
        events: &mpsc::UnboundedSender<TurnEvent>,
    ) -> TurnOutcome {
        let session = &request.session;
        let Some(pending) = self.sessions.get(session) else {
            return self
                .plan_loop(session, &request.text, ctx, Vec::new(), cancel, events)
                .await;
        };

        match classify_reply(&request.text) {
            ReplyIntent::Affirm => {
                self.sessions.delete(session);
                tracing::info!(
                    session = %session,
                    action = %pending.id,
                    calls = pending.pending_tool_calls.len(),
                    "Pending action confirmed"
                );
                self.execute_confirmed(session, pending, ctx, cancel, events)
                    .await
            }
            ReplyIntent::Decline => {
                self.sessions.delete(session);
                tracing::info!(session = %session, action = %pending.id, "Pending action declined");
                let _ = events.send(TurnEvent::Cancelled {
                    message: format!(
                        "Discarded {} pending change(s). Nothing was applied.",
                        pending.pending_tool_calls.len()
                    ),
                });
                TurnOutcome::Cancelled
            }
            ReplyIntent::Unrelated => match self.config.unmatched_reply {
                UnmatchedReplyPolicy::Reprompt => {
                    emit_confirmation(&pending.plan.summary, &pending.pending_tool_calls, events);
                    TurnOutcome::AwaitingConfirmation
                }
                UnmatchedReplyPolicy::Abandon => {
                    self.sessions.delete(session);
                    tracing::info!(session = %session, action = %pending.id, "Pending action abandoned");
                    let _ = events.send(TurnEvent::Notice {
                        message: format!(
                            "Discarded {} pending change(s) for \"{}\" without applying them.",
                            pending.pending_tool_calls.len(),
                            pending.originating_request
                        ),
                    });
                    self.plan_loop(session, &request.text, ctx, Vec::new(), cancel, events)
                        .await
                }
            },
        }
    }

    /// Run every confirmed call in order, recording every outcome.
    async fn execute_confirmed(
        &self,
        session: &SessionKey,
        pending: PendingAction,
        ctx: &PlanningContext,
        cancel: &CancellationToken,
        events: &mpsc::UnboundedSender<TurnEvent>,
    ) -> TurnOutcome {
        let PendingAction {
            originating_request,
            plan,
            pending_tool_calls,
            prior_results,
            ..
        } = pending;

        let mut history = prior_results;
        for call in &pending_tool_calls {
            let result = self.dispatch(call, ctx, events).await;
            if !result.ok {
                tracing::warn!(
                    session = %session,
                    tool = %call.tool,
                    error = result.error().unwrap_or_default(),
                    "Confirmed call failed, continuing batch"
                );
            }
            history.push(result);
        }

        if plan.done {
            self.formatter
                .format(&originating_request, &plan.summary, &history, cancel, events)
                .await;
            return TurnOutcome::Completed;
        }
        self.plan_loop(session, &originating_request, ctx, history, cancel, events)
            .await
    }

    async fn plan_loop(
        &self,
        session: &SessionKey,
        request: &str,
        ctx: &PlanningContext,
        mut history: Vec<ToolResult>,
        cancel: &CancellationToken,
        events: &mpsc::UnboundedSender<TurnEvent>,
    ) -> TurnOutcome {
        let mut summary = String::new();

        for iteration in 1..=self.config.max_iterations {
            let plan = match self.planner.plan(request, ctx, &history, cancel).await {
                Ok(plan) => plan,
                Err(err) => {
                    return self
                        .planning_failed(session, request, &summary, &history, err, cancel, events)
                        .await
                }
            };

            tracing::info!(
                session = %session,
                iteration,
                calls = plan.tool_calls.len(),
                done = plan.done,
                "Plan proposed"
            );
            let _ = events.send(TurnEvent::PlanProposed {
                iteration,
                summary: plan.summary.clone(),
                tool_calls: plan.tool_calls.clone(),
                done: plan.done,
            });
            if !plan.summary.is_empty() {
                summary = plan.summary.clone();
            }

            if plan.is_empty() && plan.done {
                break;
            }

            let (mutating, read_only): (Vec<ToolCall>, Vec<ToolCall>) = plan
                .tool_calls
                .iter()
                .cloned()
                .partition(ToolCall::is_mutating);

            for call in &read_only {
                let result = self.dispatch(call, ctx, events).await;
                history.push(result);
            }

            if !mutating.is_empty() {
                emit_confirmation(&plan.summary, &mutating, events);
                let action = PendingAction::new(request, plan, mutating, history);
                tracing::info!(
                    session = %session,
                    iteration,
                    action = %action.id,
                    calls = action.pending_tool_calls.len(),
                    "Awaiting confirmation"
                );
                self.sessions.put(session, action);
                return TurnOutcome::AwaitingConfirmation;
            }

            if plan.done {
                break;
            }

            if iteration == self.config.max_iterations {
                tracing::warn!(
                    session = %session,
                    iteration,
                    "Maximum iterations reached without a finished plan"
                );
                let _ = events.send(TurnEvent::Notice {
                    message: format!(
                        "Maximum iterations reached ({}); reporting partial results.",
                        self.config.max_iterations
                    ),
                });
            }
        }

        self.formatter
            .format(request, &summary, &history, cancel, events)
            .await;
        TurnOutcome::Completed
    }

    #[allow(clippy::too_many_arguments)]
    async fn planning_failed(
        &self,
        session: &SessionKey,
        request: &str,
        summary: &str,
        history: &[ToolResult],
        err: PlanningError,
        cancel: &CancellationToken,
        events: &mpsc::UnboundedSender<TurnEvent>,
    ) -> TurnOutcome {
        let outcome = match err {
            PlanningError::Cancelled => {
                tracing::info!(session = %session, "Planning cancelled");
                let _ = events.send(TurnEvent::Cancelled {
                    message: "Request cancelled.".to_string(),
                });
                TurnOutcome::Cancelled
            }
            err => {
                tracing::warn!(session = %session, error = %err, "Planning failed");
                let _ = events.send(TurnEvent::Error {
                    message: err.to_string(),
                });
                TurnOutcome::Failed
            }
        };

        // Results already gathered this turn (possibly confirmed mutations)
        // are still reported.
        if !history.is_empty() {
            self.formatter
                .format(request, summary, history, cancel, events)
                .await;
        }
        outcome
    }

    async fn dispatch(
        &self,
        call: &ToolCall,
        ctx: &PlanningContext,
        events: &mpsc::UnboundedSender<TurnEvent>,
    ) -> ToolResult {
        let _ = events.send(TurnEvent::ToolExecuting { call: call.clone() });
        let result = self.dispatcher.execute(call, ctx).await;
        let _ = events.send(TurnEvent::ToolResult {
            result: result.clone(),
        });
        result
    }
}

fn emit_confirmation(
    summary: &str,
    calls: &[ToolCall],
    events: &mpsc::UnboundedSender<TurnEvent>,
) {
    let _ = events.send(TurnEvent::ConfirmationRequired {
        summary: summary.to_string(),
        calls: calls.to_vec(),
        confirm_trigger: CONFIRM_TRIGGER.to_string(),
        cancel_trigger: CANCEL_TRIGGER.to_string(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::testing::{ScriptedOracle, ScriptedReply};
    use crate::ai::{OfflineOracle, Oracle};
    use crate::cluster::InMemoryCluster;
    use crate::tools::{Operation, ResourceKind};
    use serde_json::json;

    struct Harness {
        orchestrator: Orchestrator,
        cluster: Arc<InMemoryCluster>,
    }

    impl Harness {
        fn new(planner: Arc<dyn Oracle>, config: OrchestratorConfig) -> Self {
            let cluster = Arc::new(InMemoryCluster::with_namespaces([
                "default", "dev", "payments",
            ]));
            cluster
                .seed(
                    ResourceKind::Deployment,
                    json!({
                        "apiVersion": "apps/v1",
                        "kind": "Deployment",
                        "metadata": {"name": "payments-api", "namespace": "default"},
                        "spec": {
                            "replicas": 1,
                            "template": {"spec": {"containers": [
                                {"name": "payments-api", "image": "nginx:1.25"}
                            ]}}
                        }
                    }),
                )
                .unwrap();
            let orchestrator = Orchestrator::new(
                PlannerAdapter::new(planner),
                ToolDispatcher::new(cluster.clone()),
                ResultFormatter::new(Arc::new(OfflineOracle)),
                config,
            );
            Self {
                orchestrator,
                cluster,
            }
        }

        async fn turn(&self, session: &str, text: &str) -> (TurnOutcome, Vec<TurnEvent>) {
            self.turn_with(session, text, CancellationToken::new()).await
        }

        async fn turn_with(
            &self,
            session: &str,
            text: &str,
            cancel: CancellationToken,
        ) -> (TurnOutcome, Vec<TurnEvent>) {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let outcome = self
                .orchestrator
                .handle_turn(TurnRequest::new(session, text), &ctx(), cancel, &tx)
                .await;
            let mut events = Vec::new();
            while let Ok(event) = rx.try_recv() {
                events.push(event);
            }
            (outcome, events)
        }

        fn has_pending(&self, session: &str) -> bool {
            self.orchestrator
                .sessions()
                .has_pending(&SessionKey::from(session))
        }
    }

    fn ctx() -> PlanningContext {
        PlanningContext::default()
            .with_allowed_namespaces(["default", "dev", "payments"])
            .with_allowed_image_prefixes(["nginx"])
    }

    fn scripted(replies: Vec<&str>) -> (Arc<ScriptedOracle>, Harness) {
        let oracle = Arc::new(ScriptedOracle::new(
            replies.into_iter().map(ScriptedReply::text),
        ));
        let harness = Harness::new(oracle.clone(), OrchestratorConfig::default());
        (oracle, harness)
    }

    fn results(events: &[TurnEvent]) -> Vec<&ToolResult> {
        events
            .iter()
            .filter_map(|event| match event {
                TurnEvent::ToolResult { result } => Some(result),
                _ => None,
            })
            .collect()
    }

    fn narrative(events: &[TurnEvent]) -> String {
        events
            .iter()
            .filter_map(|event| match event {
                TurnEvent::TextDelta { delta } => Some(delta.as_str()),
                _ => None,
            })
            .collect()
    }

    const READ_PLAN: &str = r#"{"summary": "Inspect", "toolCalls": [
        {"tool": "listNamespaces", "args": {}},
        {"tool": "listDeployments", "args": {"namespace": "default"}}
    ], "done": true}"#;

    const MIXED_PLAN: &str = r#"{"summary": "Scale payments-api", "toolCalls": [
        {"tool": "scaleDeployment", "args": {"name": "payments-api", "replicas": 3}},
        {"tool": "getDeploymentStatus", "args": {"name": "payments-api"}}
    ], "done": true}"#;

    #[tokio::test]
    async fn read_only_plan_runs_every_call_in_order() {
        let (oracle, harness) = scripted(vec![READ_PLAN]);
        let (outcome, events) = harness.turn("ops", "what is running?").await;

        assert_eq!(outcome, TurnOutcome::Completed);
        let results = results(&events);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].tool, "listNamespaces");
        assert_eq!(results[1].tool, "listDeployments");
        assert!(results.iter().all(|r| r.ok));
        assert!(!harness.has_pending("ops"));
        assert_eq!(harness.cluster.mutation_count(), 0);
        assert_eq!(oracle.call_count(), 1);
        assert!(matches!(
            events.last(),
            Some(TurnEvent::Finished {
                outcome: TurnOutcome::Completed
            })
        ));
    }

    #[tokio::test]
    async fn mutating_calls_wait_for_confirmation() {
        let (_oracle, harness) = scripted(vec![MIXED_PLAN]);
        let (outcome, events) = harness.turn("ops", "scale payments-api to 3").await;

        assert_eq!(outcome, TurnOutcome::AwaitingConfirmation);
        assert_eq!(harness.cluster.mutation_count(), 0);
        assert_eq!(harness.cluster.invocations().len(), 1);

        let results = results(&events);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].tool, "getDeploymentStatus");

        let calls = events
            .iter()
            .find_map(|event| match event {
                TurnEvent::ConfirmationRequired {
                    calls,
                    confirm_trigger,
                    cancel_trigger,
                    ..
                } => {
                    assert_eq!(confirm_trigger, "confirm");
                    assert_eq!(cancel_trigger, "cancel");
                    Some(calls.clone())
                }
                _ => None,
            })
            .unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].operation(), Some(Operation::ScaleDeployment));

        let pending = harness
            .orchestrator
            .sessions()
            .get(&SessionKey::from("ops"))
            .unwrap();
        assert_eq!(pending.prior_results.len(), 1);
        assert_eq!(pending.originating_request, "scale payments-api to 3");
    }

    #[tokio::test]
    async fn confirmation_runs_queued_calls_once_in_order() {
        let (oracle, harness) = scripted(vec![
            r#"{"summary": "Roll out web", "toolCalls": [
                {"tool": "createDeployment", "args": {"name": "web", "image": "nginx:1.25"}},
                {"tool": "scaleDeployment", "args": {"name": "web", "replicas": 4}}
            ], "done": true}"#,
        ]);
        harness.turn("ops", "deploy web with 4 replicas").await;
        assert_eq!(harness.cluster.mutation_count(), 0);

        let (outcome, events) = harness.turn("ops", "yes").await;
        assert_eq!(outcome, TurnOutcome::Completed);
        assert_eq!(oracle.call_count(), 1);
        assert!(!harness.has_pending("ops"));

        let results = results(&events);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].tool, "createDeployment");
        assert_eq!(results[1].tool, "scaleDeployment");
        assert!(results.iter().all(|r| r.ok));
        assert_eq!(harness.cluster.mutation_count(), 2);

        let web = harness
            .cluster
            .object(&ResourceKind::Deployment, Some("default"), "web")
            .unwrap();
        assert_eq!(web["spec"]["replicas"], 4);
        assert!(narrative(&events).contains("2 operation(s), 0 failed"));
    }

    #[tokio::test]
    async fn confirmed_batch_continues_after_a_failure() {
        let (_oracle, harness) = scripted(vec![
            r#"{"summary": "Replace", "toolCalls": [
                {"tool": "deleteDeployment", "args": {"name": "legacy"}},
                {"tool": "createDeployment", "args": {"name": "web", "image": "nginx:1.25"}}
            ], "done": true}"#,
        ]);
        harness.turn("ops", "replace legacy with web").await;
        let (outcome, events) = harness.turn("ops", "confirm").await;

        assert_eq!(outcome, TurnOutcome::Completed);
        let results = results(&events);
        assert_eq!(results.len(), 2);
        assert!(!results[0].ok);
        assert_eq!(
            results[0].error(),
            Some("Deployment 'legacy' not found in namespace 'default'")
        );
        assert!(results[1].ok);
        assert!(narrative(&events).contains("2 operation(s), 1 failed"));
    }

    #[tokio::test]
    async fn declining_discards_without_side_effects() {
        let (_oracle, harness) = scripted(vec![MIXED_PLAN]);
        harness.turn("ops", "scale payments-api to 3").await;

        let (outcome, events) = harness.turn("ops", "cancel").await;
        assert_eq!(outcome, TurnOutcome::Cancelled);
        assert!(events
            .iter()
            .any(|e| matches!(e, TurnEvent::Cancelled { message } if message.contains("Nothing was applied"))));
        assert!(!harness.has_pending("ops"));
        assert_eq!(harness.cluster.mutation_count(), 0);
        assert!(results(&events).is_empty());
    }

    #[tokio::test]
    async fn affirmative_word_followed_by_cancel_applies_nothing() {
        let harness = Harness::new(Arc::new(OfflineOracle), OrchestratorConfig::default());
        harness.turn("ops", "scale payments-api to 3").await;

        let (_, events) = harness.turn("ops", "ok, cancel that").await;
        assert!(results(&events).is_empty());
        assert!(!harness.has_pending("ops"));
        assert_eq!(harness.cluster.mutation_count(), 0);
        assert_eq!(harness.orchestrator.sessions().active_turn_locks(), 0);
    }

    #[tokio::test]
    async fn unmatched_reply_abandons_pending_action_by_default() {
        let (oracle, harness) = scripted(vec![MIXED_PLAN, READ_PLAN]);
        harness.turn("ops", "scale payments-api to 3").await;

        let (outcome, events) = harness.turn("ops", "actually, what is running?").await;
        assert_eq!(outcome, TurnOutcome::Completed);
        assert!(matches!(&events[0], TurnEvent::Notice { message } if message.contains("Discarded 1 pending change(s)")));
        assert_eq!(oracle.call_count(), 2);
        assert!(!harness.has_pending("ops"));
        assert_eq!(harness.cluster.mutation_count(), 0);
    }

    #[tokio::test]
    async fn reprompt_policy_keeps_pending_action() {
        let oracle = Arc::new(ScriptedOracle::new([ScriptedReply::text(MIXED_PLAN)]));
        let harness = Harness::new(
            oracle.clone(),
            OrchestratorConfig {
                unmatched_reply: UnmatchedReplyPolicy::Reprompt,
                ..Default::default()
            },
        );
        harness.turn("ops", "scale payments-api to 3").await;

        let (outcome, events) = harness.turn("ops", "hmm, what?").await;
        assert_eq!(outcome, TurnOutcome::AwaitingConfirmation);
        assert!(matches!(&events[0], TurnEvent::ConfirmationRequired { calls, .. } if calls.len() == 1));
        assert_eq!(oracle.call_count(), 1);
        assert!(harness.has_pending("ops"));
        assert_eq!(harness.cluster.mutation_count(), 0);
    }

    #[tokio::test]
    async fn loop_stops_at_iteration_cap() {
        let oracle = Arc::new(ScriptedOracle::repeating(ScriptedReply::text(
            r#"{"summary": "Look around", "toolCalls": [{"tool": "listNamespaces", "args": {}}], "done": false}"#,
        )));
        let harness = Harness::new(oracle.clone(), OrchestratorConfig::default());
        let (outcome, events) = harness.turn("ops", "keep looking").await;

        assert_eq!(outcome, TurnOutcome::Completed);
        assert_eq!(oracle.call_count(), MAX_ITERATIONS);
        assert_eq!(results(&events).len(), MAX_ITERATIONS);
        assert!(events
            .iter()
            .any(|e| matches!(e, TurnEvent::Notice { message } if message.starts_with("Maximum iterations reached"))));
        assert!(narrative(&events).contains("10 operation(s), 0 failed"));
    }

    #[tokio::test]
    async fn planner_empty_plan_finishes_immediately() {
        let (oracle, harness) = scripted(vec![r#"{"summary": "Nothing to do", "toolCalls": [], "done": true}"#]);
        let (outcome, events) = harness.turn("ops", "anything?").await;
        assert_eq!(outcome, TurnOutcome::Completed);
        assert!(results(&events).is_empty());
        assert_eq!(oracle.call_count(), 1);
        assert_eq!(narrative(&events), "Nothing to do\n\nNo operations were executed.");
    }

    #[tokio::test]
    async fn offline_fallback_drives_full_confirmation_flow() {
        let harness = Harness::new(Arc::new(OfflineOracle), OrchestratorConfig::default());

        let (outcome, events) = harness.turn("ops", "What namespaces exist?").await;
        assert_eq!(outcome, TurnOutcome::Completed);
        let listed = results(&events);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].tool, "listNamespaces");

        let (outcome, events) = harness.turn("ops", "scale payments-api to 3").await;
        assert_eq!(outcome, TurnOutcome::AwaitingConfirmation);
        assert!(results(&events).is_empty());
        assert_eq!(harness.cluster.mutation_count(), 0);

        let (outcome, events) = harness.turn("ops", "confirm").await;
        assert_eq!(outcome, TurnOutcome::Completed);
        assert!(results(&events)[0].ok);
        let deployment = harness
            .cluster
            .object(&ResourceKind::Deployment, Some("default"), "payments-api")
            .unwrap();
        assert_eq!(deployment["spec"]["replicas"], 3);
    }

    #[tokio::test]
    async fn unrecognized_request_fails_without_backend_calls() {
        let harness = Harness::new(Arc::new(OfflineOracle), OrchestratorConfig::default());
        let (outcome, events) = harness.turn("ops", "do the thing").await;

        assert_eq!(outcome, TurnOutcome::Failed);
        assert!(events
            .iter()
            .any(|e| matches!(e, TurnEvent::Error { message } if message == "unable to understand request")));
        assert!(harness.cluster.invocations().is_empty());
    }

    #[tokio::test]
    async fn all_pods_request_takes_two_iterations() {
        let harness = Harness::new(Arc::new(OfflineOracle), OrchestratorConfig::default());
        let (outcome, events) = harness.turn("ops", "show pods in all namespaces").await;

        assert_eq!(outcome, TurnOutcome::Completed);
        let tools: Vec<&str> = results(&events).iter().map(|r| r.tool.as_str()).collect();
        assert_eq!(
            tools,
            vec!["listNamespaces", "listPods", "listPods", "listPods"]
        );
        let iterations = events
            .iter()
            .filter(|e| matches!(e, TurnEvent::PlanProposed { .. }))
            .count();
        assert_eq!(iterations, 2);
    }

    #[tokio::test]
    async fn policy_violation_after_confirmation_never_reaches_backend() {
        let (_oracle, harness) = scripted(vec![
            r#"{"summary": "Cache", "toolCalls": [
                {"tool": "createDeployment", "args": {"name": "cache", "image": "redis:7"}},
                {"tool": "createNamespace", "args": {"name": "prod"}}
            ], "done": true}"#,
        ]);
        harness.turn("ops", "deploy redis").await;
        let (outcome, events) = harness.turn("ops", "confirm").await;

        assert_eq!(outcome, TurnOutcome::Completed);
        let results = results(&events);
        assert_eq!(results[0].error(), Some("image 'redis:7' is not allowed"));
        assert_eq!(results[1].error(), Some("namespace 'prod' is not allowed"));
        assert!(harness.cluster.invocations().is_empty());
    }

    #[tokio::test]
    async fn unfinished_plan_resumes_planning_after_confirmation() {
        let (oracle, harness) = scripted(vec![
            r#"{"summary": "Create web", "toolCalls": [
                {"tool": "createDeployment", "args": {"name": "web", "image": "nginx:1.25"}}
            ], "done": false}"#,
            r#"{"summary": "Check web", "toolCalls": [
                {"tool": "getDeploymentStatus", "args": {"name": "web"}}
            ], "done": true}"#,
        ]);
        harness.turn("ops", "deploy web and check it").await;
        let (outcome, events) = harness.turn("ops", "ok").await;

        assert_eq!(outcome, TurnOutcome::Completed);
        let tools: Vec<&str> = results(&events).iter().map(|r| r.tool.as_str()).collect();
        assert_eq!(tools, vec!["createDeployment", "getDeploymentStatus"]);

        let calls = oracle.calls();
        assert_eq!(calls.len(), 2);
        // system, request, history
        assert_eq!(calls[1].len(), 3);
        assert_eq!(calls[1][1].content, "deploy web and check it");
        assert!(calls[1][2].content.contains("createDeployment"));
    }

    #[tokio::test]
    async fn sessions_do_not_share_pending_actions() {
        let harness = Harness::new(Arc::new(OfflineOracle), OrchestratorConfig::default());
        harness.turn("alice", "scale payments-api to 3").await;

        let (outcome, _) = harness.turn("bob", "confirm").await;
        assert_eq!(outcome, TurnOutcome::Failed);
        assert!(harness.has_pending("alice"));
        assert!(!harness.has_pending("bob"));
        assert_eq!(harness.cluster.mutation_count(), 0);
    }

    #[tokio::test]
    async fn planner_transport_error_fails_turn() {
        let oracle = Arc::new(ScriptedOracle::new([ScriptedReply::OpenError(
            "connection refused".to_string(),
        )]));
        let harness = Harness::new(oracle, OrchestratorConfig::default());
        let (outcome, events) = harness.turn("ops", "What namespaces exist?").await;

        assert_eq!(outcome, TurnOutcome::Failed);
        assert!(events
            .iter()
            .any(|e| matches!(e, TurnEvent::Error { message } if message.starts_with("planner unavailable"))));
        assert!(harness.cluster.invocations().is_empty());
    }

    #[tokio::test]
    async fn cancellation_ends_turn_without_side_effects() {
        let oracle = Arc::new(ScriptedOracle::new([ScriptedReply::Hang]));
        let harness = Harness::new(oracle, OrchestratorConfig::default());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let (outcome, events) = harness.turn_with("ops", "list pods", cancel).await;
        assert_eq!(outcome, TurnOutcome::Cancelled);
        assert!(events.iter().any(|e| matches!(e, TurnEvent::Cancelled { .. })));
        assert!(harness.cluster.invocations().is_empty());
        assert!(!harness.has_pending("ops"));
    }

    #[tokio::test]
    async fn run_turn_streams_until_finished() {
        let harness = Harness::new(Arc::new(OfflineOracle), OrchestratorConfig::default());
        let orchestrator = Arc::new(harness.orchestrator);
        let mut rx = orchestrator.run_turn(
            TurnRequest::new("ops", "list namespaces"),
            ctx(),
            CancellationToken::new(),
        );

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert!(matches!(events.first(), Some(TurnEvent::PlanProposed { iteration: 1, .. })));
        assert!(matches!(
            events.last(),
            Some(TurnEvent::Finished {
                outcome: TurnOutcome::Completed
            })
        ));
    }
}
