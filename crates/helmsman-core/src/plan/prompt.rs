//! Planner instruction contract and message assembly

use std::fmt::Write;

use crate::ai::OracleMessage;
use crate::plan::PlanningContext;
use crate::tools::{Operation, ToolResult};

/// System instruction: operation catalogue, policy limits and output format.
pub fn system_prompt(ctx: &PlanningContext) -> String {
    let mut prompt = String::from(
        "You plan Kubernetes cluster operations for an operator. \
         Reply with exactly one JSON object and nothing else: no prose, no markdown.\n\n\
         Format:\n\
         {\"summary\": \"<one sentence>\", \"toolCalls\": [{\"tool\": \"<operation>\", \"args\": {...}}], \"done\": <true|false>}\n\n\
         Set \"done\" to true when the calls you propose (plus earlier results) are enough to answer. \
         Set it to false when you need to see results before deciding the next step. \
         Mutating operations are always shown to the operator for confirmation before they run.\n\n\
         Read-only operations:\n",
    );
    for op in Operation::ALL.iter().filter(|op| !op.is_mutating()) {
        let _ = writeln!(prompt, "- {} {}", op, op.arg_shape());
    }
    prompt.push_str("\nMutating operations:\n");
    for op in Operation::ALL.iter().filter(|op| op.is_mutating()) {
        let _ = writeln!(prompt, "- {} {}", op, op.arg_shape());
    }

    let namespaces = ctx
        .allowed_namespaces
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    let images = if ctx.allowed_image_prefixes.is_empty() {
        "any".to_string()
    } else {
        ctx.allowed_image_prefixes.join(", ")
    };
    let _ = write!(
        prompt,
        "\nCluster context:\n\
         - default namespace: {} (used when \"namespace\" is omitted)\n\
         - allowed namespaces: {}\n\
         - maximum replicas: {}\n\
         - allowed image prefixes: {}\n\
         - default image: {}\n\
         Calls that break these limits will fail.",
        ctx.default_namespace, namespaces, ctx.max_replicas, images, ctx.default_image
    );
    prompt
}

/// Result history framed for the next planning step.
pub fn history_message(history: &[ToolResult]) -> String {
    let json = serde_json::to_string_pretty(history).unwrap_or_else(|_| "[]".to_string());
    format!(
        "Results of the operations executed so far. Use this to decide the next step:\n{}",
        json
    )
}

pub fn build_messages(
    request: &str,
    ctx: &PlanningContext,
    history: &[ToolResult],
) -> Vec<OracleMessage> {
    let mut messages = vec![
        OracleMessage::system(system_prompt(ctx)),
        OracleMessage::user(request),
    ];
    if !history.is_empty() {
        messages.push(OracleMessage::user(history_message(history)));
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::Role;
    use crate::tools::ToolCall;
    use serde_json::json;

    #[test]
    fn system_prompt_lists_every_operation_and_limit() {
        let ctx = PlanningContext::default()
            .with_allowed_namespaces(["default", "dev"])
            .with_max_replicas(7);
        let prompt = system_prompt(&ctx);
        for op in Operation::ALL {
            assert!(prompt.contains(op.as_str()), "missing {}", op);
        }
        assert!(prompt.contains("allowed namespaces: default, dev"));
        assert!(prompt.contains("maximum replicas: 7"));
        assert!(prompt.contains("allowed image prefixes: any"));
    }

    #[test]
    fn history_is_appended_only_when_present() {
        let ctx = PlanningContext::default();
        let messages = build_messages("list pods", &ctx, &[]);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);

        let call = ToolCall::new(Operation::ListNamespaces, json!({}));
        let history = vec![ToolResult::success(&call, json!({"items": []}))];
        let messages = build_messages("list pods", &ctx, &history);
        assert_eq!(messages.len(), 3);
        assert!(messages[2].content.contains("decide the next step"));
        assert!(messages[2].content.contains("listNamespaces"));
    }
}
