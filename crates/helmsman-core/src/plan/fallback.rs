//! Deterministic keyword planner
//!
//! Used whenever the oracle returns nothing usable. Matches a fixed set of
//! phrasings; anything else is unrecognized.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};
use tracing::warn;

use super::types::{Plan, PlanningContext};
use crate::tools::{Operation, ToolCall, ToolResult};

const NAME: &str = r"([a-z0-9][a-z0-9.-]*)";

fn re(pattern: &str) -> Regex {
    Regex::new(&format!("(?i){}", pattern.replace("{name}", NAME))).unwrap()
}

static NS_SUFFIX: Lazy<Regex> =
    Lazy::new(|| re(r"\s+(?:-n|--namespace|in\s+(?:the\s+)?namespace|in)\s+([a-z0-9][a-z0-9-]*)$"));
static NS_SUFFIX_TRAILING_WORD: Lazy<Regex> =
    Lazy::new(|| re(r"\s+in\s+(?:the\s+)?([a-z0-9][a-z0-9-]*)\s+namespace$"));

static ALL_PODS: Lazy<Regex> = Lazy::new(|| {
    re(r"\b(?:all\s+(?:the\s+)?pods|pods\s+(?:in|across|from)\s+(?:all|every)\s+(?:the\s+)?namespaces?|pods\s+everywhere)\b")
});
static NAMESPACES: Lazy<Regex> = Lazy::new(|| {
    re(r"^(?:(?:list|show|get|display)\s+(?:me\s+)?(?:all\s+)?(?:the\s+)?namespaces|(?:what|which|how\s+many)\b.*\bnamespaces\b.*|namespaces)$")
});
static LIST_KIND: Lazy<Regex> = Lazy::new(|| {
    re(r"^(?:(?:list|show|get|display)\s+(?:me\s+)?(?:all\s+)?(?:the\s+)?|(?:what|which)\s+)(pods|deployments|services|config\s*maps)\b")
});
static STATUS: Lazy<Regex> = Lazy::new(|| {
    re(r"^(?:(?:show|get|check|what\s+is|what's)\s+)?(?:the\s+)?(?:rollout\s+)?status\s+of\s+(?:the\s+)?(?:deployment\s+)?{name}$")
});
static SCALE: Lazy<Regex> = Lazy::new(|| {
    re(r"^scale\s+(?:deployment\s+|deploy\s+)?{name}\s+to\s+(\d+)(?:\s+replicas?)?$")
});
static SET_IMAGE: Lazy<Regex> =
    Lazy::new(|| re(r"^(?:update|set)\s+deployment\s+{name}\s+image\s+(?:to\s+)?(\S+)$"));
static PATCH_REPLICAS: Lazy<Regex> =
    Lazy::new(|| re(r"^update\s+deployment\s+{name}\s+replicas\s+(?:to\s+)?(\d+)$"));
static UPDATE_CONFIG_MAP: Lazy<Regex> =
    Lazy::new(|| re(r"^update\s+config\s*map\s+{name}\s+(.+)$"));
static UPDATE_SERVICE: Lazy<Regex> =
    Lazy::new(|| re(r"^update\s+service\s+{name}\s+port\s+(?:to\s+)?(\d+)$"));
static DELETE_DEPLOYMENT: Lazy<Regex> =
    Lazy::new(|| re(r"^(?:delete|remove)\s+deployment\s+{name}$"));
static CREATE_DEPLOYMENT: Lazy<Regex> =
    Lazy::new(|| re(r"^(?:deploy|create\s+(?:a\s+)?deployment)\s+{name}(.*)$"));
static CREATE_POD: Lazy<Regex> =
    Lazy::new(|| re(r"^(?:create|run)\s+(?:a\s+)?pod\s+{name}(.*)$"));
static CREATE_NAMESPACE: Lazy<Regex> =
    Lazy::new(|| re(r"^create\s+(?:a\s+)?namespace\s+([a-z0-9][a-z0-9-]*)$"));
static CREATE_SERVICE: Lazy<Regex> =
    Lazy::new(|| re(r"^create\s+(?:a\s+)?service\s+{name}(.*)$"));
static CREATE_CONFIG_MAP: Lazy<Regex> =
    Lazy::new(|| re(r"^create\s+(?:a\s+)?config\s*map\s+{name}(.*)$"));

static IMAGE_OPT: Lazy<Regex> = Lazy::new(|| re(r"\bimage\s+(\S+)"));
static REPLICAS_OPT: Lazy<Regex> =
    Lazy::new(|| re(r"\b(?:replicas\s+(\d+)|(\d+)\s+replicas?)\b"));
static PORT_OPT: Lazy<Regex> = Lazy::new(|| re(r"\bport\s+(\d+)"));
static KEY_VALUE: Lazy<Regex> = Lazy::new(|| re(r"([a-z0-9_.-]+)=(\S+)"));

/// Plan `request` without the oracle.
///
/// Returns `None` only when no phrasing matches and there is no history.
/// With history, an unmatched request yields an empty finished plan so the
/// accumulated results still get narrated.
pub fn fallback_plan(request: &str, ctx: &PlanningContext, history: &[ToolResult]) -> Option<Plan> {
    let text = request
        .trim()
        .trim_end_matches(['?', '.', '!'])
        .trim();
    let (text, ns_override) = split_namespace(text);
    let namespace = ns_override
        .clone()
        .unwrap_or_else(|| ctx.default_namespace.clone());

    if let Some(plan) = match_request(text, ns_override.is_some(), &namespace, ctx, history) {
        return Some(plan);
    }
    if history.is_empty() {
        warn!(request = request, "Fallback planner found no matching pattern");
        return None;
    }
    Some(Plan::finished("Summarize the results gathered so far"))
}

fn split_namespace(text: &str) -> (&str, Option<String>) {
    for pattern in [&*NS_SUFFIX_TRAILING_WORD, &*NS_SUFFIX] {
        if let Some(caps) = pattern.captures(text) {
            if let (Some(whole), Some(ns)) = (caps.get(0), caps.get(1)) {
                if is_quantifier(ns.as_str()) {
                    continue;
                }
                return (
                    text[..whole.start()].trim_end(),
                    Some(ns.as_str().to_ascii_lowercase()),
                );
            }
        }
    }
    (text, None)
}

/// "all" and "every" in "pods in every namespace" are not namespace names.
fn is_quantifier(word: &str) -> bool {
    word.eq_ignore_ascii_case("all") || word.eq_ignore_ascii_case("every")
}

fn match_request(
    text: &str,
    explicit_namespace: bool,
    namespace: &str,
    ctx: &PlanningContext,
    history: &[ToolResult],
) -> Option<Plan> {
    if !explicit_namespace && ALL_PODS.is_match(text) {
        return Some(all_pods(ctx, history));
    }

    if NAMESPACES.is_match(text) {
        return Some(single(
            "List namespaces",
            Operation::ListNamespaces,
            json!({}),
        ));
    }

    if let Some(caps) = STATUS.captures(text) {
        let name = lower(&caps[1]);
        return Some(single(
            format!("Show rollout status of deployment {}", name),
            Operation::GetDeploymentStatus,
            json!({ "name": name, "namespace": namespace }),
        ));
    }

    if let Some(caps) = SCALE.captures(text) {
        let name = lower(&caps[1]);
        let replicas = parse_count(&caps[2])?;
        return Some(single(
            format!("Scale deployment {} to {} replicas", name, replicas),
            Operation::ScaleDeployment,
            json!({ "name": name, "replicas": replicas, "namespace": namespace }),
        ));
    }

    if let Some(caps) = SET_IMAGE.captures(text) {
        let name = lower(&caps[1]);
        let image = caps[2].to_string();
        return Some(single(
            format!("Set image of deployment {} to {}", name, image),
            Operation::SetDeploymentImage,
            json!({ "name": name, "image": image, "namespace": namespace }),
        ));
    }

    if let Some(caps) = PATCH_REPLICAS.captures(text) {
        let name = lower(&caps[1]);
        let replicas = parse_count(&caps[2])?;
        return Some(single(
            format!("Patch deployment {} to {} replicas", name, replicas),
            Operation::PatchDeployment,
            json!({
                "name": name,
                "patch": { "spec": { "replicas": replicas } },
                "namespace": namespace
            }),
        ));
    }

    if let Some(caps) = UPDATE_CONFIG_MAP.captures(text) {
        let name = lower(&caps[1]);
        let data = key_values(&caps[2]);
        if !data.is_empty() {
            return Some(single(
                format!("Update config map {}", name),
                Operation::UpdateConfigMap,
                json!({ "name": name, "data": data, "namespace": namespace }),
            ));
        }
    }

    if let Some(caps) = UPDATE_SERVICE.captures(text) {
        let name = lower(&caps[1]);
        let port = parse_count(&caps[2])?;
        return Some(single(
            format!("Change port of service {} to {}", name, port),
            Operation::UpdateService,
            json!({ "name": name, "port": port, "namespace": namespace }),
        ));
    }

    if let Some(caps) = DELETE_DEPLOYMENT.captures(text) {
        let name = lower(&caps[1]);
        return Some(single(
            format!("Delete deployment {}", name),
            Operation::DeleteDeployment,
            json!({ "name": name, "namespace": namespace }),
        ));
    }

    if let Some(caps) = CREATE_DEPLOYMENT.captures(text) {
        let name = lower(&caps[1]);
        let rest = &caps[2];
        let image = option_image(rest).unwrap_or_else(|| ctx.default_image.clone());
        let replicas = option_replicas(rest).unwrap_or(1);
        return Some(single(
            format!("Create deployment {} ({}, {} replicas)", name, image, replicas),
            Operation::CreateDeployment,
            json!({ "name": name, "image": image, "replicas": replicas, "namespace": namespace }),
        ));
    }

    if let Some(caps) = CREATE_POD.captures(text) {
        let name = lower(&caps[1]);
        let image = option_image(&caps[2]).unwrap_or_else(|| ctx.default_image.clone());
        return Some(single(
            format!("Create pod {} ({})", name, image),
            Operation::CreatePod,
            json!({ "name": name, "image": image, "namespace": namespace }),
        ));
    }

    if let Some(caps) = CREATE_NAMESPACE.captures(text) {
        let name = lower(&caps[1]);
        return Some(single(
            format!("Create namespace {}", name),
            Operation::CreateNamespace,
            json!({ "name": name }),
        ));
    }

    if let Some(caps) = CREATE_SERVICE.captures(text) {
        let name = lower(&caps[1]);
        let mut args = json!({ "name": name, "namespace": namespace });
        if let Some(port) = PORT_OPT
            .captures(&caps[2])
            .and_then(|c| parse_count(&c[1]))
        {
            args["port"] = json!(port);
        }
        return Some(single(
            format!("Create service {}", name),
            Operation::CreateService,
            args,
        ));
    }

    if let Some(caps) = CREATE_CONFIG_MAP.captures(text) {
        let name = lower(&caps[1]);
        let data = key_values(&caps[2]);
        return Some(single(
            format!("Create config map {}", name),
            Operation::CreateConfigMap,
            json!({ "name": name, "data": data, "namespace": namespace }),
        ));
    }

    if let Some(caps) = LIST_KIND.captures(text) {
        let lowered = caps[1].to_ascii_lowercase();
        let (operation, label) = match lowered.replace(char::is_whitespace, "").as_str() {
            "pods" => (Operation::ListPods, "pods"),
            "deployments" => (Operation::ListDeployments, "deployments"),
            "services" => (Operation::ListServices, "services"),
            _ => (Operation::ListConfigMaps, "config maps"),
        };
        return Some(single(
            format!("List {} in namespace {}", label, namespace),
            operation,
            json!({ "namespace": namespace }),
        ));
    }

    None
}

/// First step lists namespaces; once a successful listing is in history,
/// one `listPods` per accessible namespace.
fn all_pods(ctx: &PlanningContext, history: &[ToolResult]) -> Plan {
    let listed = history.iter().rev().find(|r| {
        r.ok && r.operation() == Some(Operation::ListNamespaces)
    });
    let Some(listed) = listed else {
        return Plan::new(
            "List namespaces, then pods in each",
            vec![ToolCall::new(Operation::ListNamespaces, json!({}))],
            false,
        );
    };

    let calls: Vec<ToolCall> = listed
        .payload()
        .and_then(|p| p.get("items"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|item| item.get("name").and_then(Value::as_str))
        .filter(|ns| ctx.is_namespace_allowed(ns))
        .map(|ns| ToolCall::new(Operation::ListPods, json!({ "namespace": ns })))
        .collect();

    if calls.is_empty() {
        return Plan::finished("No accessible namespaces to list pods from");
    }
    Plan::new("List pods in every accessible namespace", calls, true)
}

fn single(summary: impl Into<String>, operation: Operation, args: Value) -> Plan {
    Plan::new(summary, vec![ToolCall::new(operation, args)], true)
}

fn lower(s: &str) -> String {
    s.to_ascii_lowercase()
}

fn parse_count(s: &str) -> Option<u64> {
    s.parse().ok()
}

fn option_image(rest: &str) -> Option<String> {
    IMAGE_OPT.captures(rest).map(|c| c[1].to_string())
}

fn option_replicas(rest: &str) -> Option<u64> {
    let caps = REPLICAS_OPT.captures(rest)?;
    caps.get(1).or_else(|| caps.get(2)).and_then(|m| parse_count(m.as_str()))
}

fn key_values(text: &str) -> Map<String, Value> {
    KEY_VALUE
        .captures_iter(text)
        .map(|c| (c[1].to_string(), Value::String(c[2].to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> PlanningContext {
        PlanningContext::default().with_allowed_namespaces(["default", "dev"])
    }

    fn only_call(plan: &Plan) -> &ToolCall {
        assert_eq!(plan.tool_calls.len(), 1, "{:?}", plan);
        &plan.tool_calls[0]
    }

    #[test]
    fn namespace_question_lists_namespaces() {
        let plan = fallback_plan("What namespaces exist?", &ctx(), &[]).unwrap();
        let call = only_call(&plan);
        assert_eq!(call.tool, "listNamespaces");
        assert!(call.args.is_empty());
        assert!(plan.done);

        let again = fallback_plan("What namespaces exist?", &ctx(), &[]).unwrap();
        assert_eq!(plan, again);
    }

    #[test]
    fn scale_uses_default_namespace() {
        let plan = fallback_plan("scale payments-api to 3", &ctx(), &[]).unwrap();
        let call = only_call(&plan);
        assert_eq!(call.tool, "scaleDeployment");
        assert_eq!(
            Value::Object(call.args.clone()),
            json!({"name": "payments-api", "replicas": 3, "namespace": "default"})
        );
    }

    #[test]
    fn namespace_suffixes_override_default() {
        for text in [
            "list pods in dev",
            "list pods in namespace dev",
            "list pods -n dev",
            "show pods in the dev namespace",
        ] {
            let plan = fallback_plan(text, &ctx(), &[]).unwrap();
            let call = only_call(&plan);
            assert_eq!(call.tool, "listPods", "{}", text);
            assert_eq!(call.args["namespace"], "dev", "{}", text);
        }
    }

    #[test]
    fn all_pods_takes_two_steps() {
        let first = fallback_plan("show pods in all namespaces", &ctx(), &[]).unwrap();
        assert_eq!(only_call(&first).tool, "listNamespaces");
        assert!(!first.done);

        let listed = ToolResult::success(
            &first.tool_calls[0],
            json!({"items": [
                {"name": "default", "status": "Active"},
                {"name": "dev", "status": "Active"},
                {"name": "kube-system", "status": "Active"}
            ]}),
        );
        let second = fallback_plan("show pods in all namespaces", &ctx(), &[listed]).unwrap();
        assert!(second.done);
        let namespaces: Vec<&Value> = second
            .tool_calls
            .iter()
            .map(|c| &c.args["namespace"])
            .collect();
        assert_eq!(namespaces, vec!["default", "dev"]);

        for request in ["list pods in every namespace", "show pods in all namespace"] {
            let plan = fallback_plan(request, &ctx(), &[]).unwrap();
            assert_eq!(only_call(&plan).tool, "listNamespaces", "{}", request);
            assert!(!plan.done);
        }
    }

    #[test]
    fn create_deployment_fills_defaults() {
        let plan = fallback_plan("deploy web", &ctx(), &[]).unwrap();
        assert_eq!(
            Value::Object(only_call(&plan).args.clone()),
            json!({"name": "web", "image": "nginx:latest", "replicas": 1, "namespace": "default"})
        );

        let plan =
            fallback_plan("create deployment api image registry.io/api:2 replicas 3 in dev", &ctx(), &[])
                .unwrap();
        let call = only_call(&plan);
        assert_eq!(call.args["image"], "registry.io/api:2");
        assert_eq!(call.args["replicas"], 3);
        assert_eq!(call.args["namespace"], "dev");
    }

    #[test]
    fn update_phrasings_map_to_operations() {
        let cases = [
            ("update deployment web image nginx:1.27", "setDeploymentImage"),
            ("update deployment web replicas 4", "patchDeployment"),
            ("update configmap app LOG_LEVEL=debug MODE=fast", "updateConfigMap"),
            ("update service web port 8080", "updateService"),
            ("delete deployment web", "deleteDeployment"),
            ("status of deployment web", "getDeploymentStatus"),
            ("create namespace qa", "createNamespace"),
        ];
        for (text, tool) in cases {
            let plan = fallback_plan(text, &ctx(), &[]).unwrap();
            assert_eq!(only_call(&plan).tool, tool, "{}", text);
        }

        let plan = fallback_plan("update configmap app LOG_LEVEL=debug", &ctx(), &[]).unwrap();
        assert_eq!(only_call(&plan).args["data"], json!({"LOG_LEVEL": "debug"}));
    }

    #[test]
    fn unrecognized_request_without_history_is_none() {
        assert!(fallback_plan("make it faster somehow", &ctx(), &[]).is_none());
    }

    #[test]
    fn unrecognized_request_with_history_finishes() {
        let call = ToolCall::new(Operation::ListNamespaces, json!({}));
        let history = vec![ToolResult::success(&call, json!({"items": []}))];
        let plan = fallback_plan("make it faster somehow", &ctx(), &history).unwrap();
        assert!(plan.done);
        assert!(plan.is_empty());
    }
}
