//! Tolerant plan parsing
//!
//! Strict parsing is tried first. On failure the repair pipeline runs one
//! step at a time, re-trying after each step that changed the text.

use serde_json::Value;

use super::repair::Repair;
use super::types::Plan;

/// Outcome of parsing oracle text into a plan
#[derive(Debug, Clone, PartialEq)]
pub enum PlanParse {
    /// Strict parse of the trimmed text succeeded
    Parsed(Plan),
    /// Parsed after one or more repairs
    Recovered { plan: Plan, repairs: Vec<Repair> },
    /// No plan could be extracted
    Unparseable { reason: String },
}

impl PlanParse {
    pub fn into_plan(self) -> Option<Plan> {
        match self {
            PlanParse::Parsed(plan) | PlanParse::Recovered { plan, .. } => Some(plan),
            PlanParse::Unparseable { .. } => None,
        }
    }
}

pub fn parse_plan(text: &str) -> PlanParse {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return PlanParse::Unparseable {
            reason: "empty reply".to_string(),
        };
    }

    let mut last_reason = match try_parse(trimmed) {
        Ok(plan) => return PlanParse::Parsed(plan),
        Err(reason) => reason,
    };

    let mut current = trimmed.to_string();
    let mut repairs = Vec::new();
    for repair in Repair::PIPELINE {
        let Some(next) = repair.apply(&current) else {
            continue;
        };
        repairs.push(repair);
        current = next;
        match try_parse(&current) {
            Ok(plan) => return PlanParse::Recovered { plan, repairs },
            Err(reason) => last_reason = reason,
        }
    }

    PlanParse::Unparseable {
        reason: last_reason,
    }
}

fn try_parse(text: &str) -> Result<Plan, String> {
    let value: Value = serde_json::from_str(text).map_err(|e| e.to_string())?;
    plan_from_value(value)
}

/// Arrays are searched for their first plan-shaped element.
fn plan_from_value(value: Value) -> Result<Plan, String> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .find(is_plan_shaped)
            .ok_or_else(|| "array contains no plan object".to_string())
            .and_then(|item| serde_json::from_value(item).map_err(|e| e.to_string())),
        Value::Object(_) => serde_json::from_value(value).map_err(|e| e.to_string()),
        other => Err(format!("expected a JSON object, got {}", json_type(&other))),
    }
}

fn is_plan_shaped(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    let calls = obj.get("toolCalls").or_else(|| obj.get("tool_calls"));
    let summary_ok = obj.get("summary").map_or(true, Value::is_string);
    summary_ok && calls.is_some_and(Value::is_array) && obj.get("done").is_some_and(Value::is_boolean)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Operation;

    const WELL_FORMED: &str = r#"{"summary": "Scale web", "toolCalls": [{"tool": "scaleDeployment", "args": {"name": "web", "replicas": 3}}], "done": true}"#;

    fn expected() -> Plan {
        match parse_plan(WELL_FORMED) {
            PlanParse::Parsed(plan) => plan,
            other => panic!("expected strict parse, got {:?}", other),
        }
    }

    #[test]
    fn well_formed_plan_parses_strictly() {
        let plan = expected();
        assert_eq!(plan.tool_calls[0].operation(), Some(Operation::ScaleDeployment));
        assert!(plan.done);
    }

    #[test]
    fn fenced_reply_with_trailing_commas_matches_well_formed() {
        let text = "```json\n{\"summary\": \"Scale web\", \"toolCalls\": [{\"tool\": \"scaleDeployment\", \"args\": {\"name\": \"web\", \"replicas\": 3,},},], \"done\": true,}\n```";
        match parse_plan(text) {
            PlanParse::Recovered { plan, repairs } => {
                assert_eq!(plan, expected());
                assert_eq!(repairs, vec![Repair::StripFences, Repair::TrailingCommas]);
            }
            other => panic!("expected recovery, got {:?}", other),
        }
    }

    #[test]
    fn prose_wrapped_python_style_reply_is_recovered() {
        let text = "Sure! Here is the plan: {'summary': 'x'} no wait {\"summary\": \"List\", \"toolCalls\": [], \"done\": True}";
        // The first balanced value is not a plan, so extraction alone cannot help.
        assert!(matches!(parse_plan(text), PlanParse::Unparseable { .. }));

        let text = "Sure! Here is the plan:\n{\"summary\": \"List\", \"toolCalls\": [{\"tool\": \"listNamespaces\"}], \"done\": True}\nLet me know.";
        let plan = parse_plan(text).into_plan().unwrap();
        assert!(plan.done);
        assert_eq!(plan.tool_calls.len(), 1);
    }

    #[test]
    fn truncated_reply_is_closed() {
        let text = r#"{"summary": "List pods", "done": false, "toolCalls": [{"tool": "listPods", "args": {"namespace": "dev"}"#;
        let plan = parse_plan(text).into_plan().unwrap();
        assert_eq!(plan.tool_calls[0].args["namespace"], "dev");
        assert!(!plan.done);
    }

    #[test]
    fn array_reply_uses_first_plan_element() {
        let text = r#"[{"note": "thinking"}, {"toolCalls": [], "done": true}, {"toolCalls": [], "done": false}]"#;
        let plan = parse_plan(text).into_plan().unwrap();
        assert!(plan.done);
        assert_eq!(plan.summary, "");
    }

    #[test]
    fn non_plan_text_is_unparseable() {
        assert!(matches!(
            parse_plan("I cannot help with that."),
            PlanParse::Unparseable { .. }
        ));
        assert!(matches!(parse_plan("   "), PlanParse::Unparseable { .. }));
        assert!(matches!(
            parse_plan(r#"{"toolCalls": []}"#),
            PlanParse::Unparseable { .. }
        ));
    }

    #[test]
    fn unknown_tools_survive_parsing() {
        let plan = parse_plan(r#"{"toolCalls": [{"tool": "rebootNode"}], "done": false}"#)
            .into_plan()
            .unwrap();
        assert_eq!(plan.tool_calls[0].tool, "rebootNode");
        assert_eq!(plan.tool_calls[0].operation(), None);
    }
}
