//! Compact views of list results
//!
//! The planner and formatter only need a handful of fields per object; raw
//! objects would blow up the history handed back to the oracle.

use serde_json::{json, Value};

use super::request::ResourceKind;
use crate::constants::cluster::MAX_LIST_ITEMS;

/// Project a backend list response to `{items, count, continue?, truncated?}`.
pub fn project_list(kind: &ResourceKind, response: &Value) -> Value {
    let items = response
        .get("items")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let projected: Vec<Value> = items
        .iter()
        .take(MAX_LIST_ITEMS)
        .map(|item| project_item(kind, item))
        .collect();

    let mut out = json!({
        "items": projected,
        "count": items.len(),
    });
    if let Some(token) = response
        .pointer("/metadata/continue")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
    {
        out["continue"] = json!(token);
    }
    if items.len() > MAX_LIST_ITEMS {
        out["truncated"] = json!(true);
    }
    out
}

fn project_item(kind: &ResourceKind, item: &Value) -> Value {
    let name = item.pointer("/metadata/name");
    let namespace = item.pointer("/metadata/namespace");
    match kind {
        ResourceKind::Namespace => json!({
            "name": name,
            "status": item.pointer("/status/phase"),
        }),
        ResourceKind::Pod => {
            let restarts: u64 = item
                .pointer("/status/containerStatuses")
                .and_then(Value::as_array)
                .map(|statuses| {
                    statuses
                        .iter()
                        .filter_map(|s| s.get("restartCount").and_then(Value::as_u64))
                        .sum()
                })
                .unwrap_or(0);
            json!({
                "name": name,
                "namespace": namespace,
                "phase": item.pointer("/status/phase"),
                "node": item.pointer("/spec/nodeName"),
                "restarts": restarts,
            })
        }
        ResourceKind::Deployment => json!({
            "name": name,
            "namespace": namespace,
            "replicas": item.pointer("/spec/replicas"),
            "readyReplicas": item.pointer("/status/readyReplicas").cloned().unwrap_or(json!(0)),
            "image": item.pointer("/spec/template/spec/containers/0/image"),
        }),
        ResourceKind::Service => {
            let ports: Vec<Value> = item
                .pointer("/spec/ports")
                .and_then(Value::as_array)
                .map(|ports| {
                    ports
                        .iter()
                        .map(|p| {
                            json!({
                                "port": p.get("port"),
                                "targetPort": p.get("targetPort"),
                                "protocol": p.get("protocol"),
                            })
                        })
                        .collect()
                })
                .unwrap_or_default();
            json!({
                "name": name,
                "namespace": namespace,
                "type": item.pointer("/spec/type"),
                "clusterIP": item.pointer("/spec/clusterIP"),
                "ports": ports,
            })
        }
        ResourceKind::ConfigMap => {
            let keys: Vec<&String> = item
                .get("data")
                .and_then(Value::as_object)
                .map(|data| data.keys().collect())
                .unwrap_or_default();
            json!({
                "name": name,
                "namespace": namespace,
                "keys": keys,
            })
        }
        ResourceKind::Custom(_) => json!({
            "name": name,
            "namespace": namespace,
            "kind": item.get("kind"),
            "apiVersion": item.get("apiVersion"),
        }),
    }
}
