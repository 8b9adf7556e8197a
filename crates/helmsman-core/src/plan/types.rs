//! Plan and planning-context types

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::tools::ToolCall;

/// Oracle- or fallback-produced plan for one planning iteration.
///
/// `done` reports informational sufficiency only. It never authorizes
/// skipping confirmation of mutating calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    #[serde(default)]
    pub summary: String,
    #[serde(alias = "tool_calls")]
    pub tool_calls: Vec<ToolCall>,
    pub done: bool,
}

impl Plan {
    pub fn new(summary: impl Into<String>, tool_calls: Vec<ToolCall>, done: bool) -> Self {
        Self {
            summary: summary.into(),
            tool_calls,
            done,
        }
    }

    /// Terminal plan with no further calls.
    pub fn finished(summary: impl Into<String>) -> Self {
        Self::new(summary, Vec::new(), true)
    }

    pub fn is_empty(&self) -> bool {
        self.tool_calls.is_empty()
    }
}

/// Cluster context handed to the planner and enforced by the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanningContext {
    pub default_namespace: String,
    pub allowed_namespaces: BTreeSet<String>,
    pub max_replicas: u32,
    /// Empty means any image is accepted.
    pub allowed_image_prefixes: Vec<String>,
    pub default_image: String,
}

impl Default for PlanningContext {
    fn default() -> Self {
        let default_namespace = constants::cluster::DEFAULT_NAMESPACE.to_string();
        Self {
            allowed_namespaces: BTreeSet::from([default_namespace.clone()]),
            default_namespace,
            max_replicas: constants::cluster::DEFAULT_MAX_REPLICAS,
            allowed_image_prefixes: Vec::new(),
            default_image: constants::cluster::DEFAULT_IMAGE.to_string(),
        }
    }
}

impl PlanningContext {
    pub fn with_default_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.default_namespace = namespace.into();
        self
    }

    pub fn with_allowed_namespaces<I, S>(mut self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_namespaces = namespaces.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_replicas(mut self, max_replicas: u32) -> Self {
        self.max_replicas = max_replicas;
        self
    }

    pub fn with_allowed_image_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_image_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_default_image(mut self, image: impl Into<String>) -> Self {
        self.default_image = image.into();
        self
    }

    pub fn is_namespace_allowed(&self, namespace: &str) -> bool {
        self.allowed_namespaces.contains(namespace)
    }

    pub fn is_image_allowed(&self, image: &str) -> bool {
        self.allowed_image_prefixes.is_empty()
            || self
                .allowed_image_prefixes
                .iter()
                .any(|prefix| image.starts_with(prefix.as_str()))
    }
}
