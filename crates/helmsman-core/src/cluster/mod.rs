//! Cluster-management backend port
//!
//! The dispatcher only ever talks to a [`ClusterBackend`]. Requests arrive
//! already validated and policy-checked.

pub mod memory;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::tools::ClusterRequest;

pub use memory::InMemoryCluster;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("{kind} '{name}' not found{}", in_namespace(.namespace))]
    NotFound {
        kind: String,
        namespace: Option<String>,
        name: String,
    },
    #[error("{kind} '{name}' already exists{}", in_namespace(.namespace))]
    AlreadyExists {
        kind: String,
        namespace: Option<String>,
        name: String,
    },
    #[error("namespace '{0}' does not exist")]
    NamespaceMissing(String),
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

fn in_namespace(namespace: &Option<String>) -> String {
    match namespace {
        Some(ns) => format!(" in namespace '{}'", ns),
        None => String::new(),
    }
}

/// Executes typed cluster requests.
///
/// List requests return `{"items": [...], "metadata": {"continue": ...}}`;
/// everything else returns the affected object or a status record.
#[async_trait]
pub trait ClusterBackend: Send + Sync {
    async fn execute(&self, request: &ClusterRequest) -> Result<Value, BackendError>;
}
