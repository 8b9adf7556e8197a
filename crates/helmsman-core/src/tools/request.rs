//! Typed backend requests built from planner-supplied arguments.
//!
//! Arguments arrive as loosely shaped JSON from the oracle. They are only
//! validated here, at execution time, so a malformed call becomes a failed
//! `ToolResult` instead of a planning error.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use super::operation::Operation;
use crate::constants;
use crate::plan::PlanningContext;

/// Argument validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgsError {
    #[error("missing required argument '{0}'")]
    Missing(&'static str),
    #[error("invalid argument '{field}': expected {expected}")]
    Invalid {
        field: &'static str,
        expected: &'static str,
    },
}

/// Resource kinds the backend understands.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ResourceKind {
    Namespace,
    Pod,
    Deployment,
    Service,
    ConfigMap,
    /// Custom resource, identified by its kind name (e.g. `Certificate`).
    Custom(String),
}

impl ResourceKind {
    /// Parse a user or oracle supplied kind. Unrecognized names are treated
    /// as custom resource kinds.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "namespace" | "namespaces" | "ns" => ResourceKind::Namespace,
            "pod" | "pods" | "po" => ResourceKind::Pod,
            "deployment" | "deployments" | "deploy" => ResourceKind::Deployment,
            "service" | "services" | "svc" => ResourceKind::Service,
            "configmap" | "configmaps" | "config-map" | "config-maps" | "cm" => {
                ResourceKind::ConfigMap
            }
            _ => ResourceKind::Custom(raw.trim().to_string()),
        }
    }

    pub fn is_namespaced(&self) -> bool {
        !matches!(self, ResourceKind::Namespace)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Namespace => f.write_str("Namespace"),
            ResourceKind::Pod => f.write_str("Pod"),
            ResourceKind::Deployment => f.write_str("Deployment"),
            ResourceKind::Service => f.write_str("Service"),
            ResourceKind::ConfigMap => f.write_str("ConfigMap"),
            ResourceKind::Custom(kind) => f.write_str(kind),
        }
    }
}

/// Selector and paging options for list requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ListOptions {
    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
    pub limit: Option<usize>,
    pub continue_token: Option<String>,
}

/// A validated request for the cluster-management backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ClusterRequest {
    List {
        kind: ResourceKind,
        /// `None` only for cluster-scoped kinds.
        namespace: Option<String>,
        options: ListOptions,
    },
    Get {
        kind: ResourceKind,
        namespace: Option<String>,
        name: String,
    },
    GetDeploymentStatus {
        namespace: String,
        name: String,
    },
    CreateNamespace {
        name: String,
        labels: BTreeMap<String, String>,
    },
    CreatePod {
        namespace: String,
        name: String,
        image: String,
        labels: BTreeMap<String, String>,
    },
    CreateDeployment {
        namespace: String,
        name: String,
        image: String,
        replicas: u64,
        labels: BTreeMap<String, String>,
    },
    CreateService {
        namespace: String,
        name: String,
        port: u64,
        target_port: u64,
        selector: BTreeMap<String, String>,
        service_type: String,
    },
    CreateConfigMap {
        namespace: String,
        name: String,
        data: BTreeMap<String, String>,
    },
    CreateCustomResource {
        namespace: String,
        api_version: String,
        kind: String,
        name: String,
        spec: Value,
    },
    PatchDeployment {
        namespace: String,
        name: String,
        patch: Value,
    },
    SetDeploymentImage {
        namespace: String,
        name: String,
        container: Option<String>,
        image: String,
    },
    UpdateService {
        namespace: String,
        name: String,
        port: Option<u64>,
        target_port: Option<u64>,
        selector: Option<BTreeMap<String, String>>,
        service_type: Option<String>,
    },
    UpdateConfigMap {
        namespace: String,
        name: String,
        data: BTreeMap<String, String>,
    },
    DeleteDeployment {
        namespace: String,
        name: String,
    },
    ScaleDeployment {
        namespace: String,
        name: String,
        replicas: u64,
    },
}

impl ClusterRequest {
    /// Validate `args` for `operation`, filling the namespace from context
    /// when the call omits it.
    pub fn from_args(
        operation: Operation,
        args: &Map<String, Value>,
        ctx: &PlanningContext,
    ) -> Result<Self, ArgsError> {
        let a = Args { args, ctx };
        let request = match operation {
            Operation::ListNamespaces => ClusterRequest::List {
                kind: ResourceKind::Namespace,
                namespace: None,
                options: a.list_options()?,
            },
            Operation::ListPods => a.list(ResourceKind::Pod)?,
            Operation::ListDeployments => a.list(ResourceKind::Deployment)?,
            Operation::ListServices => a.list(ResourceKind::Service)?,
            Operation::ListConfigMaps => a.list(ResourceKind::ConfigMap)?,
            Operation::ListCustomResources => {
                let kind = ResourceKind::Custom(a.required_str("kind")?);
                a.list(kind)?
            }
            Operation::GetResource => {
                let kind = ResourceKind::parse(&a.required_str("kind")?);
                let namespace = kind.is_namespaced().then(|| a.namespace());
                ClusterRequest::Get {
                    kind,
                    namespace,
                    name: a.required_str("name")?,
                }
            }
            Operation::GetDeploymentStatus => ClusterRequest::GetDeploymentStatus {
                namespace: a.namespace(),
                name: a.required_str("name")?,
            },
            Operation::CreateNamespace => ClusterRequest::CreateNamespace {
                name: a.required_str("name")?,
                labels: a.string_map("labels")?.unwrap_or_default(),
            },
            Operation::CreatePod => ClusterRequest::CreatePod {
                namespace: a.namespace(),
                name: a.required_str("name")?,
                image: a.required_str("image")?,
                labels: a.string_map("labels")?.unwrap_or_default(),
            },
            Operation::CreateDeployment => ClusterRequest::CreateDeployment {
                namespace: a.namespace(),
                name: a.required_str("name")?,
                image: a.required_str("image")?,
                replicas: a.optional_u64("replicas")?.unwrap_or(1),
                labels: a.string_map("labels")?.unwrap_or_default(),
            },
            Operation::CreateService => {
                let name = a.required_str("name")?;
                let port = a
                    .optional_u64("port")?
                    .unwrap_or(u64::from(constants::cluster::DEFAULT_SERVICE_PORT));
                let selector = a
                    .string_map("selector")?
                    .unwrap_or_else(|| BTreeMap::from([("app".to_string(), name.clone())]));
                ClusterRequest::CreateService {
                    namespace: a.namespace(),
                    target_port: a.optional_u64("targetPort")?.unwrap_or(port),
                    port,
                    selector,
                    service_type: a
                        .optional_str("type")?
                        .unwrap_or_else(|| "ClusterIP".to_string()),
                    name,
                }
            }
            Operation::CreateConfigMap => ClusterRequest::CreateConfigMap {
                namespace: a.namespace(),
                name: a.required_str("name")?,
                data: a.string_map("data")?.unwrap_or_default(),
            },
            Operation::CreateCustomResource => ClusterRequest::CreateCustomResource {
                namespace: a.namespace(),
                api_version: a.required_str("apiVersion")?,
                kind: a.required_str("kind")?,
                name: a.required_str("name")?,
                spec: args.get("spec").cloned().unwrap_or(Value::Object(Map::new())),
            },
            Operation::PatchDeployment => {
                let patch = match args.get("patch") {
                    Some(Value::Object(map)) if !map.is_empty() => Value::Object(map.clone()),
                    Some(_) => {
                        return Err(ArgsError::Invalid {
                            field: "patch",
                            expected: "non-empty JSON object",
                        })
                    }
                    None => return Err(ArgsError::Missing("patch")),
                };
                ClusterRequest::PatchDeployment {
                    namespace: a.namespace(),
                    name: a.required_str("name")?,
                    patch,
                }
            }
            Operation::SetDeploymentImage => ClusterRequest::SetDeploymentImage {
                namespace: a.namespace(),
                name: a.required_str("name")?,
                container: a.optional_str("container")?,
                image: a.required_str("image")?,
            },
            Operation::UpdateService => {
                let port = a.optional_u64("port")?;
                let target_port = a.optional_u64("targetPort")?;
                let selector = a.string_map("selector")?;
                let service_type = a.optional_str("type")?;
                if port.is_none()
                    && target_port.is_none()
                    && selector.is_none()
                    && service_type.is_none()
                {
                    return Err(ArgsError::Invalid {
                        field: "port",
                        expected: "at least one of port, targetPort, selector, type",
                    });
                }
                ClusterRequest::UpdateService {
                    namespace: a.namespace(),
                    name: a.required_str("name")?,
                    port,
                    target_port,
                    selector,
                    service_type,
                }
            }
            Operation::UpdateConfigMap => ClusterRequest::UpdateConfigMap {
                namespace: a.namespace(),
                name: a.required_str("name")?,
                data: a.string_map("data")?.ok_or(ArgsError::Missing("data"))?,
            },
            Operation::DeleteDeployment => ClusterRequest::DeleteDeployment {
                namespace: a.namespace(),
                name: a.required_str("name")?,
            },
            Operation::ScaleDeployment => ClusterRequest::ScaleDeployment {
                namespace: a.namespace(),
                name: a.required_str("name")?,
                replicas: a
                    .optional_u64("replicas")?
                    .ok_or(ArgsError::Missing("replicas"))?,
            },
        };
        Ok(request)
    }

    pub fn operation(&self) -> Operation {
        match self {
            ClusterRequest::List { kind, .. } => match kind {
                ResourceKind::Namespace => Operation::ListNamespaces,
                ResourceKind::Pod => Operation::ListPods,
                ResourceKind::Deployment => Operation::ListDeployments,
                ResourceKind::Service => Operation::ListServices,
                ResourceKind::ConfigMap => Operation::ListConfigMaps,
                ResourceKind::Custom(_) => Operation::ListCustomResources,
            },
            ClusterRequest::Get { .. } => Operation::GetResource,
            ClusterRequest::GetDeploymentStatus { .. } => Operation::GetDeploymentStatus,
            ClusterRequest::CreateNamespace { .. } => Operation::CreateNamespace,
            ClusterRequest::CreatePod { .. } => Operation::CreatePod,
            ClusterRequest::CreateDeployment { .. } => Operation::CreateDeployment,
            ClusterRequest::CreateService { .. } => Operation::CreateService,
            ClusterRequest::CreateConfigMap { .. } => Operation::CreateConfigMap,
            ClusterRequest::CreateCustomResource { .. } => Operation::CreateCustomResource,
            ClusterRequest::PatchDeployment { .. } => Operation::PatchDeployment,
            ClusterRequest::SetDeploymentImage { .. } => Operation::SetDeploymentImage,
            ClusterRequest::UpdateService { .. } => Operation::UpdateService,
            ClusterRequest::UpdateConfigMap { .. } => Operation::UpdateConfigMap,
            ClusterRequest::DeleteDeployment { .. } => Operation::DeleteDeployment,
            ClusterRequest::ScaleDeployment { .. } => Operation::ScaleDeployment,
        }
    }

    pub fn is_mutating(&self) -> bool {
        self.operation().is_mutating()
    }

    /// Namespace the request touches. For `CreateNamespace` this is the
    /// namespace being created.
    pub fn target_namespace(&self) -> Option<&str> {
        match self {
            ClusterRequest::List { namespace, .. } | ClusterRequest::Get { namespace, .. } => {
                namespace.as_deref()
            }
            ClusterRequest::CreateNamespace { name, .. } => Some(name),
            ClusterRequest::GetDeploymentStatus { namespace, .. }
            | ClusterRequest::CreatePod { namespace, .. }
            | ClusterRequest::CreateDeployment { namespace, .. }
            | ClusterRequest::CreateService { namespace, .. }
            | ClusterRequest::CreateConfigMap { namespace, .. }
            | ClusterRequest::CreateCustomResource { namespace, .. }
            | ClusterRequest::PatchDeployment { namespace, .. }
            | ClusterRequest::SetDeploymentImage { namespace, .. }
            | ClusterRequest::UpdateService { namespace, .. }
            | ClusterRequest::UpdateConfigMap { namespace, .. }
            | ClusterRequest::DeleteDeployment { namespace, .. }
            | ClusterRequest::ScaleDeployment { namespace, .. } => Some(namespace),
        }
    }

    /// Container images the request would set.
    pub fn images(&self) -> Vec<&str> {
        match self {
            ClusterRequest::CreatePod { image, .. }
            | ClusterRequest::CreateDeployment { image, .. }
            | ClusterRequest::SetDeploymentImage { image, .. } => vec![image.as_str()],
            ClusterRequest::PatchDeployment { patch, .. } => {
                let mut images = Vec::new();
                collect_images(patch, &mut images);
                images
            }
            _ => Vec::new(),
        }
    }

    /// Replica count the request would set. Patches carrying a non-numeric
    /// `spec.replicas` report `u64::MAX` so the limit check rejects them.
    pub fn replicas(&self) -> Option<u64> {
        match self {
            ClusterRequest::CreateDeployment { replicas, .. }
            | ClusterRequest::ScaleDeployment { replicas, .. } => Some(*replicas),
            ClusterRequest::PatchDeployment { patch, .. } => patch
                .pointer("/spec/replicas")
                .map(|value| value.as_u64().unwrap_or(u64::MAX)),
            _ => None,
        }
    }
}

/// Every string `image` field anywhere in a merge patch. Container lists
/// (`containers`, `initContainers`, `ephemeralContainers`) all land here.
fn collect_images<'a>(value: &'a Value, images: &mut Vec<&'a str>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                match child {
                    Value::String(image) if key == "image" => images.push(image),
                    _ => collect_images(child, images),
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_images(item, images)),
        _ => {}
    }
}

struct Args<'a> {
    args: &'a Map<String, Value>,
    ctx: &'a PlanningContext,
}

impl Args<'_> {
    fn namespace(&self) -> String {
        self.args
            .get("namespace")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|ns| !ns.is_empty())
            .unwrap_or(&self.ctx.default_namespace)
            .to_string()
    }

    fn required_str(&self, field: &'static str) -> Result<String, ArgsError> {
        self.optional_str(field)?.ok_or(ArgsError::Missing(field))
    }

    fn optional_str(&self, field: &'static str) -> Result<Option<String>, ArgsError> {
        match self.args.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
            Some(_) => Err(ArgsError::Invalid {
                field,
                expected: "string",
            }),
        }
    }

    /// Accepts JSON numbers and numeric strings; oracles often quote numbers.
    fn optional_u64(&self, field: &'static str) -> Result<Option<u64>, ArgsError> {
        let invalid = ArgsError::Invalid {
            field,
            expected: "non-negative integer",
        };
        match self.args.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n.as_u64().map(Some).ok_or(invalid),
            Some(Value::String(s)) => s.trim().parse::<u64>().map(Some).map_err(|_| invalid),
            Some(_) => Err(invalid),
        }
    }

    fn string_map(
        &self,
        field: &'static str,
    ) -> Result<Option<BTreeMap<String, String>>, ArgsError> {
        match self.args.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Object(map)) => Ok(Some(
                map.iter()
                    .map(|(k, v)| {
                        let value = match v {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        (k.clone(), value)
                    })
                    .collect(),
            )),
            Some(_) => Err(ArgsError::Invalid {
                field,
                expected: "object of string values",
            }),
        }
    }

    fn list_options(&self) -> Result<ListOptions, ArgsError> {
        let limit = self
            .optional_u64("limit")?
            .map(|n| usize::try_from(n).unwrap_or(usize::MAX));
        Ok(ListOptions {
            label_selector: self.optional_str("labelSelector")?,
            field_selector: self.optional_str("fieldSelector")?,
            limit,
            continue_token: self.optional_str("continue")?,
        })
    }

    fn list(&self, kind: ResourceKind) -> Result<ClusterRequest, ArgsError> {
        Ok(ClusterRequest::List {
            kind,
            namespace: Some(self.namespace()),
            options: self.list_options()?,
        })
    }
}
