//! In-memory cluster backend
//!
//! Stores Kubernetes-shaped JSON objects keyed by kind, namespace and name.
//! Used by the offline CLI and by end-to-end tests, which inspect the
//! invocation log to prove what did or did not reach the backend.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Map, Value};
use tracing::debug;

use super::{BackendError, ClusterBackend};
use crate::tools::{ClusterRequest, ListOptions, ResourceKind};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ObjectKey {
    kind: ResourceKind,
    namespace: String,
    name: String,
}

impl ObjectKey {
    fn new(kind: &ResourceKind, namespace: Option<&str>, name: &str) -> Self {
        let kind = match kind {
            ResourceKind::Custom(k) => ResourceKind::Custom(k.to_ascii_lowercase()),
            other => other.clone(),
        };
        Self {
            namespace: if kind.is_namespaced() {
                namespace.unwrap_or_default().to_string()
            } else {
                String::new()
            },
            kind,
            name: name.to_string(),
        }
    }

    fn not_found(&self, display_kind: &ResourceKind) -> BackendError {
        BackendError::NotFound {
            kind: display_kind.to_string(),
            namespace: self.scope(),
            name: self.name.clone(),
        }
    }

    fn already_exists(&self, display_kind: &ResourceKind) -> BackendError {
        BackendError::AlreadyExists {
            kind: display_kind.to_string(),
            namespace: self.scope(),
            name: self.name.clone(),
        }
    }

    fn scope(&self) -> Option<String> {
        (!self.namespace.is_empty()).then(|| self.namespace.clone())
    }
}

/// Process-local cluster used when no real backend is configured.
#[derive(Debug, Default)]
pub struct InMemoryCluster {
    objects: RwLock<BTreeMap<ObjectKey, Value>>,
    invocations: Mutex<Vec<ClusterRequest>>,
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cluster with the given namespaces already present.
    pub fn with_namespaces<I, S>(namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let cluster = Self::new();
        {
            let mut objects = cluster.objects.write();
            for ns in namespaces {
                let key = ObjectKey::new(&ResourceKind::Namespace, None, ns.as_ref());
                objects.insert(key, namespace_object(ns.as_ref(), &BTreeMap::new()));
            }
        }
        cluster
    }

    /// Insert a pre-built object, replacing any existing one with the same key.
    /// `metadata.name` is required; `metadata.namespace` is used for
    /// namespaced kinds.
    pub fn seed(&self, kind: ResourceKind, object: Value) -> Result<(), BackendError> {
        let name = object
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .ok_or_else(|| BackendError::Invalid("seeded object has no metadata.name".into()))?;
        let namespace = object.pointer("/metadata/namespace").and_then(Value::as_str);
        let key = ObjectKey::new(&kind, namespace, name);
        self.objects.write().insert(key, object);
        Ok(())
    }

    /// Every request executed so far, in order.
    pub fn invocations(&self) -> Vec<ClusterRequest> {
        self.invocations.lock().clone()
    }

    pub fn mutation_count(&self) -> usize {
        self.invocations
            .lock()
            .iter()
            .filter(|r| r.is_mutating())
            .count()
    }

    /// Snapshot of a stored object.
    pub fn object(&self, kind: &ResourceKind, namespace: Option<&str>, name: &str) -> Option<Value> {
        self.objects
            .read()
            .get(&ObjectKey::new(kind, namespace, name))
            .cloned()
    }

    fn require_namespace(&self, namespace: &str) -> Result<(), BackendError> {
        let key = ObjectKey::new(&ResourceKind::Namespace, None, namespace);
        if self.objects.read().contains_key(&key) {
            Ok(())
        } else {
            Err(BackendError::NamespaceMissing(namespace.to_string()))
        }
    }

    fn insert_new(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        name: &str,
        object: Value,
    ) -> Result<Value, BackendError> {
        if let Some(ns) = namespace {
            self.require_namespace(ns)?;
        }
        let key = ObjectKey::new(&kind, namespace, name);
        let mut objects = self.objects.write();
        if objects.contains_key(&key) {
            return Err(key.already_exists(&kind));
        }
        objects.insert(key, object.clone());
        Ok(object)
    }

    fn modify<F>(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        apply: F,
    ) -> Result<Value, BackendError>
    where
        F: FnOnce(&mut Value) -> Result<(), BackendError>,
    {
        let key = ObjectKey::new(&kind, Some(namespace), name);
        let mut objects = self.objects.write();
        let object = objects.get_mut(&key).ok_or_else(|| key.not_found(&kind))?;
        apply(object)?;
        Ok(object.clone())
    }

    fn list(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        options: &ListOptions,
    ) -> Result<Value, BackendError> {
        let labels = options
            .label_selector
            .as_deref()
            .map(parse_selector)
            .transpose()?
            .unwrap_or_default();
        let fields = options
            .field_selector
            .as_deref()
            .map(parse_selector)
            .transpose()?
            .unwrap_or_default();
        let offset = match options.continue_token.as_deref() {
            Some(token) => decode_continue(token)?,
            None => 0,
        };

        let wanted = ObjectKey::new(kind, namespace, "");
        let objects = self.objects.read();
        let matching: Vec<&Value> = objects
            .iter()
            .filter(|(key, _)| key.kind == wanted.kind && key.namespace == wanted.namespace)
            .map(|(_, object)| object)
            .filter(|object| matches_labels(object, &labels) && matches_fields(object, &fields))
            .collect();

        let total = matching.len();
        let limit = options.limit.filter(|n| *n > 0).unwrap_or(total);
        let end = offset.saturating_add(limit).min(total);
        let items: Vec<Value> = matching
            .get(offset.min(total)..end)
            .unwrap_or_default()
            .iter()
            .map(|object| (*object).clone())
            .collect();

        let mut metadata = Map::new();
        if end < total {
            metadata.insert("continue".to_string(), Value::String(encode_continue(end)));
        }
        Ok(json!({ "items": items, "metadata": metadata }))
    }

    fn get(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Value, BackendError> {
        let key = ObjectKey::new(kind, namespace, name);
        self.objects
            .read()
            .get(&key)
            .cloned()
            .ok_or_else(|| key.not_found(kind))
    }

    fn apply(&self, request: &ClusterRequest) -> Result<Value, BackendError> {
        match request {
            ClusterRequest::List {
                kind,
                namespace,
                options,
            } => self.list(kind, namespace.as_deref(), options),
            ClusterRequest::Get {
                kind,
                namespace,
                name,
            } => self.get(kind, namespace.as_deref(), name),
            ClusterRequest::GetDeploymentStatus { namespace, name } => {
                let deployment = self.get(&ResourceKind::Deployment, Some(namespace), name)?;
                Ok(deployment_status(&deployment))
            }
            ClusterRequest::CreateNamespace { name, labels } => self.insert_new(
                ResourceKind::Namespace,
                None,
                name,
                namespace_object(name, labels),
            ),
            ClusterRequest::CreatePod {
                namespace,
                name,
                image,
                labels,
            } => {
                let object = json!({
                    "apiVersion": "v1",
                    "kind": "Pod",
                    "metadata": metadata(name, Some(namespace), labels),
                    "spec": {
                        "nodeName": "memory-node-1",
                        "containers": [{ "name": name, "image": image }]
                    },
                    "status": {
                        "phase": "Running",
                        "containerStatuses": [{ "name": name, "ready": true, "restartCount": 0 }]
                    }
                });
                self.insert_new(ResourceKind::Pod, Some(namespace), name, object)
            }
            ClusterRequest::CreateDeployment {
                namespace,
                name,
                image,
                replicas,
                labels,
            } => {
                let mut pod_labels = labels.clone();
                pod_labels
                    .entry("app".to_string())
                    .or_insert_with(|| name.clone());
                let object = json!({
                    "apiVersion": "apps/v1",
                    "kind": "Deployment",
                    "metadata": metadata(name, Some(namespace), labels),
                    "spec": {
                        "replicas": replicas,
                        "selector": { "matchLabels": pod_labels },
                        "template": {
                            "metadata": { "labels": pod_labels },
                            "spec": { "containers": [{ "name": name, "image": image }] }
                        }
                    },
                    "status": rollout_status(*replicas)
                });
                self.insert_new(ResourceKind::Deployment, Some(namespace), name, object)
            }
            ClusterRequest::CreateService {
                namespace,
                name,
                port,
                target_port,
                selector,
                service_type,
            } => {
                let cluster_ip = self.next_cluster_ip();
                let object = json!({
                    "apiVersion": "v1",
                    "kind": "Service",
                    "metadata": metadata(name, Some(namespace), &BTreeMap::new()),
                    "spec": {
                        "type": service_type,
                        "clusterIP": cluster_ip,
                        "selector": selector,
                        "ports": [{ "port": port, "targetPort": target_port, "protocol": "TCP" }]
                    }
                });
                self.insert_new(ResourceKind::Service, Some(namespace), name, object)
            }
            ClusterRequest::CreateConfigMap {
                namespace,
                name,
                data,
            } => {
                let object = json!({
                    "apiVersion": "v1",
                    "kind": "ConfigMap",
                    "metadata": metadata(name, Some(namespace), &BTreeMap::new()),
                    "data": data
                });
                self.insert_new(ResourceKind::ConfigMap, Some(namespace), name, object)
            }
            ClusterRequest::CreateCustomResource {
                namespace,
                api_version,
                kind,
                name,
                spec,
            } => {
                let object = json!({
                    "apiVersion": api_version,
                    "kind": kind,
                    "metadata": metadata(name, Some(namespace), &BTreeMap::new()),
                    "spec": spec
                });
                self.insert_new(
                    ResourceKind::Custom(kind.clone()),
                    Some(namespace),
                    name,
                    object,
                )
            }
            ClusterRequest::PatchDeployment {
                namespace,
                name,
                patch,
            } => self.modify(ResourceKind::Deployment, namespace, name, |object| {
                merge_patch(object, patch);
                sync_rollout(object);
                Ok(())
            }),
            ClusterRequest::SetDeploymentImage {
                namespace,
                name,
                container,
                image,
            } => self.modify(ResourceKind::Deployment, namespace, name, |object| {
                set_container_image(object, container.as_deref(), image)
            }),
            ClusterRequest::UpdateService {
                namespace,
                name,
                port,
                target_port,
                selector,
                service_type,
            } => self.modify(ResourceKind::Service, namespace, name, |object| {
                let spec = object_entry(object, "spec")?;
                if let Some(selector) = selector {
                    spec.insert("selector".to_string(), json!(selector));
                }
                if let Some(service_type) = service_type {
                    spec.insert("type".to_string(), json!(service_type));
                }
                if port.is_some() || target_port.is_some() {
                    let existing = spec
                        .get("ports")
                        .and_then(|p| p.get(0))
                        .cloned()
                        .unwrap_or_else(|| json!({ "protocol": "TCP" }));
                    let mut first = existing.as_object().cloned().unwrap_or_default();
                    if let Some(port) = port {
                        first.insert("port".to_string(), json!(port));
                        if target_port.is_none() && !first.contains_key("targetPort") {
                            first.insert("targetPort".to_string(), json!(port));
                        }
                    }
                    if let Some(target_port) = target_port {
                        first.insert("targetPort".to_string(), json!(target_port));
                    }
                    spec.insert("ports".to_string(), json!([first]));
                }
                Ok(())
            }),
            ClusterRequest::UpdateConfigMap {
                namespace,
                name,
                data,
            } => self.modify(ResourceKind::ConfigMap, namespace, name, |object| {
                let existing = object_entry(object, "data")?;
                for (key, value) in data {
                    existing.insert(key.clone(), Value::String(value.clone()));
                }
                Ok(())
            }),
            ClusterRequest::DeleteDeployment { namespace, name } => {
                let key = ObjectKey::new(&ResourceKind::Deployment, Some(namespace), name);
                self.objects
                    .write()
                    .remove(&key)
                    .ok_or_else(|| key.not_found(&ResourceKind::Deployment))?;
                Ok(json!({ "deleted": name, "namespace": namespace, "kind": "Deployment" }))
            }
            ClusterRequest::ScaleDeployment {
                namespace,
                name,
                replicas,
            } => self.modify(ResourceKind::Deployment, namespace, name, |object| {
                object_entry(object, "spec")?.insert("replicas".to_string(), json!(replicas));
                sync_rollout(object);
                Ok(())
            }),
        }
    }

    fn next_cluster_ip(&self) -> String {
        let services = self
            .objects
            .read()
            .keys()
            .filter(|key| key.kind == ResourceKind::Service)
            .count();
        format!("10.96.0.{}", services + 10)
    }
}

#[async_trait]
impl ClusterBackend for InMemoryCluster {
    async fn execute(&self, request: &ClusterRequest) -> Result<Value, BackendError> {
        self.invocations.lock().push(request.clone());
        debug!(operation = %request.operation(), "in-memory cluster request");
        self.apply(request)
    }
}

fn metadata(name: &str, namespace: Option<&str>, labels: &BTreeMap<String, String>) -> Value {
    let mut meta = json!({
        "name": name,
        "labels": labels,
        "creationTimestamp": Utc::now().to_rfc3339(),
    });
    if let (Some(ns), Some(map)) = (namespace, meta.as_object_mut()) {
        map.insert("namespace".to_string(), json!(ns));
    }
    meta
}

fn namespace_object(name: &str, labels: &BTreeMap<String, String>) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": metadata(name, None, labels),
        "status": { "phase": "Active" }
    })
}

fn rollout_status(replicas: u64) -> Value {
    json!({
        "replicas": replicas,
        "readyReplicas": replicas,
        "availableReplicas": replicas,
        "updatedReplicas": replicas,
        "conditions": [
            { "type": "Available", "status": "True" },
            { "type": "Progressing", "status": "True", "reason": "NewReplicaSetAvailable" }
        ]
    })
}

/// The in-memory cluster converges instantly.
fn sync_rollout(object: &mut Value) {
    let replicas = object
        .pointer("/spec/replicas")
        .and_then(Value::as_u64)
        .unwrap_or(1);
    if let Some(map) = object.as_object_mut() {
        map.insert("status".to_string(), rollout_status(replicas));
    }
}

fn deployment_status(deployment: &Value) -> Value {
    let status = deployment.get("status").cloned().unwrap_or_else(|| json!({}));
    json!({
        "name": deployment.pointer("/metadata/name"),
        "namespace": deployment.pointer("/metadata/namespace"),
        "desiredReplicas": deployment.pointer("/spec/replicas"),
        "replicas": status.get("replicas"),
        "readyReplicas": status.get("readyReplicas"),
        "availableReplicas": status.get("availableReplicas"),
        "updatedReplicas": status.get("updatedReplicas"),
        "conditions": status.get("conditions"),
    })
}

fn set_container_image(
    deployment: &mut Value,
    container: Option<&str>,
    image: &str,
) -> Result<(), BackendError> {
    let containers = deployment
        .pointer_mut("/spec/template/spec/containers")
        .and_then(Value::as_array_mut)
        .ok_or_else(|| BackendError::Invalid("deployment has no containers".into()))?;
    let mut updated = 0;
    for c in containers.iter_mut() {
        let name_matches = match container {
            Some(wanted) => c.get("name").and_then(Value::as_str) == Some(wanted),
            None => updated == 0,
        };
        if name_matches {
            if let Some(map) = c.as_object_mut() {
                map.insert("image".to_string(), json!(image));
                updated += 1;
            }
        }
    }
    match (updated, container) {
        (0, Some(wanted)) => Err(BackendError::Invalid(format!(
            "container '{}' not found",
            wanted
        ))),
        (0, None) => Err(BackendError::Invalid("deployment has no containers".into())),
        _ => Ok(()),
    }
}

/// JSON merge patch: objects merge recursively, `null` removes a key, any
/// other value replaces.
fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                merge_patch(target_map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

fn object_entry<'a>(object: &'a mut Value, key: &str) -> Result<&'a mut Map<String, Value>, BackendError> {
    let entry = object
        .as_object_mut()
        .ok_or_else(|| BackendError::Invalid("stored object is malformed".into()))?
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    entry
        .as_object_mut()
        .ok_or_else(|| BackendError::Invalid(format!("field '{}' is malformed", key)))
}

type Selector = Vec<(String, String)>;

fn parse_selector(raw: &str) -> Result<Selector, BackendError> {
    raw.split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .map(|term| {
            let (key, value) = term
                .split_once("==")
                .or_else(|| term.split_once('='))
                .ok_or_else(|| BackendError::Invalid(format!("unsupported selector '{}'", term)))?;
            Ok((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

fn matches_labels(object: &Value, selector: &Selector) -> bool {
    selector.iter().all(|(key, value)| {
        object
            .pointer("/metadata/labels")
            .and_then(|labels| labels.get(key))
            .and_then(Value::as_str)
            == Some(value.as_str())
    })
}

fn matches_fields(object: &Value, selector: &Selector) -> bool {
    selector.iter().all(|(field, value)| {
        let pointer = format!("/{}", field.replace('.', "/"));
        object.pointer(&pointer).and_then(Value::as_str) == Some(value.as_str())
    })
}

fn encode_continue(offset: usize) -> String {
    format!("offset-{}", offset)
}

fn decode_continue(token: &str) -> Result<usize, BackendError> {
    token
        .strip_prefix("offset-")
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| BackendError::Invalid(format!("malformed continue token '{}'", token)))
}
