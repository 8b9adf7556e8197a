//! Operation identifiers and the read-only/mutating classification table.
//!
//! This table is the single source of truth for what requires confirmation.
//! Every identifier the planner is told about comes from `Operation::ALL`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Every cluster operation the planner may propose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    // ── Read ───────────────────────────────────────────────────────────
    ListNamespaces,
    ListPods,
    ListDeployments,
    ListServices,
    ListConfigMaps,
    ListCustomResources,
    GetResource,
    GetDeploymentStatus,

    // ── Mutating ───────────────────────────────────────────────────────
    CreateNamespace,
    CreatePod,
    CreateDeployment,
    CreateService,
    CreateConfigMap,
    CreateCustomResource,
    PatchDeployment,
    SetDeploymentImage,
    UpdateService,
    UpdateConfigMap,
    DeleteDeployment,
    ScaleDeployment,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown operation '{0}'")]
pub struct UnknownOperation(pub String);

impl Operation {
    pub const ALL: [Operation; 20] = [
        Operation::ListNamespaces,
        Operation::ListPods,
        Operation::ListDeployments,
        Operation::ListServices,
        Operation::ListConfigMaps,
        Operation::ListCustomResources,
        Operation::GetResource,
        Operation::GetDeploymentStatus,
        Operation::CreateNamespace,
        Operation::CreatePod,
        Operation::CreateDeployment,
        Operation::CreateService,
        Operation::CreateConfigMap,
        Operation::CreateCustomResource,
        Operation::PatchDeployment,
        Operation::SetDeploymentImage,
        Operation::UpdateService,
        Operation::UpdateConfigMap,
        Operation::DeleteDeployment,
        Operation::ScaleDeployment,
    ];

    /// Whether the operation creates, updates, patches, scales or deletes.
    pub fn is_mutating(self) -> bool {
        match self {
            Operation::ListNamespaces
            | Operation::ListPods
            | Operation::ListDeployments
            | Operation::ListServices
            | Operation::ListConfigMaps
            | Operation::ListCustomResources
            | Operation::GetResource
            | Operation::GetDeploymentStatus => false,
            Operation::CreateNamespace
            | Operation::CreatePod
            | Operation::CreateDeployment
            | Operation::CreateService
            | Operation::CreateConfigMap
            | Operation::CreateCustomResource
            | Operation::PatchDeployment
            | Operation::SetDeploymentImage
            | Operation::UpdateService
            | Operation::UpdateConfigMap
            | Operation::DeleteDeployment
            | Operation::ScaleDeployment => true,
        }
    }

    /// Wire identifier.
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::ListNamespaces => "listNamespaces",
            Operation::ListPods => "listPods",
            Operation::ListDeployments => "listDeployments",
            Operation::ListServices => "listServices",
            Operation::ListConfigMaps => "listConfigMaps",
            Operation::ListCustomResources => "listCustomResources",
            Operation::GetResource => "getResource",
            Operation::GetDeploymentStatus => "getDeploymentStatus",
            Operation::CreateNamespace => "createNamespace",
            Operation::CreatePod => "createPod",
            Operation::CreateDeployment => "createDeployment",
            Operation::CreateService => "createService",
            Operation::CreateConfigMap => "createConfigMap",
            Operation::CreateCustomResource => "createCustomResource",
            Operation::PatchDeployment => "patchDeployment",
            Operation::SetDeploymentImage => "setDeploymentImage",
            Operation::UpdateService => "updateService",
            Operation::UpdateConfigMap => "updateConfigMap",
            Operation::DeleteDeployment => "deleteDeployment",
            Operation::ScaleDeployment => "scaleDeployment",
        }
    }

    /// Argument shape advertised to the oracle. `?` marks optional fields.
    pub fn arg_shape(self) -> &'static str {
        const LIST: &str = "{namespace?, labelSelector?, fieldSelector?, limit?, continue?}";
        match self {
            Operation::ListNamespaces => "{labelSelector?, limit?, continue?}",
            Operation::ListPods
            | Operation::ListDeployments
            | Operation::ListServices
            | Operation::ListConfigMaps => LIST,
            Operation::ListCustomResources => {
                "{kind, namespace?, labelSelector?, fieldSelector?, limit?, continue?}"
            }
            Operation::GetResource => "{kind, name, namespace?}",
            Operation::GetDeploymentStatus => "{name, namespace?}",
            Operation::CreateNamespace => "{name, labels?}",
            Operation::CreatePod => "{name, image, namespace?, labels?}",
            Operation::CreateDeployment => "{name, image, replicas?, namespace?, labels?}",
            Operation::CreateService => {
                "{name, port?, targetPort?, selector?, type?, namespace?}"
            }
            Operation::CreateConfigMap => "{name, data?, namespace?}",
            Operation::CreateCustomResource => "{apiVersion, kind, name, spec?, namespace?}",
            Operation::PatchDeployment => "{name, patch (JSON merge patch), namespace?}",
            Operation::SetDeploymentImage => "{name, image, container?, namespace?}",
            Operation::UpdateService => "{name, port?, targetPort?, selector?, type?, namespace?}",
            Operation::UpdateConfigMap => "{name, data, namespace?}",
            Operation::DeleteDeployment => "{name, namespace?}",
            Operation::ScaleDeployment => "{name, replicas, namespace?}",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = UnknownOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| UnknownOperation(s.to_string()))
    }
}
