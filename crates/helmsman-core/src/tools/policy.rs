//! Safety policy applied to every request before it reaches the backend

use thiserror::Error;

use super::request::ClusterRequest;
use crate::plan::PlanningContext;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyViolation {
    #[error("namespace '{0}' is not allowed")]
    NamespaceNotAllowed(String),
    #[error("image '{0}' is not allowed")]
    ImageNotAllowed(String),
    #[error("replicas {requested} exceed maximum {max}")]
    ReplicasExceedMaximum { requested: u64, max: u32 },
}

/// Check `request` against the namespace allow-set, image prefixes and
/// replica ceiling. Cluster-scoped reads carry no namespace and pass.
pub fn enforce(request: &ClusterRequest, ctx: &PlanningContext) -> Result<(), PolicyViolation> {
    if let Some(namespace) = request.target_namespace() {
        if !ctx.is_namespace_allowed(namespace) {
            return Err(PolicyViolation::NamespaceNotAllowed(namespace.to_string()));
        }
    }

    if let Some(image) = request
        .images()
        .into_iter()
        .find(|image| !ctx.is_image_allowed(image))
    {
        return Err(PolicyViolation::ImageNotAllowed(image.to_string()));
    }

    if let Some(requested) = request.replicas() {
        if requested > u64::from(ctx.max_replicas) {
            return Err(PolicyViolation::ReplicasExceedMaximum {
                requested,
                max: ctx.max_replicas,
            });
        }
    }

    Ok(())
}
