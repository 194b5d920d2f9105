//! Finalizer lifecycle
//!
//! An Ingress moves from `Active` to `Deleting` when the API server sets its
//! deletion timestamp, and to `Removed` once the finalizer is cleared. The
//! finalizer is added before any Pangolin state is created, and removed only
//! after the Pangolin resource is gone.

use k8s_openapi::api::networking::v1::Ingress;
use tracing::{debug, info, instrument, warn};

use crate::cluster::ClusterClientTrait;
use crate::config::{annotations, FINALIZER};
use crate::controllers::ingress::IngressError;
use crate::controllers::resource::parse_resource_id;
use crate::controllers::{ControllerContext, ObjectKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No deletion timestamp
    Active,
    /// Deletion requested and our finalizer still present
    Deleting,
    /// Deletion requested and nothing left for us to release
    Removed,
}

pub fn has_finalizer(ingress: &Ingress) -> bool {
    ingress
        .metadata
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|name| name == FINALIZER))
}

pub fn lifecycle_state(ingress: &Ingress) -> LifecycleState {
    if ingress.metadata.deletion_timestamp.is_none() {
        LifecycleState::Active
    } else if has_finalizer(ingress) {
        LifecycleState::Deleting
    } else {
        LifecycleState::Removed
    }
}

/// Add the finalizer if missing; returns whether a write was made
///
/// The patch carries the observed resourceVersion, so a concurrent writer
/// makes it fail instead of clobbering their finalizer list.
pub async fn ensure_finalizer(
    cluster: &dyn ClusterClientTrait,
    key: &ObjectKey,
    ingress: &Ingress,
) -> Result<bool, kube::Error> {
    if has_finalizer(ingress) {
        return Ok(false);
    }

    let mut finalizers = ingress.metadata.finalizers.clone().unwrap_or_default();
    finalizers.push(FINALIZER.to_string());

    cluster
        .patch_finalizers(
            &key.namespace,
            &key.name,
            finalizers,
            ingress.metadata.resource_version.clone(),
        )
        .await?;

    info!(ingress = %key, "Added finalizer");
    Ok(true)
}

/// Release Pangolin state for a deleting Ingress, then drop the finalizer
///
/// Deleting the resource removes its targets on the Pangolin side. A resource
/// that is already gone counts as deleted. On any other failure the finalizer
/// stays and the error is returned for retry.
#[instrument(skip(ctx, ingress), fields(namespace = %key.namespace, name = %key.name))]
pub async fn finalize(
    ctx: &ControllerContext,
    key: &ObjectKey,
    ingress: &Ingress,
) -> Result<(), IngressError> {
    let stored = ingress
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(annotations::RESOURCE_ID))
        .map(String::as_str);

    match parse_resource_id(stored) {
        Ok(Some(resource_id)) => match ctx.client.delete_resource(resource_id).await {
            Ok(()) => info!(resource_id, "Deleted Pangolin resource"),
            Err(e) if e.is_not_found() => {
                debug!(resource_id, "Pangolin resource already gone");
            }
            Err(e) => return Err(e.into()),
        },
        Ok(None) => debug!("No stored resource id, nothing to delete"),
        Err(e) => warn!(error = %e, "Ignoring unusable resource id during deletion"),
    }

    let finalizers: Vec<String> = ingress
        .metadata
        .finalizers
        .iter()
        .flatten()
        .filter(|name| name.as_str() != FINALIZER)
        .cloned()
        .collect();

    ctx.cluster
        .patch_finalizers(
            &key.namespace,
            &key.name,
            finalizers,
            ingress.metadata.resource_version.clone(),
        )
        .await?;

    info!("Removed finalizer");
    Ok(())
}
