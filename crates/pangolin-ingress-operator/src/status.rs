//! Ingress status reporting
//!
//! Publishes the site's proxy address as the Ingress load balancer address.

use k8s_openapi::api::networking::v1::Ingress;
use tracing::{debug, info};

use crate::controllers::ingress::IngressError;
use crate::controllers::{ControllerContext, ObjectKey};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusOutcome {
    /// No resource has been created yet
    NoResource,
    /// The site has no known address
    NoAddress,
    Unchanged,
    Updated(String),
}

/// First load balancer IP currently published on the Ingress
pub fn current_address(ingress: &Ingress) -> Option<&str> {
    ingress
        .status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .and_then(|entries| entries.first())
        .and_then(|entry| entry.ip.as_deref())
}

pub async fn report_status(
    ctx: &ControllerContext,
    key: &ObjectKey,
    ingress: &Ingress,
    resource_id: Option<i64>,
) -> Result<StatusOutcome, IngressError> {
    let Some(resource_id) = resource_id else {
        return Ok(StatusOutcome::NoResource);
    };

    ctx.client.get_resource(resource_id).await?;
    let site = ctx.cache.site.get().await?;

    let Some(address) = site.reachable_address() else {
        debug!(site = %site.nice_id, "Site has no proxy address, skipping status");
        return Ok(StatusOutcome::NoAddress);
    };

    if current_address(ingress) == Some(address) {
        return Ok(StatusOutcome::Unchanged);
    }

    ctx.cluster
        .set_load_balancer_ip(&key.namespace, &key.name, address)
        .await?;
    info!(ingress = %key, address, "Updated Ingress status");

    Ok(StatusOutcome::Updated(address.to_string()))
}
