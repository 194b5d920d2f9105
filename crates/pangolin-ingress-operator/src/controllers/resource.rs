//! Pangolin resource reconciliation
//!
//! A resource is created at most once per Ingress. Its id is persisted in the
//! `resource-id` annotation before any further call, so a crash after
//! creation resumes at the update step instead of creating a duplicate.
//! The create endpoint takes only a subset of settings; the full settings
//! set is always applied with a follow-up update.

use tracing::{info, instrument};

use crate::config::annotations;
use crate::host::parse_host;
use crate::settings::ResourceSettings;
use crate::types::{CreateResourceRequest, UpdateResourceRequest};

use super::ingress::IngressError;
use super::{ControllerContext, ObjectKey};

/// Generated Pangolin resource name
pub fn resource_name(prefix: &str, key: &ObjectKey, subdomain: &str) -> String {
    format!("{}-{}-{}-{}", prefix, key.namespace, key.name, subdomain)
}

pub fn build_create_request(
    name: &str,
    subdomain: &str,
    domain_id: &str,
    settings: &ResourceSettings,
) -> CreateResourceRequest {
    CreateResourceRequest {
        name: name.to_string(),
        subdomain: subdomain.to_string(),
        http: true,
        protocol: "tcp".to_string(),
        domain_id: domain_id.to_string(),
        sticky_session: settings.sticky_session.unwrap_or(false),
        post_auth_path: settings.post_auth_path.clone(),
    }
}

pub fn build_update_request(
    name: &str,
    subdomain: &str,
    domain_id: &str,
    settings: &ResourceSettings,
) -> UpdateResourceRequest {
    let mut req = UpdateResourceRequest {
        name: name.to_string(),
        subdomain: subdomain.to_string(),
        domain_id: domain_id.to_string(),
        ..Default::default()
    };
    settings.apply_to(&mut req);
    req
}

/// Parse a stored resource id; an empty value means none is stored
pub fn parse_resource_id(raw: Option<&str>) -> Result<Option<i64>, IngressError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse::<i64>()
            .map(Some)
            .map_err(|_| IngressError::InvalidResourceId(value.to_string())),
    }
}

/// Ensure a Pangolin resource exists for `host` with the given settings
///
/// Returns the resource id.
#[instrument(skip(ctx, settings), fields(namespace = %key.namespace, name = %key.name))]
pub async fn reconcile_resource(
    ctx: &ControllerContext,
    key: &ObjectKey,
    stored_id: Option<&str>,
    host: &str,
    settings: &ResourceSettings,
) -> Result<i64, IngressError> {
    let (subdomain, domain) = parse_host(host);
    if domain.is_empty() {
        return Err(IngressError::InvalidHost(host.to_string()));
    }

    let domain_id = ctx.cache.domains.resolve(&domain).await?;
    let name = resource_name(&ctx.resource_prefix, key, &subdomain);
    let update = build_update_request(&name, &subdomain, &domain_id, settings);

    let resource_id = match parse_resource_id(stored_id)? {
        Some(id) => id,
        None => {
            let create = build_create_request(&name, &subdomain, &domain_id, settings);
            let created = ctx.client.create_resource(&create).await?;
            info!(
                resource_id = created.resource_id,
                resource_name = %name,
                host,
                "Created Pangolin resource"
            );

            ctx.cluster
                .set_annotation(
                    &key.namespace,
                    &key.name,
                    annotations::RESOURCE_ID,
                    &created.resource_id.to_string(),
                )
                .await?;
            created.resource_id
        }
    };

    ctx.client.update_resource(resource_id, &update).await?;
    info!(resource_id, resource_name = %name, "Applied Pangolin resource settings");

    Ok(resource_id)
}
