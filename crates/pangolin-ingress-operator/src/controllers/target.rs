//! Pangolin target reconciliation
//!
//! Target ids are assigned by Pangolin, so existing targets are matched to
//! desired ones by their (site, address, port) identity. Matched targets are
//! updated in place, missing ones are created, and everything else attached
//! to the resource is deleted on a best-effort basis.

use std::collections::HashSet;

use tracing::{debug, info, instrument, warn};

use crate::client::{ClientError, PangolinClientTrait};
use crate::resolver::Backend;
use crate::settings::HealthCheckSettings;
use crate::types::{TargetIdentity, TargetRequest};

/// Outcome counters for one target pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Stale targets whose deletion failed
    pub delete_failures: usize,
}

/// Pangolin match type for an Ingress path type
pub fn path_match_type(path_type: &str) -> &'static str {
    match path_type {
        "Exact" => "exact",
        "ImplementationSpecific" => "regex",
        _ => "prefix",
    }
}

pub fn build_target_request(
    site_id: i64,
    backend: &Backend,
    path: Option<&str>,
    path_type: &str,
    health_check: &HealthCheckSettings,
) -> TargetRequest {
    let path = path.filter(|p| !p.is_empty()).unwrap_or("/");

    let mut req = TargetRequest {
        site_id,
        ip: backend.address.clone(),
        method: "http".to_string(),
        port: backend.port,
        enabled: true,
        path: path.to_string(),
        path_match_type: path_match_type(path_type).to_string(),
        ..Default::default()
    };
    health_check.apply_to(&mut req);
    req
}

/// Drop desired targets whose identity was already seen; first wins
pub fn dedup_targets(desired: Vec<TargetRequest>) -> Vec<TargetRequest> {
    let mut seen: HashSet<TargetIdentity> = HashSet::new();
    desired
        .into_iter()
        .filter(|req| {
            let fresh = seen.insert(req.identity());
            if !fresh {
                debug!(ip = %req.ip, port = req.port, path = %req.path, "Collapsing duplicate target");
            }
            fresh
        })
        .collect()
}

/// Converge the targets of `resource_id` onto `desired`
#[instrument(skip(client, desired), fields(desired = desired.len()))]
pub async fn reconcile_targets(
    client: &dyn PangolinClientTrait,
    resource_id: i64,
    desired: Vec<TargetRequest>,
) -> Result<TargetSummary, ClientError> {
    let existing = client.list_targets(resource_id).await?;
    let mut summary = TargetSummary::default();
    let mut active: HashSet<i64> = HashSet::new();

    for req in dedup_targets(desired) {
        let identity = req.identity();
        let matched = existing
            .iter()
            .find(|t| !active.contains(&t.target_id) && t.has_identity(&identity));

        match matched {
            Some(target) => {
                client.update_target(target.target_id, &req).await?;
                active.insert(target.target_id);
                summary.updated += 1;
                debug!(target_id = target.target_id, ip = %req.ip, port = req.port, "Updated target");
            }
            None => {
                let created = client.create_target(resource_id, &req).await?;
                active.insert(created.target_id);
                summary.created += 1;
                info!(target_id = created.target_id, ip = %req.ip, port = req.port, "Created target");
            }
        }
    }

    for stale in existing.iter().filter(|t| !active.contains(&t.target_id)) {
        match client.delete_target(stale.target_id).await {
            Ok(()) => {
                summary.deleted += 1;
                info!(target_id = stale.target_id, ip = %stale.ip, port = stale.port, "Deleted stale target");
            }
            Err(e) => {
                summary.delete_failures += 1;
                warn!(target_id = stale.target_id, error = %e, "Failed to delete stale target");
            }
        }
    }

    Ok(summary)
}
