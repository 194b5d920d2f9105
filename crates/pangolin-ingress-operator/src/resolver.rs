//! Backend resolution
//!
//! Turns an Ingress path backend into the in-cluster address and numeric
//! port that a Pangolin target points at.

use k8s_openapi::api::networking::v1::IngressBackend;
use thiserror::Error;

use crate::cluster::ClusterClientTrait;

#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("Path has no service backend")]
    MissingServiceBackend,
    #[error("Service {namespace}/{name} not found")]
    ServiceNotFound { namespace: String, name: String },
    #[error("Could not determine port for service {namespace}/{name}")]
    PortNotFound { namespace: String, name: String },
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

/// Resolved target endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    pub service: String,
    pub address: String,
    pub port: i32,
}

/// In-cluster DNS name of a service
pub fn service_address(service: &str, namespace: &str) -> String {
    format!("{service}.{namespace}.svc.cluster.local")
}

/// Resolve a path backend in `namespace`
///
/// The service must exist. A numbered port is used as is; a named port is
/// looked up in the service spec.
pub async fn resolve_backend(
    cluster: &dyn ClusterClientTrait,
    namespace: &str,
    backend: &IngressBackend,
) -> Result<Backend, ResolverError> {
    let svc_backend = backend
        .service
        .as_ref()
        .ok_or(ResolverError::MissingServiceBackend)?;
    let name = svc_backend.name.as_str();

    let service = cluster
        .get_service(namespace, name)
        .await?
        .ok_or_else(|| ResolverError::ServiceNotFound {
            namespace: namespace.to_string(),
            name: name.to_string(),
        })?;

    let requested = svc_backend.port.as_ref();
    let mut port = requested.and_then(|p| p.number).unwrap_or(0);

    if port == 0 {
        if let Some(port_name) = requested.and_then(|p| p.name.as_deref()) {
            port = service
                .spec
                .as_ref()
                .and_then(|spec| spec.ports.as_ref())
                .and_then(|ports| {
                    ports
                        .iter()
                        .find(|p| p.name.as_deref() == Some(port_name))
                })
                .map(|p| p.port)
                .unwrap_or(0);
        }
    }

    if port == 0 {
        return Err(ResolverError::PortNotFound {
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
    }

    Ok(Backend {
        service: name.to_string(),
        address: service_address(name, namespace),
        port,
    })
}
