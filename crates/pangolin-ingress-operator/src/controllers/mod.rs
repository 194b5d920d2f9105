//! Ingress reconciliation

pub mod ingress;
pub mod resource;
pub mod retry;
pub mod target;

#[cfg(test)]
pub(crate) mod testing;

use std::fmt;
use std::sync::Arc;

use k8s_openapi::api::networking::v1::Ingress;

use crate::cache::ResolutionCache;
use crate::client::PangolinClientTrait;
use crate::cluster::ClusterClientTrait;

/// Shared state for all reconcile workers
pub struct ControllerContext {
    /// Pangolin REST client
    pub client: Arc<dyn PangolinClientTrait>,
    /// Kubernetes reads and writes
    pub cluster: Arc<dyn ClusterClientTrait>,
    /// Domain and site lookups
    pub cache: Arc<ResolutionCache>,
    /// Ingress class handled by this controller
    pub ingress_class: String,
    /// Prefix for generated resource names
    pub resource_prefix: String,
}

/// Namespace and name of an Ingress
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of a watched object; `None` when the object lacks a name
    pub fn from_ingress(ingress: &Ingress) -> Option<Self> {
        let name = ingress.metadata.name.clone()?;
        let namespace = ingress
            .metadata
            .namespace
            .clone()
            .unwrap_or_else(|| "default".to_string());
        Some(Self { namespace, name })
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
