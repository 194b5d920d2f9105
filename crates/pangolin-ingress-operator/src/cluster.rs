//! Kubernetes-side operations used during reconciliation
//!
//! Reads and writes go through [`ClusterClientTrait`] so that reconcile logic
//! can be exercised without an API server.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client};
use serde_json::json;
use tracing::debug;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterClientTrait: Send + Sync {
    /// Fetch an Ingress; `None` when it no longer exists
    async fn get_ingress(&self, namespace: &str, name: &str)
        -> Result<Option<Ingress>, kube::Error>;

    async fn get_service(&self, namespace: &str, name: &str)
        -> Result<Option<Service>, kube::Error>;

    /// Replace the finalizer list, guarded by `resource_version` when given
    async fn patch_finalizers(
        &self,
        namespace: &str,
        name: &str,
        finalizers: Vec<String>,
        resource_version: Option<String>,
    ) -> Result<(), kube::Error>;

    async fn set_annotation(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<(), kube::Error>;

    /// Publish a single load balancer address on the Ingress status
    async fn set_load_balancer_ip(
        &self,
        namespace: &str,
        name: &str,
        ip: &str,
    ) -> Result<(), kube::Error>;
}

/// [`ClusterClientTrait`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn ingresses(&self, namespace: &str) -> Api<Ingress> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ClusterClientTrait for KubeCluster {
    async fn get_ingress(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Ingress>, kube::Error> {
        self.ingresses(namespace).get_opt(name).await
    }

    async fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Service>, kube::Error> {
        let services: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        services.get_opt(name).await
    }

    async fn patch_finalizers(
        &self,
        namespace: &str,
        name: &str,
        finalizers: Vec<String>,
        resource_version: Option<String>,
    ) -> Result<(), kube::Error> {
        let mut metadata = json!({ "finalizers": finalizers });
        if let Some(rv) = resource_version {
            metadata["resourceVersion"] = json!(rv);
        }
        let patch = json!({ "metadata": metadata });

        self.ingresses(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;

        debug!(namespace, name, "Patched finalizers");
        Ok(())
    }

    async fn set_annotation(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<(), kube::Error> {
        let patch = json!({
            "metadata": {
                "annotations": { key: value }
            }
        });

        self.ingresses(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn set_load_balancer_ip(
        &self,
        namespace: &str,
        name: &str,
        ip: &str,
    ) -> Result<(), kube::Error> {
        let patch = json!({
            "status": {
                "loadBalancer": {
                    "ingress": [{ "ip": ip }]
                }
            }
        });

        self.ingresses(namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}
