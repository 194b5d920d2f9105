//! End-to-end reconcile tests against in-memory Pangolin and cluster fakes
//!
//! The fakes keep real state, so these tests observe convergence across
//! repeated passes and process restarts rather than individual calls.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressLoadBalancerIngress,
    IngressLoadBalancerStatus, IngressRule, IngressServiceBackend, IngressSpec, IngressStatus,
    ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use k8s_openapi::chrono::Utc;

use pangolin_ingress_operator::cache::ResolutionCache;
use pangolin_ingress_operator::client::{ClientError, PangolinClientTrait};
use pangolin_ingress_operator::cluster::ClusterClientTrait;
use pangolin_ingress_operator::config::{annotations, FINALIZER};
use pangolin_ingress_operator::controllers::ingress::reconcile;
use pangolin_ingress_operator::controllers::{ControllerContext, ObjectKey};
use pangolin_ingress_operator::types::{
    CreateResourceRequest, Domain, Resource, Site, Target, TargetRequest, UpdateResourceRequest,
};

const SITE_ID: i64 = 7;
const PROXY_IP: &str = "203.0.113.7";
const WEB_ADDRESS: &str = "web.default.svc.cluster.local";

// ============================================================================
// Pangolin fake
// ============================================================================

#[derive(Default)]
struct PangolinState {
    next_id: i64,
    resources: BTreeMap<i64, Resource>,
    /// target id -> (resource id, target)
    targets: BTreeMap<i64, (i64, Target)>,
    last_update: Option<UpdateResourceRequest>,
    resource_creates: usize,
    target_creates: usize,
    target_deletes: usize,
    resource_deletes: usize,
    fail_resource_delete: bool,
}

#[derive(Default)]
struct FakePangolin {
    state: Mutex<PangolinState>,
}

impl FakePangolin {
    fn new() -> Self {
        let fake = Self::default();
        fake.state().next_id = 100;
        fake
    }

    fn state(&self) -> std::sync::MutexGuard<'_, PangolinState> {
        self.state.lock().unwrap()
    }

    fn seed_resource(&self, resource_id: i64) {
        self.state().resources.insert(
            resource_id,
            Resource {
                resource_id,
                ..Default::default()
            },
        );
    }

    fn seed_target(&self, resource_id: i64, target_id: i64, port: i32) {
        self.state().targets.insert(
            target_id,
            (
                resource_id,
                Target {
                    target_id,
                    site_id: SITE_ID,
                    ip: WEB_ADDRESS.to_string(),
                    port,
                    enabled: true,
                    ..Default::default()
                },
            ),
        );
    }

    fn targets_of(&self, resource_id: i64) -> Vec<Target> {
        self.state()
            .targets
            .values()
            .filter(|(rid, _)| *rid == resource_id)
            .map(|(_, t)| t.clone())
            .collect()
    }

    fn target_from(target_id: i64, req: &TargetRequest) -> Target {
        Target {
            target_id,
            site_id: req.site_id,
            ip: req.ip.clone(),
            method: Some(req.method.clone()),
            port: req.port,
            enabled: req.enabled,
            path: Some(req.path.clone()),
            path_match_type: Some(req.path_match_type.clone()),
            health_status: None,
        }
    }
}

#[async_trait]
impl PangolinClientTrait for FakePangolin {
    async fn create_resource(&self, req: &CreateResourceRequest) -> Result<Resource, ClientError> {
        let mut state = self.state();
        state.next_id += 1;
        state.resource_creates += 1;
        let resource = Resource {
            resource_id: state.next_id,
            name: req.name.clone(),
            subdomain: Some(req.subdomain.clone()),
            domain_id: Some(req.domain_id.clone()),
            http: req.http,
            protocol: req.protocol.clone(),
            ..Default::default()
        };
        state.resources.insert(resource.resource_id, resource.clone());
        Ok(resource)
    }

    async fn get_resource(&self, resource_id: i64) -> Result<Resource, ClientError> {
        self.state()
            .resources
            .get(&resource_id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("resource {resource_id}")))
    }

    async fn list_resources(&self) -> Result<Vec<Resource>, ClientError> {
        Ok(self.state().resources.values().cloned().collect())
    }

    async fn update_resource(
        &self,
        resource_id: i64,
        req: &UpdateResourceRequest,
    ) -> Result<Resource, ClientError> {
        let mut state = self.state();
        state.last_update = Some(req.clone());
        state
            .resources
            .get(&resource_id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("resource {resource_id}")))
    }

    async fn delete_resource(&self, resource_id: i64) -> Result<(), ClientError> {
        let mut state = self.state();
        if state.fail_resource_delete {
            return Err(ClientError::Api {
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        if state.resources.remove(&resource_id).is_none() {
            return Err(ClientError::NotFound(format!("resource {resource_id}")));
        }
        state.targets.retain(|_, (rid, _)| *rid != resource_id);
        state.resource_deletes += 1;
        Ok(())
    }

    async fn create_target(
        &self,
        resource_id: i64,
        req: &TargetRequest,
    ) -> Result<Target, ClientError> {
        let mut state = self.state();
        state.next_id += 1;
        state.target_creates += 1;
        let target = Self::target_from(state.next_id, req);
        state
            .targets
            .insert(target.target_id, (resource_id, target.clone()));
        Ok(target)
    }

    async fn list_targets(&self, resource_id: i64) -> Result<Vec<Target>, ClientError> {
        Ok(self.targets_of(resource_id))
    }

    async fn update_target(
        &self,
        target_id: i64,
        req: &TargetRequest,
    ) -> Result<Target, ClientError> {
        let mut state = self.state();
        let (_, target) = state
            .targets
            .get_mut(&target_id)
            .ok_or_else(|| ClientError::NotFound(format!("target {target_id}")))?;
        *target = Self::target_from(target_id, req);
        Ok(target.clone())
    }

    async fn delete_target(&self, target_id: i64) -> Result<(), ClientError> {
        let mut state = self.state();
        state
            .targets
            .remove(&target_id)
            .ok_or_else(|| ClientError::NotFound(format!("target {target_id}")))?;
        state.target_deletes += 1;
        Ok(())
    }

    async fn list_domains(&self) -> Result<Vec<Domain>, ClientError> {
        Ok(vec![Domain {
            domain_id: "dom-1".to_string(),
            base_domain: "example.com".to_string(),
        }])
    }

    async fn get_domain(&self, domain_id: &str) -> Result<Domain, ClientError> {
        Err(ClientError::NotFound(format!("domain {domain_id}")))
    }

    async fn get_site(&self, site_id: i64) -> Result<Site, ClientError> {
        Err(ClientError::NotFound(format!("site {site_id}")))
    }

    async fn get_site_by_nice_id(&self, nice_id: &str) -> Result<Site, ClientError> {
        Ok(Site {
            site_id: SITE_ID,
            nice_id: nice_id.to_string(),
            proxy_ip: Some(PROXY_IP.to_string()),
            online: true,
            ..Default::default()
        })
    }

    async fn list_sites(&self) -> Result<Vec<Site>, ClientError> {
        Ok(vec![])
    }
}

// ============================================================================
// Cluster fake
// ============================================================================

#[derive(Default)]
struct FakeCluster {
    ingresses: Mutex<HashMap<(String, String), Ingress>>,
    services: Mutex<HashMap<(String, String), Service>>,
    status_writes: Mutex<usize>,
}

impl FakeCluster {
    fn with(ingress: Ingress, services: Vec<Service>) -> Self {
        let cluster = Self::default();
        cluster.put(ingress);
        for svc in services {
            let key = (
                svc.metadata.namespace.clone().unwrap_or_default(),
                svc.metadata.name.clone().unwrap_or_default(),
            );
            cluster.services.lock().unwrap().insert(key, svc);
        }
        cluster
    }

    fn put(&self, ingress: Ingress) {
        let key = (
            ingress.metadata.namespace.clone().unwrap_or_default(),
            ingress.metadata.name.clone().unwrap_or_default(),
        );
        self.ingresses.lock().unwrap().insert(key, ingress);
    }

    fn ingress(&self) -> Option<Ingress> {
        self.ingresses
            .lock()
            .unwrap()
            .get(&("default".to_string(), "web".to_string()))
            .cloned()
    }

    /// Apply a write to a stored Ingress, bumping its resourceVersion
    fn modify(
        &self,
        namespace: &str,
        name: &str,
        f: impl FnOnce(&mut Ingress),
    ) -> Result<(), kube::Error> {
        let mut ingresses = self.ingresses.lock().unwrap();
        let ingress = ingresses
            .get_mut(&(namespace.to_string(), name.to_string()))
            .ok_or_else(|| api_error(404, "NotFound"))?;
        f(ingress);
        let rv: u64 = ingress
            .metadata
            .resource_version
            .as_deref()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        ingress.metadata.resource_version = Some((rv + 1).to_string());
        Ok(())
    }

    fn start_deletion(&self) {
        self.modify("default", "web", |ing| {
            ing.metadata.deletion_timestamp = Some(Time(Utc::now()));
        })
        .unwrap();
    }
}

fn api_error(code: u16, reason: &str) -> kube::Error {
    kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".to_string(),
        message: reason.to_string(),
        reason: reason.to_string(),
        code,
    })
}

#[async_trait]
impl ClusterClientTrait for FakeCluster {
    async fn get_ingress(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Ingress>, kube::Error> {
        Ok(self
            .ingresses
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Service>, kube::Error> {
        Ok(self
            .services
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn patch_finalizers(
        &self,
        namespace: &str,
        name: &str,
        finalizers: Vec<String>,
        resource_version: Option<String>,
    ) -> Result<(), kube::Error> {
        let key = (namespace.to_string(), name.to_string());
        {
            let ingresses = self.ingresses.lock().unwrap();
            let current = ingresses.get(&key).ok_or_else(|| api_error(404, "NotFound"))?;
            if resource_version.is_some() && current.metadata.resource_version != resource_version {
                return Err(api_error(409, "Conflict"));
            }
        }

        self.modify(namespace, name, |ing| {
            ing.metadata.finalizers = Some(finalizers);
        })?;

        // The API server removes a deleting object once its finalizers are gone
        let mut ingresses = self.ingresses.lock().unwrap();
        let released = ingresses.get(&key).is_some_and(|ing| {
            ing.metadata.deletion_timestamp.is_some()
                && ing.metadata.finalizers.as_ref().map_or(true, |f| f.is_empty())
        });
        if released {
            ingresses.remove(&key);
        }
        Ok(())
    }

    async fn set_annotation(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<(), kube::Error> {
        self.modify(namespace, name, |ing| {
            ing.metadata
                .annotations
                .get_or_insert_with(BTreeMap::new)
                .insert(key.to_string(), value.to_string());
        })
    }

    async fn set_load_balancer_ip(
        &self,
        namespace: &str,
        name: &str,
        ip: &str,
    ) -> Result<(), kube::Error> {
        *self.status_writes.lock().unwrap() += 1;
        self.modify(namespace, name, |ing| {
            ing.status = Some(IngressStatus {
                load_balancer: Some(IngressLoadBalancerStatus {
                    ingress: Some(vec![IngressLoadBalancerIngress {
                        ip: Some(ip.to_string()),
                        ..Default::default()
                    }]),
                }),
            });
        })
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn path(path: &str, service: &str, port: i32) -> HTTPIngressPath {
    HTTPIngressPath {
        path: Some(path.to_string()),
        path_type: "Prefix".to_string(),
        backend: IngressBackend {
            service: Some(IngressServiceBackend {
                name: service.to_string(),
                port: Some(ServiceBackendPort {
                    number: Some(port),
                    name: None,
                }),
            }),
            resource: None,
        },
    }
}

fn ingress(paths: Vec<HTTPIngressPath>, annotations: &[(&str, &str)]) -> Ingress {
    Ingress {
        metadata: ObjectMeta {
            name: Some("web".to_string()),
            namespace: Some("default".to_string()),
            generation: Some(1),
            resource_version: Some("1".to_string()),
            annotations: Some(
                annotations
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            ..Default::default()
        },
        spec: Some(IngressSpec {
            ingress_class_name: Some("pangolin".to_string()),
            rules: Some(vec![IngressRule {
                host: Some("app.example.com".to_string()),
                http: Some(HTTPIngressRuleValue { paths }),
            }]),
            ..Default::default()
        }),
        status: None,
    }
}

fn service(name: &str) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            ports: Some(vec![ServicePort {
                name: Some("http".to_string()),
                port: 80,
                ..Default::default()
            }]),
            ..Default::default()
        }),
        status: None,
    }
}

/// A fresh context, as built by a newly started process
fn context(pangolin: &Arc<FakePangolin>, cluster: &Arc<FakeCluster>) -> ControllerContext {
    let client: Arc<dyn PangolinClientTrait> = pangolin.clone();
    ControllerContext {
        client: client.clone(),
        cluster: cluster.clone(),
        cache: Arc::new(ResolutionCache::new(client, "edge-1".to_string())),
        ingress_class: "pangolin".to_string(),
        resource_prefix: "pangolin-controller".to_string(),
    }
}

fn key() -> ObjectKey {
    ObjectKey::new("default", "web")
}

fn stored_resource_id(cluster: &FakeCluster) -> Option<String> {
    cluster
        .ingress()?
        .metadata
        .annotations?
        .get(annotations::RESOURCE_ID)
        .cloned()
}

// ============================================================================
// Properties
// ============================================================================

#[tokio::test]
async fn test_reconcile_is_idempotent() {
    let pangolin = Arc::new(FakePangolin::new());
    let cluster = Arc::new(FakeCluster::with(
        ingress(vec![path("/", "web", 80)], &[]),
        vec![service("web")],
    ));
    let ctx = context(&pangolin, &cluster);

    reconcile(&ctx, &key()).await.unwrap();
    reconcile(&ctx, &key()).await.unwrap();

    let state = pangolin.state();
    assert_eq!(state.resource_creates, 1);
    assert_eq!(state.target_creates, 1);
    assert_eq!(state.target_deletes, 0);
    assert_eq!(state.resources.len(), 1);
    assert_eq!(state.targets.len(), 1);
    drop(state);

    let stored = cluster.ingress().unwrap();
    assert!(stored
        .metadata
        .finalizers
        .unwrap()
        .contains(&FINALIZER.to_string()));
    assert_eq!(*cluster.status_writes.lock().unwrap(), 1);
}

#[tokio::test]
async fn test_restart_reuses_stored_resource() {
    let pangolin = Arc::new(FakePangolin::new());
    let cluster = Arc::new(FakeCluster::with(
        ingress(vec![path("/", "web", 80)], &[]),
        vec![service("web")],
    ));

    reconcile(&context(&pangolin, &cluster), &key()).await.unwrap();
    let resource_id = stored_resource_id(&cluster).expect("resource id persisted");

    // Cold caches, same external state
    reconcile(&context(&pangolin, &cluster), &key()).await.unwrap();

    assert_eq!(stored_resource_id(&cluster), Some(resource_id.clone()));
    let state = pangolin.state();
    assert_eq!(state.resource_creates, 1);
    assert_eq!(state.target_creates, 1);
    assert_eq!(state.target_deletes, 0);
    drop(state);

    let targets = pangolin.targets_of(resource_id.parse().unwrap());
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].site_id, SITE_ID);
    assert_eq!(targets[0].ip, WEB_ADDRESS);
    assert_eq!(targets[0].port, 80);
}

#[tokio::test]
async fn test_stale_target_is_removed() {
    let pangolin = Arc::new(FakePangolin::new());
    pangolin.seed_resource(42);
    pangolin.seed_target(42, 1, 80);
    pangolin.seed_target(42, 2, 9090);

    let mut existing = ingress(vec![path("/", "web", 80)], &[(annotations::RESOURCE_ID, "42")]);
    existing.metadata.finalizers = Some(vec![FINALIZER.to_string()]);
    let cluster = Arc::new(FakeCluster::with(existing, vec![service("web")]));

    reconcile(&context(&pangolin, &cluster), &key()).await.unwrap();

    let targets = pangolin.targets_of(42);
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].target_id, 1);
    assert_eq!(targets[0].port, 80);
    assert_eq!(pangolin.state().resource_creates, 0);
    assert_eq!(pangolin.state().target_deletes, 1);
}

#[tokio::test]
async fn test_changed_settings_update_target_in_place() {
    let pangolin = Arc::new(FakePangolin::new());
    let cluster = Arc::new(FakeCluster::with(
        ingress(vec![path("/", "web", 80)], &[]),
        vec![service("web")],
    ));
    let ctx = context(&pangolin, &cluster);
    reconcile(&ctx, &key()).await.unwrap();

    cluster
        .modify("default", "web", |ing| {
            ing.metadata
                .annotations
                .get_or_insert_with(BTreeMap::new)
                .insert(annotations::HC_PATH.to_string(), "/healthz".to_string());
            let rules = ing.spec.as_mut().unwrap().rules.as_mut().unwrap();
            rules[0].http.as_mut().unwrap().paths[0].path = Some("/app".to_string());
        })
        .unwrap();
    reconcile(&ctx, &key()).await.unwrap();

    let state = pangolin.state();
    assert_eq!(state.target_creates, 1);
    assert_eq!(state.target_deletes, 0);
    let (_, target) = state.targets.values().next().unwrap();
    assert_eq!(target.path.as_deref(), Some("/app"));
}

#[tokio::test]
async fn test_multiple_paths_share_one_resource() {
    let pangolin = Arc::new(FakePangolin::new());
    let cluster = Arc::new(FakeCluster::with(
        ingress(
            vec![
                path("/", "web", 80),
                path("/api", "api", 8080),
                // Same (site, address, port) as the first path
                path("/other", "web", 80),
            ],
            &[],
        ),
        vec![service("web"), service("api")],
    ));

    reconcile(&context(&pangolin, &cluster), &key()).await.unwrap();

    let state = pangolin.state();
    assert_eq!(state.resource_creates, 1);
    assert_eq!(state.targets.len(), 2);
    let ports: Vec<i32> = state.targets.values().map(|(_, t)| t.port).collect();
    assert!(ports.contains(&80));
    assert!(ports.contains(&8080));
}

#[tokio::test]
async fn test_deletion_waits_for_external_delete() {
    let pangolin = Arc::new(FakePangolin::new());
    let cluster = Arc::new(FakeCluster::with(
        ingress(vec![path("/", "web", 80)], &[]),
        vec![service("web")],
    ));
    let ctx = context(&pangolin, &cluster);
    reconcile(&ctx, &key()).await.unwrap();
    let resource_id = stored_resource_id(&cluster).unwrap();

    cluster.start_deletion();
    pangolin.state().fail_resource_delete = true;
    assert!(reconcile(&ctx, &key()).await.is_err());

    // Still protected, still pointing at the resource
    let stuck = cluster.ingress().expect("object kept while finalizer present");
    assert!(stuck.metadata.finalizers.unwrap().contains(&FINALIZER.to_string()));
    assert_eq!(stored_resource_id(&cluster), Some(resource_id));

    pangolin.state().fail_resource_delete = false;
    reconcile(&ctx, &key()).await.unwrap();

    assert!(cluster.ingress().is_none());
    let state = pangolin.state();
    assert_eq!(state.resource_deletes, 1);
    assert!(state.resources.is_empty());
    assert!(state.targets.is_empty());
}

#[tokio::test]
async fn test_active_object_never_deletes() {
    let pangolin = Arc::new(FakePangolin::new());
    let cluster = Arc::new(FakeCluster::with(
        ingress(vec![path("/", "web", 80)], &[]),
        vec![service("web")],
    ));
    let ctx = context(&pangolin, &cluster);

    reconcile(&ctx, &key()).await.unwrap();
    reconcile(&ctx, &key()).await.unwrap();

    assert_eq!(pangolin.state().resource_deletes, 0);
    assert!(cluster.ingress().is_some());
}

#[tokio::test]
async fn test_invalid_annotation_fails_open() {
    let pangolin = Arc::new(FakePangolin::new());
    let cluster = Arc::new(FakeCluster::with(
        ingress(
            vec![path("/", "web", 80)],
            &[
                (annotations::SSO, "notabool"),
                (annotations::BLOCK_ACCESS, "true"),
                (annotations::HC_INTERVAL, "soon"),
            ],
        ),
        vec![service("web")],
    ));

    reconcile(&context(&pangolin, &cluster), &key()).await.unwrap();

    let state = pangolin.state();
    let update = state.last_update.as_ref().expect("settings applied");
    assert_eq!(update.sso, None);
    assert_eq!(update.block_access, Some(true));
    assert_eq!(state.targets.len(), 1);
}

#[tokio::test]
async fn test_missing_service_creates_nothing() {
    let pangolin = Arc::new(FakePangolin::new());
    let cluster = Arc::new(FakeCluster::with(
        ingress(vec![path("/", "web", 80)], &[]),
        vec![],
    ));

    assert!(reconcile(&context(&pangolin, &cluster), &key()).await.is_err());
    assert_eq!(pangolin.state().resource_creates, 0);
    assert_eq!(stored_resource_id(&cluster), None);
}
