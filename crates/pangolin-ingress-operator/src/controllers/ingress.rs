//! Ingress controller
//!
//! Watches networking.k8s.io/v1 Ingress resources of the configured class and
//! keeps one Pangolin resource, plus its targets, in step with each of them.

use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::networking::v1::{Ingress, IngressBackend};
use kube::runtime::watcher::{self, Config as WatcherConfig, Event};
use kube::runtime::WatchStreamExt;
use kube::{Api, Client};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::cache::CacheError;
use crate::client::ClientError;
use crate::config::annotations;
use crate::deletion::{ensure_finalizer, finalize, lifecycle_state, LifecycleState};
use crate::filter::EventFilter;
use crate::resolver::{resolve_backend, ResolverError};
use crate::settings::Settings;
use crate::status::report_status;
use crate::workqueue::{run_workers, WorkQueue};

use super::resource::reconcile_resource;
use super::retry::ErrorKind;
use super::target::{build_target_request, reconcile_targets};
use super::{ControllerContext, ObjectKey};

#[derive(Debug, Error)]
pub enum IngressError {
    #[error("Pangolin client error: {0}")]
    Client(#[from] ClientError),
    #[error("Resolution failed: {0}")]
    Cache(#[from] CacheError),
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
    #[error("Backend resolution failed: {0}")]
    Backend(#[from] ResolverError),
    #[error("Host {0:?} has no registrable domain")]
    InvalidHost(String),
    #[error("Stored resource id {0:?} is not a number")]
    InvalidResourceId(String),
    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Classify error type for retry behavior
pub fn classify_error(error: &IngressError) -> ErrorKind {
    match error {
        // Won't resolve without a change to the Ingress
        IngressError::InvalidHost(_)
        | IngressError::InvalidResourceId(_)
        | IngressError::MissingField(_)
        | IngressError::Backend(ResolverError::MissingServiceBackend)
        | IngressError::Cache(CacheError::SiteNotConfigured) => ErrorKind::Permanent,
        // Unregistered domains and missing services can appear later
        IngressError::Client(_)
        | IngressError::Cache(_)
        | IngressError::Kube(_)
        | IngressError::Backend(_) => ErrorKind::Transient,
    }
}

/// Class requested by an Ingress, preferring the spec field
fn ingress_class(ingress: &Ingress) -> Option<&str> {
    ingress
        .spec
        .as_ref()
        .and_then(|spec| spec.ingress_class_name.as_deref())
        .or_else(|| {
            ingress
                .metadata
                .annotations
                .as_ref()
                .and_then(|a| a.get(annotations::INGRESS_CLASS))
                .map(String::as_str)
        })
}

/// Whether the Ingress belongs to `class`
pub fn is_managed(ingress: &Ingress, class: &str) -> bool {
    ingress_class(ingress) == Some(class)
}

/// One HTTP path of the primary host
#[derive(Debug, Clone, PartialEq)]
pub struct Route<'a> {
    pub path: Option<&'a str>,
    pub path_type: &'a str,
    pub backend: &'a IngressBackend,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostRoutes<'a> {
    pub host: &'a str,
    pub routes: Vec<Route<'a>>,
}

/// Collect every path served under the primary host
///
/// The primary host is the first non-empty rule host. Rules for other hosts
/// are skipped, since an Ingress maps to exactly one Pangolin resource.
pub fn primary_host_routes(ingress: &Ingress) -> Option<HostRoutes<'_>> {
    let rules = ingress.spec.as_ref()?.rules.as_ref()?;
    let mut primary: Option<HostRoutes<'_>> = None;

    for rule in rules {
        let Some(host) = rule.host.as_deref().filter(|h| !h.is_empty()) else {
            debug!("Skipping rule without host");
            continue;
        };

        let entry = primary.get_or_insert_with(|| HostRoutes {
            host,
            routes: Vec::new(),
        });
        if entry.host != host {
            warn!(
                host,
                primary = entry.host,
                "Skipping rule for additional host; only the first host is routed"
            );
            continue;
        }

        let Some(http) = rule.http.as_ref() else {
            debug!(host, "Skipping rule without HTTP paths");
            continue;
        };
        entry.routes.extend(http.paths.iter().map(|p| Route {
            path: p.path.as_deref(),
            path_type: p.path_type.as_str(),
            backend: &p.backend,
        }));
    }

    primary
}

/// Reconcile a single Ingress by key
#[instrument(skip(ctx), fields(namespace = %key.namespace, name = %key.name))]
pub async fn reconcile(ctx: &ControllerContext, key: &ObjectKey) -> Result<(), IngressError> {
    let Some(ingress) = ctx.cluster.get_ingress(&key.namespace, &key.name).await? else {
        debug!("Ingress no longer exists");
        return Ok(());
    };

    // A deleting Ingress carrying our finalizer is released even if its
    // class changed after we started managing it
    match lifecycle_state(&ingress) {
        LifecycleState::Removed => return Ok(()),
        LifecycleState::Deleting => return finalize(ctx, key, &ingress).await,
        LifecycleState::Active => {}
    }

    if !is_managed(&ingress, &ctx.ingress_class) {
        debug!(ingress_class = %ctx.ingress_class, "Ingress not managed by this controller");
        return Ok(());
    }

    info!("Reconciling Ingress");

    ensure_finalizer(ctx.cluster.as_ref(), key, &ingress).await?;

    let annotations = ingress.metadata.annotations.clone().unwrap_or_default();
    let settings = Settings::extract(&annotations);

    let Some(primary) = primary_host_routes(&ingress) else {
        debug!("No rule with a host, nothing to route");
        return Ok(());
    };
    if primary.routes.is_empty() {
        debug!(host = primary.host, "Primary host has no HTTP paths");
        return Ok(());
    }

    // Resolve every backend before touching Pangolin so a missing service
    // never leaves a resource without targets
    let mut backends = Vec::with_capacity(primary.routes.len());
    for route in &primary.routes {
        let backend = resolve_backend(ctx.cluster.as_ref(), &key.namespace, route.backend).await?;
        backends.push((route, backend));
    }

    let site = ctx.cache.site.get().await?;

    let stored_id = annotations.get(annotations::RESOURCE_ID).map(String::as_str);
    let resource_id =
        reconcile_resource(ctx, key, stored_id, primary.host, &settings.resource).await?;

    let desired = backends
        .iter()
        .map(|(route, backend)| {
            build_target_request(
                site.site_id,
                backend,
                route.path,
                route.path_type,
                &settings.health_check,
            )
        })
        .collect();
    let summary = reconcile_targets(ctx.client.as_ref(), resource_id, desired).await?;
    debug!(
        resource_id,
        created = summary.created,
        updated = summary.updated,
        deleted = summary.deleted,
        delete_failures = summary.delete_failures,
        "Reconciled targets"
    );

    report_status(ctx, key, &ingress, Some(resource_id)).await?;

    info!(resource_id, host = primary.host, "Successfully reconciled Ingress");
    Ok(())
}

/// Reconcile a key and classify any failure for the work queue
pub async fn process(ctx: &ControllerContext, key: &ObjectKey) -> Result<(), ErrorKind> {
    reconcile(ctx, key).await.map_err(|e| {
        let kind = classify_error(&e);
        warn!(ingress = %key, error = %e, error_kind = ?kind, "Reconciliation error");
        kind
    })
}

/// Feed one watcher event through the filter into the queue
pub fn handle_event(
    filter: &mut EventFilter<ObjectKey>,
    queue: &WorkQueue<ObjectKey>,
    event: Event<Ingress>,
) {
    match event {
        Event::Apply(ingress) | Event::InitApply(ingress) => {
            let Some(key) = ObjectKey::from_ingress(&ingress) else {
                return;
            };
            if filter.admit(key.clone(), &ingress) {
                debug!(ingress = %key, "Enqueueing Ingress");
                queue.add(key);
            }
        }
        Event::Delete(ingress) => {
            if let Some(key) = ObjectKey::from_ingress(&ingress) {
                filter.forget(&key);
            }
        }
        Event::Init => debug!("Ingress watch (re)listing"),
        Event::InitDone => debug!("Ingress watch list complete"),
    }
}

/// Watch all Ingresses and enqueue relevant changes
pub async fn watch_ingresses(client: Client, queue: WorkQueue<ObjectKey>) {
    let ingresses: Api<Ingress> = Api::all(client);
    let mut filter = EventFilter::new();
    let mut events = watcher::watcher(ingresses, WatcherConfig::default())
        .default_backoff()
        .boxed();

    while let Some(event) = events.next().await {
        match event {
            Ok(event) => handle_event(&mut filter, &queue, event),
            Err(e) => warn!(error = %e, "Ingress watch error"),
        }
    }
}

/// Run the Ingress controller until the queue shuts down
pub async fn run(
    client: Client,
    ctx: Arc<ControllerContext>,
    queue: WorkQueue<ObjectKey>,
    workers: usize,
) {
    info!(workers, ingress_class = %ctx.ingress_class, "Starting Ingress controller");

    let watch = tokio::spawn(watch_ingresses(client, queue.clone()));

    run_workers(queue, workers, move |key: ObjectKey| {
        let ctx = ctx.clone();
        async move { process(&ctx, &key).await }
    })
    .await;

    watch.abort();
    info!("Ingress controller stopped");
}
