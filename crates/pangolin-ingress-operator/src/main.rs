use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};
use tokio::select;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use pangolin_ingress_operator::cache::ResolutionCache;
use pangolin_ingress_operator::client::PangolinClient;
use pangolin_ingress_operator::cluster::KubeCluster;
use pangolin_ingress_operator::config::{OperatorArgs, API_KEY_SECRET_KEY};
use pangolin_ingress_operator::controllers::{self, ControllerContext};
use pangolin_ingress_operator::health::{run_health_server, HealthState};
use pangolin_ingress_operator::leader::{LeaderElection, LeaderElectionConfig, LeadershipLoss};
use pangolin_ingress_operator::workqueue::WorkQueue;

/// Time allowed for in-flight reconciles to finish after shutdown starts
const SHUTDOWN_GRACE_SECS: u64 = 30;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON formatting for production
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = OperatorArgs::parse();
    args.validate().context("Invalid configuration")?;
    let leader_config = LeaderElectionConfig::from_args(&args)
        .context("Invalid leader election configuration")?;

    info!(
        ingress_class = %args.ingress_class,
        base_url = %args.pangolin_base_url,
        org_id = %args.pangolin_org_id,
        site = %args.pangolin_site_nice_id,
        workers = args.workers,
        "pangolin-ingress-operator starting"
    );

    let kube_client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    info!("Connected to Kubernetes cluster");

    let api_key = load_api_key(&kube_client, &args)
        .await
        .context("Failed to load Pangolin API key")?;

    info!(
        secret_name = %args.pangolin_api_key_secret,
        secret_namespace = %args.pangolin_api_key_namespace,
        "Loaded Pangolin API key"
    );

    let pangolin = Arc::new(
        PangolinClient::new(&args.pangolin_base_url, api_key, args.pangolin_org_id.clone())
            .context("Failed to create Pangolin client")?,
    );
    let cache = Arc::new(ResolutionCache::new(
        pangolin.clone(),
        args.pangolin_site_nice_id.clone(),
    ));

    let ctx = Arc::new(ControllerContext {
        client: pangolin,
        cluster: Arc::new(KubeCluster::new(kube_client.clone())),
        cache: cache.clone(),
        ingress_class: args.ingress_class.clone(),
        resource_prefix: args.resource_prefix.clone(),
    });

    let health = Arc::new(HealthState::new(cache));
    let health_port = args.health_port;
    tokio::spawn(async move {
        if let Err(e) = run_health_server(health, health_port).await {
            error!(error = %e, "Health check server failed");
        }
    });

    // Setup signal handlers
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to setup SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to setup SIGINT handler")?;

    let renewal = match leader_config {
        Some(config) => {
            info!(
                lease = %config.lease_name(),
                namespace = %config.namespace(),
                holder = %config.holder_id(),
                "Leader election enabled"
            );
            let election = LeaderElection::new(kube_client.clone(), &config);
            select! {
                _ = election.acquire() => {}
                _ = sigterm.recv() => {
                    info!("Received SIGTERM before acquiring leadership");
                    return Ok(());
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT before acquiring leadership");
                    return Ok(());
                }
            }
            Some(election.spawn_renewal_task())
        }
        None => None,
    };

    let queue = WorkQueue::new();
    let mut controller = tokio::spawn(controllers::ingress::run(
        kube_client,
        ctx,
        queue.clone(),
        args.workers,
    ));

    let outcome = select! {
        result = &mut controller => {
            queue.shutdown();
            match result {
                Ok(()) => bail!("Ingress controller exited unexpectedly"),
                Err(e) => bail!("Ingress controller task failed: {}", e),
            }
        }
        loss = leadership_lost(renewal) => Err(loss),
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down gracefully");
            Ok(())
        }
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down gracefully");
            Ok(())
        }
    };

    queue.shutdown();
    info!(grace_seconds = SHUTDOWN_GRACE_SECS, "Waiting for in-flight reconciles");
    if tokio::time::timeout(Duration::from_secs(SHUTDOWN_GRACE_SECS), controller)
        .await
        .is_err()
    {
        warn!("In-flight reconciles did not finish within the grace period");
    }

    match outcome {
        Ok(()) => {
            info!("Shutdown complete");
            Ok(())
        }
        Err(loss) => bail!("Leadership lost: {}", loss),
    }
}

/// Resolves when the renewal task reports a loss; never when election is off
async fn leadership_lost(renewal: Option<JoinHandle<LeadershipLoss>>) -> LeadershipLoss {
    let Some(handle) = renewal else {
        return std::future::pending().await;
    };

    match handle.await {
        Ok(loss) => {
            error!(reason = %loss, "Leadership lost");
            loss
        }
        Err(e) => LeadershipLoss::RenewalFailed {
            last_error: format!("renewal task failed: {e}"),
        },
    }
}

/// Read the bearer token from the configured Secret
async fn load_api_key(client: &Client, args: &OperatorArgs) -> Result<String> {
    let secrets: Api<Secret> = Api::namespaced(client.clone(), &args.pangolin_api_key_namespace);

    let secret = secrets
        .get(&args.pangolin_api_key_secret)
        .await
        .with_context(|| {
            format!(
                "Secret {}/{} not found",
                args.pangolin_api_key_namespace, args.pangolin_api_key_secret
            )
        })?;

    let data = secret.data.as_ref().context("Secret has no data field")?;
    let raw = data
        .get(API_KEY_SECRET_KEY)
        .with_context(|| format!("Secret missing {API_KEY_SECRET_KEY}"))?;

    let key = String::from_utf8(raw.0.clone())
        .context("API key is not valid UTF-8")?
        .trim()
        .to_string();
    if key.is_empty() {
        bail!("Secret entry {} is empty", API_KEY_SECRET_KEY);
    }

    Ok(key)
}
