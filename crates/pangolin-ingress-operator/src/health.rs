//! Health check HTTP server for Kubernetes probes.
//!
//! Provides `/healthz` (liveness) and `/readyz` (readiness) endpoints.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::cache::ResolutionCache;

/// Shared state for health check endpoints.
pub struct HealthState {
    /// Whether the operator has completed startup.
    started: AtomicBool,
    /// Used to confirm the configured site is reachable through Pangolin.
    cache: Arc<ResolutionCache>,
}

impl HealthState {
    pub fn new(cache: Arc<ResolutionCache>) -> Self {
        Self {
            started: AtomicBool::new(false),
            cache,
        }
    }

    /// Mark the operator as started and ready.
    pub fn mark_started(&self) {
        self.started.store(true, Ordering::SeqCst);
        info!("Health check: operator marked as started");
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}

/// Run the health check HTTP server.
///
/// The operator is marked as started only after the server binds, so a
/// readiness probe can never succeed before the server is listening.
pub async fn run_health_server(state: Arc<HealthState>, port: u16) -> std::io::Result<()> {
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .with_state(state.clone());

    // Probes come from the kubelet via the pod IP
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!(port = port, "Health check server listening");

    state.mark_started();

    axum::serve(listener, app).await
}

/// Liveness probe endpoint.
///
/// Returns 200 OK if the process is alive.
async fn healthz() -> StatusCode {
    debug!("Liveness probe: OK");
    StatusCode::OK
}

/// Readiness probe endpoint.
///
/// Returns 503 Service Unavailable until startup completes, and whenever
/// the configured site cannot be resolved.
async fn readyz(State(state): State<Arc<HealthState>>) -> StatusCode {
    if !state.is_started() {
        debug!("Readiness probe: NOT READY (startup incomplete)");
        return StatusCode::SERVICE_UNAVAILABLE;
    }

    match state.cache.site.get().await {
        Ok(site) => {
            debug!(site_id = site.site_id, "Readiness probe: OK");
            StatusCode::OK
        }
        Err(e) => {
            warn!(error = %e, "Readiness probe: NOT READY (site unresolved)");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
