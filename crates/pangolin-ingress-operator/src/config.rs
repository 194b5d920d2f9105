//! Process configuration and annotation keys

use std::time::Duration;

use clap::Parser;
use thiserror::Error;

/// Default Pangolin API endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.tunnel.tf";

/// Secret entry holding the API bearer token
pub const API_KEY_SECRET_KEY: &str = "api-key";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("--pangolin-org-id is required")]
    MissingOrgId,
    #[error("--pangolin-site-nice-id is required")]
    MissingSiteNiceId,
    #[error("--workers must be at least 1")]
    NoWorkers,
    #[error("--leader-election-namespace (POD_NAMESPACE) is required when leader election is enabled")]
    MissingLeaseNamespace,
    #[error("POD_NAME is required when leader election is enabled")]
    MissingHolderId,
    #[error("lease renew interval ({renew:?}) must be less than lease duration ({duration:?})")]
    LeaseTiming { renew: Duration, duration: Duration },
}

#[derive(Parser, Debug, Clone)]
#[command(name = "pangolin-ingress-operator")]
#[command(about = "Syncs Kubernetes Ingress objects to Pangolin resources", long_about = None)]
pub struct OperatorArgs {
    /// Ingress class handled by this controller
    #[arg(long, env = "INGRESS_CLASS", default_value = "pangolin")]
    pub ingress_class: String,

    /// Pangolin API base URL
    #[arg(long, env = "PANGOLIN_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub pangolin_base_url: String,

    /// Secret holding the Pangolin API key
    #[arg(long, env = "PANGOLIN_API_KEY_SECRET", default_value = "pangolin-api-key")]
    pub pangolin_api_key_secret: String,

    /// Namespace of the API key secret
    #[arg(long, env = "PANGOLIN_API_KEY_NAMESPACE", default_value = "pangolin-system")]
    pub pangolin_api_key_namespace: String,

    /// Pangolin organization id
    #[arg(long, env = "PANGOLIN_ORG_ID", default_value = "")]
    pub pangolin_org_id: String,

    /// Nice id of the site that targets are attached to
    #[arg(long, env = "PANGOLIN_SITE_NICE_ID", default_value = "")]
    pub pangolin_site_nice_id: String,

    /// Prefix for generated Pangolin resource names
    #[arg(long, env = "RESOURCE_PREFIX", default_value = "pangolin-controller")]
    pub resource_prefix: String,

    /// Number of concurrent reconcile workers
    #[arg(long, env = "WORKERS", default_value_t = 4)]
    pub workers: usize,

    /// Port for the /healthz and /readyz endpoints
    #[arg(long, env = "HEALTH_PORT", default_value_t = 8081)]
    pub health_port: u16,

    /// Enable lease-based leader election
    #[arg(long, env = "LEADER_ELECT", default_value_t = false)]
    pub leader_elect: bool,

    /// Name of the leader election Lease
    #[arg(
        long,
        env = "LEADER_ELECTION_ID",
        default_value = "pangolin-ingress-controller.k8s.io"
    )]
    pub leader_election_id: String,

    /// Namespace of the leader election Lease
    #[arg(long, env = "POD_NAMESPACE")]
    pub leader_election_namespace: Option<String>,

    /// Holder identity for the Lease
    #[arg(long, env = "POD_NAME")]
    pub pod_name: Option<String>,

    /// Lease TTL in seconds
    #[arg(long, env = "LEADER_ELECTION_LEASE_DURATION", default_value_t = 15)]
    pub lease_duration_secs: u64,

    /// Lease renewal interval in seconds
    #[arg(long, env = "LEADER_ELECTION_RENEW_INTERVAL", default_value_t = 5)]
    pub renew_interval_secs: u64,
}

impl OperatorArgs {
    /// Reject configurations the operator cannot start with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pangolin_org_id.trim().is_empty() {
            return Err(ConfigError::MissingOrgId);
        }
        if self.pangolin_site_nice_id.trim().is_empty() {
            return Err(ConfigError::MissingSiteNiceId);
        }
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        Ok(())
    }
}

/// Annotations recognized on Ingress objects
pub mod annotations {
    /// Prefix shared by every annotation this controller reads or writes
    pub const PREFIX: &str = "pangolin.ingress.k8s.io/";

    /// Pangolin resource id, written by the controller
    pub const RESOURCE_ID: &str = "pangolin.ingress.k8s.io/resource-id";

    /// Legacy ingress class selector
    pub const INGRESS_CLASS: &str = "kubernetes.io/ingress.class";

    pub const SSO: &str = "pangolin.ingress.k8s.io/sso";
    pub const SSL: &str = "pangolin.ingress.k8s.io/ssl";
    pub const BLOCK_ACCESS: &str = "pangolin.ingress.k8s.io/block-access";
    pub const EMAIL_WHITELIST_ENABLED: &str = "pangolin.ingress.k8s.io/email-whitelist-enabled";
    pub const APPLY_RULES: &str = "pangolin.ingress.k8s.io/apply-rules";
    pub const ENABLED: &str = "pangolin.ingress.k8s.io/enabled";

    pub const STICKY_SESSION: &str = "pangolin.ingress.k8s.io/sticky-session";
    pub const TLS_SERVER_NAME: &str = "pangolin.ingress.k8s.io/tls-server-name";
    pub const SET_HOST_HEADER: &str = "pangolin.ingress.k8s.io/set-host-header";
    pub const HEADERS: &str = "pangolin.ingress.k8s.io/headers";
    pub const POST_AUTH_PATH: &str = "pangolin.ingress.k8s.io/post-auth-path";

    pub const HC_ENABLED: &str = "pangolin.ingress.k8s.io/healthcheck-enabled";
    pub const HC_PATH: &str = "pangolin.ingress.k8s.io/healthcheck-path";
    pub const HC_SCHEME: &str = "pangolin.ingress.k8s.io/healthcheck-scheme";
    pub const HC_MODE: &str = "pangolin.ingress.k8s.io/healthcheck-mode";
    pub const HC_HOSTNAME: &str = "pangolin.ingress.k8s.io/healthcheck-hostname";
    pub const HC_PORT: &str = "pangolin.ingress.k8s.io/healthcheck-port";
    pub const HC_INTERVAL: &str = "pangolin.ingress.k8s.io/healthcheck-interval";
    pub const HC_UNHEALTHY_INTERVAL: &str = "pangolin.ingress.k8s.io/healthcheck-unhealthy-interval";
    pub const HC_TIMEOUT: &str = "pangolin.ingress.k8s.io/healthcheck-timeout";
    pub const HC_HEADERS: &str = "pangolin.ingress.k8s.io/healthcheck-headers";
    pub const HC_FOLLOW_REDIRECTS: &str = "pangolin.ingress.k8s.io/healthcheck-follow-redirects";
    pub const HC_METHOD: &str = "pangolin.ingress.k8s.io/healthcheck-method";
    pub const HC_STATUS: &str = "pangolin.ingress.k8s.io/healthcheck-status";
    pub const HC_TLS_SERVER_NAME: &str = "pangolin.ingress.k8s.io/healthcheck-tls-server-name";
}

/// Finalizer guarding Pangolin resource cleanup
pub const FINALIZER: &str = "pangolin.ingress.k8s.io/finalizer";
