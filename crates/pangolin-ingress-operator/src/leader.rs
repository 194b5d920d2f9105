//! Leader election for running multiple controller replicas safely.
//!
//! Uses the Kubernetes Lease API via `kube-leader-election` so that only one
//! replica reconciles at a time. Standby replicas block in
//! [`LeaderElection::acquire`]; the leader renews in the background and the
//! renewal task completes once leadership is gone, which ends the process.

use std::time::Duration;

use kube::Client;
use kube_leader_election::{LeaseLock, LeaseLockParams, LeaseLockResult};
use tokio::task::JoinHandle;
use tracing::{error, info, trace, warn};

use crate::config::{ConfigError, OperatorArgs};

/// Maximum consecutive renewal failures before giving up the lease.
const MAX_RENEWAL_FAILURES: u32 = 3;

#[derive(Debug, Clone)]
pub struct LeaderElectionConfig {
    lease_name: String,
    namespace: String,
    holder_id: String,
    lease_duration: Duration,
    renew_interval: Duration,
}

impl LeaderElectionConfig {
    /// Build the configuration from process arguments.
    ///
    /// Returns `Ok(None)` when leader election is disabled.
    pub fn from_args(args: &OperatorArgs) -> Result<Option<Self>, ConfigError> {
        if !args.leader_elect {
            return Ok(None);
        }

        let namespace = args
            .leader_election_namespace
            .clone()
            .filter(|ns| !ns.is_empty())
            .ok_or(ConfigError::MissingLeaseNamespace)?;
        let holder_id = args
            .pod_name
            .clone()
            .filter(|name| !name.is_empty())
            .ok_or(ConfigError::MissingHolderId)?;

        let lease_duration = Duration::from_secs(args.lease_duration_secs);
        let renew_interval = Duration::from_secs(args.renew_interval_secs);
        if renew_interval >= lease_duration {
            return Err(ConfigError::LeaseTiming {
                renew: renew_interval,
                duration: lease_duration,
            });
        }

        Ok(Some(Self {
            lease_name: args.leader_election_id.clone(),
            namespace,
            holder_id,
            lease_duration,
            renew_interval,
        }))
    }

    pub fn lease_name(&self) -> &str {
        &self.lease_name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn holder_id(&self) -> &str {
        &self.holder_id
    }
}

/// Why the renewal task stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeadershipLoss {
    /// Another replica now holds the lease
    Preempted { new_holder: String },
    /// Renewal failed [`MAX_RENEWAL_FAILURES`] times in a row
    RenewalFailed { last_error: String },
}

impl std::fmt::Display for LeadershipLoss {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LeadershipLoss::Preempted { new_holder } => {
                write!(f, "lost leadership to {}", new_holder)
            }
            LeadershipLoss::RenewalFailed { last_error } => write!(
                f,
                "lease renewal failed {} times: {}",
                MAX_RENEWAL_FAILURES, last_error
            ),
        }
    }
}

fn holder_of(result: &LeaseLockResult) -> &str {
    result
        .lease
        .as_ref()
        .and_then(|l| l.spec.as_ref())
        .and_then(|s| s.holder_identity.as_deref())
        .unwrap_or("unknown")
}

/// Tracks consecutive renewal failures
#[derive(Debug, Default)]
struct RenewalFailures {
    consecutive: u32,
}

impl RenewalFailures {
    /// Record a failure; returns true once the limit is reached
    fn record(&mut self) -> bool {
        self.consecutive += 1;
        self.consecutive >= MAX_RENEWAL_FAILURES
    }

    fn reset(&mut self) -> u32 {
        std::mem::take(&mut self.consecutive)
    }
}

/// Leader election manager using the Kubernetes Lease API.
pub struct LeaderElection {
    lease_lock: LeaseLock,
    renew_interval: Duration,
}

impl LeaderElection {
    pub fn new(client: Client, config: &LeaderElectionConfig) -> Self {
        let lease_lock = LeaseLock::new(
            client,
            config.namespace(),
            LeaseLockParams {
                holder_id: config.holder_id().to_string(),
                lease_name: config.lease_name().to_string(),
                lease_ttl: config.lease_duration,
            },
        );

        Self {
            lease_lock,
            renew_interval: config.renew_interval,
        }
    }

    /// Block until this replica holds the lease.
    pub async fn acquire(&self) {
        info!("Attempting to acquire leadership");

        loop {
            match self.lease_lock.try_acquire_or_renew().await {
                Ok(result) if result.acquired_lease => {
                    info!(holder = %holder_of(&result), "Leadership acquired");
                    return;
                }
                Ok(result) => {
                    info!(current_holder = %holder_of(&result), "Another replica is leader, waiting");
                }
                Err(e) => {
                    warn!(error = %e, "Failed to check leadership, retrying");
                }
            }

            tokio::time::sleep(self.renew_interval).await;
        }
    }

    /// Renew the lease periodically in a background task.
    ///
    /// The task only completes when leadership is lost.
    pub fn spawn_renewal_task(self) -> JoinHandle<LeadershipLoss> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.renew_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut failures = RenewalFailures::default();

            info!(
                interval_secs = self.renew_interval.as_secs(),
                max_failures = MAX_RENEWAL_FAILURES,
                "Starting lease renewal loop"
            );

            loop {
                interval.tick().await;

                match self.lease_lock.try_acquire_or_renew().await {
                    Ok(result) if result.acquired_lease => {
                        let previous = failures.reset();
                        if previous > 0 {
                            info!(previous_failures = previous, "Lease renewed after transient failures");
                        }
                        trace!("Lease renewed");
                    }
                    Ok(result) => {
                        let new_holder = holder_of(&result).to_string();
                        error!(new_holder = %new_holder, "Lost leadership to another replica");
                        return LeadershipLoss::Preempted { new_holder };
                    }
                    Err(e) => {
                        if failures.record() {
                            error!(error = %e, "Lease renewal failed repeatedly, giving up leadership");
                            return LeadershipLoss::RenewalFailed {
                                last_error: e.to_string(),
                            };
                        }
                        warn!(
                            error = %e,
                            attempt = failures.consecutive,
                            max_attempts = MAX_RENEWAL_FAILURES,
                            "Transient lease renewal failure, will retry"
                        );
                    }
                }
            }
        })
    }
}
