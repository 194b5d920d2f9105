//! Retry policy with exponential backoff for reconcile errors
//!
//! Errors are classified as transient or permanent. Transient errors are
//! retried with exponential backoff and never abandoned; permanent errors wait
//! for the next change to the object.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, warn};

/// Base delay for exponential backoff (seconds)
const BASE_DELAY_SECS: u64 = 5;

/// Maximum delay between retries (1 hour)
const MAX_DELAY_SECS: u64 = 3600;

/// Tracks consecutive failures per key
#[derive(Debug)]
pub struct RetryTracker<K> {
    attempts: Mutex<HashMap<K, u32>>,
}

impl<K: Eq + Hash + Clone> Default for RetryTracker<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone> RetryTracker<K> {
    pub fn new() -> Self {
        Self {
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Increment the failure count for a key and return the new count
    pub fn increment(&self, key: &K) -> u32 {
        let mut attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        let count = attempts.entry(key.clone()).or_insert(0);
        *count += 1;
        *count
    }

    /// Reset the failure count (call on successful reconciliation)
    pub fn reset(&self, key: &K) {
        let mut attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        attempts.remove(key);
    }

    pub fn get(&self, key: &K) -> u32 {
        let attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        attempts.get(key).copied().unwrap_or(0)
    }
}

/// Error classification for retry behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network issues, API unavailability, unregistered domains
    Transient,
    /// Errors that will not recover without a change to the object
    Permanent,
}

/// What to do with a key after a failed reconcile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    Requeue(Duration),
    AwaitChange,
}

/// Exponential backoff: 5s, 10s, 20s, 40s, ... up to 1 hour
pub fn backoff_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(32);
    let delay_secs = BASE_DELAY_SECS.saturating_mul(2u64.saturating_pow(exponent));
    Duration::from_secs(delay_secs.min(MAX_DELAY_SECS))
}

/// Determine retry action based on error kind and attempt count
pub fn compute_backoff(attempt: u32, kind: ErrorKind) -> RetryAction {
    match kind {
        ErrorKind::Transient => {
            let delay = backoff_delay(attempt);
            debug!(
                attempt,
                delay_secs = delay.as_secs(),
                "Scheduling retry with exponential backoff"
            );
            RetryAction::Requeue(delay)
        }
        ErrorKind::Permanent => {
            warn!("Permanent error, waiting for object change");
            RetryAction::AwaitChange
        }
    }
}
