//! De-duplicating work queue and worker pool
//!
//! Keys wait in FIFO order and appear at most once. A key that is added
//! while a worker is processing it is marked dirty and handed out again only
//! after that worker calls [`WorkQueue::done`], so one key is never processed
//! by two workers at the same time.

use std::collections::{HashSet, VecDeque};
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::controllers::retry::{backoff_delay, compute_backoff, ErrorKind, RetryAction, RetryTracker};

struct QueueState<K> {
    queue: VecDeque<K>,
    /// Keys waiting to be processed (queued, or re-added while in flight)
    dirty: HashSet<K>,
    /// Keys currently held by a worker
    processing: HashSet<K>,
    shutting_down: bool,
}

struct Inner<K> {
    state: Mutex<QueueState<K>>,
    notify: Notify,
    failures: RetryTracker<K>,
}

/// Shared handle to a work queue
pub struct WorkQueue<K> {
    inner: Arc<Inner<K>>,
}

impl<K> Clone for WorkQueue<K> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K> Default for WorkQueue<K>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> WorkQueue<K>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState {
                    queue: VecDeque::new(),
                    dirty: HashSet::new(),
                    processing: HashSet::new(),
                    shutting_down: false,
                }),
                notify: Notify::new(),
                failures: RetryTracker::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState<K>> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    /// Enqueue a key unless it is already waiting
    pub fn add(&self, key: K) {
        let mut state = self.state();
        if state.shutting_down || state.dirty.contains(&key) {
            return;
        }
        state.dirty.insert(key.clone());
        if state.processing.contains(&key) {
            // Re-queued by done()
            return;
        }
        state.queue.push_back(key);
        drop(state);
        self.inner.notify.notify_one();
    }

    /// Enqueue a key after `delay`
    pub fn add_after(&self, key: K, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key);
        });
    }

    /// Record a failure for `key` and enqueue it after the backoff delay
    pub fn add_rate_limited(&self, key: K) {
        let attempt = self.inner.failures.increment(&key);
        self.add_after(key, backoff_delay(attempt));
    }

    /// Clear the failure history of `key`
    pub fn forget(&self, key: &K) {
        self.inner.failures.reset(key);
    }

    /// Consecutive failures recorded for `key`
    pub fn num_requeues(&self, key: &K) -> u32 {
        self.inner.failures.get(key)
    }

    /// Wait for the next key; `None` once the queue is shut down
    pub async fn get(&self) -> Option<K> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before checking so an add() between the check and the
            // await is not missed
            notified.as_mut().enable();

            {
                let mut state = self.state();
                if state.shutting_down {
                    return None;
                }
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
            }

            notified.await;
        }
    }

    /// Release a key handed out by [`get`](Self::get)
    pub fn done(&self, key: &K) {
        let mut state = self.state();
        state.processing.remove(key);
        if state.dirty.contains(key) && !state.shutting_down {
            state.queue.push_back(key.clone());
            drop(state);
            self.inner.notify.notify_one();
        }
    }

    /// Stop handing out keys and wake every waiting worker
    pub fn shutdown(&self) {
        self.state().shutting_down = true;
        self.inner.notify.notify_waiters();
        info!("Work queue shutting down");
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state().shutting_down
    }

    /// Number of keys waiting to be handed out
    pub fn len(&self) -> usize {
        self.state().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Run `workers` workers against `queue` until it shuts down
///
/// Successful keys have their failure history cleared. Transient failures
/// are re-added after an exponential backoff; permanent failures wait for
/// the next event on the key.
pub async fn run_workers<K, F, Fut>(queue: WorkQueue<K>, workers: usize, handler: F)
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    F: Fn(K) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ErrorKind>> + Send + 'static,
{
    let handler = Arc::new(handler);

    let handles: Vec<_> = (0..workers.max(1))
        .map(|worker| {
            let queue = queue.clone();
            let handler = handler.clone();
            tokio::spawn(async move {
                debug!(worker, "Worker started");
                while let Some(key) = queue.get().await {
                    match handler(key.clone()).await {
                        Ok(()) => queue.forget(&key),
                        Err(kind) => {
                            let attempt = queue.inner.failures.increment(&key);
                            match compute_backoff(attempt, kind) {
                                RetryAction::Requeue(delay) => queue.add_after(key.clone(), delay),
                                RetryAction::AwaitChange => queue.forget(&key),
                            }
                        }
                    }
                    queue.done(&key);
                }
                debug!(worker, "Worker stopped");
            })
        })
        .collect();

    for result in join_all(handles).await {
        if let Err(e) = result {
            warn!(error = %e, "Worker task failed");
        }
    }
}
