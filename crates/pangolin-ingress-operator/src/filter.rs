//! Event relevance filter
//!
//! The watcher reports every write to an Ingress, including the status and
//! annotation writes this controller makes itself. Only spec changes
//! (generation bumps), the start of deletion, and changes to recognized
//! annotations other than the resource id are worth a reconcile.

use std::collections::{BTreeMap, HashMap};

use k8s_openapi::api::networking::v1::Ingress;

use crate::config::annotations;

/// What the filter remembers about the last admitted version of an object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSnapshot {
    generation: Option<i64>,
    deleting: bool,
    /// Recognized annotations only, excluding the resource id
    annotations: BTreeMap<String, String>,
}

impl ObjectSnapshot {
    pub fn of(ingress: &Ingress) -> Self {
        let annotations = ingress
            .metadata
            .annotations
            .iter()
            .flatten()
            .filter(|(key, _)| is_recognized(key))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Self {
            generation: ingress.metadata.generation,
            deleting: ingress.metadata.deletion_timestamp.is_some(),
            annotations,
        }
    }

    /// Whether moving from `self` to `next` warrants a reconcile
    pub fn is_relevant_change(&self, next: &ObjectSnapshot) -> bool {
        self.generation != next.generation
            || (!self.deleting && next.deleting)
            || self.annotations != next.annotations
    }
}

/// Annotation keys whose changes trigger a reconcile
fn is_recognized(key: &str) -> bool {
    key.starts_with(annotations::PREFIX) && key != annotations::RESOURCE_ID
}

/// Last-seen snapshots keyed by object key
#[derive(Debug, Default)]
pub struct EventFilter<K> {
    seen: HashMap<K, ObjectSnapshot>,
}

impl<K: std::hash::Hash + Eq> EventFilter<K> {
    pub fn new() -> Self {
        Self {
            seen: HashMap::new(),
        }
    }

    /// Record the object and report whether it should be reconciled
    ///
    /// Objects seen for the first time are always admitted.
    pub fn admit(&mut self, key: K, ingress: &Ingress) -> bool {
        let next = ObjectSnapshot::of(ingress);
        match self.seen.get(&key) {
            Some(previous) if !previous.is_relevant_change(&next) => {
                self.seen.insert(key, next);
                false
            }
            _ => {
                self.seen.insert(key, next);
                true
            }
        }
    }

    /// Drop the snapshot for a deleted object
    pub fn forget(&mut self, key: &K) {
        self.seen.remove(key);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
