//! Domain and site resolution caches
//!
//! Both caches are shared by every worker. Lookups take a shared read lock;
//! on a miss the remote list call runs with no lock held and only the merge
//! step takes the write lock. Concurrent misses may each issue a list call;
//! merges are idempotent.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::client::{ClientError, PangolinClientTrait};
use crate::types::Site;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("No Pangolin domain configured for {0}")]
    DomainNotFound(String),
    #[error("Pangolin site identifier is not configured")]
    SiteNotConfigured,
    #[error("Pangolin client error: {0}")]
    Client(#[from] ClientError),
}

/// Base domain name to domain id map
pub struct DomainCache {
    client: Arc<dyn PangolinClientTrait>,
    domains: RwLock<HashMap<String, String>>,
}

impl DomainCache {
    pub fn new(client: Arc<dyn PangolinClientTrait>) -> Self {
        Self {
            client,
            domains: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve a base domain to its domain id, refreshing from the API on miss
    pub async fn resolve(&self, base_domain: &str) -> Result<String, CacheError> {
        if let Some(id) = self.domains.read().await.get(base_domain) {
            return Ok(id.clone());
        }

        debug!(base_domain, "Domain cache miss, listing domains");
        let listed = self.client.list_domains().await?;

        let mut domains = self.domains.write().await;
        for domain in listed {
            domains.insert(domain.base_domain, domain.domain_id);
        }

        domains
            .get(base_domain)
            .cloned()
            .ok_or_else(|| CacheError::DomainNotFound(base_domain.to_string()))
    }

    /// Number of cached domains
    pub async fn len(&self) -> usize {
        self.domains.read().await.len()
    }
}

/// Descriptor of the single configured site, fetched once
pub struct SiteCache {
    client: Arc<dyn PangolinClientTrait>,
    nice_id: String,
    site: RwLock<Option<Site>>,
}

impl SiteCache {
    pub fn new(client: Arc<dyn PangolinClientTrait>, nice_id: String) -> Self {
        Self {
            client,
            nice_id,
            site: RwLock::new(None),
        }
    }

    pub fn nice_id(&self) -> &str {
        &self.nice_id
    }

    pub async fn get(&self) -> Result<Site, CacheError> {
        if self.nice_id.is_empty() {
            return Err(CacheError::SiteNotConfigured);
        }

        if let Some(site) = self.site.read().await.as_ref() {
            return Ok(site.clone());
        }

        let site = self.client.get_site_by_nice_id(&self.nice_id).await?;
        info!(
            site_id = site.site_id,
            nice_id = %site.nice_id,
            "Resolved Pangolin site"
        );

        *self.site.write().await = Some(site.clone());
        Ok(site)
    }
}

/// Caches shared by all reconcile workers
pub struct ResolutionCache {
    pub domains: DomainCache,
    pub site: SiteCache,
}

impl ResolutionCache {
    pub fn new(client: Arc<dyn PangolinClientTrait>, site_nice_id: String) -> Self {
        Self {
            domains: DomainCache::new(client.clone()),
            site: SiteCache::new(client, site_nice_id),
        }
    }
}
