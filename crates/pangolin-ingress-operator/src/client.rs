//! Pangolin REST API client
//!
//! Provides a typed interface over the Pangolin integration API.
//!
//! # API Endpoints Used
//!
//! - `PUT /v1/org/{org}/resource` - Create resource
//! - `GET|POST|DELETE /v1/resource/{id}` - Get, update, delete resource
//! - `GET /v1/org/{org}/resources` - List resources
//! - `PUT /v1/resource/{id}/target` - Create target
//! - `GET /v1/resource/{id}/targets` - List targets
//! - `POST|DELETE /v1/target/{id}` - Update, delete target
//! - `GET /v1/org/{org}/domains`, `GET /v1/org/{org}/domain/{id}` - Domains
//! - `GET /v1/site/{id}`, `GET /v1/org/{org}/site/{niceId}`,
//!   `GET /v1/org/{org}/sites` - Sites
//!
//! Every response wraps its payload in a `{"data": ...}` envelope.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::types::{
    CreateResourceRequest, Domain, Resource, Site, Target, TargetRequest, UpdateResourceRequest,
};

/// Per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Trait for Pangolin API operations
///
/// This trait allows for mocking in tests while keeping the concrete
/// implementation for production use.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PangolinClientTrait: Send + Sync {
    /// Create a resource in the configured organization
    async fn create_resource(&self, req: &CreateResourceRequest) -> Result<Resource, ClientError>;

    async fn get_resource(&self, resource_id: i64) -> Result<Resource, ClientError>;

    async fn list_resources(&self) -> Result<Vec<Resource>, ClientError>;

    /// Apply the full settings set to an existing resource
    async fn update_resource(
        &self,
        resource_id: i64,
        req: &UpdateResourceRequest,
    ) -> Result<Resource, ClientError>;

    async fn delete_resource(&self, resource_id: i64) -> Result<(), ClientError>;

    async fn create_target(
        &self,
        resource_id: i64,
        req: &TargetRequest,
    ) -> Result<Target, ClientError>;

    async fn list_targets(&self, resource_id: i64) -> Result<Vec<Target>, ClientError>;

    async fn update_target(&self, target_id: i64, req: &TargetRequest)
        -> Result<Target, ClientError>;

    async fn delete_target(&self, target_id: i64) -> Result<(), ClientError>;

    /// List every domain registered with the organization
    async fn list_domains(&self) -> Result<Vec<Domain>, ClientError>;

    async fn get_domain(&self, domain_id: &str) -> Result<Domain, ClientError>;

    async fn get_site(&self, site_id: i64) -> Result<Site, ClientError>;

    /// Look up a site by its human-readable nice id
    async fn get_site_by_nice_id(&self, nice_id: &str) -> Result<Site, ClientError>;

    async fn list_sites(&self) -> Result<Vec<Site>, ClientError>;
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Conflict: {message}")]
    Conflict { message: String },
    #[error("API request failed with status {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Response missing data")]
    MissingData,
    #[error("Client configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Whether the server rejected the request as a duplicate (HTTP 409)
    pub fn is_conflict(&self) -> bool {
        matches!(self, ClientError::Conflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }
}

/// Standard Pangolin response wrapper
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ResourceList {
    #[serde(default)]
    resources: Vec<Resource>,
}

#[derive(Debug, Deserialize)]
struct TargetList {
    #[serde(default)]
    targets: Vec<Target>,
}

#[derive(Debug, Deserialize)]
struct DomainList {
    #[serde(default)]
    domains: Vec<Domain>,
}

#[derive(Debug, Deserialize)]
struct SiteList {
    #[serde(default)]
    sites: Vec<Site>,
}

/// Client for the Pangolin REST API
#[derive(Debug)]
pub struct PangolinClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    org_id: String,
}

impl PangolinClient {
    /// Create a new client
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or if the API key
    /// contains invalid header characters.
    pub fn new(base_url: &str, api_key: String, org_id: String) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {}", e)))?;

        // Validate API key can be used in headers (fail early)
        HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|_| ClientError::Config("API key contains invalid characters".to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            org_id,
        })
    }

    pub fn org_id(&self) -> &str {
        &self.org_id
    }

    /// Build authorization headers for API requests
    fn auth_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        // Key was validated in constructor
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", self.api_key)) {
            headers.insert(AUTHORIZATION, value);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    /// Send a request and return the raw body of a successful response
    async fn send<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Vec<u8>, ClientError>
    where
        B: Serialize + ?Sized,
    {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self
            .client
            .request(method.clone(), &url)
            .headers(self.auth_headers());

        if let Some(body) = body {
            let payload = serde_json::to_vec(body)?;
            debug!(
                method = %method,
                path = %path,
                body = %String::from_utf8_lossy(&payload),
                "Pangolin API request"
            );
            builder = builder.body(payload);
        }

        let response = builder.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        if status.is_success() {
            return Ok(bytes.to_vec());
        }

        let message = String::from_utf8_lossy(&bytes).to_string();
        Err(match status {
            StatusCode::CONFLICT => ClientError::Conflict { message },
            StatusCode::NOT_FOUND => ClientError::NotFound(message),
            _ => ClientError::Api {
                status: status.as_u16(),
                message,
            },
        })
    }

    /// Send a request and decode the `data` member of the response envelope
    async fn request<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let bytes = self.send(method, path, body).await?;
        let envelope: Envelope<T> = serde_json::from_slice(&bytes)?;
        envelope.data.ok_or(ClientError::MissingData)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.request::<(), T>(Method::GET, path, None).await
    }
}

#[async_trait]
impl PangolinClientTrait for PangolinClient {
    #[instrument(skip(self, req), fields(name = %req.name))]
    async fn create_resource(&self, req: &CreateResourceRequest) -> Result<Resource, ClientError> {
        let path = format!("/v1/org/{}/resource", self.org_id);
        let resource: Resource = self.request(Method::PUT, &path, Some(req)).await?;
        debug!(resource_id = resource.resource_id, "Created resource");
        Ok(resource)
    }

    #[instrument(skip(self))]
    async fn get_resource(&self, resource_id: i64) -> Result<Resource, ClientError> {
        self.get(&format!("/v1/resource/{}", resource_id)).await
    }

    #[instrument(skip(self))]
    async fn list_resources(&self) -> Result<Vec<Resource>, ClientError> {
        let list: ResourceList = self
            .get(&format!("/v1/org/{}/resources", self.org_id))
            .await?;
        Ok(list.resources)
    }

    #[instrument(skip(self, req))]
    async fn update_resource(
        &self,
        resource_id: i64,
        req: &UpdateResourceRequest,
    ) -> Result<Resource, ClientError> {
        let path = format!("/v1/resource/{}", resource_id);
        self.request(Method::POST, &path, Some(req)).await
    }

    #[instrument(skip(self))]
    async fn delete_resource(&self, resource_id: i64) -> Result<(), ClientError> {
        let path = format!("/v1/resource/{}", resource_id);
        self.send::<()>(Method::DELETE, &path, None).await?;
        debug!(resource_id, "Deleted resource");
        Ok(())
    }

    #[instrument(skip(self, req), fields(ip = %req.ip, port = req.port))]
    async fn create_target(
        &self,
        resource_id: i64,
        req: &TargetRequest,
    ) -> Result<Target, ClientError> {
        let path = format!("/v1/resource/{}/target", resource_id);
        self.request(Method::PUT, &path, Some(req)).await
    }

    #[instrument(skip(self))]
    async fn list_targets(&self, resource_id: i64) -> Result<Vec<Target>, ClientError> {
        let list: TargetList = self
            .get(&format!("/v1/resource/{}/targets", resource_id))
            .await?;
        Ok(list.targets)
    }

    #[instrument(skip(self, req))]
    async fn update_target(
        &self,
        target_id: i64,
        req: &TargetRequest,
    ) -> Result<Target, ClientError> {
        let path = format!("/v1/target/{}", target_id);
        self.request(Method::POST, &path, Some(req)).await
    }

    #[instrument(skip(self))]
    async fn delete_target(&self, target_id: i64) -> Result<(), ClientError> {
        let path = format!("/v1/target/{}", target_id);
        self.send::<()>(Method::DELETE, &path, None).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_domains(&self) -> Result<Vec<Domain>, ClientError> {
        let list: DomainList = self
            .get(&format!("/v1/org/{}/domains", self.org_id))
            .await?;
        Ok(list.domains)
    }

    #[instrument(skip(self))]
    async fn get_domain(&self, domain_id: &str) -> Result<Domain, ClientError> {
        self.get(&format!("/v1/org/{}/domain/{}", self.org_id, domain_id))
            .await
    }

    #[instrument(skip(self))]
    async fn get_site(&self, site_id: i64) -> Result<Site, ClientError> {
        self.get(&format!("/v1/site/{}", site_id)).await
    }

    #[instrument(skip(self))]
    async fn get_site_by_nice_id(&self, nice_id: &str) -> Result<Site, ClientError> {
        self.get(&format!("/v1/org/{}/site/{}", self.org_id, nice_id))
            .await
    }

    #[instrument(skip(self))]
    async fn list_sites(&self) -> Result<Vec<Site>, ClientError> {
        let list: SiteList = self.get(&format!("/v1/org/{}/sites", self.org_id)).await?;
        Ok(list.sites)
    }
}
