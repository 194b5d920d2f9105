//! Pangolin API wire types
//!
//! Request payloads serialize with camelCase keys and omit unset optional
//! fields so that an absent setting never overwrites the server-side value.

use serde::{Deserialize, Serialize};

/// Proxy resource (a routable host plus access settings)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub resource_id: i64,
    #[serde(default)]
    pub resource_guid: String,
    #[serde(default)]
    pub org_id: String,
    #[serde(default)]
    pub nice_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub subdomain: Option<String>,
    #[serde(default)]
    pub full_domain: Option<String>,
    #[serde(default)]
    pub domain_id: Option<String>,
    #[serde(default)]
    pub http: bool,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub sticky_session: bool,
}

/// Backend endpoint attached to a resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub target_id: i64,
    pub site_id: i64,
    pub ip: String,
    #[serde(default)]
    pub method: Option<String>,
    pub port: i32,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub path_match_type: Option<String>,
    #[serde(default)]
    pub health_status: Option<String>,
}

impl Target {
    /// Whether this target has the given (site, address, port) identity
    pub fn has_identity(&self, identity: &TargetIdentity) -> bool {
        self.site_id == identity.site_id && self.ip == identity.address && self.port == identity.port
    }
}

/// Matching key for targets: the server assigns target ids, so a target is
/// recognised by where it points rather than by id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetIdentity {
    pub site_id: i64,
    pub address: String,
    pub port: i32,
}

/// Proxy deployment location
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    pub site_id: i64,
    #[serde(default)]
    pub nice_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub proxy_ip: Option<String>,
    #[serde(default)]
    pub online: bool,
    #[serde(default, rename = "type")]
    pub site_type: Option<String>,
}

impl Site {
    /// Reachable proxy address, if the site reports a non-empty one
    pub fn reachable_address(&self) -> Option<&str> {
        self.proxy_ip.as_deref().filter(|ip| !ip.is_empty())
    }
}

/// Base domain registered with the organization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Domain {
    pub domain_id: String,
    pub base_domain: String,
}

/// Custom header name/value pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// Payload for `PUT /v1/org/{org}/resource`
///
/// The create endpoint accepts only a subset of resource settings; the rest
/// are applied by a follow-up [`UpdateResourceRequest`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateResourceRequest {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub subdomain: String,
    pub http: bool,
    pub protocol: String,
    pub domain_id: String,
    #[serde(skip_serializing_if = "is_false")]
    pub sticky_session: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_auth_path: Option<String>,
}

/// Payload for `POST /v1/resource/{id}`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResourceRequest {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub subdomain: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub domain_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sso: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_access: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_whitelist_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apply_rules: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sticky_session: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_server_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub set_host_header: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<Vec<Header>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_auth_path: Option<String>,
}

/// Payload for creating (`PUT /v1/resource/{id}/target`) and updating
/// (`POST /v1/target/{id}`) a target
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRequest {
    pub site_id: i64,
    pub ip: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub method: String,
    pub port: i32,
    pub enabled: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub path_match_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hc_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hc_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hc_scheme: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hc_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hc_hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hc_port: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hc_interval: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hc_unhealthy_interval: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hc_timeout: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hc_headers: Option<Vec<Header>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hc_follow_redirects: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hc_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hc_status: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hc_tls_server_name: Option<String>,
}

impl TargetRequest {
    pub fn identity(&self) -> TargetIdentity {
        TargetIdentity {
            site_id: self.site_id,
            address: self.ip.clone(),
            port: self.port,
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}
