//! Annotation-driven settings
//!
//! All `pangolin.ingress.k8s.io/*` annotations are read in one pass into a
//! typed [`Settings`] value. Parsing fails open: a malformed value is treated
//! as if the annotation were absent, so a typo never blocks reconciliation.

use std::collections::BTreeMap;

use tracing::warn;

use crate::config::annotations;
use crate::types::{Header, TargetRequest, UpdateResourceRequest};

/// Resource-level proxy and access settings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceSettings {
    pub enabled: Option<bool>,
    pub sso: Option<bool>,
    pub ssl: Option<bool>,
    pub block_access: Option<bool>,
    pub email_whitelist_enabled: Option<bool>,
    pub apply_rules: Option<bool>,
    pub sticky_session: Option<bool>,
    pub tls_server_name: Option<String>,
    pub set_host_header: Option<String>,
    pub headers: Option<Vec<Header>>,
    pub post_auth_path: Option<String>,
}

/// Per-target health check settings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HealthCheckSettings {
    pub enabled: Option<bool>,
    pub path: Option<String>,
    pub scheme: Option<String>,
    pub mode: Option<String>,
    pub hostname: Option<String>,
    pub port: Option<i32>,
    pub interval: Option<i32>,
    pub unhealthy_interval: Option<i32>,
    pub timeout: Option<i32>,
    pub headers: Option<Vec<Header>>,
    pub follow_redirects: Option<bool>,
    pub method: Option<String>,
    pub status: Option<i32>,
    pub tls_server_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    pub resource: ResourceSettings,
    pub health_check: HealthCheckSettings,
}

impl Settings {
    /// Parse every recognized annotation
    pub fn extract(annotations: &BTreeMap<String, String>) -> Self {
        let resource = ResourceSettings {
            enabled: parse_bool(annotations, annotations::ENABLED),
            sso: parse_bool(annotations, annotations::SSO),
            ssl: parse_bool(annotations, annotations::SSL),
            block_access: parse_bool(annotations, annotations::BLOCK_ACCESS),
            email_whitelist_enabled: parse_bool(annotations, annotations::EMAIL_WHITELIST_ENABLED),
            apply_rules: parse_bool(annotations, annotations::APPLY_RULES),
            sticky_session: parse_bool(annotations, annotations::STICKY_SESSION),
            tls_server_name: parse_string(annotations, annotations::TLS_SERVER_NAME),
            set_host_header: parse_string(annotations, annotations::SET_HOST_HEADER),
            headers: parse_headers(annotations, annotations::HEADERS),
            post_auth_path: parse_string(annotations, annotations::POST_AUTH_PATH),
        };

        let health_check = HealthCheckSettings {
            enabled: parse_bool(annotations, annotations::HC_ENABLED),
            path: parse_string(annotations, annotations::HC_PATH),
            scheme: parse_string(annotations, annotations::HC_SCHEME),
            mode: parse_string(annotations, annotations::HC_MODE),
            hostname: parse_string(annotations, annotations::HC_HOSTNAME),
            port: parse_int(annotations, annotations::HC_PORT),
            interval: parse_int(annotations, annotations::HC_INTERVAL),
            unhealthy_interval: parse_int(annotations, annotations::HC_UNHEALTHY_INTERVAL),
            timeout: parse_int(annotations, annotations::HC_TIMEOUT),
            headers: parse_headers(annotations, annotations::HC_HEADERS),
            follow_redirects: parse_bool(annotations, annotations::HC_FOLLOW_REDIRECTS),
            method: parse_string(annotations, annotations::HC_METHOD),
            status: parse_int(annotations, annotations::HC_STATUS),
            tls_server_name: parse_string(annotations, annotations::HC_TLS_SERVER_NAME),
        };

        Self {
            resource,
            health_check,
        }
    }
}

impl ResourceSettings {
    /// Copy the settings onto an update payload, leaving unset fields absent
    pub fn apply_to(&self, req: &mut UpdateResourceRequest) {
        req.enabled = self.enabled;
        req.sso = self.sso;
        req.ssl = self.ssl;
        req.block_access = self.block_access;
        req.email_whitelist_enabled = self.email_whitelist_enabled;
        req.apply_rules = self.apply_rules;
        req.sticky_session = self.sticky_session;
        req.tls_server_name = self.tls_server_name.clone();
        req.set_host_header = self.set_host_header.clone();
        req.headers = self.headers.clone();
        req.post_auth_path = self.post_auth_path.clone();
    }
}

impl HealthCheckSettings {
    pub fn apply_to(&self, req: &mut TargetRequest) {
        req.hc_enabled = self.enabled;
        req.hc_path = self.path.clone();
        req.hc_scheme = self.scheme.clone();
        req.hc_mode = self.mode.clone();
        req.hc_hostname = self.hostname.clone();
        req.hc_port = self.port;
        req.hc_interval = self.interval;
        req.hc_unhealthy_interval = self.unhealthy_interval;
        req.hc_timeout = self.timeout;
        req.hc_headers = self.headers.clone();
        req.hc_follow_redirects = self.follow_redirects;
        req.hc_method = self.method.clone();
        req.hc_status = self.status;
        req.hc_tls_server_name = self.tls_server_name.clone();
    }
}

/// Boolean literals accepted in annotation values
fn parse_bool_literal(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

fn parse_bool(annotations: &BTreeMap<String, String>, key: &str) -> Option<bool> {
    let value = annotations.get(key).filter(|v| !v.is_empty())?;
    let parsed = parse_bool_literal(value);
    if parsed.is_none() {
        warn!(annotation = key, value = %value, "Ignoring invalid boolean annotation");
    }
    parsed
}

/// A present string annotation is kept even when empty
fn parse_string(annotations: &BTreeMap<String, String>, key: &str) -> Option<String> {
    annotations.get(key).cloned()
}

fn parse_int(annotations: &BTreeMap<String, String>, key: &str) -> Option<i32> {
    let value = annotations.get(key).filter(|v| !v.is_empty())?;
    match value.parse::<i32>() {
        Ok(n) => Some(n),
        Err(_) => {
            warn!(annotation = key, value = %value, "Ignoring invalid integer annotation");
            None
        }
    }
}

/// JSON array of `{"name": ..., "value": ...}` objects; an empty array is
/// treated as unset.
fn parse_headers(annotations: &BTreeMap<String, String>, key: &str) -> Option<Vec<Header>> {
    let value = annotations.get(key).filter(|v| !v.is_empty())?;
    match serde_json::from_str::<Vec<Header>>(value) {
        Ok(headers) if headers.is_empty() => None,
        Ok(headers) => Some(headers),
        Err(e) => {
            warn!(annotation = key, error = %e, "Ignoring malformed headers annotation");
            None
        }
    }
}
