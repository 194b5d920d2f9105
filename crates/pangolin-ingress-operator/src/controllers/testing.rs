//! Fixtures shared by controller unit tests

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::cache::ResolutionCache;
use crate::client::MockPangolinClientTrait;
use crate::cluster::MockClusterClientTrait;
use crate::types::{Domain, Site};

use super::ControllerContext;

pub const SITE_NICE_ID: &str = "edge-1";
pub const SITE_ID: i64 = 7;
pub const PROXY_IP: &str = "203.0.113.7";

pub fn make_context(
    client: MockPangolinClientTrait,
    cluster: MockClusterClientTrait,
) -> ControllerContext {
    let client = Arc::new(client);
    ControllerContext {
        client: client.clone(),
        cluster: Arc::new(cluster),
        cache: Arc::new(ResolutionCache::new(client, SITE_NICE_ID.to_string())),
        ingress_class: "pangolin".to_string(),
        resource_prefix: "pangolin-controller".to_string(),
    }
}

pub fn example_domains() -> Vec<Domain> {
    vec![Domain {
        domain_id: "dom-1".to_string(),
        base_domain: "example.com".to_string(),
    }]
}

pub fn example_site() -> Site {
    Site {
        site_id: SITE_ID,
        nice_id: SITE_NICE_ID.to_string(),
        name: "edge".to_string(),
        proxy_ip: Some(PROXY_IP.to_string()),
        online: true,
        ..Default::default()
    }
}

pub fn http_path(path: &str, path_type: &str, service: &str, port: i32) -> HTTPIngressPath {
    HTTPIngressPath {
        path: Some(path.to_string()),
        path_type: path_type.to_string(),
        backend: IngressBackend {
            service: Some(IngressServiceBackend {
                name: service.to_string(),
                port: Some(ServiceBackendPort {
                    number: Some(port),
                    name: None,
                }),
            }),
            resource: None,
        },
    }
}

pub fn rule(host: &str, paths: Vec<HTTPIngressPath>) -> IngressRule {
    IngressRule {
        host: Some(host.to_string()),
        http: Some(HTTPIngressRuleValue { paths }),
    }
}

pub fn ingress_with(rules: Vec<IngressRule>, annotations: &[(&str, &str)]) -> Ingress {
    let annotations: BTreeMap<String, String> = annotations
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    Ingress {
        metadata: ObjectMeta {
            name: Some("web".to_string()),
            namespace: Some("default".to_string()),
            uid: Some("uid-1".to_string()),
            generation: Some(1),
            resource_version: Some("100".to_string()),
            annotations: Some(annotations),
            ..Default::default()
        },
        spec: Some(IngressSpec {
            ingress_class_name: Some("pangolin".to_string()),
            rules: Some(rules),
            ..Default::default()
        }),
        status: None,
    }
}

pub fn simple_ingress(annotations: &[(&str, &str)]) -> Ingress {
    ingress_with(
        vec![rule("app.example.com", vec![http_path("/", "Prefix", "web", 80)])],
        annotations,
    )
}

pub fn service(name: &str, ports: &[(&str, i32)]) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            ports: Some(
                ports
                    .iter()
                    .map(|(port_name, port)| ServicePort {
                        name: Some(port_name.to_string()),
                        port: *port,
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        status: None,
    }
}
