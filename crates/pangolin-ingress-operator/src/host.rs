//! Host name splitting
//!
//! A host is split into a subdomain and a base domain by taking the last two
//! dot-separated labels as the base domain. Multi-label public suffixes such
//! as `co.uk` are not recognized: `app.example.co.uk` yields subdomain
//! `app.example` and base domain `co.uk`.

/// Split `host` into `(subdomain, base_domain)`
///
/// An empty base domain means the host has no registrable domain.
pub fn parse_host(host: &str) -> (String, String) {
    let host = host.trim();
    if host.is_empty() {
        return (String::new(), String::new());
    }

    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 2 {
        return (host.to_string(), String::new());
    }

    let split = labels.len() - 2;
    let domain = labels[split..].join(".");
    let subdomain = labels[..split].join(".");
    (subdomain, domain)
}
