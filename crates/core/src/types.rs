//! Cloud-side resources as returned by the provider API.

use serde::{Deserialize, Serialize};

pub type DropletId = u64;

/// Status reported by a load balancer that finished provisioning.
pub const LOAD_BALANCER_ACTIVE: &str = "active";

/// Resource type of load balancers in tag requests.
pub const LOAD_BALANCER_RESOURCE_TYPE: &str = "load_balancer";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub name: String,
}

impl Region {
    pub fn from_slug(slug: &str) -> Self { Self { slug: slug.to_string(), name: String::new() } }
}

/// A compute node. Provider fields this crate does not interpret are kept in
/// `extra` and serialized back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Droplet {
    pub id: DropletId,
    pub name: String,
    #[serde(default)]
    pub region: Region,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Droplet {
    pub fn new(id: DropletId, name: &str) -> Self {
        Self { id, name: name.to_string(), ..Default::default() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardingRule {
    pub entry_protocol: String,
    pub entry_port: i32,
    pub target_protocol: String,
    pub target_port: i32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub certificate_id: String,
    #[serde(default)]
    pub tls_passthrough: bool,
}

impl ForwardingRule {
    /// Whether the entry side terminates TLS on the load balancer.
    pub fn terminates_tls(&self) -> bool {
        matches!(self.entry_protocol.as_str(), "https" | "http2")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancer {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub region: Region,
    #[serde(default)]
    pub forwarding_rules: Vec<ForwardingRule>,
    #[serde(default)]
    pub droplet_ids: Vec<DropletId>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl LoadBalancer {
    /// Certificate attached to the TLS-terminating forwarding rule, if any.
    pub fn certificate_id(&self) -> Option<&str> {
        self.forwarding_rules
            .iter()
            .find(|r| r.terminates_tls())
            .map(|r| r.certificate_id.as_str())
            .filter(|id| !id.is_empty())
    }

    pub fn is_active(&self) -> bool { self.status == LOAD_BALANCER_ACTIVE }
}

/// Desired state sent on load balancer create and update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancerRequest {
    pub name: String,
    pub region: String,
    pub forwarding_rules: Vec<ForwardingRule>,
    pub droplet_ids: Vec<DropletId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Kind of certificate. Let's Encrypt certificates are issued and renewed by
/// the provider; custom ones are uploaded by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateType {
    LetsEncrypt,
    Custom,
}

impl CertificateType {
    pub fn is_managed(self) -> bool { matches!(self, CertificateType::LetsEncrypt) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub cert_type: CertificateType,
    #[serde(default)]
    pub state: String,
}

impl Certificate {
    pub fn new(id: &str, cert_type: CertificateType) -> Self {
        Self { id: id.to_string(), name: String::new(), cert_type, state: String::new() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCreateRequest {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TagResource {
    #[serde(rename = "resource_id")]
    pub id: String,
    #[serde(rename = "resource_type")]
    pub resource_type: String,
}

impl TagResource {
    pub fn load_balancer(id: &str) -> Self {
        Self { id: id.to_string(), resource_type: LOAD_BALANCER_RESOURCE_TYPE.to_string() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagResourcesRequest {
    pub resources: Vec<TagResource>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(entry: &str, cert: &str) -> ForwardingRule {
        ForwardingRule {
            entry_protocol: entry.into(),
            entry_port: 443,
            target_protocol: "http".into(),
            target_port: 30000,
            certificate_id: cert.into(),
            tls_passthrough: false,
        }
    }

    #[test]
    fn certificate_id_comes_from_tls_rule() {
        let lb = LoadBalancer {
            forwarding_rules: vec![rule("http", ""), rule("https", "cert-1")],
            ..Default::default()
        };
        assert_eq!(lb.certificate_id(), Some("cert-1"));
    }

    #[test]
    fn certificate_id_absent_without_tls_rule() {
        let lb = LoadBalancer { forwarding_rules: vec![rule("tcp", "")], ..Default::default() };
        assert_eq!(lb.certificate_id(), None);
        let passthrough = LoadBalancer { forwarding_rules: vec![rule("https", "")], ..Default::default() };
        assert_eq!(passthrough.certificate_id(), None);
    }

    #[test]
    fn droplet_keeps_unknown_provider_fields() {
        let raw = serde_json::json!({
            "id": 7,
            "name": "node-7",
            "region": { "slug": "nyc1", "name": "New York 1" },
            "memory": 2048,
            "vcpus": 2,
        });
        let d: Droplet = serde_json::from_value(raw).expect("droplet");
        assert_eq!(d.id, 7);
        assert_eq!(d.region.slug, "nyc1");
        assert_eq!(d.extra.get("memory"), Some(&serde_json::json!(2048)));
        let back = serde_json::to_value(&d).expect("serialize");
        assert_eq!(back["vcpus"], serde_json::json!(2));
    }

    #[test]
    fn certificate_type_uses_provider_names() {
        let c: Certificate = serde_json::from_value(serde_json::json!({ "id": "c", "type": "lets_encrypt" })).expect("cert");
        assert_eq!(c.cert_type, CertificateType::LetsEncrypt);
        assert!(c.cert_type.is_managed());
        assert!(!CertificateType::Custom.is_managed());
    }
}
