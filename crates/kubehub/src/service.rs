//! Service annotations and naming shared by the tag syncer and load balancer reconciliation.

use ccm_core::{CcmError, CcmResult};
use k8s_openapi::api::core::v1::Service;

/// ID of the load balancer bound to a service.
pub const ANN_LOAD_BALANCER_ID: &str = "kubernetes.digitalocean.com/load-balancer-id";
/// Certificate used for TLS termination on the load balancer.
pub const ANN_CERTIFICATE_ID: &str = "service.beta.kubernetes.io/do-loadbalancer-certificate-id";
pub const ANN_PROTOCOL: &str = "service.beta.kubernetes.io/do-loadbalancer-protocol";
pub const ANN_TLS_PORTS: &str = "service.beta.kubernetes.io/do-loadbalancer-tls-ports";
pub const ANN_TLS_PASSTHROUGH: &str = "service.beta.kubernetes.io/do-loadbalancer-tls-passthrough";

pub const SERVICE_TYPE_LOAD_BALANCER: &str = "LoadBalancer";

pub const DEFAULT_TLS_PORT: i32 = 443;
const MAX_LOAD_BALANCER_NAME_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Http,
    Https,
    Http2,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Http => "http",
            Protocol::Https => "https",
            Protocol::Http2 => "http2",
        }
    }
}

impl std::str::FromStr for Protocol {
    type Err = CcmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Protocol::Tcp),
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            "http2" => Ok(Protocol::Http2),
            other => Err(CcmError::Validation(format!(
                "invalid protocol {:?} in annotation {:?}, expected tcp, http, https or http2",
                other, ANN_PROTOCOL
            ))),
        }
    }
}

/// Non-empty annotation value.
pub fn annotation<'a>(svc: &'a Service, key: &str) -> Option<&'a str> {
    svc.metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(key))
        .map(|v| v.as_str())
        .filter(|v| !v.is_empty())
}

pub fn load_balancer_id(svc: &Service) -> Option<&str> { annotation(svc, ANN_LOAD_BALANCER_ID) }

pub fn certificate_id(svc: &Service) -> Option<&str> { annotation(svc, ANN_CERTIFICATE_ID) }

pub fn protocol(svc: &Service) -> CcmResult<Protocol> {
    annotation(svc, ANN_PROTOCOL).map(str::parse).unwrap_or(Ok(Protocol::Tcp))
}

/// Ports terminating TLS. Defaults to 443 when the service carries a certificate.
pub fn tls_ports(svc: &Service) -> CcmResult<Vec<i32>> {
    let wants_tls = certificate_id(svc).is_some() || tls_passthrough(svc)?;
    match annotation(svc, ANN_TLS_PORTS) {
        Some(raw) => raw
            .split(',')
            .map(|p| {
                p.trim().parse::<i32>().map_err(|_| {
                    CcmError::Validation(format!("invalid port {:?} in annotation {:?}", p.trim(), ANN_TLS_PORTS))
                })
            })
            .collect(),
        None if wants_tls => Ok(vec![DEFAULT_TLS_PORT]),
        None => Ok(Vec::new()),
    }
}

pub fn tls_passthrough(svc: &Service) -> CcmResult<bool> {
    match annotation(svc, ANN_TLS_PASSTHROUGH) {
        None => Ok(false),
        Some("true") => Ok(true),
        Some("false") => Ok(false),
        Some(other) => Err(CcmError::Validation(format!(
            "invalid value {:?} in annotation {:?}, expected true or false",
            other, ANN_TLS_PASSTHROUGH
        ))),
    }
}

pub fn is_load_balancer(svc: &Service) -> bool {
    svc.spec.as_ref().and_then(|s| s.type_.as_deref()) == Some(SERVICE_TYPE_LOAD_BALANCER)
}

/// Name a load balancer gets when created for `svc`: `a` followed by the
/// dash-less UID, capped at 32 characters.
pub fn default_load_balancer_name(svc: &Service) -> String {
    let uid = svc.metadata.uid.as_deref().unwrap_or_default();
    let mut name: String = std::iter::once('a').chain(uid.chars().filter(|c| *c != '-')).collect();
    name.truncate(MAX_LOAD_BALANCER_NAME_LEN);
    name
}

/// `namespace/name` for logs and error messages.
pub fn service_key(svc: &Service) -> String {
    format!(
        "{}/{}",
        svc.metadata.namespace.as_deref().unwrap_or("default"),
        svc.metadata.name.as_deref().unwrap_or_default()
    )
}
