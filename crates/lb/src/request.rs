//! Translating a service and its nodes into a load balancer request.

use ccm_core::{
    build_k8s_tag, droplet_id_from_provider_id, CcmError, CcmResult, DropletId, ForwardingRule, LoadBalancerRequest,
};
use ccm_kubehub::{
    default_load_balancer_name, protocol, service_key, tls_passthrough, tls_ports, Protocol, DEFAULT_TLS_PORT,
};
use ccm_store::Resources;
use k8s_openapi::api::core::v1::{Node, Service};
use tracing::warn;

/// One rule per service port. TLS ports terminate with `cert` or pass TLS
/// through; every other port forwards plain traffic.
pub fn forwarding_rules(svc: &Service, cert: Option<&str>) -> CcmResult<Vec<ForwardingRule>> {
    let proto = protocol(svc)?;
    let passthrough = tls_passthrough(svc)?;
    let mut tls = tls_ports(svc)?;
    if tls.is_empty() && cert.is_some() {
        tls.push(DEFAULT_TLS_PORT);
    }
    if cert.is_some() && passthrough {
        return Err(CcmError::Validation(
            "either a certificate ID should be set or TLS passthrough enabled, not both".into(),
        ));
    }
    if matches!(proto, Protocol::Https | Protocol::Http2) && cert.is_none() && !passthrough {
        return Err(CcmError::Validation(format!(
            "protocol {} requires a certificate ID or TLS passthrough",
            proto.as_str()
        )));
    }

    let ports = svc.spec.as_ref().and_then(|s| s.ports.as_deref()).unwrap_or_default();
    ports
        .iter()
        .map(|p| {
            let node_port = p.node_port.unwrap_or_default();
            if tls.contains(&p.port) {
                tls_rule(proto, p.port, node_port, cert, passthrough)
            } else {
                let plain = if proto == Protocol::Tcp { Protocol::Tcp } else { Protocol::Http };
                Ok(ForwardingRule {
                    entry_protocol: plain.as_str().into(),
                    entry_port: p.port,
                    target_protocol: plain.as_str().into(),
                    target_port: node_port,
                    ..Default::default()
                })
            }
        })
        .collect()
}

fn tls_rule(proto: Protocol, port: i32, node_port: i32, cert: Option<&str>, passthrough: bool) -> CcmResult<ForwardingRule> {
    if cert.is_none() && !passthrough {
        return Err(CcmError::Validation(format!(
            "TLS port {} needs a certificate ID or TLS passthrough",
            port
        )));
    }
    let entry = if proto == Protocol::Http2 { Protocol::Http2 } else { Protocol::Https };
    let target = if passthrough { Protocol::Https } else { Protocol::Http };
    Ok(ForwardingRule {
        entry_protocol: entry.as_str().into(),
        entry_port: port,
        target_protocol: target.as_str().into(),
        target_port: node_port,
        certificate_id: cert.unwrap_or_default().to_string(),
        tls_passthrough: passthrough,
    })
}

/// Droplets behind `nodes`: the provider ID when set, else the cached droplet
/// of the same name. Nodes matching neither are skipped.
pub fn droplet_ids(resources: &Resources, nodes: &[Node]) -> CcmResult<Vec<DropletId>> {
    let mut ids = Vec::with_capacity(nodes.len());
    for node in nodes {
        let provider_id = node.spec.as_ref().and_then(|s| s.provider_id.as_deref()).unwrap_or_default();
        if !provider_id.is_empty() {
            ids.push(droplet_id_from_provider_id(provider_id)?);
            continue;
        }
        let name = node.metadata.name.as_deref().unwrap_or_default();
        match resources.droplet_by_name(name) {
            Some(d) => ids.push(d.id),
            None => warn!(node = name, "no droplet found for node; leaving it out of the load balancer"),
        }
    }
    Ok(ids)
}

pub fn build_request(
    resources: &Resources,
    region: &str,
    svc: &Service,
    nodes: &[Node],
    cert: Option<&str>,
) -> CcmResult<LoadBalancerRequest> {
    let forwarding_rules = forwarding_rules(svc, cert)
        .map_err(|e| match e {
            CcmError::Validation(msg) => CcmError::Validation(format!("service {}: {}", service_key(svc), msg)),
            other => other,
        })?;
    let tags = if resources.cluster_id().is_empty() { Vec::new() } else { vec![build_k8s_tag(resources.cluster_id())] };
    Ok(LoadBalancerRequest {
        name: default_load_balancer_name(svc),
        region: region.to_string(),
        forwarding_rules,
        droplet_ids: droplet_ids(resources, nodes)?,
        tags,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccm_kubehub::{ANN_PROTOCOL, ANN_TLS_PASSTHROUGH, ANN_TLS_PORTS};
    use k8s_openapi::api::core::v1::{ServicePort, ServiceSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn svc(annotations: &[(&str, &str)], ports: &[(i32, i32)]) -> Service {
        Service {
            metadata: ObjectMeta {
                name: Some("web".into()),
                annotations: Some(annotations.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                ports: Some(
                    ports
                        .iter()
                        .map(|(p, n)| ServicePort { port: *p, node_port: Some(*n), ..Default::default() })
                        .collect(),
                ),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn plain_ports_forward_tcp_by_default() {
        let rules = forwarding_rules(&svc(&[], &[(80, 30080)]), None).expect("rules");
        assert_eq!(rules.len(), 1);
        assert_eq!((rules[0].entry_protocol.as_str(), rules[0].target_protocol.as_str()), ("tcp", "tcp"));
        assert_eq!((rules[0].entry_port, rules[0].target_port), (80, 30080));
    }

    #[test]
    fn tls_port_carries_certificate() {
        let s = svc(&[(ANN_PROTOCOL, "http")], &[(80, 30080), (443, 30443)]);
        let rules = forwarding_rules(&s, Some("cert-1")).expect("rules");
        assert_eq!(rules[0].entry_protocol, "http");
        assert_eq!(rules[1].entry_protocol, "https");
        assert_eq!(rules[1].target_protocol, "http");
        assert_eq!(rules[1].certificate_id, "cert-1");
    }

    #[test]
    fn http2_and_passthrough() {
        let h2 = forwarding_rules(&svc(&[(ANN_PROTOCOL, "http2")], &[(443, 1)]), Some("c")).expect("rules");
        assert_eq!(h2[0].entry_protocol, "http2");
        let pt = forwarding_rules(&svc(&[(ANN_TLS_PASSTHROUGH, "true")], &[(443, 1)]), None).expect("rules");
        assert!(pt[0].tls_passthrough);
        assert_eq!((pt[0].entry_protocol.as_str(), pt[0].target_protocol.as_str()), ("https", "https"));
        assert!(pt[0].certificate_id.is_empty());
    }

    #[test]
    fn invalid_tls_setups_are_rejected() {
        let no_cert = svc(&[(ANN_TLS_PORTS, "443")], &[(443, 1)]);
        assert!(matches!(forwarding_rules(&no_cert, None), Err(CcmError::Validation(_))));
        let both = svc(&[(ANN_TLS_PASSTHROUGH, "true")], &[(443, 1)]);
        assert!(matches!(forwarding_rules(&both, Some("c")), Err(CcmError::Validation(_))));
        let https = svc(&[(ANN_PROTOCOL, "https")], &[(443, 1)]);
        assert!(matches!(forwarding_rules(&https, None), Err(CcmError::Validation(_))));
    }
}
