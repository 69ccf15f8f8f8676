//! Arbitration between the certificate a service declares and the one its
//! load balancer currently serves.
//!
//! [`decide`] is the whole policy and takes only resolved facts. Lookups live
//! in [`resolve_certificate`], which feeds it.

use ccm_core::{CcmError, CcmResult, CertificateType, CloudClient};
use ccm_kubehub::ANN_CERTIFICATE_ID;
use tracing::debug;

/// What a certificate ID resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertState {
    Live(CertificateType),
    /// The store answered 404 for this ID.
    Dangling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CertRef<'a> {
    pub id: &'a str,
    pub state: CertState,
}

impl<'a> CertRef<'a> {
    pub fn new(id: &'a str, state: CertState) -> Self { Self { id, state } }
}

fn dangling(id: &str) -> CcmError {
    CcmError::DanglingReference { annotation: ANN_CERTIFICATE_ID, id: id.to_string() }
}

/// Certificate to record on both the service and the load balancer, given a
/// load balancer that already serves `lb`.
///
/// A working certificate beats a dangling one. Between two working ones a
/// managed certificate on the load balancer wins; otherwise the service wins.
/// A service that declares nothing keeps whatever working certificate the
/// load balancer has.
pub fn decide(service: Option<CertRef<'_>>, lb: CertRef<'_>) -> CcmResult<String> {
    use CertState::{Dangling, Live};

    let svc = match service {
        Some(svc) if svc.id != lb.id => svc,
        _ => {
            return match lb.state {
                Live(_) => Ok(lb.id.to_string()),
                Dangling => Err(dangling(lb.id)),
            }
        }
    };
    match (lb.state, svc.state) {
        (Live(t), _) if t.is_managed() => Ok(lb.id.to_string()),
        (Live(_), Live(_)) => Ok(svc.id.to_string()),
        (Live(_), Dangling) => Err(dangling(svc.id)),
        (Dangling, Live(_)) => Ok(svc.id.to_string()),
        (Dangling, Dangling) => Err(dangling(svc.id)),
    }
}

pub async fn certificate_state(client: &CloudClient, id: &str) -> CcmResult<CertState> {
    match client.certificates.get(id).await {
        Ok(cert) => Ok(CertState::Live(cert.cert_type)),
        Err(e) if e.is_not_found() => Ok(CertState::Dangling),
        Err(e) => Err(CcmError::Remote(e)),
    }
}

/// Resolve the certificate for a reconciliation pass. Without a certificate
/// on the load balancer the service's declaration is adopted as is and no
/// lookup is made.
pub async fn resolve_certificate(
    client: &CloudClient,
    service_cert: Option<&str>,
    lb_cert: Option<&str>,
) -> CcmResult<Option<String>> {
    let lb_cert = match lb_cert {
        Some(id) => id,
        None => return Ok(service_cert.map(str::to_string)),
    };
    let lb = CertRef::new(lb_cert, certificate_state(client, lb_cert).await?);
    let svc = match service_cert {
        Some(id) if id == lb_cert => Some(CertRef::new(id, lb.state)),
        Some(id) => Some(CertRef::new(id, certificate_state(client, id).await?)),
        None => None,
    };

    let out = decide(svc, lb);
    let outcome = match &out {
        Ok(id) if id == lb_cert => "kept_load_balancer",
        Ok(_) => "adopted_service",
        Err(_) => "dangling",
    };
    metrics::counter!("ccm_certificate_resolutions_total", 1u64, "outcome" => outcome);
    debug!(service_cert = ?service_cert, lb_cert, outcome, "certificate resolved");
    out.map(Some)
}
