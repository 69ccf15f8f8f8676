//! Load balancer reconciliation for services of type `LoadBalancer`.
//!
//! Each pass locates the live load balancer, settles which certificate it
//! should serve, creates or updates it and waits for it to become active.
//! Failures are returned to the caller; nothing here retries.

#![forbid(unsafe_code)]

pub mod certificates;
pub mod request;
pub mod waiter;

use std::collections::BTreeMap;
use std::sync::Arc;

use ccm_core::{all_load_balancers, ApiError, CcmResult, CloudClient, LoadBalancer, LoadBalancerConfig};
use ccm_kubehub::{
    certificate_id, default_load_balancer_name, load_balancer_id, service_key, ServiceUpdater, ANN_CERTIFICATE_ID,
    ANN_LOAD_BALANCER_ID,
};
use ccm_store::Resources;
use k8s_openapi::api::core::v1::{LoadBalancerIngress, LoadBalancerStatus, Node, Service};
use tracing::{debug, info, warn};

pub use certificates::{certificate_state, decide, resolve_certificate, CertRef, CertState};
pub use request::{build_request, droplet_ids, forwarding_rules};
pub use waiter::wait_active;

pub struct LoadBalancers {
    resources: Arc<Resources>,
    services: Arc<dyn ServiceUpdater>,
    config: LoadBalancerConfig,
}

fn ingress_status(lb: &LoadBalancer) -> LoadBalancerStatus {
    LoadBalancerStatus {
        ingress: Some(vec![LoadBalancerIngress { ip: Some(lb.ip.clone()), ..Default::default() }]),
    }
}

impl LoadBalancers {
    pub fn new(resources: Arc<Resources>, services: Arc<dyn ServiceUpdater>, config: LoadBalancerConfig) -> Self {
        Self { resources, services, config }
    }

    fn client(&self) -> &CloudClient { self.resources.client() }

    /// Live load balancer of `svc`: the one named by its ID annotation, else
    /// the one carrying its default name.
    pub async fn locate(&self, svc: &Service) -> CcmResult<Option<LoadBalancer>> {
        if let Some(id) = load_balancer_id(svc) {
            match self.client().load_balancers.get(id).await {
                Ok(lb) => return Ok(Some(lb)),
                Err(e) if e.is_not_found() => {
                    warn!(service = %service_key(svc), lb_id = id, "annotated load balancer not found; looking up by name")
                }
                Err(e) => return Err(e.into()),
            }
        }
        let name = default_load_balancer_name(svc);
        Ok(all_load_balancers(self.client()).await?.into_iter().find(|lb| lb.name == name))
    }

    pub async fn get_load_balancer(&self, svc: &Service) -> CcmResult<Option<LoadBalancerStatus>> {
        Ok(self.locate(svc).await?.as_ref().map(ingress_status))
    }

    pub async fn ensure_load_balancer(&self, svc: &Service, nodes: &[Node]) -> CcmResult<LoadBalancerStatus> {
        let lb = self.reconcile(svc, nodes, self.locate(svc).await?).await?;
        Ok(ingress_status(&lb))
    }

    /// Like [`ensure_load_balancer`](Self::ensure_load_balancer) but never creates.
    pub async fn update_load_balancer(&self, svc: &Service, nodes: &[Node]) -> CcmResult<()> {
        let live = self.locate(svc).await?.ok_or_else(|| {
            ApiError::not_found(format!("no load balancer for service {}", service_key(svc)))
        })?;
        self.reconcile(svc, nodes, Some(live)).await?;
        Ok(())
    }

    /// Missing load balancers count as deleted.
    pub async fn ensure_load_balancer_deleted(&self, svc: &Service) -> CcmResult<()> {
        let lb = match self.locate(svc).await? {
            Some(lb) => lb,
            None => {
                debug!(service = %service_key(svc), "no load balancer to delete");
                return Ok(());
            }
        };
        match self.client().load_balancers.delete(&lb.id).await {
            Ok(()) => {
                info!(service = %service_key(svc), lb_id = %lb.id, "load balancer deleted");
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn reconcile(&self, svc: &Service, nodes: &[Node], live: Option<LoadBalancer>) -> CcmResult<LoadBalancer> {
        let declared = certificate_id(svc);
        let cert = resolve_certificate(
            self.client(),
            declared,
            live.as_ref().and_then(LoadBalancer::certificate_id),
        )
        .await?;

        let mut svc = svc.clone();
        if let Some(id) = cert.as_deref().filter(|id| Some(*id) != declared) {
            info!(service = %service_key(&svc), from = ?declared, to = id, "recording resolved certificate");
            self.record(&mut svc, ANN_CERTIFICATE_ID, id).await?;
        }

        let req = build_request(&self.resources, &self.config.region, &svc, nodes, cert.as_deref())?;
        let lb = match &live {
            Some(lb) => {
                debug!(service = %service_key(&svc), lb_id = %lb.id, "updating load balancer");
                self.client().load_balancers.update(&lb.id, &req).await?
            }
            None => {
                info!(service = %service_key(&svc), name = %req.name, "creating load balancer");
                self.client().load_balancers.create(&req).await?
            }
        };
        let lb = wait_active(self.client(), &lb.id, self.config.active_timeout, self.config.active_check_tick).await?;

        if load_balancer_id(&svc) != Some(lb.id.as_str()) {
            self.record(&mut svc, ANN_LOAD_BALANCER_ID, &lb.id).await?;
        }
        Ok(lb)
    }

    /// Persist one annotation and mirror it on the local copy.
    async fn record(&self, svc: &mut Service, key: &str, value: &str) -> CcmResult<()> {
        let patch = BTreeMap::from([(key.to_string(), value.to_string())]);
        self.services.patch_annotations(svc, &patch).await?;
        svc.metadata.annotations.get_or_insert_with(BTreeMap::new).insert(key.to_string(), value.to_string());
        Ok(())
    }
}
