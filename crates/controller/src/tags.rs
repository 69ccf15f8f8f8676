//! Keeps the cluster tag on every load balancer that belongs to a cluster service.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use ccm_core::{
    all_load_balancers, build_k8s_tag, with_timeout, CcmError, CcmResult, CloudClient, LoadBalancer,
    TagCreateRequest, TagResource, TagResourcesRequest,
};
use ccm_kubehub::{default_load_balancer_name, is_load_balancer, load_balancer_id, ServiceLister};
use k8s_openapi::api::core::v1::Service;
use rustc_hash::FxHashMap;
use tracing::{debug, info};

/// Load balancers to tag: the ID annotation when set, else the LB found under
/// the service's default name. Services matching neither are skipped.
pub fn tag_resources_for(services: &[Arc<Service>], lbs: &[LoadBalancer]) -> Vec<TagResource> {
    let by_name: FxHashMap<&str, &str> = lbs.iter().map(|lb| (lb.name.as_str(), lb.id.as_str())).collect();
    services
        .iter()
        .filter(|svc| is_load_balancer(svc))
        .filter_map(|svc| {
            load_balancer_id(svc)
                .map(str::to_string)
                .or_else(|| by_name.get(default_load_balancer_name(svc).as_str()).map(|id| id.to_string()))
        })
        .map(|id| TagResource::load_balancer(&id))
        .collect()
}

async fn tag_resources(client: &CloudClient, tag: &str, req: &TagResourcesRequest, timeout: Duration) -> CcmResult<()> {
    with_timeout(timeout, client.tags.tag_resources(tag, req)).await.map_err(|e| {
        if e.is_not_found() {
            CcmError::TagMissing { tag: tag.to_string() }
        } else {
            CcmError::Remote(e)
        }
    })
}

fn ids(req: &TagResourcesRequest) -> Vec<&str> { req.resources.iter().map(|r| r.id.as_str()).collect() }

/// One tagging pass. A missing tag is created and tagging retried once;
/// every other failure ends the pass.
pub async fn sync_tags(client: &CloudClient, services: &dyn ServiceLister, cluster_id: &str, timeout: Duration) -> Result<()> {
    let lbs = with_timeout(timeout, all_load_balancers(client)).await.context("failed to list load balancers")?;
    let resources = tag_resources_for(&services.list(), &lbs);
    if resources.is_empty() {
        debug!("no load balancers to tag");
        return Ok(());
    }

    let tag = build_k8s_tag(cluster_id);
    let req = TagResourcesRequest { resources };
    match tag_resources(client, &tag, &req, timeout).await {
        Ok(()) => {}
        Err(CcmError::TagMissing { .. }) => {
            info!(tag = %tag, "tag does not exist; creating it");
            with_timeout(timeout, client.tags.create(&TagCreateRequest { name: tag.clone() }))
                .await
                .with_context(|| format!("failed to create tag {:?}", tag))?;
            metrics::counter!("ccm_tag_created_total", 1u64);
            tag_resources(client, &tag, &req, timeout)
                .await
                .with_context(|| format!("failed to tag load balancers {:?} with tag {:?}", ids(&req), tag))?;
        }
        Err(e) => {
            return Err(e).with_context(|| format!("failed to tag load balancers {:?} with tag {:?}", ids(&req), tag));
        }
    }
    info!(tag = %tag, load_balancers = req.resources.len(), "tagged load balancers");
    Ok(())
}
