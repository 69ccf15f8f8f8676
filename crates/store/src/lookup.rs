//! Droplet lookups that go to the cloud API instead of the cache.

use ccm_core::{all_droplets, CcmError, CcmResult, CloudClient, Droplet, DropletId};

pub async fn droplet_by_id(client: &CloudClient, id: DropletId) -> CcmResult<Droplet> {
    client.droplets.get(id).await.map_err(|e| {
        if e.is_not_found() {
            CcmError::InstanceNotFound(format!("droplet {}", id))
        } else {
            CcmError::Remote(e)
        }
    })
}

/// First droplet named `name`. Walks every page of the droplet listing.
pub async fn droplet_by_name(client: &CloudClient, name: &str) -> CcmResult<Droplet> {
    all_droplets(client)
        .await?
        .into_iter()
        .find(|d| d.name == name)
        .ok_or_else(|| CcmError::InstanceNotFound(format!("droplet named {:?}", name)))
}
