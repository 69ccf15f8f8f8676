//! Region lookups for the orchestrator's zone queries.

use ccm_core::{droplet_id_from_provider_id, CcmResult, CloudClient};

use crate::lookup::{droplet_by_id, droplet_by_name};

/// Only the region is populated; this cloud has no finer failure domain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Zone {
    pub region: String,
}

#[derive(Debug, Clone)]
pub struct Zones {
    client: CloudClient,
    region: String,
}

impl Zones {
    pub fn new(client: CloudClient, region: &str) -> Self { Self { client, region: region.to_string() } }

    /// Region the controller itself runs in.
    pub fn get_zone(&self) -> Zone { Zone { region: self.region.clone() } }

    pub async fn zone_by_provider_id(&self, provider_id: &str) -> CcmResult<Zone> {
        let id = droplet_id_from_provider_id(provider_id)?;
        let d = droplet_by_id(&self.client, id).await?;
        Ok(Zone { region: d.region.slug })
    }

    pub async fn zone_by_node_name(&self, node_name: &str) -> CcmResult<Zone> {
        let d = droplet_by_name(&self.client, node_name).await?;
        Ok(Zone { region: d.region.slug })
    }
}
