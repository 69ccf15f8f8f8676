//! Cloud controller core: resource types, cloud API traits and errors.

#![forbid(unsafe_code)]

pub mod cloud;
pub mod config;
pub mod error;
pub mod types;

pub use cloud::{
    all_droplets, all_load_balancers, collect_pages, with_timeout, CertificatesService, CloudClient,
    DropletsService, ListOptions, LoadBalancersService, Page, TagsService,
};
pub use config::{LoadBalancerConfig, ResourcesConfig};
pub use error::{ApiError, CcmError, CcmResult};
pub use types::*;

/// Prefix of every cluster ownership tag.
pub const K8S_TAG_PREFIX: &str = "k8s:";

/// Provider ID scheme used by nodes of this cloud.
pub const PROVIDER_ID_PREFIX: &str = "digitalocean://";

/// Tag marking resources owned by the cluster with the given ID.
pub fn build_k8s_tag(cluster_id: &str) -> String { format!("{}{}", K8S_TAG_PREFIX, cluster_id) }

/// Parse a node provider ID (`digitalocean://123`) into a droplet ID.
pub fn droplet_id_from_provider_id(provider_id: &str) -> CcmResult<DropletId> {
    if provider_id.is_empty() {
        return Err(CcmError::Validation("provider ID cannot be empty".into()));
    }
    let raw = provider_id
        .strip_prefix(PROVIDER_ID_PREFIX)
        .ok_or_else(|| CcmError::Validation(format!("provider ID {:?} is missing prefix {:?}", provider_id, PROVIDER_ID_PREFIX)))?;
    if raw.is_empty() {
        return Err(CcmError::Validation(format!("provider ID {:?} has no droplet ID", provider_id)));
    }
    raw.parse::<DropletId>()
        .map_err(|e| CcmError::Validation(format!("failed to parse droplet ID from {:?}: {}", provider_id, e)))
}
