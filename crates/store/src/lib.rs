//! In-RAM droplet inventory mirrored from the cloud API.
//!
//! The inventory is kept as an immutable [`DropletIndex`] behind an
//! [`ArcSwap`]: readers load the current snapshot without blocking, writers
//! build the next snapshot and swap it in. Network calls are made before a
//! write begins, never while one is in progress.

#![forbid(unsafe_code)]

pub mod lookup;
pub mod zones;

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use ccm_core::{all_droplets, with_timeout, ApiError, CloudClient, Droplet, DropletId, ResourcesConfig};
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

pub use lookup::{droplet_by_id, droplet_by_name};
pub use zones::{Zone, Zones};

/// Droplets indexed by ID and by name. Both maps always hold the same droplets.
#[derive(Debug, Default, Clone)]
pub struct DropletIndex {
    by_id: FxHashMap<DropletId, Arc<Droplet>>,
    by_name: FxHashMap<String, Arc<Droplet>>,
}

impl DropletIndex {
    pub fn from_droplets(droplets: Vec<Droplet>) -> Self {
        let mut idx = Self::default();
        for d in droplets {
            idx.upsert(Arc::new(d));
        }
        idx
    }

    pub fn len(&self) -> usize { self.by_id.len() }
    pub fn is_empty(&self) -> bool { self.by_id.is_empty() }
    pub fn name_len(&self) -> usize { self.by_name.len() }

    pub fn get(&self, id: DropletId) -> Option<&Arc<Droplet>> { self.by_id.get(&id) }
    pub fn get_by_name(&self, name: &str) -> Option<&Arc<Droplet>> { self.by_name.get(name) }

    /// Insert or replace a droplet, dropping the name entry it had before a rename.
    fn upsert(&mut self, droplet: Arc<Droplet>) {
        if let Some(old) = self.by_id.get(&droplet.id) {
            if old.name != droplet.name {
                self.by_name.remove(&old.name);
            }
        }
        // a name now taken by a different droplet evicts that droplet entirely
        if let Some(prev) = self.by_name.get(&droplet.name) {
            if prev.id != droplet.id {
                warn!(name = %droplet.name, evicted = prev.id, kept = droplet.id, "duplicate droplet name; evicting older droplet");
                self.by_id.remove(&prev.id);
            }
        }
        self.by_name.insert(droplet.name.clone(), droplet.clone());
        self.by_id.insert(droplet.id, droplet);
    }

    /// Remove by ID using the name this index last saw for it.
    fn remove(&mut self, id: DropletId) -> Option<Arc<Droplet>> {
        let old = self.by_id.remove(&id)?;
        self.by_name.remove(&old.name);
        Some(old)
    }

    /// Droplets ordered by ID.
    pub fn sorted(&self) -> Vec<Arc<Droplet>> {
        let mut out: Vec<_> = self.by_id.values().cloned().collect();
        out.sort_unstable_by_key(|d| d.id);
        out
    }
}

/// Cloud resources known to the controller plus the cluster identity they are tracked for.
pub struct Resources {
    cluster_id: String,
    cluster_vpc_id: String,
    client: CloudClient,
    sync_timeout: Duration,
    index: ArcSwap<DropletIndex>,
}

impl Resources {
    pub fn new(config: &ResourcesConfig, client: CloudClient) -> Self {
        Self {
            cluster_id: config.cluster_id.clone(),
            cluster_vpc_id: config.cluster_vpc_id.clone(),
            client,
            sync_timeout: config.sync_resources_timeout,
            index: ArcSwap::from_pointee(DropletIndex::default()),
        }
    }

    pub fn cluster_id(&self) -> &str { &self.cluster_id }
    pub fn cluster_vpc_id(&self) -> &str { &self.cluster_vpc_id }
    pub fn client(&self) -> &CloudClient { &self.client }

    /// Current snapshot of the index.
    pub fn snapshot(&self) -> Arc<DropletIndex> { self.index.load_full() }

    /// All cached droplets ordered by ID.
    pub fn droplets(&self) -> Vec<Arc<Droplet>> { self.index.load().sorted() }

    pub fn droplet_by_id(&self, id: DropletId) -> Option<Arc<Droplet>> { self.index.load().get(id).cloned() }

    pub fn droplet_by_name(&self, name: &str) -> Option<Arc<Droplet>> { self.index.load().get_by_name(name).cloned() }

    /// Replace the whole inventory in one swap.
    pub fn update_droplets(&self, droplets: Vec<Droplet>) {
        let next = DropletIndex::from_droplets(droplets);
        let n = next.len();
        self.index.store(Arc::new(next));
        metrics::gauge!("ccm_droplet_cache_size", n as f64);
    }

    /// Refresh a single droplet. A 404 removes it from the inventory; any
    /// other failure is returned and the inventory is left as it was.
    pub async fn sync_droplet(&self, id: DropletId) -> Result<(), ApiError> {
        match with_timeout(self.sync_timeout, self.client.droplets.get(id)).await {
            Ok(droplet) => {
                let droplet = Arc::new(droplet);
                self.index.rcu(|cur| {
                    let mut next = DropletIndex::clone(cur);
                    next.upsert(droplet.clone());
                    next
                });
                debug!(droplet_id = id, "droplet synced");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                let mut removed = None;
                self.index.rcu(|cur| {
                    let mut next = DropletIndex::clone(cur);
                    removed = next.remove(id);
                    next
                });
                if let Some(old) = removed {
                    info!(droplet_id = id, name = %old.name, "droplet gone; removed from cache");
                }
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Re-list all droplets and replace the inventory. On failure the previous
    /// inventory stays in place.
    pub async fn sync_droplets(&self) -> Result<(), ApiError> {
        let droplets = with_timeout(self.sync_timeout, all_droplets(&self.client)).await?;
        let n = droplets.len();
        self.update_droplets(droplets);
        debug!(droplets = n, "droplet inventory replaced");
        Ok(())
    }
}

impl std::fmt::Debug for Resources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resources")
            .field("cluster_id", &self.cluster_id)
            .field("cluster_vpc_id", &self.cluster_vpc_id)
            .field("droplets", &self.index.load().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(id: DropletId, name: &str) -> Droplet { Droplet::new(id, name) }

    #[test]
    fn upsert_rename_drops_stale_name() {
        let mut idx = DropletIndex::from_droplets(vec![d(1, "one")]);
        idx.upsert(Arc::new(d(1, "uno")));
        assert_eq!(idx.len(), 1);
        assert_eq!(idx.name_len(), 1);
        assert!(idx.get_by_name("one").is_none());
        assert_eq!(idx.get_by_name("uno").map(|d| d.id), Some(1));
    }

    #[test]
    fn name_collision_keeps_indexes_aligned() {
        let mut idx = DropletIndex::from_droplets(vec![d(1, "node"), d(2, "other")]);
        idx.upsert(Arc::new(d(3, "node")));
        assert_eq!(idx.len(), idx.name_len());
        assert!(idx.get(1).is_none());
        assert_eq!(idx.get_by_name("node").map(|d| d.id), Some(3));
    }

    #[test]
    fn remove_uses_cached_name() {
        let mut idx = DropletIndex::from_droplets(vec![d(1, "one"), d(2, "two")]);
        let gone = idx.remove(1).expect("present");
        assert_eq!(gone.name, "one");
        assert!(idx.get_by_name("one").is_none());
        assert!(idx.remove(1).is_none());
        assert_eq!((idx.len(), idx.name_len()), (1, 1));
    }

    #[test]
    fn sorted_orders_by_id() {
        let idx = DropletIndex::from_droplets(vec![d(3, "c"), d(1, "a"), d(2, "b")]);
        let ids: Vec<_> = idx.sorted().iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
