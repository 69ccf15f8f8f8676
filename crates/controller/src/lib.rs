//! Background reconciliation: droplet inventory refresh and cluster tagging,
//! each on its own timer.

#![forbid(unsafe_code)]

pub mod syncer;
pub mod tags;

use std::sync::Arc;

use anyhow::{Context, Result};
use ccm_core::ResourcesConfig;
use ccm_kubehub::ServiceLister;
use ccm_store::Resources;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub use syncer::{run_ticker, SyncFn, Syncer, TickerSyncer};
pub use tags::{sync_tags, tag_resources_for};

pub const RESOURCES_SYNCER: &str = "resources syncer";
pub const TAGS_SYNCER: &str = "tags syncer";

pub struct ResourcesController {
    config: ResourcesConfig,
    resources: Arc<Resources>,
    services: Arc<dyn ServiceLister>,
    syncer: Arc<dyn Syncer>,
}

impl ResourcesController {
    pub fn new(config: ResourcesConfig, resources: Arc<Resources>, services: Arc<dyn ServiceLister>) -> Self {
        Self { config, resources, services, syncer: Arc::new(TickerSyncer) }
    }

    /// Replace the loop driver, e.g. with one that records each start.
    pub fn with_syncer(mut self, syncer: Arc<dyn Syncer>) -> Self {
        self.syncer = syncer;
        self
    }

    pub fn resources(&self) -> &Arc<Resources> { &self.resources }

    /// Start the sync loops. The tag loop needs a cluster ID and is not
    /// started without one. Every loop ends when `stop` is cancelled.
    pub fn run(self: &Arc<Self>, stop: CancellationToken) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(2);

        let me = self.clone();
        handles.push(self.syncer.sync(
            RESOURCES_SYNCER,
            self.config.sync_resources_period,
            stop.clone(),
            Box::new(move || {
                let me = me.clone();
                async move { me.sync_resources().await }.boxed()
            }),
        ));

        if !self.config.has_cluster_id() {
            info!("no cluster ID configured; skipping cluster dependent syncers");
            return handles;
        }

        let me = self.clone();
        handles.push(self.syncer.sync(
            TAGS_SYNCER,
            self.config.sync_tags_period,
            stop,
            Box::new(move || {
                let me = me.clone();
                async move { me.sync_tags().await }.boxed()
            }),
        ));
        handles
    }

    pub async fn sync_resources(&self) -> Result<()> {
        self.resources.sync_droplets().await.context("failed to sync droplet resources")?;
        debug!(droplets = self.resources.snapshot().len(), "synced droplet resources");
        Ok(())
    }

    pub async fn sync_tags(&self) -> Result<()> {
        sync_tags(self.resources.client(), self.services.as_ref(), &self.config.cluster_id, self.config.sync_tags_timeout)
            .await
    }
}
