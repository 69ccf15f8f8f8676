//! Kubernetes side of the cloud controller: read-only service listing and
//! annotation write-back.

#![forbid(unsafe_code)]

pub mod service;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use ccm_core::{CcmError, CcmResult};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Service;
use kube::{
    api::{Api, Patch, PatchParams},
    runtime::{reflector, reflector::Store, watcher, WatchStreamExt},
    Client,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use service::*;

/// Read-only view of the services currently declared in the cluster.
pub trait ServiceLister: Send + Sync {
    fn list(&self) -> Vec<Arc<Service>>;
}

/// Persists annotation changes back onto a service object.
#[async_trait::async_trait]
pub trait ServiceUpdater: Send + Sync {
    /// Merge `annotations` into the service's annotations.
    async fn patch_annotations(&self, svc: &Service, annotations: &BTreeMap<String, String>) -> CcmResult<()>;
}

/// Services backed by a reflector cache (lists) and the API server (patches).
#[derive(Clone)]
pub struct KubeServices {
    client: Client,
    store: Store<Service>,
}

impl KubeServices {
    /// Start a cluster-wide list+watch of services feeding the lister cache.
    pub fn spawn(client: Client) -> (Self, JoinHandle<()>) {
        let api: Api<Service> = Api::all(client.clone());
        let (store, writer) = reflector::store();
        let handle = tokio::spawn(async move {
            let stream = reflector(writer, watcher(api, watcher::Config::default()))
                .default_backoff()
                .applied_objects();
            futures::pin_mut!(stream);
            info!("service watcher started");
            while let Some(ev) = stream.next().await {
                match ev {
                    Ok(svc) => debug!(service = %service_key(&svc), "service applied"),
                    Err(e) => warn!(error = %e, "service watch error"),
                }
            }
            warn!("service watcher stream ended");
        });
        (Self { client, store }, handle)
    }

    /// Connect with the ambient kubeconfig or in-cluster configuration.
    pub async fn try_default() -> Result<(Self, JoinHandle<()>)> {
        let client = Client::try_default().await?;
        Ok(Self::spawn(client))
    }
}

impl ServiceLister for KubeServices {
    fn list(&self) -> Vec<Arc<Service>> { self.store.state() }
}

#[async_trait::async_trait]
impl ServiceUpdater for KubeServices {
    async fn patch_annotations(&self, svc: &Service, annotations: &BTreeMap<String, String>) -> CcmResult<()> {
        let name = svc
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| CcmError::Orchestrator("service has no name".into()))?;
        let ns = svc.metadata.namespace.as_deref().unwrap_or("default");
        let api: Api<Service> = Api::namespaced(self.client.clone(), ns);
        let patch = serde_json::json!({ "metadata": { "annotations": annotations } });
        api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| CcmError::Orchestrator(format!("patching service {}/{}: {}", ns, name, e)))?;
        debug!(service = %service_key(svc), keys = ?annotations.keys().collect::<Vec<_>>(), "service annotations patched");
        Ok(())
    }
}
