//! In-memory cluster services and service fixtures.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use ccm_core::{CcmError, CcmResult};
use ccm_kubehub::{service_key, ServiceLister, ServiceUpdater, SERVICE_TYPE_LOAD_BALANCER};
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

#[derive(Default)]
struct Inner {
    services: BTreeMap<String, Arc<Service>>,
    patches: usize,
    fail_patch: Option<String>,
}

/// Services held in memory; patches are applied to the stored objects.
#[derive(Default)]
pub struct InMemoryServices {
    inner: Mutex<Inner>,
}

impl InMemoryServices {
    pub fn new(services: Vec<Service>) -> Arc<Self> {
        let me = Self::default();
        for svc in services {
            me.insert(svc);
        }
        Arc::new(me)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> { self.inner.lock().unwrap_or_else(|p| p.into_inner()) }

    pub fn insert(&self, svc: Service) { self.lock().services.insert(service_key(&svc), Arc::new(svc)); }

    /// Stored service by `namespace/name`.
    pub fn get(&self, key: &str) -> Option<Arc<Service>> { self.lock().services.get(key).cloned() }

    pub fn patches(&self) -> usize { self.lock().patches }

    /// Make the next patch fail with an orchestrator error.
    pub fn fail_next_patch(&self, msg: &str) { self.lock().fail_patch = Some(msg.to_string()); }
}

impl ServiceLister for InMemoryServices {
    fn list(&self) -> Vec<Arc<Service>> { self.lock().services.values().cloned().collect() }
}

#[async_trait]
impl ServiceUpdater for InMemoryServices {
    async fn patch_annotations(&self, svc: &Service, annotations: &BTreeMap<String, String>) -> CcmResult<()> {
        let mut inner = self.lock();
        if let Some(msg) = inner.fail_patch.take() {
            return Err(CcmError::Orchestrator(msg));
        }
        inner.patches += 1;
        let key = service_key(svc);
        let mut stored = inner.services.get(&key).map(|s| Service::clone(s)).unwrap_or_else(|| svc.clone());
        let anns = stored.metadata.annotations.get_or_insert_with(BTreeMap::new);
        for (k, v) in annotations {
            anns.insert(k.clone(), v.clone());
        }
        inner.services.insert(key, Arc::new(stored));
        Ok(())
    }
}

/// Builder for test services. Each index yields a distinct name and UID.
#[derive(Debug, Clone)]
pub struct ServiceBuilder {
    idx: u32,
    load_balancer: bool,
    annotations: BTreeMap<String, String>,
    ports: Vec<(i32, i32)>,
}

impl ServiceBuilder {
    pub fn new(idx: u32) -> Self {
        Self { idx, load_balancer: false, annotations: BTreeMap::new(), ports: Vec::new() }
    }

    pub fn load_balancer(mut self) -> Self {
        self.load_balancer = true;
        self
    }

    pub fn annotation(mut self, key: &str, value: &str) -> Self {
        self.annotations.insert(key.to_string(), value.to_string());
        self
    }

    /// Service port and the node port it forwards to.
    pub fn port(mut self, port: i32, node_port: i32) -> Self {
        self.ports.push((port, node_port));
        self
    }

    pub fn build(self) -> Service {
        let ports = self
            .ports
            .iter()
            .map(|(port, node_port)| ServicePort {
                port: *port,
                node_port: Some(*node_port),
                protocol: Some("TCP".into()),
                ..Default::default()
            })
            .collect::<Vec<_>>();
        Service {
            metadata: ObjectMeta {
                name: Some(format!("service{}", self.idx)),
                namespace: Some("default".into()),
                uid: Some(service_uid(self.idx)),
                annotations: (!self.annotations.is_empty()).then_some(self.annotations),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                type_: Some(if self.load_balancer { SERVICE_TYPE_LOAD_BALANCER } else { "ClusterIP" }.into()),
                ports: (!ports.is_empty()).then_some(ports),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

/// UID of the fixture service with the given index.
pub fn service_uid(idx: u32) -> String { format!("{:08}-0000-0000-0000-000000000000", idx) }

/// Default load balancer name of the fixture service with the given index.
pub fn load_balancer_name(idx: u32) -> String {
    let mut name: String = std::iter::once('a').chain(service_uid(idx).chars().filter(|c| *c != '-')).collect();
    name.truncate(32);
    name
}
