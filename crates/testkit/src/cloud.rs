//! In-memory cloud API with call recording and scripted failures.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use ccm_core::{
    ApiError, Certificate, CertificatesService, CloudClient, Droplet, DropletId, DropletsService, ListOptions,
    LoadBalancer, LoadBalancerRequest, LoadBalancersService, Page, Region, Tag, TagCreateRequest,
    TagResourcesRequest, TagsService, LOAD_BALANCER_ACTIVE,
};

/// Cloud operations that can be counted or made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    DropletsGet,
    DropletsList,
    LoadBalancersGet,
    LoadBalancersList,
    LoadBalancersCreate,
    LoadBalancersUpdate,
    LoadBalancersDelete,
    CertificatesGet,
    CertificatesList,
    TagsCreate,
    TagResources,
}

/// Status a load balancer reports while still provisioning.
pub const LOAD_BALANCER_NEW: &str = "new";

#[derive(Default)]
struct State {
    droplets: BTreeMap<DropletId, Droplet>,
    load_balancers: BTreeMap<String, LoadBalancer>,
    certificates: BTreeMap<String, Certificate>,
    tags: BTreeSet<String>,
    calls: HashMap<Op, usize>,
    failures: HashMap<Op, VecDeque<ApiError>>,
    tag_requests: Vec<(String, TagResourcesRequest)>,
    tag_creates: Vec<TagCreateRequest>,
    lb_requests: Vec<LoadBalancerRequest>,
    // polls left before a load balancer flips to active
    pending_polls: HashMap<String, u32>,
    activate_after: u32,
    page_size: usize,
    next_lb: u32,
}

pub struct FakeCloud {
    state: Mutex<State>,
}

impl FakeCloud {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { state: Mutex::new(State { page_size: 200, ..Default::default() }) })
    }

    /// Client whose every service is this fake.
    pub fn client(self: &Arc<Self>) -> CloudClient { CloudClient::from_shared(self.clone()) }

    fn lock(&self) -> MutexGuard<'_, State> { self.state.lock().unwrap_or_else(|p| p.into_inner()) }

    /// Count the call and pop a scripted failure for it, if any.
    fn enter(&self, op: Op) -> Result<MutexGuard<'_, State>, ApiError> {
        let mut st = self.lock();
        *st.calls.entry(op).or_default() += 1;
        if let Some(err) = st.failures.get_mut(&op).and_then(|q| q.pop_front()) {
            return Err(err);
        }
        Ok(st)
    }

    pub fn fail_next(&self, op: Op, err: ApiError) { self.lock().failures.entry(op).or_default().push_back(err); }

    pub fn calls(&self, op: Op) -> usize { self.lock().calls.get(&op).copied().unwrap_or(0) }

    pub fn set_page_size(&self, n: usize) { self.lock().page_size = n.max(1); }

    /// Newly created or updated load balancers report `new` for `polls` gets before turning active.
    pub fn activate_after(&self, polls: u32) { self.lock().activate_after = polls; }

    pub fn insert_droplet(&self, d: Droplet) { self.lock().droplets.insert(d.id, d); }

    pub fn remove_droplet(&self, id: DropletId) { self.lock().droplets.remove(&id); }

    pub fn insert_load_balancer(&self, lb: LoadBalancer) { self.lock().load_balancers.insert(lb.id.clone(), lb); }

    pub fn load_balancer(&self, id: &str) -> Option<LoadBalancer> { self.lock().load_balancers.get(id).cloned() }

    pub fn load_balancers(&self) -> Vec<LoadBalancer> { self.lock().load_balancers.values().cloned().collect() }

    pub fn insert_certificate(&self, c: Certificate) { self.lock().certificates.insert(c.id.clone(), c); }

    pub fn insert_tag(&self, name: &str) { self.lock().tags.insert(name.to_string()); }

    pub fn has_tag(&self, name: &str) -> bool { self.lock().tags.contains(name) }

    /// Every tag-resources call, including ones that failed.
    pub fn tag_requests(&self) -> Vec<(String, TagResourcesRequest)> { self.lock().tag_requests.clone() }

    pub fn tag_creates(&self) -> Vec<TagCreateRequest> { self.lock().tag_creates.clone() }

    /// Bodies of every create and update call, in order.
    pub fn load_balancer_requests(&self) -> Vec<LoadBalancerRequest> { self.lock().lb_requests.clone() }
}

fn paged<T: Clone>(items: Vec<T>, opts: ListOptions, page_size: usize) -> Page<T> {
    let page = opts.page.max(1) as usize;
    let start = (page - 1) * page_size;
    let chunk: Vec<T> = items.iter().skip(start).take(page_size).cloned().collect();
    let next_page = if start + page_size < items.len() { Some(page as u32 + 1) } else { None };
    Page { items: chunk, next_page }
}

fn apply_request(lb: &mut LoadBalancer, req: &LoadBalancerRequest) {
    lb.name = req.name.clone();
    lb.region = Region::from_slug(&req.region);
    lb.forwarding_rules = req.forwarding_rules.clone();
    lb.droplet_ids = req.droplet_ids.clone();
    lb.tags = req.tags.clone();
}

fn mark_provisioning(st: &mut State, lb: &mut LoadBalancer) {
    if st.activate_after == 0 {
        lb.status = LOAD_BALANCER_ACTIVE.to_string();
    } else {
        lb.status = LOAD_BALANCER_NEW.to_string();
        st.pending_polls.insert(lb.id.clone(), st.activate_after);
    }
}

#[async_trait]
impl DropletsService for FakeCloud {
    async fn get(&self, id: DropletId) -> Result<Droplet, ApiError> {
        let st = self.enter(Op::DropletsGet)?;
        st.droplets.get(&id).cloned().ok_or_else(|| ApiError::not_found(format!("droplet {} not found", id)))
    }

    async fn list(&self, opts: ListOptions) -> Result<Page<Droplet>, ApiError> {
        let st = self.enter(Op::DropletsList)?;
        Ok(paged(st.droplets.values().cloned().collect(), opts, st.page_size))
    }
}

#[async_trait]
impl LoadBalancersService for FakeCloud {
    async fn get(&self, id: &str) -> Result<LoadBalancer, ApiError> {
        let mut st = self.enter(Op::LoadBalancersGet)?;
        let polls = st.pending_polls.get(id).copied();
        let lb = st
            .load_balancers
            .get_mut(id)
            .ok_or_else(|| ApiError::not_found(format!("load balancer {} not found", id)))?;
        match polls {
            Some(n) if n > 0 => {
                let out = lb.clone();
                st.pending_polls.insert(id.to_string(), n - 1);
                Ok(out)
            }
            Some(_) => {
                lb.status = LOAD_BALANCER_ACTIVE.to_string();
                let out = lb.clone();
                st.pending_polls.remove(id);
                Ok(out)
            }
            None => Ok(lb.clone()),
        }
    }

    async fn list(&self, opts: ListOptions) -> Result<Page<LoadBalancer>, ApiError> {
        let st = self.enter(Op::LoadBalancersList)?;
        Ok(paged(st.load_balancers.values().cloned().collect(), opts, st.page_size))
    }

    async fn create(&self, req: &LoadBalancerRequest) -> Result<LoadBalancer, ApiError> {
        let mut st = self.enter(Op::LoadBalancersCreate)?;
        st.next_lb += 1;
        let n = st.next_lb;
        let mut lb = LoadBalancer { id: format!("lb-{}", n), ip: format!("203.0.113.{}", n), ..Default::default() };
        apply_request(&mut lb, req);
        mark_provisioning(&mut st, &mut lb);
        st.lb_requests.push(req.clone());
        st.load_balancers.insert(lb.id.clone(), lb.clone());
        Ok(lb)
    }

    async fn update(&self, id: &str, req: &LoadBalancerRequest) -> Result<LoadBalancer, ApiError> {
        let mut st = self.enter(Op::LoadBalancersUpdate)?;
        let mut lb = st
            .load_balancers
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::not_found(format!("load balancer {} not found", id)))?;
        apply_request(&mut lb, req);
        mark_provisioning(&mut st, &mut lb);
        st.lb_requests.push(req.clone());
        st.load_balancers.insert(lb.id.clone(), lb.clone());
        Ok(lb)
    }

    async fn delete(&self, id: &str) -> Result<(), ApiError> {
        let mut st = self.enter(Op::LoadBalancersDelete)?;
        st.load_balancers
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ApiError::not_found(format!("load balancer {} not found", id)))
    }
}

#[async_trait]
impl CertificatesService for FakeCloud {
    async fn get(&self, id: &str) -> Result<Certificate, ApiError> {
        let st = self.enter(Op::CertificatesGet)?;
        st.certificates.get(id).cloned().ok_or_else(|| ApiError::not_found(format!("certificate {} not found", id)))
    }

    async fn list(&self, opts: ListOptions) -> Result<Page<Certificate>, ApiError> {
        let st = self.enter(Op::CertificatesList)?;
        Ok(paged(st.certificates.values().cloned().collect(), opts, st.page_size))
    }
}

#[async_trait]
impl TagsService for FakeCloud {
    async fn create(&self, req: &TagCreateRequest) -> Result<Tag, ApiError> {
        let mut st = self.enter(Op::TagsCreate)?;
        st.tag_creates.push(req.clone());
        st.tags.insert(req.name.clone());
        Ok(Tag { name: req.name.clone() })
    }

    async fn tag_resources(&self, tag: &str, req: &TagResourcesRequest) -> Result<(), ApiError> {
        let mut st = self.lock();
        *st.calls.entry(Op::TagResources).or_default() += 1;
        st.tag_requests.push((tag.to_string(), req.clone()));
        if let Some(err) = st.failures.get_mut(&Op::TagResources).and_then(|q| q.pop_front()) {
            return Err(err);
        }
        if !st.tags.contains(tag) {
            return Err(ApiError::not_found(format!("tag {} not found", tag)));
        }
        Ok(())
    }
}
