//! Cloud API surface consumed by the controller, one trait per resource family.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ApiError;
use crate::types::{
    Certificate, Droplet, DropletId, LoadBalancer, LoadBalancerRequest, Tag, TagCreateRequest,
    TagResourcesRequest,
};

/// Page selector for list calls. Pages start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListOptions {
    pub page: u32,
    pub per_page: u32,
}

impl Default for ListOptions {
    fn default() -> Self { Self { page: 1, per_page: 200 } }
}

/// One page of a list call; `next_page` is `None` on the last page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page: Option<u32>,
}

#[async_trait]
pub trait DropletsService: Send + Sync {
    async fn get(&self, id: DropletId) -> Result<Droplet, ApiError>;
    async fn list(&self, opts: ListOptions) -> Result<Page<Droplet>, ApiError>;
}

#[async_trait]
pub trait LoadBalancersService: Send + Sync {
    async fn get(&self, id: &str) -> Result<LoadBalancer, ApiError>;
    async fn list(&self, opts: ListOptions) -> Result<Page<LoadBalancer>, ApiError>;
    async fn create(&self, req: &LoadBalancerRequest) -> Result<LoadBalancer, ApiError>;
    async fn update(&self, id: &str, req: &LoadBalancerRequest) -> Result<LoadBalancer, ApiError>;
    async fn delete(&self, id: &str) -> Result<(), ApiError>;
}

#[async_trait]
pub trait CertificatesService: Send + Sync {
    async fn get(&self, id: &str) -> Result<Certificate, ApiError>;
    async fn list(&self, opts: ListOptions) -> Result<Page<Certificate>, ApiError>;
}

#[async_trait]
pub trait TagsService: Send + Sync {
    async fn create(&self, req: &TagCreateRequest) -> Result<Tag, ApiError>;
    /// Attach `tag` to resources. A 404 status means the tag itself does not exist.
    async fn tag_resources(&self, tag: &str, req: &TagResourcesRequest) -> Result<(), ApiError>;
}

/// Handle to the provider API, one service per resource family.
#[derive(Clone)]
pub struct CloudClient {
    pub droplets: Arc<dyn DropletsService>,
    pub load_balancers: Arc<dyn LoadBalancersService>,
    pub certificates: Arc<dyn CertificatesService>,
    pub tags: Arc<dyn TagsService>,
}

impl CloudClient {
    pub fn new(
        droplets: Arc<dyn DropletsService>,
        load_balancers: Arc<dyn LoadBalancersService>,
        certificates: Arc<dyn CertificatesService>,
        tags: Arc<dyn TagsService>,
    ) -> Self {
        Self { droplets, load_balancers, certificates, tags }
    }

    /// Build a client where one value serves every resource family.
    pub fn from_shared<T>(api: Arc<T>) -> Self
    where
        T: DropletsService + LoadBalancersService + CertificatesService + TagsService + 'static,
    {
        Self {
            droplets: api.clone(),
            load_balancers: api.clone(),
            certificates: api.clone(),
            tags: api,
        }
    }
}

impl std::fmt::Debug for CloudClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str("CloudClient") }
}

/// Bound a cloud call; an elapsed deadline becomes [`ApiError::Timeout`].
pub async fn with_timeout<T, Fut>(timeout: Duration, fut: Fut) -> Result<T, ApiError>
where
    Fut: Future<Output = Result<T, ApiError>>,
{
    tokio::time::timeout(timeout, fut).await.map_err(|_| ApiError::Timeout(timeout))?
}

/// Walk a paged list call from the first page to the last.
pub async fn collect_pages<T, F, Fut>(mut fetch: F) -> Result<Vec<T>, ApiError>
where
    F: FnMut(ListOptions) -> Fut,
    Fut: Future<Output = Result<Page<T>, ApiError>>,
{
    let mut opts = ListOptions::default();
    let mut out = Vec::new();
    loop {
        let page = fetch(opts).await?;
        out.extend(page.items);
        match page.next_page {
            // guard against a provider echoing the same page forever
            Some(next) if next > opts.page => opts.page = next,
            _ => break,
        }
    }
    Ok(out)
}

pub async fn all_droplets(client: &CloudClient) -> Result<Vec<Droplet>, ApiError> {
    collect_pages(move |opts| client.droplets.list(opts)).await
}

pub async fn all_load_balancers(client: &CloudClient) -> Result<Vec<LoadBalancer>, ApiError> {
    collect_pages(move |opts| client.load_balancers.list(opts)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn collects_every_page_in_order() {
        let pages = vec![
            Page { items: vec![1, 2], next_page: Some(2) },
            Page { items: vec![3], next_page: Some(3) },
            Page { items: vec![4], next_page: None },
        ];
        let mut seen = Vec::new();
        let all = collect_pages(|opts| {
            seen.push(opts.page);
            let page = pages[(opts.page - 1) as usize].clone();
            async move { Ok::<_, ApiError>(page) }
        })
        .await
        .expect("pages");
        assert_eq!(all, vec![1, 2, 3, 4]);
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn stops_on_first_error() {
        let res: Result<Vec<u8>, _> = collect_pages(|opts| async move {
            if opts.page == 1 {
                Ok(Page { items: vec![1], next_page: Some(2) })
            } else {
                Err(ApiError::status(500, "boom"))
            }
        })
        .await;
        assert_eq!(res, Err(ApiError::status(500, "boom")));
    }

    #[tokio::test(start_paused = true)]
    async fn with_timeout_maps_elapsed() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, ApiError>(())
        };
        let res = with_timeout(Duration::from_secs(1), slow).await;
        assert_eq!(res, Err(ApiError::Timeout(Duration::from_secs(1))));
    }

    #[tokio::test]
    async fn non_advancing_next_page_terminates() {
        let all = collect_pages(|_| async { Ok::<_, ApiError>(Page { items: vec![9u8], next_page: Some(1) }) })
            .await
            .expect("pages");
        assert_eq!(all, vec![9]);
    }
}
