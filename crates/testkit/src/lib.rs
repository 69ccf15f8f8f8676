//! Test doubles for the cloud controller crates.
//!
//! - [`FakeCloud`]: in-memory cloud API recording every call, with scripted failures
//! - [`InMemoryServices`]: service lister and annotation updater over a map
//! - [`ServiceBuilder`]: service fixtures with stable names and UIDs

#![forbid(unsafe_code)]

pub mod cloud;
pub mod services;

pub use cloud::{FakeCloud, Op, LOAD_BALANCER_NEW};
pub use services::{load_balancer_name, service_uid, InMemoryServices, ServiceBuilder};

use ccm_core::{Droplet, DropletId, Region};

/// Initialize test logging (safe to call from every test).
pub fn init_test_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_test_writer()
        .try_init();
}

/// Droplet in `nyc1` with the given ID and name.
pub fn droplet(id: DropletId, name: &str) -> Droplet {
    Droplet { region: Region::from_slug("nyc1"), status: "active".into(), ..Droplet::new(id, name) }
}
