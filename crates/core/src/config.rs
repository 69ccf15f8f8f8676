//! Runtime configuration read from `CCM_*` environment variables.

use std::time::Duration;

pub const SYNC_RESOURCES_PERIOD: Duration = Duration::from_secs(60);
pub const SYNC_TAGS_PERIOD: Duration = Duration::from_secs(60);
pub const SYNC_RESOURCES_TIMEOUT: Duration = Duration::from_secs(3 * 60);
pub const SYNC_TAGS_TIMEOUT: Duration = Duration::from_secs(60);

pub const LB_ACTIVE_TIMEOUT: Duration = Duration::from_secs(90);
pub const LB_ACTIVE_CHECK_TICK: Duration = Duration::from_secs(5);

fn env_string(key: &str) -> String { std::env::var(key).unwrap_or_default() }

fn env_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or(default)
}

/// Cluster identity and background sync schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcesConfig {
    /// Empty disables tag syncing.
    pub cluster_id: String,
    /// Carried for callers; the sync core does not interpret it.
    pub cluster_vpc_id: String,
    pub sync_resources_period: Duration,
    pub sync_tags_period: Duration,
    pub sync_resources_timeout: Duration,
    pub sync_tags_timeout: Duration,
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            cluster_id: String::new(),
            cluster_vpc_id: String::new(),
            sync_resources_period: SYNC_RESOURCES_PERIOD,
            sync_tags_period: SYNC_TAGS_PERIOD,
            sync_resources_timeout: SYNC_RESOURCES_TIMEOUT,
            sync_tags_timeout: SYNC_TAGS_TIMEOUT,
        }
    }
}

impl ResourcesConfig {
    pub fn new(cluster_id: &str, cluster_vpc_id: &str) -> Self {
        Self { cluster_id: cluster_id.to_string(), cluster_vpc_id: cluster_vpc_id.to_string(), ..Default::default() }
    }

    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            cluster_id: env_string("CCM_CLUSTER_ID"),
            cluster_vpc_id: env_string("CCM_CLUSTER_VPC_ID"),
            sync_resources_period: env_secs("CCM_SYNC_RESOURCES_PERIOD_SECS", d.sync_resources_period),
            sync_tags_period: env_secs("CCM_SYNC_TAGS_PERIOD_SECS", d.sync_tags_period),
            sync_resources_timeout: env_secs("CCM_SYNC_RESOURCES_TIMEOUT_SECS", d.sync_resources_timeout),
            sync_tags_timeout: env_secs("CCM_SYNC_TAGS_TIMEOUT_SECS", d.sync_tags_timeout),
        }
    }

    pub fn has_cluster_id(&self) -> bool { !self.cluster_id.is_empty() }
}

/// Load balancer reconciliation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancerConfig {
    pub region: String,
    /// Upper bound on waiting for a load balancer to turn active.
    pub active_timeout: Duration,
    /// Interval between status polls while waiting.
    pub active_check_tick: Duration,
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self { region: String::new(), active_timeout: LB_ACTIVE_TIMEOUT, active_check_tick: LB_ACTIVE_CHECK_TICK }
    }
}

impl LoadBalancerConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            region: env_string("CCM_REGION"),
            active_timeout: env_secs("CCM_LB_ACTIVE_TIMEOUT_SECS", d.active_timeout),
            active_check_tick: env_secs("CCM_LB_ACTIVE_CHECK_TICK_SECS", d.active_check_tick),
        }
    }
}
