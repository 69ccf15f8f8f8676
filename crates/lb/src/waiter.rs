//! Polling a load balancer until it reports active.

use std::time::Duration;

use ccm_core::{CcmError, CcmResult, CloudClient, LoadBalancer};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Poll every `tick` until the load balancer is active. The first poll is
/// immediate and each poll runs under the overall deadline. An API error ends
/// the wait at once; running past `timeout` yields
/// [`CcmError::ConvergenceTimeout`], at most one tick after the deadline.
pub async fn wait_active(client: &CloudClient, id: &str, timeout: Duration, tick: Duration) -> CcmResult<LoadBalancer> {
    let started = Instant::now();
    let deadline = started + timeout;
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let lb = match tokio::time::timeout_at(deadline, client.load_balancers.get(id)).await {
            Ok(res) => res?,
            Err(_) => {
                warn!(lb_id = id, timeout = ?timeout, "load balancer poll outlived the deadline");
                return Err(CcmError::ConvergenceTimeout { id: id.to_string(), timeout });
            }
        };
        if lb.is_active() {
            let waited = started.elapsed();
            metrics::histogram!("ccm_lb_active_wait_seconds", waited.as_secs_f64());
            info!(lb_id = id, waited = ?waited, "load balancer is active");
            return Ok(lb);
        }
        if Instant::now() >= deadline {
            return Err(CcmError::ConvergenceTimeout { id: id.to_string(), timeout });
        }
        debug!(lb_id = id, status = %lb.status, "load balancer not active yet");
    }
}
