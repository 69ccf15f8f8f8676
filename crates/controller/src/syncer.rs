//! Strategy for running a fallible action on a fixed period.

use std::time::Duration;

use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Action run on every tick.
pub type SyncFn = Box<dyn FnMut() -> BoxFuture<'static, anyhow::Result<()>> + Send>;

pub trait Syncer: Send + Sync {
    /// Run `f` every `period` until `stop` is cancelled.
    fn sync(&self, name: &'static str, period: Duration, stop: CancellationToken, f: SyncFn) -> JoinHandle<()>;
}

/// Spawns one task per loop, driven by a tokio interval.
#[derive(Debug, Default, Clone, Copy)]
pub struct TickerSyncer;

impl Syncer for TickerSyncer {
    fn sync(&self, name: &'static str, period: Duration, stop: CancellationToken, f: SyncFn) -> JoinHandle<()> {
        tokio::spawn(run_ticker(name, period, stop, f))
    }
}

/// Fires once immediately, then on every tick. Errors are logged and the loop
/// goes on; only `stop` ends it. Ticks missed while `f` overruns fire back to back.
/// A `stop` already cancelled on entry wins over the first tick, so `f` never runs.
pub async fn run_ticker(name: &'static str, period: Duration, stop: CancellationToken, mut f: SyncFn) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
    info!(syncer = name, period = ?period, "syncer started");
    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {
                let outcome = match f().await {
                    Ok(()) => {
                        debug!(syncer = name, "sync succeeded");
                        "ok"
                    }
                    Err(e) => {
                        error!(syncer = name, error = %format!("{:#}", e), "sync failed");
                        "error"
                    }
                };
                metrics::counter!("ccm_sync_runs_total", 1u64, "syncer" => name, "outcome" => outcome);
            }
        }
    }
    info!(syncer = name, "syncer stopped");
}
