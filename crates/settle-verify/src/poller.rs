//! Bounded polling
//!
//! Every wait sleeps one interval, fetches a fresh snapshot, and checks it,
//! until the condition holds or the deadline passes. Snapshots are never
//! cached between ticks. Elapsed time is measured on tokio's monotonic clock
//! so a paused test runtime controls it exactly.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use settle_common::config::HarnessConfig;
use settle_common::crd::{DatabaseClusterSpec, DatabaseClusterStatus};
use settle_common::{Error, Result};

use crate::evaluator::{evaluate, ConvergenceVerdict};

/// Interval and deadline for one wait
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    /// Sleep before each fetch
    pub interval: Duration,
    /// Give up once this much time has elapsed
    pub deadline: Duration,
}

impl PollPolicy {
    /// Create a policy from explicit values
    pub fn new(interval: Duration, deadline: Duration) -> Self {
        Self { interval, deadline }
    }

    /// Policy for a cluster of `nodes` nodes: the deadline scales with size
    pub fn for_nodes(config: &HarnessConfig, nodes: usize) -> Self {
        Self {
            interval: config.poll_interval,
            deadline: config.timeout_for(nodes),
        }
    }
}

/// Poll until the observed status converges to `desired`
///
/// `fetch` returns the current status; an error classified as not found
/// counts as pending, any other error aborts the wait. A `Diverged` verdict
/// is logged and polling continues: only `Converged` ends the wait early.
pub async fn wait_until_converged<F, Fut>(
    cluster: &str,
    desired: &DatabaseClusterSpec,
    policy: &PollPolicy,
    mut fetch: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<DatabaseClusterStatus>>,
{
    let start = Instant::now();
    let mut tick = 0u32;

    loop {
        tokio::time::sleep(policy.interval).await;
        tick += 1;

        let verdict = match fetch().await {
            Ok(status) => evaluate(desired, Some(&status)),
            Err(e) if e.is_not_found() => evaluate(desired, None),
            Err(e) => return Err(abort(cluster, e)),
        };

        let elapsed = start.elapsed();
        match &verdict {
            ConvergenceVerdict::Converged => {
                info!(
                    cluster = %cluster,
                    tick,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Cluster converged"
                );
                return Ok(());
            }
            ConvergenceVerdict::Diverged(divergence) => {
                warn!(cluster = %cluster, tick, %divergence, "Cluster diverged, still polling");
            }
            ConvergenceVerdict::Pending(reason) => {
                debug!(cluster = %cluster, tick, %reason, "Cluster not yet converged");
            }
        }

        if elapsed >= policy.deadline {
            return Err(Error::timeout(cluster, "converge", elapsed, verdict.to_string()));
        }
    }
}

/// Poll until `fetch` reports the object as not found
///
/// Any successful fetch means the object still exists.
pub async fn wait_until_absent<F, Fut, T>(
    cluster: &str,
    policy: &PollPolicy,
    mut fetch: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let start = Instant::now();
    let mut tick = 0u32;

    loop {
        tokio::time::sleep(policy.interval).await;
        tick += 1;

        match fetch().await {
            Ok(_) => {
                debug!(cluster = %cluster, tick, "Cluster still present");
            }
            Err(e) if e.is_not_found() => {
                info!(
                    cluster = %cluster,
                    tick,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Cluster gone"
                );
                return Ok(());
            }
            Err(e) => return Err(abort(cluster, e)),
        }

        let elapsed = start.elapsed();
        if elapsed >= policy.deadline {
            return Err(Error::timeout(cluster, "disappear", elapsed, "still present"));
        }
    }
}

/// Classify a fetch error that ends a wait
fn abort(cluster: &str, e: Error) -> Error {
    match e {
        Error::Fetch { .. } => e,
        other => Error::fetch(cluster, other.to_string()),
    }
}
