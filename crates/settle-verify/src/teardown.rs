//! Storage teardown tracking
//!
//! Deleting the cluster resource only starts teardown: the reconciler first
//! removes the pods, then the storage subsystem releases their claims. A
//! delete is complete once both are gone.
//!
//! The two phases run strictly in order under one shared deadline. Pods are
//! not looked at again once the first phase is done.

use std::fmt;
use std::future::Future;

use tokio::time::Instant;
use tracing::{debug, info};

use settle_common::crd::{StorageSpec, VolumeMode};
use settle_common::{Error, Result};

use crate::poller::PollPolicy;

/// Lifecycle phase of a persistent storage claim
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClaimPhase {
    /// Claim exists and is bound to a volume
    Bound,
    /// Deletion requested but not finished
    Terminating,
    /// Claim no longer exists
    Absent,
}

impl fmt::Display for ClaimPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClaimPhase::Bound => write!(f, "Bound"),
            ClaimPhase::Terminating => write!(f, "Terminating"),
            ClaimPhase::Absent => write!(f, "Absent"),
        }
    }
}

/// A storage claim belonging to a cluster
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageClaim {
    /// Claim name
    pub name: String,
    /// Current phase
    pub phase: ClaimPhase,
    /// Mode of the volume the claim backs
    pub mode: VolumeMode,
}

impl StorageClaim {
    /// Create a claim record for a filesystem volume, the Kubernetes default
    pub fn new(name: impl Into<String>, phase: ClaimPhase) -> Self {
        Self {
            name: name.into(),
            phase,
            mode: VolumeMode::Filesystem,
        }
    }

    /// Set the volume mode
    pub fn with_mode(mut self, mode: VolumeMode) -> Self {
        self.mode = mode;
        self
    }
}

/// What happens to claims of one volume mode when the cluster is deleted
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Retention {
    /// Claims are deleted along with the cluster and must reach `Absent`
    #[default]
    Remove,
    /// Claims are kept; `Bound` is the expected end state
    Retain,
}

impl Retention {
    /// Whether a claim in `phase` no longer holds up teardown
    ///
    /// `Terminating` never counts as done, whatever the policy.
    pub fn is_settled(&self, phase: ClaimPhase) -> bool {
        match (self, phase) {
            (_, ClaimPhase::Absent) => true,
            (_, ClaimPhase::Terminating) => false,
            (Retention::Remove, ClaimPhase::Bound) => false,
            (Retention::Retain, ClaimPhase::Bound) => true,
        }
    }
}

/// Retention of a cluster's claims, per volume mode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClaimRetention {
    /// Claims of block volumes
    pub block: Retention,
    /// Claims of filesystem volumes
    pub filesystem: Retention,
}

impl ClaimRetention {
    /// Retention implied by the cluster's volume policies
    pub fn for_storage(storage: &StorageSpec) -> Self {
        let retention = |mode| {
            if storage.retains_claims(mode) {
                Retention::Retain
            } else {
                Retention::Remove
            }
        };
        Self {
            block: retention(VolumeMode::Block),
            filesystem: retention(VolumeMode::Filesystem),
        }
    }

    /// Retention for claims of `mode` volumes
    pub fn for_mode(&self, mode: VolumeMode) -> Retention {
        match mode {
            VolumeMode::Block => self.block,
            VolumeMode::Filesystem => self.filesystem,
        }
    }

    /// Whether `claim` no longer holds up teardown
    pub fn is_settled(&self, claim: &StorageClaim) -> bool {
        self.for_mode(claim.mode).is_settled(claim.phase)
    }
}

/// Wait for every pod, then every storage claim, of a deleted cluster
///
/// `fetch_pods` returns the names of pods still present; `fetch_claims`
/// returns the claims still listed for the cluster. On timeout the error
/// names the phase and the objects that were still present.
pub async fn wait_for_teardown<P, PF, C, CF>(
    cluster: &str,
    retention: ClaimRetention,
    policy: &PollPolicy,
    mut fetch_pods: P,
    mut fetch_claims: C,
) -> Result<()>
where
    P: FnMut() -> PF,
    PF: Future<Output = Result<Vec<String>>>,
    C: FnMut() -> CF,
    CF: Future<Output = Result<Vec<StorageClaim>>>,
{
    let start = Instant::now();

    loop {
        tokio::time::sleep(policy.interval).await;
        let pods = fetch_pods().await?;
        if pods.is_empty() {
            info!(cluster = %cluster, "All pods removed");
            break;
        }
        debug!(cluster = %cluster, remaining = pods.len(), "Waiting for pods to be removed");
        if start.elapsed() >= policy.deadline {
            return Err(Error::teardown_timeout(cluster, "pod", pods));
        }
    }

    loop {
        tokio::time::sleep(policy.interval).await;
        let stuck: Vec<String> = fetch_claims()
            .await?
            .into_iter()
            .filter(|claim| !retention.is_settled(claim))
            .map(|claim| format!("{} ({})", claim.name, claim.phase))
            .collect();
        if stuck.is_empty() {
            info!(
                cluster = %cluster,
                ?retention,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Storage claims released"
            );
            return Ok(());
        }
        debug!(cluster = %cluster, remaining = stuck.len(), "Waiting for storage claims");
        if start.elapsed() >= policy.deadline {
            return Err(Error::teardown_timeout(cluster, "storage claim", stuck));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use settle_common::crd::{VolumePolicy, VolumeSpec};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn policy(deadline_secs: u64) -> PollPolicy {
        PollPolicy::new(Duration::from_secs(1), Duration::from_secs(deadline_secs))
    }

    fn retain_all() -> ClaimRetention {
        ClaimRetention {
            block: Retention::Retain,
            filesystem: Retention::Retain,
        }
    }

    fn claims(phase: ClaimPhase) -> Vec<StorageClaim> {
        vec![
            StorageClaim::new("ns-aerocluster-0-0", phase),
            StorageClaim::new("ns-aerocluster-0-1", phase),
        ]
    }

    /// Story: claims stuck terminating for K ticks finish on tick K+1
    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(4)]
    #[tokio::test(start_paused = true)]
    async fn terminating_claims_keep_wait_pending(#[case] k: u32) {
        let ticks = AtomicU32::new(0);

        wait_for_teardown(
            "aerocluster",
            ClaimRetention::default(),
            &policy(60),
            || async { Ok(Vec::new()) },
            || {
                let tick = ticks.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if tick <= k {
                        Ok(claims(ClaimPhase::Terminating))
                    } else {
                        Ok(Vec::new())
                    }
                }
            },
        )
        .await
        .unwrap();

        assert_eq!(ticks.load(Ordering::SeqCst), k + 1);
    }

    /// Story: pods are checked until empty and never again afterwards
    #[tokio::test(start_paused = true)]
    async fn pods_are_not_rechecked_after_phase_one() {
        let pod_calls = AtomicU32::new(0);
        let claim_calls = AtomicU32::new(0);

        wait_for_teardown(
            "aerocluster",
            ClaimRetention::default(),
            &policy(60),
            || {
                let n = pod_calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Ok(vec!["aerocluster-0-0".to_string()])
                    } else {
                        Ok(Vec::new())
                    }
                }
            },
            || {
                let n = claim_calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 3 {
                        Ok(claims(ClaimPhase::Terminating))
                    } else {
                        Ok(vec![StorageClaim::new("gone", ClaimPhase::Absent)])
                    }
                }
            },
        )
        .await
        .unwrap();

        assert_eq!(pod_calls.load(Ordering::SeqCst), 3);
        assert_eq!(claim_calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_pods_time_out_in_pod_phase() {
        let claim_calls = AtomicU32::new(0);

        let err = wait_for_teardown(
            "aerocluster",
            ClaimRetention::default(),
            &policy(5),
            || async { Ok(vec!["aerocluster-0-1".to_string()]) },
            || {
                claim_calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(Vec::new()) }
            },
        )
        .await
        .unwrap_err();

        match err {
            Error::TeardownTimeout { phase, stuck, .. } => {
                assert_eq!(phase, "pod");
                assert_eq!(stuck, vec!["aerocluster-0-1".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(claim_calls.load(Ordering::SeqCst), 0);
    }

    /// Story: the deadline is shared, so time spent on pods counts against claims
    #[tokio::test(start_paused = true)]
    async fn deadline_is_shared_between_phases() {
        let pod_calls = AtomicU32::new(0);
        let claim_calls = AtomicU32::new(0);
        let start = Instant::now();

        let err = wait_for_teardown(
            "aerocluster",
            ClaimRetention::default(),
            &policy(10),
            || {
                let n = pod_calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 7 {
                        Ok(vec!["aerocluster-0-0".to_string()])
                    } else {
                        Ok(Vec::new())
                    }
                }
            },
            || {
                claim_calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(claims(ClaimPhase::Terminating)) }
            },
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("storage claim"));
        assert!(err.to_string().contains("ns-aerocluster-0-0 (Terminating)"));
        assert_eq!(claim_calls.load(Ordering::SeqCst), 2);
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn retained_claims_may_stay_bound() {
        wait_for_teardown(
            "aerocluster",
            retain_all(),
            &policy(5),
            || async { Ok(Vec::new()) },
            || async { Ok(claims(ClaimPhase::Bound)) },
        )
        .await
        .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn removed_claims_may_not_stay_bound() {
        let err = wait_for_teardown(
            "aerocluster",
            ClaimRetention::default(),
            &policy(3),
            || async { Ok(Vec::new()) },
            || async { Ok(claims(ClaimPhase::Bound)) },
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("ns-aerocluster-0-1 (Bound)"));
    }

    #[tokio::test(start_paused = true)]
    async fn list_errors_abort() {
        let err = wait_for_teardown(
            "aerocluster",
            ClaimRetention::default(),
            &policy(60),
            || async { Err(Error::fetch("aerocluster", "forbidden")) },
            || async { Ok(Vec::new()) },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Fetch { .. }));
    }

    #[rstest]
    #[case::absent_removed(Retention::Remove, ClaimPhase::Absent, true)]
    #[case::bound_removed(Retention::Remove, ClaimPhase::Bound, false)]
    #[case::terminating_removed(Retention::Remove, ClaimPhase::Terminating, false)]
    #[case::absent_retained(Retention::Retain, ClaimPhase::Absent, true)]
    #[case::bound_retained(Retention::Retain, ClaimPhase::Bound, true)]
    #[case::terminating_retained(Retention::Retain, ClaimPhase::Terminating, false)]
    fn settled_phases(
        #[case] retention: Retention,
        #[case] phase: ClaimPhase,
        #[case] settled: bool,
    ) {
        assert_eq!(retention.is_settled(phase), settled);
    }

    fn storage(block: Option<bool>, filesystem: Option<bool>) -> StorageSpec {
        StorageSpec {
            block_volume_policy: VolumePolicy {
                init_method: None,
                cascade_delete: block,
            },
            filesystem_volume_policy: VolumePolicy {
                init_method: None,
                cascade_delete: filesystem,
            },
            volumes: vec![
                VolumeSpec::new("/test/dev/xvdf", 1, "ssd", VolumeMode::Block),
                VolumeSpec::new("/opt/aerospike", 1, "ssd", VolumeMode::Filesystem),
            ],
        }
    }

    #[test]
    fn retention_follows_cascade_policy_per_mode() {
        assert_eq!(
            ClaimRetention::for_storage(&storage(Some(true), Some(true))),
            ClaimRetention::default()
        );
        assert_eq!(
            ClaimRetention::for_storage(&storage(Some(true), Some(false))),
            ClaimRetention {
                block: Retention::Remove,
                filesystem: Retention::Retain,
            }
        );
    }

    /// Story: retaining filesystem claims does not excuse a cascaded block claim
    #[tokio::test(start_paused = true)]
    async fn cascaded_claim_stuck_bound_times_out_beside_retained_ones() {
        let retention = ClaimRetention::for_storage(&storage(Some(true), Some(false)));

        let err = wait_for_teardown(
            "aerocluster",
            retention,
            &policy(3),
            || async { Ok(Vec::new()) },
            || async {
                Ok(vec![
                    StorageClaim::new("ns-aerocluster-0-0-xvdf", ClaimPhase::Bound)
                        .with_mode(VolumeMode::Block),
                    StorageClaim::new("ns-aerocluster-0-0-opt", ClaimPhase::Bound),
                ])
            },
        )
        .await
        .unwrap_err();

        match err {
            Error::TeardownTimeout { phase, stuck, .. } => {
                assert_eq!(phase, "storage claim");
                assert_eq!(stuck, vec!["ns-aerocluster-0-0-xvdf (Bound)".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retained_mode_may_stay_bound() {
        let retention = ClaimRetention::for_storage(&storage(Some(true), Some(false)));

        wait_for_teardown(
            "aerocluster",
            retention,
            &policy(3),
            || async { Ok(Vec::new()) },
            || async { Ok(vec![StorageClaim::new("ns-aerocluster-0-0-opt", ClaimPhase::Bound)]) },
        )
        .await
        .unwrap();
    }
}
