//! Lifecycle driver
//!
//! Wraps each create, update and delete in the wait that proves it took
//! effect. A [`ClusterHandle`] tracks where its cluster is in the lifecycle
//! and is borrowed mutably by each call, so one cluster is driven by one
//! logical thread of control.
//!
//! ```text
//! Absent -> Creating -> Converged -> (Updating -> Converged)* -> Deleting -> TornDown
//!              \             \              \                       \
//!               +-------------+--------------+-----------------------+--> Failed
//! ```

use std::fmt;
use std::sync::Arc;

use kube::ResourceExt;
use tracing::{info, instrument, warn};

use settle_common::config::HarnessConfig;
use settle_common::crd::{DatabaseCluster, DatabaseClusterSpec};
use settle_common::{Error, Result};

use crate::cleanup::CleanupRegistry;
use crate::client::ClusterApi;
use crate::evaluator::evaluate;
use crate::merge::merge_into;
use crate::poller::{wait_until_absent, wait_until_converged, PollPolicy};
use crate::resources::validate_pod_resources;
use crate::teardown::{wait_for_teardown, ClaimRetention};

/// Where a cluster is in its lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    /// Not created yet
    Absent,
    /// Create submitted, waiting for convergence
    Creating,
    /// Last verification succeeded
    Converged,
    /// Update submitted, waiting for convergence
    Updating,
    /// Delete submitted, waiting for teardown
    Deleting,
    /// Resource, pods and storage claims are gone
    TornDown,
    /// A verification failed
    Failed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Absent => "absent",
            LifecycleState::Creating => "creating",
            LifecycleState::Converged => "converged",
            LifecycleState::Updating => "updating",
            LifecycleState::Deleting => "deleting",
            LifecycleState::TornDown => "torn down",
            LifecycleState::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// A cluster driven through its lifecycle
#[derive(Clone, Debug)]
pub struct ClusterHandle {
    name: String,
    namespace: String,
    spec: DatabaseClusterSpec,
    state: LifecycleState,
}

impl ClusterHandle {
    fn new(name: String, namespace: String, spec: DatabaseClusterSpec) -> Self {
        Self {
            name,
            namespace,
            spec,
            state: LifecycleState::Absent,
        }
    }

    /// Cluster name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cluster namespace
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Spec of the last submitted change
    pub fn spec(&self) -> &DatabaseClusterSpec {
        &self.spec
    }

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    fn require(&self, operation: &str, allowed: &[LifecycleState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::invalid_transition(&self.name, operation, self.state.to_string()))
        }
    }

    /// Record the outcome of a wait: the success state or `Failed`
    fn settle(&mut self, result: Result<()>, success: LifecycleState) -> Result<()> {
        self.state = match &result {
            Ok(()) => success,
            Err(e) => {
                warn!(cluster = %self.name, error = %e, "Verification failed");
                LifecycleState::Failed
            }
        };
        result
    }
}

/// Runs lifecycle operations and verifies each one
pub struct ClusterLifecycle {
    api: Arc<dyn ClusterApi>,
    config: HarnessConfig,
    cleanup: CleanupRegistry,
}

impl ClusterLifecycle {
    /// Create a driver; created clusters are registered with `cleanup`
    pub fn new(
        api: Arc<dyn ClusterApi>,
        config: HarnessConfig,
        cleanup: CleanupRegistry,
    ) -> Self {
        Self {
            api,
            config,
            cleanup,
        }
    }

    /// Harness configuration in use
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Create a cluster and wait until it converges
    ///
    /// The cluster is registered for cleanup as soon as the create succeeds.
    /// A rejected create returns `SpecRejected` and registers nothing.
    #[instrument(skip(self, cluster), fields(cluster = %cluster.name_any()))]
    pub async fn create_and_verify(&self, cluster: DatabaseCluster) -> Result<ClusterHandle> {
        let (name, namespace) = self.identity(&cluster)?;
        cluster.spec.validate()?;

        let mut handle = ClusterHandle::new(name, namespace, cluster.spec.clone());
        handle.require("create", &[LifecycleState::Absent])?;

        self.api.create_cluster(&handle.namespace, &cluster).await?;
        self.cleanup.register_cluster(self.api.clone(), &handle.namespace, &handle.name);
        handle.state = LifecycleState::Creating;
        info!(
            cluster = %handle.name,
            size = handle.spec.size,
            "Cluster created, waiting for convergence"
        );

        let result = self.converge(&handle).await;
        handle.settle(result, LifecycleState::Converged)?;
        Ok(handle)
    }

    /// Submit a new spec for an existing cluster and wait until it converges
    ///
    /// The live object is re-fetched and `desired` merged onto it, so the
    /// update carries the live resource version.
    #[instrument(skip(self, handle, desired), fields(cluster = %handle.name))]
    pub async fn update_and_verify(
        &self,
        handle: &mut ClusterHandle,
        desired: DatabaseClusterSpec,
    ) -> Result<()> {
        handle.require("update", &[LifecycleState::Converged])?;
        desired.validate()?;

        let live = self.api.get_cluster(&handle.namespace, &handle.name).await?;
        let merged = merge_into(live, &desired);
        self.api.replace_cluster(&handle.namespace, &merged).await?;

        handle.spec = merged.spec;
        handle.state = LifecycleState::Updating;
        info!(
            cluster = %handle.name,
            size = handle.spec.size,
            image = %handle.spec.image,
            "Cluster updated, waiting for convergence"
        );

        let result = self.converge(handle).await;
        handle.settle(result, LifecycleState::Converged)
    }

    /// Delete a cluster and wait for its pods and storage claims to go away
    ///
    /// Allowed after a failed verification too, so a broken cluster can still
    /// be torn down and checked.
    #[instrument(skip(self, handle), fields(cluster = %handle.name))]
    pub async fn delete_and_verify(&self, handle: &mut ClusterHandle) -> Result<()> {
        handle.require("delete", &[LifecycleState::Converged, LifecycleState::Failed])?;

        match self.api.delete_cluster(&handle.namespace, &handle.name).await {
            Err(e) if e.is_not_found() => {
                info!(cluster = %handle.name, "Cluster already gone");
            }
            other => other?,
        }
        handle.state = LifecycleState::Deleting;
        info!(cluster = %handle.name, "Cluster deleted, waiting for teardown");

        let result = self.teardown(handle).await;
        handle.settle(result, LifecycleState::TornDown)
    }

    /// Check that every pod's containers declare exactly the cluster's resources
    ///
    /// Read-only. A cluster that declares no resources has nothing to check;
    /// otherwise one pod per node must be listed.
    #[instrument(skip(self, handle), fields(cluster = %handle.name))]
    pub async fn validate_resources(&self, handle: &ClusterHandle) -> Result<()> {
        handle.require("validate resources of", &[LifecycleState::Converged])?;
        let Some(declared) = handle.spec.resources.as_ref() else {
            info!(cluster = %handle.name, "No resources declared, nothing to validate");
            return Ok(());
        };

        let pods = self.api.list_pods(&handle.namespace, &handle.name).await?;
        validate_pod_resources(&handle.name, declared, handle.spec.node_count(), &pods)?;
        info!(cluster = %handle.name, pods = pods.len(), "Pod resources match the cluster");
        Ok(())
    }

    /// Update the cluster if it exists, create it otherwise
    ///
    /// An existing cluster was created outside this scope and is not
    /// registered for cleanup.
    pub async fn apply_and_verify(&self, cluster: DatabaseCluster) -> Result<ClusterHandle> {
        let (name, namespace) = self.identity(&cluster)?;
        match self.api.get_cluster(&namespace, &name).await {
            Ok(live) => {
                info!(cluster = %name, "Cluster exists, updating");
                let mut handle = ClusterHandle::new(name, namespace, live.spec);
                handle.state = LifecycleState::Converged;
                self.update_and_verify(&mut handle, cluster.spec).await?;
                Ok(handle)
            }
            Err(e) if e.is_not_found() => self.create_and_verify(cluster).await,
            Err(e) => Err(e),
        }
    }

    /// Take over an existing cluster without changing it
    ///
    /// The handle starts `Converged` if the current snapshot is converged and
    /// `Failed` otherwise; either state allows [`Self::verify`] and delete.
    pub async fn attach(&self, namespace: &str, name: &str) -> Result<ClusterHandle> {
        let live = self.api.get_cluster(namespace, name).await?;
        let verdict = evaluate(&live.spec, live.status.as_ref());
        info!(cluster = %name, %verdict, "Attached to existing cluster");

        let mut handle = ClusterHandle::new(name.to_string(), namespace.to_string(), live.spec);
        handle.state = if verdict.is_converged() {
            LifecycleState::Converged
        } else {
            LifecycleState::Failed
        };
        Ok(handle)
    }

    /// Wait for the cluster to converge to the handle's spec without changing it
    #[instrument(skip(self, handle), fields(cluster = %handle.name))]
    pub async fn verify(&self, handle: &mut ClusterHandle) -> Result<()> {
        handle.require("verify", &[LifecycleState::Converged, LifecycleState::Failed])?;
        let result = self.converge(handle).await;
        handle.settle(result, LifecycleState::Converged)
    }

    fn identity(&self, cluster: &DatabaseCluster) -> Result<(String, String)> {
        let name = cluster
            .metadata
            .name
            .clone()
            .ok_or_else(|| Error::configuration("cluster resource has no name"))?;
        let namespace = cluster
            .metadata
            .namespace
            .clone()
            .unwrap_or_else(|| self.config.namespace.clone());
        Ok((name, namespace))
    }

    async fn converge(&self, handle: &ClusterHandle) -> Result<()> {
        let api = self.api.as_ref();
        let (namespace, name) = (handle.namespace.as_str(), handle.name.as_str());
        let policy = PollPolicy::for_nodes(&self.config, handle.spec.node_count());

        wait_until_converged(name, &handle.spec, &policy, move || async move {
            api.get_cluster(namespace, name)
                .await
                .map(|cluster| cluster.status.unwrap_or_default())
        })
        .await
    }

    async fn teardown(&self, handle: &ClusterHandle) -> Result<()> {
        let api = self.api.as_ref();
        let (namespace, name) = (handle.namespace.as_str(), handle.name.as_str());
        let policy = PollPolicy::for_nodes(&self.config, handle.spec.node_count());
        let retention = ClaimRetention::for_storage(&handle.spec.storage);

        wait_until_absent(name, &policy, move || api.get_cluster(namespace, name)).await?;
        wait_for_teardown(
            name,
            retention,
            &policy,
            move || async move {
                let pods = api.list_pods(namespace, name).await?;
                Ok(pods.into_iter().filter_map(|pod| pod.metadata.name).collect())
            },
            move || api.list_claims(namespace, name),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleanup::TestContext;
    use crate::client::MockClusterApi;
    use crate::teardown::{ClaimPhase, StorageClaim};
    use crate::testing::{
        cluster, live, observed, pod, CLUSTER, NAMESPACE, NEW_IMAGE, OLD_IMAGE,
    };
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn config() -> HarnessConfig {
        HarnessConfig {
            poll_interval: Duration::from_secs(5),
            timeout_per_node: Duration::from_secs(60),
            ..Default::default()
        }
    }

    fn driver(api: MockClusterApi, ctx: &TestContext) -> ClusterLifecycle {
        ClusterLifecycle::new(Arc::new(api), config(), ctx.registry())
    }

    /// Expect `get_cluster` to show `images` only after `pending` empty ticks
    fn expect_converging(
        api: &mut MockClusterApi,
        spec: &DatabaseClusterSpec,
        images: &[&str],
        pending: u32,
    ) {
        let calls = Arc::new(AtomicU32::new(0));
        let ready = live(spec, Some(observed(spec, images)));
        let creating = live(spec, None);
        api.expect_get_cluster().returning(move |_, _| {
            if calls.fetch_add(1, Ordering::SeqCst) < pending {
                Ok(creating.clone())
            } else {
                Ok(ready.clone())
            }
        });
    }

    fn converged_handle(spec: DatabaseClusterSpec) -> ClusterHandle {
        let mut handle = ClusterHandle::new(CLUSTER.to_string(), NAMESPACE.to_string(), spec);
        handle.state = LifecycleState::Converged;
        handle
    }

    /// Story: after a successful create, every node is up with a node id
    #[tokio::test(start_paused = true)]
    async fn create_verifies_convergence_and_registers_cleanup() {
        let desired = cluster(3, OLD_IMAGE);
        let mut api = MockClusterApi::new();
        api.expect_create_cluster()
            .withf(|ns, c| ns == NAMESPACE && c.spec.size == 3)
            .times(1)
            .returning(|_, c| Ok(c.clone()));
        expect_converging(&mut api, &desired.spec, &[OLD_IMAGE; 3], 2);
        api.expect_delete_cluster().times(1).returning(|_, _| Ok(()));

        let mut ctx = TestContext::new(&config());
        let handle = driver(api, &ctx).create_and_verify(desired).await.unwrap();

        assert_eq!(handle.state(), LifecycleState::Converged);
        assert_eq!(handle.name(), CLUSTER);
        assert_eq!(ctx.registry().len(), 1);
        ctx.cleanup().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_create_is_terminal_and_not_registered() {
        let mut api = MockClusterApi::new();
        api.expect_create_cluster()
            .times(1)
            .returning(|_, _| Err(Error::spec_rejected(CLUSTER, "invalid storage class")));
        api.expect_get_cluster().never();

        let ctx = TestContext::new(&config());
        let err = driver(api, &ctx)
            .create_and_verify(cluster(2, OLD_IMAGE))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::SpecRejected { .. }));
        assert!(err.to_string().contains("invalid storage class"));
        assert!(ctx.registry().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn create_that_never_converges_times_out() {
        let desired = cluster(2, OLD_IMAGE);
        let mut api = MockClusterApi::new();
        api.expect_create_cluster().returning(|_, c| Ok(c.clone()));
        api.expect_get_cluster()
            .returning(|_, name| Err(Error::not_found("AerospikeCluster", name)));
        api.expect_delete_cluster()
            .times(1)
            .returning(|_, name| Err(Error::not_found("AerospikeCluster", name)));

        let mut ctx = TestContext::new(&config());
        let err = driver(api, &ctx).create_and_verify(desired).await.unwrap_err();

        assert!(matches!(err, Error::Timeout { .. }));
        // Registered before the wait started, so cleanup still covers it
        assert_eq!(ctx.registry().len(), 1);
        ctx.cleanup().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_spec_is_never_submitted() {
        let mut api = MockClusterApi::new();
        api.expect_create_cluster().never();

        let ctx = TestContext::new(&config());
        let err = driver(api, &ctx)
            .create_and_verify(cluster(0, OLD_IMAGE))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    /// Story: a rolling upgrade converges only once every pod runs the new image
    #[tokio::test(start_paused = true)]
    async fn update_merges_onto_live_object_and_waits_for_upgrade() {
        let old = cluster(3, OLD_IMAGE).spec;
        let mut new = old.clone();
        new.image = NEW_IMAGE.to_string();

        let mut api = MockClusterApi::new();
        let gets = Arc::new(AtomicU32::new(0));
        let rolling = [
            live(&old, Some(observed(&old, &[OLD_IMAGE; 3]))),
            live(&new, Some(observed(&new, &[OLD_IMAGE, OLD_IMAGE, NEW_IMAGE]))),
            live(&new, Some(observed(&new, &[OLD_IMAGE, NEW_IMAGE, NEW_IMAGE]))),
            live(&new, Some(observed(&new, &[NEW_IMAGE; 3]))),
        ];
        let g = gets.clone();
        api.expect_get_cluster().returning(move |_, _| {
            let n = g.fetch_add(1, Ordering::SeqCst) as usize;
            Ok(rolling[n.min(3)].clone())
        });
        api.expect_replace_cluster()
            .withf(|_, c| {
                c.spec.image == NEW_IMAGE
                    && c.metadata.resource_version.as_deref() == Some("42")
                    && c.status.is_none()
            })
            .times(1)
            .returning(|_, c| Ok(c.clone()));

        let ctx = TestContext::new(&config());
        let mut handle = converged_handle(old);
        driver(api, &ctx)
            .update_and_verify(&mut handle, new)
            .await
            .unwrap();

        assert_eq!(handle.state(), LifecycleState::Converged);
        assert_eq!(handle.spec().image, NEW_IMAGE);
        // one fetch for the merge, three polls
        assert_eq!(gets.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_update_marks_handle_failed() {
        let old = cluster(2, OLD_IMAGE).spec;
        let mut new = old.clone();
        new.image = NEW_IMAGE.to_string();

        let mut api = MockClusterApi::new();
        let stale = live(&new, Some(observed(&new, &[OLD_IMAGE, NEW_IMAGE])));
        api.expect_get_cluster().returning(move |_, _| Ok(stale.clone()));
        api.expect_replace_cluster().returning(|_, c| Ok(c.clone()));

        let ctx = TestContext::new(&config());
        let lifecycle = driver(api, &ctx);
        let mut handle = converged_handle(old);
        let err = lifecycle
            .update_and_verify(&mut handle, new.clone())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Timeout { .. }));
        assert_eq!(handle.state(), LifecycleState::Failed);

        let err = lifecycle.update_and_verify(&mut handle, new).await.unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn delete_waits_for_resource_pods_and_claims() {
        let spec = cluster(2, OLD_IMAGE).spec;
        let mut api = MockClusterApi::new();
        api.expect_delete_cluster()
            .withf(|ns, name| ns == NAMESPACE && name == CLUSTER)
            .times(1)
            .returning(|_, _| Ok(()));

        let gets = Arc::new(AtomicU32::new(0));
        let present = live(&spec, None);
        let g = gets.clone();
        api.expect_get_cluster().returning(move |_, name| {
            if g.fetch_add(1, Ordering::SeqCst) < 1 {
                Ok(present.clone())
            } else {
                Err(Error::not_found("AerospikeCluster", name))
            }
        });

        let pod_lists = Arc::new(AtomicU32::new(0));
        let p = pod_lists.clone();
        api.expect_list_pods().returning(move |_, _| {
            if p.fetch_add(1, Ordering::SeqCst) < 1 {
                Ok(vec![pod("aerocluster-0-0", "200m", "1Gi", "1Gi")])
            } else {
                Ok(Vec::new())
            }
        });

        let claim_lists = Arc::new(AtomicU32::new(0));
        let c = claim_lists.clone();
        api.expect_list_claims().returning(move |_, _| {
            if c.fetch_add(1, Ordering::SeqCst) < 2 {
                Ok(vec![StorageClaim::new("ns-aerocluster-0-0", ClaimPhase::Terminating)])
            } else {
                Ok(Vec::new())
            }
        });

        let ctx = TestContext::new(&config());
        let mut handle = converged_handle(spec);
        driver(api, &ctx).delete_and_verify(&mut handle).await.unwrap();

        assert_eq!(handle.state(), LifecycleState::TornDown);
        assert_eq!(gets.load(Ordering::SeqCst), 2);
        assert_eq!(pod_lists.load(Ordering::SeqCst), 2);
        assert_eq!(claim_lists.load(Ordering::SeqCst), 3);

        let mut api = MockClusterApi::new();
        api.expect_delete_cluster().never();
        let err = driver(api, &ctx).delete_and_verify(&mut handle).await.unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn delete_of_stuck_cluster_times_out() {
        let spec = cluster(1, OLD_IMAGE).spec;
        let mut api = MockClusterApi::new();
        api.expect_delete_cluster().returning(|_, _| Ok(()));
        let present = live(&spec, None);
        api.expect_get_cluster().returning(move |_, _| Ok(present.clone()));
        api.expect_list_pods().never();

        let ctx = TestContext::new(&config());
        let mut handle = converged_handle(spec);
        let err = driver(api, &ctx).delete_and_verify(&mut handle).await.unwrap_err();

        assert!(err.to_string().contains("disappear"));
        assert_eq!(handle.state(), LifecycleState::Failed);
    }

    /// Story: one pod out of three with the wrong memory limit fails validation
    #[tokio::test]
    async fn validate_resources_names_the_bad_pod() {
        let spec = cluster(3, OLD_IMAGE).spec;
        let mut api = MockClusterApi::new();
        api.expect_list_pods()
            .withf(|ns, name| ns == NAMESPACE && name == CLUSTER)
            .returning(|_, _| {
                Ok(vec![
                    pod("aerocluster-0-0", "200m", "1Gi", "1Gi"),
                    pod("aerocluster-0-1", "200m", "1Gi", "1Gi"),
                    pod("aerocluster-0-2", "200m", "1Gi", "3Gi"),
                ])
            });

        let ctx = TestContext::new(&config());
        let err = driver(api, &ctx)
            .validate_resources(&converged_handle(spec))
            .await
            .unwrap_err();

        assert!(
            matches!(err, Error::ResourceMismatch { ref pod, .. } if pod == "aerocluster-0-2")
        );
    }

    #[tokio::test]
    async fn validate_resources_fails_when_no_pods_are_listed() {
        let spec = cluster(2, OLD_IMAGE).spec;
        let mut api = MockClusterApi::new();
        api.expect_list_pods().returning(|_, _| Ok(Vec::new()));

        let ctx = TestContext::new(&config());
        let err = driver(api, &ctx)
            .validate_resources(&converged_handle(spec))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Fetch { .. }));
        assert!(err.to_string().contains("listed 0"));
    }

    #[tokio::test]
    async fn attach_reflects_current_snapshot() {
        let spec = cluster(2, OLD_IMAGE).spec;
        let mut api = MockClusterApi::new();
        let half = live(&spec, Some(observed(&spec, &[OLD_IMAGE])));
        api.expect_get_cluster().times(1).returning(move |_, _| Ok(half.clone()));

        let ctx = TestContext::new(&config());
        let handle = driver(api, &ctx).attach(NAMESPACE, CLUSTER).await.unwrap();
        assert_eq!(handle.state(), LifecycleState::Failed);
        assert_eq!(handle.spec(), &spec);
    }

    #[tokio::test(start_paused = true)]
    async fn verify_waits_for_attached_cluster() {
        let spec = cluster(2, OLD_IMAGE).spec;
        let mut api = MockClusterApi::new();
        expect_converging(&mut api, &spec, &[OLD_IMAGE; 2], 3);

        let ctx = TestContext::new(&config());
        let lifecycle = driver(api, &ctx);
        let mut handle = lifecycle.attach(NAMESPACE, CLUSTER).await.unwrap();
        assert_eq!(handle.state(), LifecycleState::Failed);

        lifecycle.verify(&mut handle).await.unwrap();
        assert_eq!(handle.state(), LifecycleState::Converged);
    }

    #[tokio::test(start_paused = true)]
    async fn apply_updates_existing_cluster() {
        let old = cluster(2, OLD_IMAGE);
        let mut new = old.clone();
        new.spec.size = 3;

        let mut api = MockClusterApi::new();
        let current = live(&new.spec, Some(observed(&new.spec, &[OLD_IMAGE; 3])));
        api.expect_get_cluster().returning(move |_, _| Ok(current.clone()));
        api.expect_replace_cluster().times(1).returning(|_, c| Ok(c.clone()));
        api.expect_create_cluster().never();

        let ctx = TestContext::new(&config());
        let handle = driver(api, &ctx).apply_and_verify(new).await.unwrap();

        assert_eq!(handle.spec().size, 3);
        assert!(ctx.registry().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn apply_creates_missing_cluster() {
        let desired = cluster(1, OLD_IMAGE);
        let mut api = MockClusterApi::new();
        let lookups = Arc::new(AtomicU32::new(0));
        let ready = live(&desired.spec, Some(observed(&desired.spec, &[OLD_IMAGE])));
        let l = lookups.clone();
        api.expect_get_cluster().returning(move |_, name| {
            if l.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(Error::not_found("AerospikeCluster", name))
            } else {
                Ok(ready.clone())
            }
        });
        api.expect_create_cluster().times(1).returning(|_, c| Ok(c.clone()));
        api.expect_replace_cluster().never();
        api.expect_delete_cluster().times(1).returning(|_, _| Ok(()));

        let mut ctx = TestContext::new(&config());
        let handle = driver(api, &ctx).apply_and_verify(desired).await.unwrap();

        assert_eq!(handle.state(), LifecycleState::Converged);
        assert_eq!(ctx.registry().len(), 1);
        ctx.cleanup().await.unwrap();
    }
}
