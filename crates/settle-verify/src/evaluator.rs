//! Convergence evaluation
//!
//! Decides from one observed snapshot whether a cluster has reached its
//! desired state. Evaluation is a pure function: the same inputs always give
//! the same verdict, and nothing is fetched or logged here. The poller owns
//! repetition and reporting.

use std::fmt;

use settle_common::crd::{DatabaseClusterSpec, DatabaseClusterStatus, ResourceSpec};
use settle_common::quantity::quantities_equal;

/// Why a snapshot is not yet converged
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PendingReason {
    /// The cluster resource does not exist (yet)
    NotFound,
    /// The reconciler has not yet rolled out the desired size
    StatusSize {
        /// Desired node count
        expected: i32,
        /// Size recorded in the status
        actual: i32,
    },
    /// The number of running pods differs from the desired node count
    PodCount {
        /// Desired node count
        expected: usize,
        /// Pods reported in the status
        actual: usize,
    },
    /// The reconciler's applied spec differs from the desired spec
    SpecNotApplied {
        /// First field that differs, in declaration order
        field: &'static str,
    },
    /// A pod has not been assigned a node identity
    MissingNodeId {
        /// Pod name
        pod: String,
    },
}

impl fmt::Display for PendingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PendingReason::NotFound => write!(f, "cluster not found"),
            PendingReason::StatusSize { expected, actual } => {
                write!(f, "status size is {actual}, want {expected}")
            }
            PendingReason::PodCount { expected, actual } => {
                write!(f, "{actual} pods reported, want {expected}")
            }
            PendingReason::SpecNotApplied { field } => {
                write!(f, "applied spec differs at {field}")
            }
            PendingReason::MissingNodeId { pod } => write!(f, "pod {pod} has no node id"),
        }
    }
}

/// A pod running something other than the desired image
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaleImage {
    /// Pod name
    pub pod: String,
    /// Image the pod reports
    pub image: String,
}

/// Advisory mismatch found after every structural check passed
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Divergence {
    /// Pods still running an image other than the desired one
    ImageMismatch {
        /// Desired image
        expected: String,
        /// Every pod that reports a different image, in pod-name order
        pods: Vec<StaleImage>,
    },
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Divergence::ImageMismatch { expected, pods } => {
                let stale: Vec<String> = pods
                    .iter()
                    .map(|p| format!("{} ({})", p.pod, p.image))
                    .collect();
                write!(f, "image {expected} not running on {}", stale.join(", "))
            }
        }
    }
}

/// Outcome of comparing desired state against one snapshot
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConvergenceVerdict {
    /// Not there yet; keep polling
    Pending(PendingReason),
    /// Structurally complete but an advisory check failed; not success
    Diverged(Divergence),
    /// Observed state matches the desired state
    Converged,
}

impl ConvergenceVerdict {
    /// True only for [`ConvergenceVerdict::Converged`]
    pub fn is_converged(&self) -> bool {
        matches!(self, ConvergenceVerdict::Converged)
    }
}

impl fmt::Display for ConvergenceVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConvergenceVerdict::Pending(reason) => write!(f, "pending: {reason}"),
            ConvergenceVerdict::Diverged(divergence) => write!(f, "diverged: {divergence}"),
            ConvergenceVerdict::Converged => write!(f, "converged"),
        }
    }
}

/// Compare the desired spec against an observed status
///
/// `None` means the cluster resource was not found. Checks run in a fixed
/// order and the first failing structural check decides the verdict. Image
/// mismatches are collected across every pod before deciding.
pub fn evaluate(
    desired: &DatabaseClusterSpec,
    observed: Option<&DatabaseClusterStatus>,
) -> ConvergenceVerdict {
    let Some(status) = observed else {
        return ConvergenceVerdict::Pending(PendingReason::NotFound);
    };

    if status.reconciled_size() != desired.size {
        return ConvergenceVerdict::Pending(PendingReason::StatusSize {
            expected: desired.size,
            actual: status.reconciled_size(),
        });
    }

    let expected_pods = desired.node_count();
    if status.pods.len() != expected_pods {
        return ConvergenceVerdict::Pending(PendingReason::PodCount {
            expected: expected_pods,
            actual: status.pods.len(),
        });
    }

    if let Some(field) = first_difference(desired, &status.applied) {
        return ConvergenceVerdict::Pending(PendingReason::SpecNotApplied { field });
    }

    let mut stale = Vec::new();
    for (pod, pod_status) in &status.pods {
        if pod_status.node_id().is_empty() {
            return ConvergenceVerdict::Pending(PendingReason::MissingNodeId { pod: pod.clone() });
        }
        if pod_status.image != desired.image {
            stale.push(StaleImage {
                pod: pod.clone(),
                image: pod_status.image.clone(),
            });
        }
    }

    if stale.is_empty() {
        ConvergenceVerdict::Converged
    } else {
        ConvergenceVerdict::Diverged(Divergence::ImageMismatch {
            expected: desired.image.clone(),
            pods: stale,
        })
    }
}

/// Name of the first field where the applied spec differs from the desired one
///
/// Resource quantities compare by value, so an applied "1024Mi" matches a
/// desired "1Gi". Everything else is deep equality.
pub fn first_difference(
    desired: &DatabaseClusterSpec,
    applied: &DatabaseClusterSpec,
) -> Option<&'static str> {
    if desired.size != applied.size {
        return Some("size");
    }
    if desired.image != applied.image {
        return Some("image");
    }
    if desired.storage.volumes != applied.storage.volumes {
        return Some("storage.volumes");
    }
    if desired.storage.block_volume_policy != applied.storage.block_volume_policy {
        return Some("storage.blockVolumePolicy");
    }
    if desired.storage.filesystem_volume_policy != applied.storage.filesystem_volume_policy {
        return Some("storage.filesystemVolumePolicy");
    }
    if desired.access_control != applied.access_control {
        return Some("aerospikeAccessControl");
    }
    if desired.config_secret != applied.config_secret {
        return Some("aerospikeConfigSecret");
    }
    if desired.multi_pod_per_host != applied.multi_pod_per_host {
        return Some("multiPodPerHost");
    }
    if !resources_equal(desired.resources.as_ref(), applied.resources.as_ref()) {
        return Some("resources");
    }
    if desired.rack_config != applied.rack_config {
        return Some("rackConfig");
    }
    if desired.config != applied.config {
        return Some("aerospikeConfig");
    }
    None
}

fn resources_equal(a: Option<&ResourceSpec>, b: Option<&ResourceSpec>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => {
            quantities_equal(&a.requests.cpu, &b.requests.cpu)
                && quantities_equal(&a.requests.memory, &b.requests.memory)
                && quantities_equal(&a.limits.cpu, &b.limits.cpu)
                && quantities_equal(&a.limits.memory, &b.limits.memory)
        }
        _ => false,
    }
}
