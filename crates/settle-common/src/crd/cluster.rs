//! DatabaseCluster Custom Resource Definition
//!
//! The desired-state resource the database operator reconciles. settle only
//! reads and submits it; the operator owns the CRD installation.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{
    AccessControlSpec, ConfigSecretSpec, PodStatusMap, RackConfig, ResourceSpec, StorageSpec,
};

/// Desired state of a database cluster
///
/// The reconciler writes an applied copy of this spec back into the status
/// once a change has been rolled out, which is what convergence compares
/// against.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "aerospike.com",
    version = "v1alpha1",
    kind = "AerospikeCluster",
    root = "DatabaseCluster",
    plural = "aerospikeclusters",
    shortname = "aeroc",
    status = "DatabaseClusterStatus",
    namespaced
)]
#[serde(default, rename_all = "camelCase")]
pub struct DatabaseClusterSpec {
    /// Number of nodes
    pub size: i32,

    /// Container image reference for every node
    pub image: String,

    /// Persistent storage topology
    pub storage: StorageSpec,

    /// Users and roles
    #[serde(
        rename = "aerospikeAccessControl",
        skip_serializing_if = "Option::is_none"
    )]
    pub access_control: Option<AccessControlSpec>,

    /// Secret mounted into every node
    #[serde(rename = "aerospikeConfigSecret")]
    pub config_secret: ConfigSecretSpec,

    /// Allow more than one node per Kubernetes host
    pub multi_pod_per_host: bool,

    /// Per-node CPU and memory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceSpec>,

    /// Rack awareness
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rack_config: Option<RackConfig>,

    /// Database configuration, passed through to the server verbatim
    #[serde(rename = "aerospikeConfig")]
    pub config: BTreeMap<String, serde_json::Value>,
}

impl DatabaseClusterSpec {
    /// Number of nodes the cluster should run
    ///
    /// Negative sizes are rejected by `validate`; they count as zero here.
    pub fn node_count(&self) -> usize {
        usize::try_from(self.size).unwrap_or(0)
    }

    /// Validate the parts of the spec the harness relies on
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.size < 1 {
            return Err(crate::Error::configuration(format!(
                "cluster size must be at least 1, got {}",
                self.size
            )));
        }
        if self.image.trim().is_empty() {
            return Err(crate::Error::configuration("image cannot be empty"));
        }
        Ok(())
    }
}

/// Observed state of a database cluster
///
/// The applied spec is inlined, so `size` and `image` at the top level of
/// the status are the values the reconciler last rolled out.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseClusterStatus {
    /// Copy of the spec the reconciler believes it last applied
    #[serde(flatten)]
    pub applied: DatabaseClusterSpec,

    /// Per-pod status, keyed by pod name
    #[serde(default)]
    pub pods: PodStatusMap,
}

impl DatabaseClusterStatus {
    /// Size the reconciler last applied
    pub fn reconciled_size(&self) -> i32 {
        self.applied.size
    }
}
