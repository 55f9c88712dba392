//! Shared types embedded in the DatabaseCluster spec and status

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// =============================================================================
// Resources
// =============================================================================

/// CPU and memory quantities in Kubernetes notation (e.g. "200m", "1Gi")
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ResourceQuantities {
    /// CPU quantity
    pub cpu: String,
    /// Memory quantity
    pub memory: String,
}

impl ResourceQuantities {
    /// Create a quantity pair
    pub fn new(cpu: impl Into<String>, memory: impl Into<String>) -> Self {
        Self {
            cpu: cpu.into(),
            memory: memory.into(),
        }
    }
}

/// Per-node resource request/limit pair
///
/// `limits >= requests` is the caller's responsibility and is not checked here.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ResourceSpec {
    /// Requested resources
    pub requests: ResourceQuantities,
    /// Resource limits
    pub limits: ResourceQuantities,
}

impl ResourceSpec {
    /// Requests and limits set to the same quantities
    pub fn guaranteed(cpu: impl Into<String>, memory: impl Into<String>) -> Self {
        let quantities = ResourceQuantities::new(cpu, memory);
        Self {
            requests: quantities.clone(),
            limits: quantities,
        }
    }
}

// =============================================================================
// Storage
// =============================================================================

/// How a persistent volume is exposed to the database process
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum VolumeMode {
    /// Raw block device
    #[default]
    #[serde(rename = "block")]
    Block,
    /// Mounted filesystem
    #[serde(rename = "filesystem")]
    Filesystem,
}

impl std::fmt::Display for VolumeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VolumeMode::Block => write!(f, "block"),
            VolumeMode::Filesystem => write!(f, "filesystem"),
        }
    }
}

/// How a volume is initialized when first attached
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum VolumeInitMethod {
    /// Leave the volume untouched
    #[serde(rename = "none")]
    None,
    /// Zero the device with dd
    #[serde(rename = "dd")]
    Dd,
    /// Discard all blocks
    #[serde(rename = "blkdiscard")]
    Blkdiscard,
    /// Delete files on a filesystem volume
    #[serde(rename = "deleteFiles")]
    DeleteFiles,
}

/// Policy applied to every volume of one mode
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VolumePolicy {
    /// Initialization method for new volumes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_method: Option<VolumeInitMethod>,

    /// Delete the volume's claim when the cluster is deleted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cascade_delete: Option<bool>,
}

/// A single persistent volume attached to every node
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSpec {
    /// Device path or mount path inside the container
    pub path: String,
    /// Size in GiB
    #[serde(rename = "sizeInGB")]
    pub size_in_gb: u32,
    /// Storage class of the claim
    pub storage_class: String,
    /// Block or filesystem
    pub volume_mode: VolumeMode,
}

impl VolumeSpec {
    /// Create a volume descriptor
    pub fn new(
        path: impl Into<String>,
        size_in_gb: u32,
        storage_class: impl Into<String>,
        volume_mode: VolumeMode,
    ) -> Self {
        Self {
            path: path.into(),
            size_in_gb,
            storage_class: storage_class.into(),
            volume_mode,
        }
    }
}

/// Storage topology of a cluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StorageSpec {
    /// Policy for block volumes
    #[serde(default)]
    pub block_volume_policy: VolumePolicy,

    /// Policy for filesystem volumes
    #[serde(default)]
    pub filesystem_volume_policy: VolumePolicy,

    /// Volumes attached to each node
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<VolumeSpec>,
}

impl StorageSpec {
    /// Policy governing every volume of `mode`
    pub fn policy_for(&self, mode: VolumeMode) -> &VolumePolicy {
        match mode {
            VolumeMode::Block => &self.block_volume_policy,
            VolumeMode::Filesystem => &self.filesystem_volume_policy,
        }
    }

    /// Returns true if claims of `mode` volumes outlive the cluster
    ///
    /// An unset cascade flag counts as "retain", matching the operator's default.
    /// A mode no volume uses has no claims to retain.
    pub fn retains_claims(&self, mode: VolumeMode) -> bool {
        self.volumes.iter().any(|volume| volume.volume_mode == mode)
            && !self.policy_for(mode).cascade_delete.unwrap_or(false)
    }
}

// =============================================================================
// Access control and secrets
// =============================================================================

/// A database user managed by the operator
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserSpec {
    /// User name
    pub name: String,
    /// Secret holding the user's password
    pub secret_name: String,
    /// Roles granted to the user
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Access control list for the cluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct AccessControlSpec {
    /// Users to create
    #[serde(default)]
    pub users: Vec<UserSpec>,
}

/// Secret mounted into every node (TLS material, feature keys)
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSecretSpec {
    /// Secret name
    pub secret_name: String,
    /// Mount path inside the container
    pub mount_path: String,
}

// =============================================================================
// Rack awareness
// =============================================================================

/// A rack nodes can be assigned to
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Rack {
    /// Rack identifier
    pub id: i32,
    /// Availability zone constraint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    /// Region constraint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Node name constraint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
}

/// Rack configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct RackConfig {
    /// Racks the cluster spreads across
    #[serde(default)]
    pub racks: Vec<Rack>,
}

// =============================================================================
// Observed pod status
// =============================================================================

/// Database-level identity of a running node
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeSummary {
    /// Node identity within the database cluster, empty until registered
    #[serde(default, rename = "nodeID")]
    pub node_id: String,
    /// Database cluster name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,
}

/// Status of a single compute unit as recorded by the reconciler
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PodStatus {
    /// Image actually running
    #[serde(default)]
    pub image: String,

    /// Pod IP
    #[serde(default, rename = "podIP", skip_serializing_if = "Option::is_none")]
    pub pod_ip: Option<String>,

    /// Host IP
    #[serde(default, rename = "hostIP", skip_serializing_if = "Option::is_none")]
    pub host_ip: Option<String>,

    /// Database node summary
    #[serde(default, rename = "aerospike")]
    pub node: NodeSummary,

    /// Rack the pod was placed in
    #[serde(default, rename = "rackID", skip_serializing_if = "Option::is_none")]
    pub rack_id: Option<i32>,
}

impl PodStatus {
    /// Pod status with an image and node identity
    pub fn new(image: impl Into<String>, node_id: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            node: NodeSummary {
                node_id: node_id.into(),
                cluster_name: None,
            },
            ..Default::default()
        }
    }

    /// Node identity assigned by the reconciler (empty until registered)
    pub fn node_id(&self) -> &str {
        &self.node.node_id
    }
}

/// Pod statuses keyed by pod name (iteration is ordered by name)
pub type PodStatusMap = BTreeMap<String, PodStatus>;
