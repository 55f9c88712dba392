//! Desired-state resource definitions

mod cluster;
mod types;

pub use cluster::{DatabaseCluster, DatabaseClusterSpec, DatabaseClusterStatus};
pub use types::{
    AccessControlSpec, ConfigSecretSpec, NodeSummary, PodStatus, PodStatusMap, Rack, RackConfig,
    ResourceQuantities, ResourceSpec, StorageSpec, UserSpec, VolumeInitMethod, VolumeMode,
    VolumePolicy, VolumeSpec,
};
