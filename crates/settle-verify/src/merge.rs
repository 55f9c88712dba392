//! Update merge
//!
//! An update re-fetches the live object and writes the caller's intended
//! fields onto it, field by field, so the submitted object keeps the live
//! metadata (resource version, uid, server-set labels) and any optional
//! section the caller left unset.

use settle_common::crd::{DatabaseCluster, DatabaseClusterSpec};

/// Merge the desired spec onto the live spec
///
/// Required fields always take the desired value. Optional sections keep the
/// live value when the desired one is unset, except access control: leaving
/// it unset removes it. The database configuration map is replaced whole.
pub fn merge_spec(
    live: &DatabaseClusterSpec,
    desired: &DatabaseClusterSpec,
) -> DatabaseClusterSpec {
    DatabaseClusterSpec {
        size: desired.size,
        image: desired.image.clone(),
        storage: desired.storage.clone(),
        access_control: desired.access_control.clone(),
        config_secret: desired.config_secret.clone(),
        multi_pod_per_host: desired.multi_pod_per_host,
        resources: desired.resources.clone().or_else(|| live.resources.clone()),
        rack_config: desired.rack_config.clone().or_else(|| live.rack_config.clone()),
        config: desired.config.clone(),
    }
}

/// The live object with its spec replaced by the merged spec
///
/// Status is dropped: the API ignores it on replace and it must not be
/// mistaken for the outcome of this update.
pub fn merge_into(live: DatabaseCluster, desired: &DatabaseClusterSpec) -> DatabaseCluster {
    let spec = merge_spec(&live.spec, desired);
    DatabaseCluster {
        metadata: live.metadata,
        spec,
        status: None,
    }
}
