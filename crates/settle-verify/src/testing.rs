//! Shared builders for unit tests

use k8s_openapi::api::core::v1::{Container, Pod, PodSpec, ResourceRequirements};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::ObjectMeta;
use std::collections::BTreeMap;

use settle_common::crd::{DatabaseCluster, DatabaseClusterSpec, DatabaseClusterStatus, PodStatus};
use settle_common::fixtures::sample_cluster;

pub const OLD_IMAGE: &str = "aerospike/aerospike-server-enterprise:5.4.0.5";
pub const NEW_IMAGE: &str = "aerospike/aerospike-server-enterprise:5.5.0.3";
pub const NAMESPACE: &str = "test";
pub const CLUSTER: &str = "aerocluster";

pub fn cluster(size: i32, image: &str) -> DatabaseCluster {
    sample_cluster(CLUSTER, NAMESPACE, size, image)
}

pub fn desired_spec(size: i32, image: &str) -> DatabaseClusterSpec {
    cluster(size, image).spec
}

/// Status with the desired spec applied and one pod per image, each with a node id
pub fn observed(desired: &DatabaseClusterSpec, images: &[&str]) -> DatabaseClusterStatus {
    DatabaseClusterStatus {
        applied: desired.clone(),
        pods: images
            .iter()
            .enumerate()
            .map(|(i, image)| {
                (
                    format!("{CLUSTER}-0-{i}"),
                    PodStatus::new(*image, format!("BB9{i}0A1C2E3F4")),
                )
            })
            .collect(),
    }
}

/// The live object as the API would return it with the given status
pub fn live(spec: &DatabaseClusterSpec, status: Option<DatabaseClusterStatus>) -> DatabaseCluster {
    let mut cluster = cluster(spec.size, &spec.image);
    cluster.spec = spec.clone();
    cluster.metadata.resource_version = Some("42".to_string());
    cluster.status = status;
    cluster
}

/// A pod with one container declaring the given requests and limits
pub fn pod(name: &str, cpu: &str, memory: &str, memory_limit: &str) -> Pod {
    let quantities = |cpu: &str, memory: &str| {
        BTreeMap::from([
            ("cpu".to_string(), Quantity(cpu.to_string())),
            ("memory".to_string(), Quantity(memory.to_string())),
        ])
    };
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(NAMESPACE.to_string()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![Container {
                name: "aerospike-server".to_string(),
                resources: Some(ResourceRequirements {
                    requests: Some(quantities(cpu, memory)),
                    limits: Some(quantities(cpu, memory_limit)),
                    ..Default::default()
                }),
                ..Default::default()
            }],
            ..Default::default()
        }),
        status: None,
    }
}
