//! Per-container resource validation
//!
//! After convergence every container of every pod must declare exactly the
//! CPU and memory the cluster declares. Quantities compare by value.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use tracing::debug;

use settle_common::crd::{ResourceQuantities, ResourceSpec};
use settle_common::quantity::quantities_equal;
use settle_common::{Error, Result};

const UNSET: &str = "<unset>";

/// Check every container of every pod against the declared resources
///
/// Exactly `expected_pods` pods must be listed and each must have at least one
/// container, so an empty listing never passes. Returns the first mismatch
/// found, scanning pods in the order given and containers in declaration order.
pub fn validate_pod_resources(
    cluster: &str,
    declared: &ResourceSpec,
    expected_pods: usize,
    pods: &[Pod],
) -> Result<()> {
    if pods.len() != expected_pods {
        return Err(Error::fetch(
            cluster,
            format!("expected {expected_pods} pods to validate, listed {}", pods.len()),
        ));
    }

    for pod in pods {
        let pod_name = pod.metadata.name.as_deref().unwrap_or_default();
        let containers = pod.spec.as_ref().map(|s| s.containers.as_slice()).unwrap_or_default();
        if containers.is_empty() {
            return Err(Error::ResourceMismatch {
                pod: pod_name.to_string(),
                container: UNSET.to_string(),
                resource: "containers".to_string(),
                expected: "at least one".to_string(),
                actual: "0".to_string(),
            });
        }

        for container in containers {
            let resources = container.resources.as_ref();
            check(
                pod_name,
                &container.name,
                "request",
                &declared.requests,
                resources.and_then(|r| r.requests.as_ref()),
            )?;
            check(
                pod_name,
                &container.name,
                "limit",
                &declared.limits,
                resources.and_then(|r| r.limits.as_ref()),
            )?;
        }
        debug!(pod = %pod_name, containers = containers.len(), "Pod resources match");
    }
    Ok(())
}

fn check(
    pod: &str,
    container: &str,
    kind: &str,
    declared: &ResourceQuantities,
    actual: Option<&BTreeMap<String, Quantity>>,
) -> Result<()> {
    for (resource, expected) in [("cpu", &declared.cpu), ("memory", &declared.memory)] {
        let actual = actual
            .and_then(|quantities| quantities.get(resource))
            .map(|q| q.0.as_str())
            .unwrap_or(UNSET);
        if !quantities_equal(expected, actual) {
            return Err(Error::ResourceMismatch {
                pod: pod.to_string(),
                container: container.to_string(),
                resource: format!("{resource} {kind}"),
                expected: expected.clone(),
                actual: actual.to_string(),
            });
        }
    }
    Ok(())
}
