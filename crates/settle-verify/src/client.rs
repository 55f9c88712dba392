//! Cluster API access
//!
//! Lifecycle operations talk to the orchestration platform only through
//! [`ClusterApi`], so the driver can be tested against a mock while
//! production code uses the kube client.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::Client;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use settle_common::crd::{DatabaseCluster, VolumeMode};
use settle_common::{cluster_label_selector, Error, Result};

use crate::teardown::{ClaimPhase, StorageClaim};

/// Resource kind used in not-found errors
pub const CLUSTER_KIND: &str = "AerospikeCluster";

/// Operations the lifecycle driver needs from the platform
///
/// Implementations classify errors: a missing object is `Error::NotFound`,
/// a refused create or replace is `Error::SpecRejected`.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Fetch a cluster resource
    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<DatabaseCluster>;

    /// Create a cluster resource
    async fn create_cluster(
        &self,
        namespace: &str,
        cluster: &DatabaseCluster,
    ) -> Result<DatabaseCluster>;

    /// Replace a cluster resource; `cluster` must carry the live resource version
    async fn replace_cluster(
        &self,
        namespace: &str,
        cluster: &DatabaseCluster,
    ) -> Result<DatabaseCluster>;

    /// Request deletion of a cluster resource
    async fn delete_cluster(&self, namespace: &str, name: &str) -> Result<()>;

    /// List the pods belonging to a cluster
    async fn list_pods(&self, namespace: &str, cluster: &str) -> Result<Vec<Pod>>;

    /// List the storage claims belonging to a cluster
    async fn list_claims(&self, namespace: &str, cluster: &str) -> Result<Vec<StorageClaim>>;
}

/// [`ClusterApi`] backed by a kube client
#[derive(Clone)]
pub struct KubeClusterApi {
    client: Client,
}

impl KubeClusterApi {
    /// Create a new KubeClusterApi
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn clusters(&self, namespace: &str) -> Api<DatabaseCluster> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn owned_by(cluster: &str) -> ListParams {
        ListParams::default().labels(&cluster_label_selector(cluster))
    }
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<DatabaseCluster> {
        self.clusters(namespace)
            .get_opt(name)
            .await
            .map_err(|e| classify_read(name, e))?
            .ok_or_else(|| Error::not_found(CLUSTER_KIND, name))
    }

    async fn create_cluster(
        &self,
        namespace: &str,
        cluster: &DatabaseCluster,
    ) -> Result<DatabaseCluster> {
        let name = cluster.metadata.name.as_deref().unwrap_or_default();
        debug!(cluster = %name, namespace = %namespace, "Creating cluster resource");
        self.clusters(namespace)
            .create(&PostParams::default(), cluster)
            .await
            .map_err(|e| classify_mutation(name, e))
    }

    async fn replace_cluster(
        &self,
        namespace: &str,
        cluster: &DatabaseCluster,
    ) -> Result<DatabaseCluster> {
        let name = cluster.metadata.name.as_deref().unwrap_or_default();
        debug!(cluster = %name, namespace = %namespace, "Replacing cluster resource");
        self.clusters(namespace)
            .replace(name, &PostParams::default(), cluster)
            .await
            .map_err(|e| classify_mutation(name, e))
    }

    async fn delete_cluster(&self, namespace: &str, name: &str) -> Result<()> {
        debug!(cluster = %name, namespace = %namespace, "Deleting cluster resource");
        self.clusters(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| classify_read(name, e))
    }

    async fn list_pods(&self, namespace: &str, cluster: &str) -> Result<Vec<Pod>> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let list = pods
            .list(&Self::owned_by(cluster))
            .await
            .map_err(|e| classify_read(cluster, e))?;
        Ok(list.items)
    }

    async fn list_claims(&self, namespace: &str, cluster: &str) -> Result<Vec<StorageClaim>> {
        let claims: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), namespace);
        let list = claims
            .list(&Self::owned_by(cluster))
            .await
            .map_err(|e| classify_read(cluster, e))?;
        Ok(list.items.iter().map(claim_from_pvc).collect())
    }
}

/// Phase of a listed claim; listing never returns `Absent`
pub fn claim_from_pvc(pvc: &PersistentVolumeClaim) -> StorageClaim {
    let phase = if pvc.metadata.deletion_timestamp.is_some() {
        ClaimPhase::Terminating
    } else {
        ClaimPhase::Bound
    };
    let mode = match pvc.spec.as_ref().and_then(|spec| spec.volume_mode.as_deref()) {
        Some("Block") => VolumeMode::Block,
        _ => VolumeMode::Filesystem,
    };
    StorageClaim::new(pvc.metadata.name.clone().unwrap_or_default(), phase).with_mode(mode)
}

fn classify_read(name: &str, e: kube::Error) -> Error {
    match e {
        kube::Error::Api(ae) if ae.code == 404 => Error::not_found(CLUSTER_KIND, name),
        other => Error::from(other),
    }
}

fn classify_mutation(name: &str, e: kube::Error) -> Error {
    match e {
        kube::Error::Api(ae) if ae.code == 404 => Error::not_found(CLUSTER_KIND, name),
        kube::Error::Api(ae) if (400..500).contains(&ae.code) => {
            Error::spec_rejected(name, ae.message)
        }
        other => Error::from(other),
    }
}
