//! Common types for settle: the cluster resource, errors, configuration, and utilities

#![deny(missing_docs)]

pub mod config;
pub mod crd;
pub mod error;
pub mod fixtures;
pub mod quantity;
pub mod retry;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Label key every object of a database deployment carries
pub const LABEL_APP: &str = "app";

/// Value of [`LABEL_APP`] for database clusters
pub const LABEL_APP_VALUE: &str = "aerospike-cluster";

/// Label key naming the cluster resource that owns a pod or storage claim
pub const LABEL_CLUSTER: &str = "aerospike.com/cr";

/// Label selector for pods and storage claims owned by a cluster
pub fn cluster_label_selector(cluster: &str) -> String {
    format!("{LABEL_APP}={LABEL_APP_VALUE},{LABEL_CLUSTER}={cluster}")
}
