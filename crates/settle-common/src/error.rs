//! Error types for settle
//!
//! Errors are structured with fields so that a failed verification says which
//! invariant broke (pod count, applied spec, node identity, stuck storage
//! claim, resource quantity) instead of a bare "timed out".

use std::time::Duration;

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for settle operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error that has not been classified further
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// The requested object does not exist (yet, or any more)
    ///
    /// Transient while waiting for a create or update to become visible,
    /// expected terminal condition while waiting for a delete.
    #[error("{kind} {name} not found")]
    NotFound {
        /// Resource kind (e.g. "DatabaseCluster")
        kind: String,
        /// Object name
        name: String,
    },

    /// Non-recoverable error while fetching observed state
    #[error("fetch error for {cluster}: {message}")]
    Fetch {
        /// Cluster being observed
        cluster: String,
        /// Description of what failed
        message: String,
    },

    /// Deadline exceeded while the cluster was still pending
    #[error("timed out after {elapsed:?} waiting for {cluster} to {operation}: {last_observed}")]
    Timeout {
        /// Cluster being observed
        cluster: String,
        /// What the wait was for (e.g. "converge", "disappear")
        operation: String,
        /// Time spent waiting
        elapsed: Duration,
        /// Diagnostic for the last snapshot seen before the deadline
        last_observed: String,
    },

    /// Deadline exceeded while pods or storage claims were still present
    #[error("timed out during {phase} teardown of {cluster}, still present: {}", .stuck.join(", "))]
    TeardownTimeout {
        /// Cluster being torn down
        cluster: String,
        /// Teardown phase that did not complete ("pod" or "storage claim")
        phase: String,
        /// Identifiers of the objects that were still present
        stuck: Vec<String>,
    },

    /// The API refused the requested mutation outright
    #[error("spec rejected for {cluster}: {message}")]
    SpecRejected {
        /// Cluster the mutation targeted
        cluster: String,
        /// Message returned by the API, verbatim
        message: String,
    },

    /// A pod's declared resources differ from the cluster's declared resources
    #[error("{resource} not matching on {pod}/{container}: want {expected}, got {actual}")]
    ResourceMismatch {
        /// Pod name
        pod: String,
        /// Container name
        container: String,
        /// Resource field (e.g. "memory limit")
        resource: String,
        /// Quantity declared on the cluster
        expected: String,
        /// Quantity declared on the container
        actual: String,
    },

    /// A lifecycle operation was requested in a state that does not allow it
    #[error("cannot {operation} {cluster} while {state}")]
    InvalidTransition {
        /// Cluster handle name
        cluster: String,
        /// Requested operation
        operation: String,
        /// Current lifecycle state
        state: String,
    },

    /// Invalid harness configuration
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of what's invalid
        message: String,
    },

    /// Fixture loading error
    #[error("fixture error [{path}]: {message}")]
    Fixture {
        /// Directory or file being loaded
        path: String,
        /// Description of what failed
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred
        context: String,
    },
}

impl Error {
    /// Create a not-found error for a resource kind and name
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a fetch error with cluster context
    pub fn fetch(cluster: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Fetch {
            cluster: cluster.into(),
            message: msg.into(),
        }
    }

    /// Create a timeout error carrying the last observed diagnostic
    pub fn timeout(
        cluster: impl Into<String>,
        operation: impl Into<String>,
        elapsed: Duration,
        last_observed: impl Into<String>,
    ) -> Self {
        Self::Timeout {
            cluster: cluster.into(),
            operation: operation.into(),
            elapsed,
            last_observed: last_observed.into(),
        }
    }

    /// Create a teardown timeout naming the stuck identifiers
    pub fn teardown_timeout(
        cluster: impl Into<String>,
        phase: impl Into<String>,
        stuck: Vec<String>,
    ) -> Self {
        Self::TeardownTimeout {
            cluster: cluster.into(),
            phase: phase.into(),
            stuck,
        }
    }

    /// Create a spec rejection error
    pub fn spec_rejected(cluster: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::SpecRejected {
            cluster: cluster.into(),
            message: msg.into(),
        }
    }

    /// Create an invalid lifecycle transition error
    pub fn invalid_transition(
        cluster: impl Into<String>,
        operation: impl Into<String>,
        state: impl Into<String>,
    ) -> Self {
        Self::InvalidTransition {
            cluster: cluster.into(),
            operation: operation.into(),
            state: state.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }

    /// Create a fixture loading error
    pub fn fixture(path: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Fixture {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error means the object does not exist
    ///
    /// Unclassified kube errors are inspected for an HTTP 404 so callers can
    /// use the raw client without converting first.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Kube {
                source: kube::Error::Api(ae),
            } => ae.code == 404,
            _ => false,
        }
    }

    /// Check if this error is retryable
    ///
    /// Used by cleanup, which retries deletes until its own deadline.
    /// Rejections and mismatches are deterministic and never retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => {
                !matches!(
                    source,
                    kube::Error::Api(ae) if (400..500).contains(&ae.code)
                )
            }
            Error::NotFound { .. } => true,
            Error::Fetch { .. } => true,
            Error::Internal { .. } => true,
            Error::Timeout { .. }
            | Error::TeardownTimeout { .. }
            | Error::SpecRejected { .. }
            | Error::ResourceMismatch { .. }
            | Error::InvalidTransition { .. }
            | Error::Configuration { .. }
            | Error::Fixture { .. }
            | Error::Serialization { .. } => false,
        }
    }

    /// Get the cluster name if this error is associated with a specific cluster
    pub fn cluster(&self) -> Option<&str> {
        match self {
            Error::Fetch { cluster, .. }
            | Error::Timeout { cluster, .. }
            | Error::TeardownTimeout { cluster, .. }
            | Error::SpecRejected { cluster, .. }
            | Error::InvalidTransition { cluster, .. } => Some(cluster),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::serialization(e.to_string())
    }
}
