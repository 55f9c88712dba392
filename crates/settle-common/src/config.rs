//! Harness configuration
//!
//! Every knob here affects timing or which images are exercised, never how
//! convergence is decided. Values come from defaults, then `SETTLE_*`
//! environment variables, then whatever the caller overrides.

use std::time::Duration;

use crate::{Error, Result};

/// Image the cluster is created with
pub const DEFAULT_CLUSTER_IMAGE: &str = "aerospike/aerospike-server-enterprise:5.4.0.5";

/// Image rolling-upgrade scenarios move the cluster to
pub const DEFAULT_UPGRADE_IMAGE: &str = "aerospike/aerospike-server-enterprise:5.5.0.3";

/// Default interval between polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default convergence timeout per node
pub const DEFAULT_TIMEOUT_PER_NODE: Duration = Duration::from_secs(300);

/// Default deadline for deleting objects registered for cleanup
pub const DEFAULT_CLEANUP_TIMEOUT: Duration = Duration::from_secs(200);

/// Default retry interval for cleanup deletes
pub const DEFAULT_CLEANUP_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Environment variable names
pub mod env {
    /// Poll interval in seconds
    pub const POLL_INTERVAL_SECS: &str = "SETTLE_POLL_INTERVAL_SECS";
    /// Convergence timeout per node in seconds
    pub const TIMEOUT_PER_NODE_SECS: &str = "SETTLE_TIMEOUT_PER_NODE_SECS";
    /// Cleanup deadline in seconds
    pub const CLEANUP_TIMEOUT_SECS: &str = "SETTLE_CLEANUP_TIMEOUT_SECS";
    /// Cleanup retry interval in seconds
    pub const CLEANUP_RETRY_SECS: &str = "SETTLE_CLEANUP_RETRY_SECS";
    /// Current cluster image
    pub const IMAGE: &str = "SETTLE_IMAGE";
    /// Upgrade target image
    pub const UPGRADE_IMAGE: &str = "SETTLE_UPGRADE_IMAGE";
    /// Namespace clusters are created in
    pub const NAMESPACE: &str = "SETTLE_NAMESPACE";
}

/// Timing and image configuration for a verification run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Sleep between polls
    pub poll_interval: Duration,
    /// Convergence deadline per node; the wait deadline is this times the node count
    pub timeout_per_node: Duration,
    /// Deadline for cleanup deletes
    pub cleanup_timeout: Duration,
    /// Sleep between cleanup delete attempts
    pub cleanup_retry_interval: Duration,
    /// Image clusters are created with
    pub image: String,
    /// Image upgrade scenarios move to
    pub upgrade_image: String,
    /// Namespace clusters are created in
    pub namespace: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout_per_node: DEFAULT_TIMEOUT_PER_NODE,
            cleanup_timeout: DEFAULT_CLEANUP_TIMEOUT,
            cleanup_retry_interval: DEFAULT_CLEANUP_RETRY_INTERVAL,
            image: DEFAULT_CLUSTER_IMAGE.to_string(),
            upgrade_image: DEFAULT_UPGRADE_IMAGE.to_string(),
            namespace: "default".to_string(),
        }
    }
}

impl HarnessConfig {
    /// Defaults overridden by `SETTLE_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup (used by `from_env` and tests)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup(env::POLL_INTERVAL_SECS) {
            config.poll_interval = parse_secs(env::POLL_INTERVAL_SECS, &v)?;
        }
        if let Some(v) = lookup(env::TIMEOUT_PER_NODE_SECS) {
            config.timeout_per_node = parse_secs(env::TIMEOUT_PER_NODE_SECS, &v)?;
        }
        if let Some(v) = lookup(env::CLEANUP_TIMEOUT_SECS) {
            config.cleanup_timeout = parse_secs(env::CLEANUP_TIMEOUT_SECS, &v)?;
        }
        if let Some(v) = lookup(env::CLEANUP_RETRY_SECS) {
            config.cleanup_retry_interval = parse_secs(env::CLEANUP_RETRY_SECS, &v)?;
        }
        if let Some(v) = lookup(env::IMAGE) {
            config.image = v;
        }
        if let Some(v) = lookup(env::UPGRADE_IMAGE) {
            config.upgrade_image = v;
        }
        if let Some(v) = lookup(env::NAMESPACE) {
            config.namespace = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would make every wait fail or spin
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(Error::configuration("poll interval must be positive"));
        }
        if self.timeout_per_node.is_zero() {
            return Err(Error::configuration("timeout per node must be positive"));
        }
        if self.cleanup_retry_interval.is_zero() {
            return Err(Error::configuration(
                "cleanup retry interval must be positive",
            ));
        }
        if self.image.trim().is_empty() || self.upgrade_image.trim().is_empty() {
            return Err(Error::configuration("image references cannot be empty"));
        }
        if self.namespace.trim().is_empty() {
            return Err(Error::configuration("namespace cannot be empty"));
        }
        Ok(())
    }

    /// Convergence deadline for a cluster of `nodes` nodes
    ///
    /// Larger clusters legitimately take longer; a zero-node request still
    /// gets one node's worth of time so delete waits are bounded.
    pub fn timeout_for(&self, nodes: usize) -> Duration {
        let nodes = u32::try_from(nodes.max(1)).unwrap_or(u32::MAX);
        self.timeout_per_node.saturating_mul(nodes)
    }
}

fn parse_secs(key: &str, value: &str) -> Result<Duration> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| Error::configuration(format!("{key} must be whole seconds, got '{value}'")))
}
