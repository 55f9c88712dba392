//! Convergence verification for declaratively managed database clusters
//!
//! Submits lifecycle operations against the cluster resource and proves, by
//! bounded polling, that the live system reaches the declared state:
//!
//! - [`evaluator`]: pure verdict for one observed snapshot
//! - [`poller`]: interval/deadline loops around a fetch
//! - [`teardown`]: pods-then-claims wait after a delete
//! - [`driver`]: create, update and delete, each verified
//! - [`cleanup`]: scoped removal of everything a run created

#![deny(missing_docs)]

pub mod cleanup;
pub mod client;
pub mod driver;
pub mod evaluator;
pub mod merge;
pub mod poller;
pub mod resources;
pub mod teardown;

#[cfg(test)]
mod testing;

pub use cleanup::{CleanupRegistry, TestContext};
pub use client::{ClusterApi, KubeClusterApi};
pub use driver::{ClusterHandle, ClusterLifecycle, LifecycleState};
pub use evaluator::{evaluate, ConvergenceVerdict, Divergence, PendingReason};
pub use teardown::{ClaimPhase, ClaimRetention, Retention, StorageClaim};
