//! Scoped cleanup of objects created during a verification run
//!
//! Every object is registered in the same call that creates it, before any
//! verification starts, so a failed wait still leaves something to clean
//! up. Cleanup runs in reverse registration order.

use std::future::Future;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{info, warn};

use settle_common::config::HarnessConfig;
use settle_common::retry::{retry_with_backoff_if, RetryConfig};
use settle_common::{Error, Result};

use crate::client::ClusterApi;

type CleanupAction = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

struct CleanupEntry {
    label: String,
    action: CleanupAction,
}

/// Shared list of pending cleanup actions
#[derive(Clone, Default)]
pub struct CleanupRegistry {
    entries: Arc<Mutex<Vec<CleanupEntry>>>,
}

impl CleanupRegistry {
    /// Register an action; it may run more than once if it fails transiently
    pub fn register<F, Fut>(&self, label: impl Into<String>, action: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let entry = CleanupEntry {
            label: label.into(),
            action: Arc::new(move || action().boxed()),
        };
        self.lock().push(entry);
    }

    /// Register deletion of a cluster resource; an already deleted cluster is fine
    pub fn register_cluster(&self, api: Arc<dyn ClusterApi>, namespace: &str, name: &str) {
        let namespace = namespace.to_string();
        let name = name.to_string();
        self.register(format!("cluster {namespace}/{name}"), move || {
            let api = api.clone();
            let namespace = namespace.clone();
            let name = name.clone();
            async move {
                match api.delete_cluster(&namespace, &name).await {
                    Err(e) if e.is_not_found() => Ok(()),
                    other => other,
                }
            }
        });
    }

    /// Number of pending actions
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn take(&self) -> Vec<CleanupEntry> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<CleanupEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Run actions newest first, retrying each until the retry budget runs out
///
/// Every action runs even if an earlier one fails; the failures are reported
/// together afterwards.
async fn run_entries(entries: Vec<CleanupEntry>, retry: &RetryConfig) -> Result<()> {
    let mut failures = Vec::new();
    for entry in entries.into_iter().rev() {
        let action = entry.action.clone();
        let result =
            retry_with_backoff_if(retry, &entry.label, |e: &Error| e.is_retryable(), || action())
                .await;
        match result {
            Ok(()) => info!(action = %entry.label, "Cleaned up"),
            Err(e) => failures.push(format!("{}: {e}", entry.label)),
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(Error::internal_with_context("cleanup", failures.join("; ")))
    }
}

/// Owns the cleanup of one verification scope
///
/// Call [`TestContext::cleanup`] when the scope ends. If the context is
/// dropped with actions still pending, they are spawned onto the current
/// tokio runtime on a best-effort basis.
pub struct TestContext {
    registry: CleanupRegistry,
    retry: RetryConfig,
}

impl TestContext {
    /// Create a context whose cleanup retries per the harness configuration
    pub fn new(config: &HarnessConfig) -> Self {
        Self {
            registry: CleanupRegistry::default(),
            retry: RetryConfig::fixed(config.cleanup_retry_interval, config.cleanup_timeout),
        }
    }

    /// Registry to hand to anything that creates objects in this scope
    pub fn registry(&self) -> CleanupRegistry {
        self.registry.clone()
    }

    /// Run every registered action now
    pub async fn cleanup(&mut self) -> Result<()> {
        let entries = self.registry.take();
        if entries.is_empty() {
            return Ok(());
        }
        info!(count = entries.len(), "Running cleanup");
        run_entries(entries, &self.retry).await
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        let entries = self.registry.take();
        if entries.is_empty() {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(count = entries.len(), "Context dropped before cleanup, spawning it");
                let retry = self.retry.clone();
                handle.spawn(async move {
                    if let Err(e) = run_entries(entries, &retry).await {
                        warn!(error = %e, "Background cleanup failed");
                    }
                });
            }
            Err(_) => {
                let labels: Vec<String> = entries.into_iter().map(|e| e.label).collect();
                warn!(
                    pending = %labels.join(", "),
                    "Context dropped outside a runtime, objects left behind"
                );
            }
        }
    }
}
