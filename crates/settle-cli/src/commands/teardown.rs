//! Teardown command - delete a cluster and wait until nothing is left

use std::path::Path;
use std::sync::Arc;

use clap::Args;
use tracing::info;

use settle_common::config::HarnessConfig;
use settle_verify::{CleanupRegistry, ClusterLifecycle, KubeClusterApi};

use super::create_client;
use crate::Result;

#[derive(Args, Debug)]
pub struct TeardownArgs {
    /// Cluster name
    pub name: String,
}

pub async fn run(
    args: TeardownArgs,
    config: HarnessConfig,
    kubeconfig: Option<&Path>,
) -> Result<()> {
    let client = create_client(kubeconfig).await?;
    let namespace = config.namespace.clone();
    let lifecycle = ClusterLifecycle::new(
        Arc::new(KubeClusterApi::new(client)),
        config,
        CleanupRegistry::default(),
    );

    let mut handle = lifecycle.attach(&namespace, &args.name).await?;
    lifecycle.delete_and_verify(&mut handle).await?;
    info!(cluster = %args.name, "Cluster torn down");
    println!("{namespace}/{} deleted", args.name);
    Ok(())
}
