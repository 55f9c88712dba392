//! Apply command - create or update a cluster from a manifest

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use clap::Args;
use tracing::info;

use settle_common::config::HarnessConfig;
use settle_common::crd::DatabaseCluster;
use settle_verify::{CleanupRegistry, ClusterHandle, ClusterLifecycle, KubeClusterApi};

use super::{create_client, print_field};
use crate::{Error, Result};

#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Path to an AerospikeCluster YAML file (use "-" for stdin)
    #[arg(long, short = 'f')]
    pub file: String,
}

pub async fn run(args: ApplyArgs, config: HarnessConfig, kubeconfig: Option<&Path>) -> Result<()> {
    let cluster = parse_manifest(&read_manifest(&args.file)?)?;
    let client = create_client(kubeconfig).await?;

    // Applied clusters outlive the command, so nothing is registered for cleanup.
    let lifecycle = ClusterLifecycle::new(
        Arc::new(KubeClusterApi::new(client)),
        config,
        CleanupRegistry::default(),
    );
    let handle = lifecycle.apply_and_verify(cluster).await?;
    info!(cluster = %handle.name(), "Cluster applied and converged");
    print_handle(&handle);
    Ok(())
}

fn read_manifest(file: &str) -> Result<String> {
    if file == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        Ok(std::fs::read_to_string(file)?)
    }
}

/// Parse a single cluster manifest
pub fn parse_manifest(yaml: &str) -> Result<DatabaseCluster> {
    let cluster: DatabaseCluster = serde_yaml::from_str(yaml)?;
    if cluster.metadata.name.is_none() {
        return Err(Error::validation("manifest has no metadata.name"));
    }
    Ok(cluster)
}

pub(crate) fn print_handle(handle: &ClusterHandle) {
    println!("{}/{}", handle.namespace(), handle.name());
    print_field("state", handle.state());
    print_field("size", handle.spec().size);
    print_field("image", &handle.spec().image);
}
