//! Verify command - check an existing cluster against its own spec

use std::path::Path;
use std::sync::Arc;

use clap::Args;

use settle_common::config::HarnessConfig;
use settle_verify::{evaluate, CleanupRegistry, ClusterApi, ClusterLifecycle, KubeClusterApi};

use super::apply::print_handle;
use super::{create_client, print_field};
use crate::{Error, Result};

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Cluster name
    pub name: String,

    /// Evaluate the current snapshot once instead of waiting for convergence
    #[arg(long)]
    pub once: bool,
}

pub async fn run(args: VerifyArgs, config: HarnessConfig, kubeconfig: Option<&Path>) -> Result<()> {
    let client = create_client(kubeconfig).await?;
    let api = Arc::new(KubeClusterApi::new(client));
    let namespace = config.namespace.clone();

    if args.once {
        let live = api.get_cluster(&namespace, &args.name).await?;
        let verdict = evaluate(&live.spec, live.status.as_ref());
        println!("{namespace}/{}", args.name);
        print_field("verdict", &verdict);
        if !verdict.is_converged() {
            return Err(Error::validation(format!(
                "cluster {} is not converged",
                args.name
            )));
        }
        return Ok(());
    }

    let lifecycle = ClusterLifecycle::new(api, config, CleanupRegistry::default());
    let mut handle = lifecycle.attach(&namespace, &args.name).await?;
    lifecycle.verify(&mut handle).await?;
    lifecycle.validate_resources(&handle).await?;
    print_handle(&handle);
    Ok(())
}
