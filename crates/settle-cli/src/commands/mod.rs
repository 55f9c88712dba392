//! CLI commands

use std::path::Path;
use std::time::Duration;

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};

use crate::{Error, Result};

pub mod apply;
pub mod run;
pub mod teardown;
pub mod verify;

/// Connection timeout for the API server
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Read timeout for single API requests
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Create a kube client from an explicit kubeconfig, or the standard lookup
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client> {
    let mut config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| Error::Kubeconfig {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| Error::Kubeconfig {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?
        }
        None => Config::infer().await.map_err(|e| Error::Kube(kube::Error::InferConfig(e)))?,
    };
    config.connect_timeout = Some(CONNECT_TIMEOUT);
    config.read_timeout = Some(READ_TIMEOUT);
    Ok(Client::try_from(config)?)
}

/// Print one aligned `label: value` line
pub(crate) fn print_field(label: &str, value: impl std::fmt::Display) {
    println!("  {:<14} {}", format!("{label}:"), value);
}
