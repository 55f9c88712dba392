//! settle CLI library

pub mod commands;
pub mod error;
pub mod fixtures;

pub use error::{Error, Result};

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use settle_common::config::HarnessConfig;
use settle_common::telemetry::LogFormat;

/// settle - verify that a database operator converges clusters to their declared state
#[derive(Parser, Debug)]
#[command(name = "settle")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run verification scenarios against a live operator
    Run(commands::run::RunArgs),
    /// Create or update a cluster from a manifest and wait for convergence
    Apply(commands::apply::ApplyArgs),
    /// Check that an existing cluster is converged
    Verify(commands::verify::VerifyArgs),
    /// Delete a cluster and wait for its pods and storage claims to go away
    Teardown(commands::teardown::TeardownArgs),
}

/// Options shared by every subcommand
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Path to kubeconfig file (defaults to the standard lookup)
    #[arg(long, env = "KUBECONFIG", global = true)]
    pub kubeconfig: Option<PathBuf>,

    /// Log output format
    #[arg(long, env = "SETTLE_LOG_FORMAT", value_enum, default_value_t, global = true)]
    pub log_format: LogFormatArg,

    #[command(flatten)]
    pub harness: HarnessArgs,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    #[default]
    Pretty,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

/// Timing and image overrides
///
/// Unset flags keep the value from the `SETTLE_*` environment variables, or
/// the harness default when those are unset too.
#[derive(Args, Debug, Clone, Default)]
pub struct HarnessArgs {
    /// Namespace clusters live in
    #[arg(long, short = 'n', global = true)]
    pub namespace: Option<String>,

    /// Seconds between polls
    #[arg(long, global = true)]
    pub poll_interval_secs: Option<u64>,

    /// Convergence timeout per node, in seconds
    #[arg(long, global = true)]
    pub timeout_per_node_secs: Option<u64>,

    /// Deadline for cleanup deletes, in seconds
    #[arg(long, global = true)]
    pub cleanup_timeout_secs: Option<u64>,

    /// Seconds between cleanup delete attempts
    #[arg(long, global = true)]
    pub cleanup_retry_secs: Option<u64>,

    /// Image clusters are created with
    #[arg(long, global = true)]
    pub image: Option<String>,

    /// Image upgrade scenarios move to
    #[arg(long, global = true)]
    pub upgrade_image: Option<String>,
}

impl HarnessArgs {
    /// Environment configuration with these overrides applied
    pub fn to_config(&self) -> Result<HarnessConfig> {
        self.apply(HarnessConfig::from_env()?)
    }

    fn apply(&self, mut config: HarnessConfig) -> Result<HarnessConfig> {
        if let Some(ns) = &self.namespace {
            config.namespace = ns.clone();
        }
        if let Some(secs) = self.poll_interval_secs {
            config.poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = self.timeout_per_node_secs {
            config.timeout_per_node = Duration::from_secs(secs);
        }
        if let Some(secs) = self.cleanup_timeout_secs {
            config.cleanup_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.cleanup_retry_secs {
            config.cleanup_retry_interval = Duration::from_secs(secs);
        }
        if let Some(image) = &self.image {
            config.image = image.clone();
        }
        if let Some(image) = &self.upgrade_image {
            config.upgrade_image = image.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        let config = self.global.harness.to_config()?;
        let kubeconfig = self.global.kubeconfig.as_deref();
        match self.command {
            Commands::Run(args) => commands::run::run(args, config, kubeconfig).await,
            Commands::Apply(args) => commands::apply::run(args, config, kubeconfig).await,
            Commands::Verify(args) => commands::verify::run(args, config, kubeconfig).await,
            Commands::Teardown(args) => commands::teardown::run(args, config, kubeconfig).await,
        }
    }
}
