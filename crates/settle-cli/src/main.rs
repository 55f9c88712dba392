//! settle CLI
//!
//! Drives database clusters through create, update, and delete against a live
//! operator and checks each step converges.

use clap::Parser;

use settle_cli::{Cli, Result};
use settle_common::telemetry::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.global.log_format.into())?;
    cli.run().await
}
