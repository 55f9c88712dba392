//! Run command - drive lifecycle scenarios against a live operator
//!
//! Each scenario creates its own sample cluster, walks it through a fixed
//! sequence of steps, and stops at the first failing step. Everything the run
//! created is deleted afterwards whether the steps passed or not.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Args, ValueEnum};
use tracing::{info, warn};

use settle_common::config::HarnessConfig;
use settle_common::fixtures::{sample_cluster, Fixtures};
use settle_verify::{ClusterLifecycle, KubeClusterApi, TestContext};

use super::create_client;
use crate::fixtures::install_fixtures;
use crate::{Error, Result};

/// Largest initial size; the lifecycle scenario scales one node past it
const MAX_SIZE: i64 = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    /// Create, check resources, scale up and down, delete
    Lifecycle,
    /// Create on the current image, roll to the upgrade image, delete
    Upgrade,
    /// Every scenario in turn
    All,
}

impl Scenario {
    fn expand(self) -> &'static [Scenario] {
        match self {
            Scenario::Lifecycle => &[Scenario::Lifecycle],
            Scenario::Upgrade => &[Scenario::Upgrade],
            Scenario::All => &[Scenario::Lifecycle, Scenario::Upgrade],
        }
    }

    fn label(self) -> &'static str {
        match self {
            Scenario::Lifecycle => "lifecycle",
            Scenario::Upgrade => "upgrade",
            Scenario::All => "all",
        }
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Scenario to run
    #[arg(value_enum, default_value_t = Scenario::All)]
    pub scenario: Scenario,

    /// Initial node count of each scenario cluster
    #[arg(
        long,
        default_value_t = 2,
        value_parser = clap::value_parser!(i32).range(1..=MAX_SIZE)
    )]
    pub size: i32,

    /// Name prefix for scenario clusters
    #[arg(long, default_value = "aerocluster")]
    pub name: String,

    /// Directory of config schema files
    #[arg(long, requires = "secret_dir")]
    pub schema_dir: Option<PathBuf>,

    /// Directory of TLS and feature-key files for the cluster secret
    #[arg(long, requires = "schema_dir")]
    pub secret_dir: Option<PathBuf>,

    /// Password stored in the auth secret
    #[arg(
        long,
        env = "SETTLE_ADMIN_PASSWORD",
        default_value = "admin",
        hide_env_values = true
    )]
    pub admin_password: String,
}

/// Outcome of one scenario step
#[derive(Debug)]
struct StepRecord {
    scenario: &'static str,
    step: &'static str,
    elapsed: Duration,
    error: Option<String>,
}

#[derive(Debug, Default)]
struct Report {
    steps: Vec<StepRecord>,
}

impl Report {
    /// Record a step and hand back its value if it passed
    fn record<T>(
        &mut self,
        scenario: &'static str,
        step: &'static str,
        (result, elapsed): (settle_common::Result<T>, Duration),
    ) -> Option<T> {
        match result {
            Ok(value) => {
                info!(scenario, step, elapsed_secs = elapsed.as_secs(), "Step passed");
                self.steps.push(StepRecord {
                    scenario,
                    step,
                    elapsed,
                    error: None,
                });
                Some(value)
            }
            Err(e) => {
                warn!(scenario, step, error = %e, "Step failed");
                self.steps.push(StepRecord {
                    scenario,
                    step,
                    elapsed,
                    error: Some(e.to_string()),
                });
                None
            }
        }
    }

    fn failed(&self) -> usize {
        self.steps.iter().filter(|s| s.error.is_some()).count()
    }

    fn print(&self) {
        println!();
        for record in &self.steps {
            let status = if record.error.is_some() { "FAIL" } else { "PASS" };
            println!(
                "{status}  {:<28} {:>6.1}s",
                format!("{}/{}", record.scenario, record.step),
                record.elapsed.as_secs_f64()
            );
            if let Some(error) = &record.error {
                println!("      {error}");
            }
        }
        println!(
            "\n{} steps, {} passed, {} failed",
            self.steps.len(),
            self.steps.len() - self.failed(),
            self.failed()
        );
    }

    fn into_result(self) -> Result<()> {
        match self.failed() {
            0 => Ok(()),
            failed => Err(Error::ScenarioFailed {
                failed,
                total: self.steps.len(),
            }),
        }
    }
}

async fn timed<T, Fut>(fut: Fut) -> (settle_common::Result<T>, Duration)
where
    Fut: Future<Output = settle_common::Result<T>>,
{
    let started = Instant::now();
    let result = fut.await;
    (result, started.elapsed())
}

pub async fn run(args: RunArgs, config: HarnessConfig, kubeconfig: Option<&Path>) -> Result<()> {
    let client = create_client(kubeconfig).await?;
    let mut ctx = TestContext::new(&config);

    if let (Some(schema_dir), Some(secret_dir)) = (&args.schema_dir, &args.secret_dir) {
        let fixtures = Fixtures::load(schema_dir, secret_dir)?.install()?;
        install_fixtures(
            &client,
            &config.namespace,
            &fixtures,
            &args.admin_password,
            &ctx.registry(),
        )
        .await?;
    } else {
        info!("No fixture directories given, expecting cluster secrets to exist");
    }

    let lifecycle = ClusterLifecycle::new(
        Arc::new(KubeClusterApi::new(client)),
        config,
        ctx.registry(),
    );

    let mut report = Report::default();
    for scenario in args.scenario.expand() {
        info!(scenario = scenario.label(), "Running scenario");
        match scenario {
            Scenario::Lifecycle => run_lifecycle(&lifecycle, &args, &mut report).await,
            Scenario::Upgrade => run_upgrade(&lifecycle, &args, &mut report).await,
            Scenario::All => {}
        }
    }

    let cleanup = ctx.cleanup().await;
    report.print();

    match (report.into_result(), cleanup) {
        (Err(e), Err(cleanup_err)) => {
            warn!(error = %cleanup_err, "Cleanup failed after scenario failures");
            Err(e)
        }
        (Err(e), Ok(())) => Err(e),
        (Ok(()), cleanup) => Ok(cleanup?),
    }
}

fn cluster_name(prefix: &str, scenario: Scenario) -> String {
    format!("{prefix}-{}", scenario.label())
}

async fn run_lifecycle(lifecycle: &ClusterLifecycle, args: &RunArgs, report: &mut Report) {
    const SCENARIO: &str = "lifecycle";
    let config = lifecycle.config();
    let cluster = sample_cluster(
        &cluster_name(&args.name, Scenario::Lifecycle),
        &config.namespace,
        args.size,
        &config.image,
    );

    let Some(mut handle) =
        report.record(SCENARIO, "create", timed(lifecycle.create_and_verify(cluster)).await)
    else {
        return;
    };

    let validated = timed(lifecycle.validate_resources(&handle)).await;
    if report.record(SCENARIO, "validate resources", validated).is_none() {
        return;
    }

    let mut bigger = handle.spec().clone();
    bigger.size = args.size + 1;
    let scaled = timed(lifecycle.update_and_verify(&mut handle, bigger)).await;
    if report.record(SCENARIO, "scale up", scaled).is_none() {
        return;
    }

    let mut smaller = handle.spec().clone();
    smaller.size = args.size;
    let scaled = timed(lifecycle.update_and_verify(&mut handle, smaller)).await;
    if report.record(SCENARIO, "scale down", scaled).is_none() {
        return;
    }

    let deleted = timed(lifecycle.delete_and_verify(&mut handle)).await;
    report.record(SCENARIO, "delete", deleted);
}

async fn run_upgrade(lifecycle: &ClusterLifecycle, args: &RunArgs, report: &mut Report) {
    const SCENARIO: &str = "upgrade";
    let config = lifecycle.config();
    let cluster = sample_cluster(
        &cluster_name(&args.name, Scenario::Upgrade),
        &config.namespace,
        args.size,
        &config.image,
    );

    let Some(mut handle) =
        report.record(SCENARIO, "create", timed(lifecycle.create_and_verify(cluster)).await)
    else {
        return;
    };

    let mut upgraded = handle.spec().clone();
    upgraded.image = config.upgrade_image.clone();
    let rolled = timed(lifecycle.update_and_verify(&mut handle, upgraded)).await;
    if report.record(SCENARIO, "upgrade image", rolled).is_none() {
        return;
    }

    let deleted = timed(lifecycle.delete_and_verify(&mut handle)).await;
    report.record(SCENARIO, "delete", deleted);
}
