//! kubechaos - chaos experiment operator for Kubernetes

use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Patch, PatchParams};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::{predicates, reflector, watcher, Controller, WatchStreamExt};
use kube::{Api, Client, CustomResourceExt};

use kubechaos::config::{
    ControllerConfig, DEFAULT_CONFLICT_BACKOFF, DEFAULT_ERROR_BACKOFF, DEFAULT_INIT_REVISIT,
    DEFAULT_NO_TARGETS_BACKOFF, DEFAULT_RECONCILE_TIMEOUT, DEFAULT_RECURRING_INTERVAL,
};
use kubechaos::controller::{error_policy, reconcile, Context};
use kubechaos::crd::ChaosExperiment;
use kubechaos::events::CONTROLLER_NAME;
use kubechaos::telemetry::{init_telemetry, TelemetryConfig};

/// kubechaos - run ChaosExperiment resources against a Kubernetes cluster
#[derive(Parser, Debug)]
#[command(name = "kubechaos", version, about, long_about = None)]
struct Cli {
    /// Print the ChaosExperiment CRD manifest and exit
    #[arg(long)]
    crd: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "KUBECHAOS_LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the ChaosExperiment controller (default mode)
    Controller(ControllerArgs),
}

/// Controller mode arguments
#[derive(Args, Debug)]
struct ControllerArgs {
    /// Only watch experiments in this namespace (default: all namespaces)
    #[arg(long, env = "KUBECHAOS_NAMESPACE")]
    namespace: Option<String>,

    /// Apply the ChaosExperiment CRD with server-side apply before starting
    #[arg(long, env = "KUBECHAOS_INSTALL_CRDS")]
    install_crds: bool,

    /// Do not publish Kubernetes Events for phase transitions
    #[arg(long, env = "KUBECHAOS_NO_EVENTS")]
    no_events: bool,

    /// Revisit delay after an experiment is initialized
    #[arg(
        long,
        env = "KUBECHAOS_INIT_REVISIT",
        value_parser = humantime::parse_duration,
        default_value = "5s"
    )]
    init_revisit: Duration,

    /// Revisit delay when no pods match an experiment's selector
    #[arg(
        long,
        env = "KUBECHAOS_NO_TARGETS_BACKOFF",
        value_parser = humantime::parse_duration,
        default_value = "60s"
    )]
    no_targets_backoff: Duration,

    /// Revisit delay after a failed list, delete or status write
    #[arg(
        long,
        env = "KUBECHAOS_ERROR_BACKOFF",
        value_parser = humantime::parse_duration,
        default_value = "30s"
    )]
    error_backoff: Duration,

    /// Revisit delay after a status write conflict
    #[arg(
        long,
        env = "KUBECHAOS_CONFLICT_BACKOFF",
        value_parser = humantime::parse_duration,
        default_value = "1s"
    )]
    conflict_backoff: Duration,

    /// Period of recurring experiments that have no duration
    #[arg(
        long,
        env = "KUBECHAOS_RECURRING_INTERVAL",
        value_parser = humantime::parse_duration,
        default_value = "60s"
    )]
    recurring_interval: Duration,

    /// Deadline for a single reconcile invocation
    #[arg(
        long,
        env = "KUBECHAOS_RECONCILE_TIMEOUT",
        value_parser = humantime::parse_duration,
        default_value = "30s"
    )]
    reconcile_timeout: Duration,
}

impl Default for ControllerArgs {
    fn default() -> Self {
        Self {
            namespace: None,
            install_crds: false,
            no_events: false,
            init_revisit: DEFAULT_INIT_REVISIT,
            no_targets_backoff: DEFAULT_NO_TARGETS_BACKOFF,
            error_backoff: DEFAULT_ERROR_BACKOFF,
            conflict_backoff: DEFAULT_CONFLICT_BACKOFF,
            recurring_interval: DEFAULT_RECURRING_INTERVAL,
            reconcile_timeout: DEFAULT_RECONCILE_TIMEOUT,
        }
    }
}

impl From<&ControllerArgs> for ControllerConfig {
    fn from(args: &ControllerArgs) -> Self {
        Self {
            init_revisit: args.init_revisit,
            no_targets_backoff: args.no_targets_backoff,
            error_backoff: args.error_backoff,
            conflict_backoff: args.conflict_backoff,
            recurring_interval: args.recurring_interval,
            reconcile_timeout: args.reconcile_timeout,
            record_events: !args.no_events,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&ChaosExperiment::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    init_telemetry(TelemetryConfig { json: cli.log_json })?;

    match cli.command {
        Some(Commands::Controller(args)) => run_controller(args).await,
        None => run_controller(ControllerArgs::default()).await,
    }
}

/// Ensure the ChaosExperiment CRD is installed
///
/// Server-side apply keeps the installed schema in step with this binary.
async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(CONTROLLER_NAME).force();

    tracing::info!("Installing ChaosExperiment CRD...");
    crds.patch(
        "chaosexperiments.chaos.shanto.dev",
        &params,
        &Patch::Apply(&ChaosExperiment::crd()),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to install ChaosExperiment CRD: {}", e))?;

    Ok(())
}

/// Run the ChaosExperiment controller until SIGTERM/SIGINT
async fn run_controller(args: ControllerArgs) -> anyhow::Result<()> {
    tracing::info!("kubechaos controller starting...");

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    if args.install_crds {
        ensure_crds_installed(&client).await?;
    }

    let config = ControllerConfig::from(&args);
    tracing::info!(?config, namespace = ?args.namespace, "controller configuration");

    let experiments: Api<ChaosExperiment> = match &args.namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    };
    let ctx = Arc::new(Context::new(client, config));

    // Status writes do not bump metadata.generation, so the controller's own
    // updates never re-trigger it; revisits come from the returned requeue.
    let (reader, writer) = reflector::store();
    let stream = watcher(experiments, WatcherConfig::default())
        .default_backoff()
        .reflect(writer)
        .applied_objects()
        .predicate_filter(predicates::generation);

    Controller::for_stream(stream, reader)
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, action)) => {
                    tracing::debug!(
                        experiment = %obj.name,
                        ?action,
                        "Experiment reconciliation completed"
                    );
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Experiment reconciliation error");
                }
            }
        })
        .await;

    tracing::info!("kubechaos controller stopped");
    Ok(())
}
