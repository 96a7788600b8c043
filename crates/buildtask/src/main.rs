//! Build Task Runner CLI.
//!
//! Runs one build Job for a project in the current namespace and, for the
//! full task, publishes the application once the build succeeds.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use buildtask::{
    run_build_task, ui, BuildRequest, BuildTaskConfig, KubeCluster, ResourceNaming,
};
use clap::error::ErrorKind;
use clap::Parser;
use tokio_util::compat::TokioAsyncWriteCompatExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Run a build task Job in Kubernetes.
#[derive(Parser)]
#[command(name = "idc-buildtask", version, about = "Run a build task Job in Kubernetes")]
struct Cli {
    /// Build task name (full, incremental, update).
    task_name: String,

    /// Project name, used in volume sub-paths and labels.
    project_name: String,

    /// Path to a YAML configuration file.
    #[arg(long, env = "BUILDTASK_CONFIG")]
    config: Option<PathBuf>,

    /// Namespace to run in (defaults to the current kube context).
    #[arg(long, env = "BUILDTASK_NAMESPACE")]
    namespace: Option<String>,

    /// Workspace identifier used to narrow resource discovery.
    #[arg(long, env = "CHE_WORKSPACE_ID")]
    workspace_id: Option<String>,

    /// Do not look up an owner for published resources.
    #[arg(long)]
    without_owner: bool,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

fn parse_cli() -> std::result::Result<Cli, ExitCode> {
    Cli::try_parse().map_err(|e| match e.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            let _ = e.print();
            ExitCode::SUCCESS
        }
        _ => {
            let _ = e.print();
            ui::print_usage();
            ExitCode::FAILURE
        }
    })
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("info,buildtask=debug,idc_buildtask=debug")
        } else {
            EnvFilter::new("warn,buildtask=info,idc_buildtask=info")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stdout)
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = BuildTaskConfig::load(cli.config.as_deref())
        .context("Failed to load configuration")?;
    if cli.without_owner {
        config.discovery.resolve_owner = false;
    }
    config.validate().context("Invalid configuration")?;

    info!("The task chosen: {}", cli.task_name);
    info!("The project chosen: {}", cli.project_name);

    let client = kube::Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let namespace = cli
        .namespace
        .clone()
        .unwrap_or_else(|| client.default_namespace().to_string());
    let cluster = KubeCluster::new(client, namespace);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Received SIGINT, cancelling build");
                cancel.cancel();
            }
        }
    });

    let request = BuildRequest {
        job_name: ResourceNaming::job_name(&config.job.name_prefix),
        task_name: cli.task_name,
        project_name: cli.project_name,
        workspace_id: cli.workspace_id,
    };

    let mut stdout = tokio::io::stdout().compat_write();
    let summary = run_build_task(&cluster, &config, &request, cancel, &mut stdout).await?;

    if !summary.succeeded() {
        ui::print_error(&format!("The job {} failed, exiting...", summary.job_name));
        return Ok(ExitCode::FAILURE);
    }

    match &summary.published {
        Some(objects) => {
            ui::print_section("Application deployed");
            ui::print_success(&format!(
                "Published {}",
                objects.deployment.metadata.name.as_deref().unwrap_or_default()
            ));
        }
        None => ui::print_success(&format!("The job {} succeeded", summary.job_name)),
    }
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match parse_cli() {
        Ok(cli) => cli,
        Err(code) => return code,
    };
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            ui::print_error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}
