//! End-to-end run of one build task: resolve, build, run, publish.

use crate::cluster::ClusterApi;
use crate::config::BuildTaskConfig;
use crate::error::Result;
use crate::job::build_job;
use crate::naming::ResourceNaming;
use crate::orchestrator::{BuildOrchestrator, JobOutcome};
use crate::publisher::{should_publish, ServiceBundle, ServicePublisher};
use crate::resolver::{ResourceBundle, ResourceResolver};
use futures::io::AsyncWrite;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// What the caller asked for
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub task_name: String,
    pub project_name: String,
    pub workspace_id: Option<String>,
    /// Unique name for the build Job
    pub job_name: String,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub job_name: String,
    pub bundle: ResourceBundle,
    pub outcome: JobOutcome,
    /// Present when the application was published
    pub published: Option<ServiceBundle>,
}

impl RunSummary {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_success()
    }
}

/// Run `request` against `cluster`, copying build logs to `log_sink`.
///
/// The configuration must already be validated. The project name is checked
/// before any cluster call. A failed build is returned
/// as `Ok` with [`JobOutcome::Failed`]; nothing is published in that case.
#[instrument(skip_all, fields(task = %request.task_name, project = %request.project_name))]
pub async fn run_build_task<C, W>(
    cluster: &C,
    config: &BuildTaskConfig,
    request: &BuildRequest,
    cancel: CancellationToken,
    log_sink: &mut W,
) -> Result<RunSummary>
where
    C: ClusterApi + ?Sized,
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    ResourceNaming::validate_project_name(&request.project_name)?;
    info!("Current namespace: {}", cluster.namespace());

    let bundle = ResourceResolver::new(
        cluster,
        &config.discovery,
        request.workspace_id.as_deref(),
    )
    .resolve()
    .await?;

    let task = config.tasks.select(&request.task_name)?;
    let job = build_job(
        &bundle,
        &task,
        &request.project_name,
        &request.job_name,
        &config.job,
    )?;

    let report = BuildOrchestrator::new(cluster, config.wait.policy(), cancel)
        .run(job, log_sink)
        .await?;

    let published = if should_publish(report.outcome, &config.tasks, &request.task_name) {
        let publisher = ServicePublisher::new(cluster, &config.publish);
        Some(publisher.publish(&bundle, &request.project_name).await?)
    } else {
        None
    };

    Ok(RunSummary {
        job_name: report.job_name,
        bundle,
        outcome: report.outcome,
        published,
    })
}
