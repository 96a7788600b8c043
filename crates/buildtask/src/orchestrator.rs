//! Build Job lifecycle.
//!
//! `Submitted -> AwaitingRunning -> StreamingLogs -> AwaitingTerminal ->
//! {Succeeded | Failed} -> Deleted`
//!
//! Once the Job has been created it is deleted exactly once on every path out
//! of the state machine, including timeouts and cancellation.

use crate::cluster::ClusterApi;
use crate::error::{Error, Result};
use crate::wait::WaitPolicy;
use futures::io::{AsyncWrite, AsyncWriteExt};
use k8s_openapi::api::batch::v1::{Job, JobStatus};
use kube::api::{DeleteParams, ListParams, PropagationPolicy};
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Terminal state of the build Job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed,
}

impl JobOutcome {
    /// Derive the outcome from a Job status; `None` while the Job is still active.
    ///
    /// A succeeded pod wins over earlier failures, so the two are never reported together.
    pub fn from_status(status: Option<&JobStatus>) -> Option<Self> {
        let status = status?;
        if status.succeeded.unwrap_or(0) >= 1 {
            Some(Self::Succeeded)
        } else if status.failed.unwrap_or(0) > 0 {
            Some(Self::Failed)
        } else {
            None
        }
    }

    pub fn is_success(self) -> bool {
        self == Self::Succeeded
    }
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// States of the lifecycle, recorded in order for the run report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Submitted,
    AwaitingRunning,
    StreamingLogs,
    AwaitingTerminal,
    Succeeded,
    Failed,
    Deleted,
}

/// What happened to the submitted Job
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub job_name: String,
    pub outcome: JobOutcome,
    /// Pods whose logs were copied to the sink
    pub pods_streamed: usize,
    pub phases: Vec<Phase>,
}

/// Drives one build Job from submission to deletion.
pub struct BuildOrchestrator<'a, C: ClusterApi + ?Sized> {
    cluster: &'a C,
    policy: WaitPolicy,
    cancel: CancellationToken,
}

/// How the wait for a running pod ended
enum Started {
    Running(String),
    Finished(JobOutcome),
}

/// Identity of the Job as stored by the cluster
struct Submitted {
    name: String,
    uid: Option<String>,
}

impl<'a, C: ClusterApi + ?Sized> BuildOrchestrator<'a, C> {
    pub fn new(cluster: &'a C, policy: WaitPolicy, cancel: CancellationToken) -> Self {
        Self {
            cluster,
            policy,
            cancel,
        }
    }

    /// Submit `job`, follow it to a terminal outcome and delete it.
    ///
    /// Pod logs are copied to `log_sink` as they are produced.
    #[instrument(skip_all, fields(job = job.metadata.name.as_deref().unwrap_or_default()))]
    pub async fn run<W>(&self, job: Job, log_sink: &mut W) -> Result<BuildReport>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let mut phases = Vec::new();
        let submitted = self.submit(&job).await?;
        phases.push(Phase::Submitted);

        let driven = self.drive(&submitted, log_sink, &mut phases).await;
        let deleted = self.delete(&submitted.name).await;

        match (driven, deleted) {
            (Ok((outcome, pods_streamed)), Ok(())) => {
                phases.push(Phase::Deleted);
                Ok(BuildReport {
                    job_name: submitted.name,
                    outcome,
                    pods_streamed,
                    phases,
                })
            }
            (Ok(_), Err(e)) => Err(e),
            (Err(e), deleted) => {
                if let Err(delete_error) = deleted {
                    error!("Cleanup after failed wait also failed: {}", delete_error);
                }
                Err(e)
            }
        }
    }

    async fn submit(&self, job: &Job) -> Result<Submitted> {
        let requested = job.metadata.name.clone().unwrap_or_default();
        let created = self
            .cluster
            .create_job(job)
            .await
            .map_err(|e| Error::Submit {
                name: requested.clone(),
                source: Box::new(e),
            })?;

        let name = created.metadata.name.unwrap_or(requested);
        info!("The job {} has been created", name);
        Ok(Submitted {
            name,
            uid: created.metadata.uid,
        })
    }

    async fn drive<W>(
        &self,
        job: &Submitted,
        log_sink: &mut W,
        phases: &mut Vec<Phase>,
    ) -> Result<(JobOutcome, usize)>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        phases.push(Phase::AwaitingRunning);
        info!("Waiting for pod to run");
        let name = job.name.as_str();
        let started = self
            .policy
            .wait_for(&format!("a running pod of job {name}"), &self.cancel, move || {
                self.started(job)
            })
            .await?;
        let finished = match started {
            Started::Running(pod) => {
                info!("Running pod found: {} Retrieving logs...", pod);
                None
            }
            Started::Finished(outcome) => {
                info!("The job {} {} before a running pod was observed", name, outcome);
                Some(outcome)
            }
        };

        phases.push(Phase::StreamingLogs);
        let pods_streamed = self.stream_logs(name, log_sink).await;

        phases.push(Phase::AwaitingTerminal);
        let outcome = match finished {
            Some(outcome) => outcome,
            None => {
                let uid = job.uid.as_deref();
                self.policy
                    .wait_for(&format!("job {name} to finish"), &self.cancel, move || {
                        self.job_outcome(name, uid)
                    })
                    .await?
            }
        };
        info!("The job {} {}", name, outcome);

        phases.push(match outcome {
            JobOutcome::Succeeded => Phase::Succeeded,
            JobOutcome::Failed => Phase::Failed,
        });
        Ok((outcome, pods_streamed))
    }

    /// A running pod, or the outcome of a Job whose pod finished between two polls.
    async fn started(&self, job: &Submitted) -> Result<Option<Started>> {
        if let Some(pod) = self.running_pod(&job.name).await? {
            return Ok(Some(Started::Running(pod)));
        }
        let outcome = self.job_outcome(&job.name, job.uid.as_deref()).await?;
        Ok(outcome.map(Started::Finished))
    }

    async fn running_pod(&self, job_name: &str) -> Result<Option<String>> {
        let params = ListParams::default()
            .labels(&format!("job-name={job_name}"))
            .fields("status.phase=Running");
        let pods = self.cluster.list_pods(&params).await?;
        Ok(pods.into_iter().find_map(|pod| pod.metadata.name))
    }

    /// Copy the logs of every pod of the Job, one after another.
    async fn stream_logs<W>(&self, job_name: &str, log_sink: &mut W) -> usize
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let params = ListParams::default().labels(&format!("job-name={job_name}"));
        let pods = match self.cluster.list_pods(&params).await {
            Ok(pods) => pods,
            Err(e) => {
                warn!("Unable to list pods of job {}: {}", job_name, e);
                return 0;
            }
        };

        let mut streamed = 0;
        for pod_name in pods.into_iter().filter_map(|pod| pod.metadata.name) {
            info!("Retrieving logs for pod: {}", pod_name);
            let stream = match self.cluster.stream_logs(&pod_name).await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("Unable to retrieve logs for pod {}: {}", pod_name, e);
                    continue;
                }
            };

            match futures::io::copy_buf(stream, &mut *log_sink).await {
                Ok(bytes) => {
                    debug!(bytes, "Log stream for pod {} closed", pod_name);
                    streamed += 1;
                }
                Err(e) => warn!("Log stream for pod {} broke off: {}", pod_name, e),
            }
        }

        if let Err(e) = log_sink.flush().await {
            warn!("Failed to flush build logs: {}", e);
        }
        streamed
    }

    /// Look the Job up by exact name and uid.
    async fn job_outcome(&self, job_name: &str, uid: Option<&str>) -> Result<Option<JobOutcome>> {
        let params = ListParams::default().fields(&format!("metadata.name={job_name}"));
        let jobs = self.cluster.list_jobs(&params).await?;

        let job = jobs.into_iter().find(|job| {
            job.metadata.name.as_deref() == Some(job_name)
                && (uid.is_none() || job.metadata.uid.as_deref() == uid)
        });
        let Some(job) = job else {
            debug!("Job {} not visible yet", job_name);
            return Ok(None);
        };

        Ok(JobOutcome::from_status(job.status.as_ref()))
    }

    async fn delete(&self, job_name: &str) -> Result<()> {
        let params = DeleteParams {
            propagation_policy: Some(PropagationPolicy::Foreground),
            grace_period_seconds: Some(0),
            ..Default::default()
        };

        self.cluster
            .delete_job(job_name, &params)
            .await
            .map_err(|e| Error::Delete {
                name: job_name.to_string(),
                source: Box::new(e),
            })?;
        info!("The job {} has been deleted", job_name);
        Ok(())
    }
}
