//! In-memory cluster used by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use buildtask::{ClusterApi, Error, LogStream, Result};
use k8s_openapi::api::{
    apps::v1::Deployment,
    batch::v1::{Job, JobStatus},
    core::v1::{PersistentVolumeClaim, Pod, PodSpec, Service},
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::api::{DeleteParams, ListParams};
use std::collections::HashMap;
use std::sync::Mutex;

pub const NAMESPACE: &str = "che";

/// Scripted cluster state. Unconfigured queries return empty lists.
#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    claims: HashMap<String, Vec<String>>,
    claim_error: bool,
    workspace_pods: HashMap<String, Vec<Pod>>,
    pod_list_error: bool,
    job_pods: Vec<String>,
    running_after: usize,
    running_errors: usize,
    running_queries: usize,
    logs: HashMap<String, Option<Vec<u8>>>,
    statuses: Vec<JobStatus>,
    status_queries: usize,
    decoy_jobs: Vec<Job>,
    create_job_error: bool,
    delete_error: bool,
    service_error: bool,
    deployment_error: bool,
    submitted: Option<Job>,
    calls: Vec<String>,
    deletes: Vec<Delete>,
    services: Vec<Service>,
    deployments: Vec<Deployment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub name: String,
    pub propagation: String,
    pub grace_period_seconds: Option<u32>,
}

pub fn claim(name: &str) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn workspace_pod(name: &str, service_account: &str, owner: Option<OwnerReference>) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            owner_references: owner.map(|o| vec![o]),
            ..Default::default()
        },
        spec: Some(PodSpec {
            service_account_name: Some(service_account.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn replica_set_owner() -> OwnerReference {
    OwnerReference {
        api_version: "apps/v1".to_string(),
        kind: "ReplicaSet".to_string(),
        name: "workspace-rs".to_string(),
        uid: "rs-uid-1".to_string(),
        ..Default::default()
    }
}

pub fn succeeded() -> JobStatus {
    JobStatus {
        succeeded: Some(1),
        ..Default::default()
    }
}

pub fn failed() -> JobStatus {
    JobStatus {
        failed: Some(1),
        ..Default::default()
    }
}

pub fn active() -> JobStatus {
    JobStatus {
        active: Some(1),
        ..Default::default()
    }
}

fn named_pod(name: &str) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    // -- scripting ---------------------------------------------------------

    pub fn claims(self, selector: &str, names: &[&str]) -> Self {
        self.with(|s| {
            s.claims.insert(
                selector.to_string(),
                names.iter().map(|n| (*n).to_string()).collect(),
            );
        });
        self
    }

    pub fn failing_claim_queries(self) -> Self {
        self.with(|s| s.claim_error = true);
        self
    }

    pub fn workspace_pods(self, selector: &str, pods: Vec<Pod>) -> Self {
        self.with(|s| {
            s.workspace_pods.insert(selector.to_string(), pods);
        });
        self
    }

    pub fn failing_pod_queries(self) -> Self {
        self.with(|s| s.pod_list_error = true);
        self
    }

    /// Pods belonging to the submitted Job, with their log output (`None` fails the stream).
    pub fn job_pod(self, name: &str, logs: Option<&str>) -> Self {
        self.with(|s| {
            s.job_pods.push(name.to_string());
            s.logs
                .insert(name.to_string(), logs.map(|l| l.as_bytes().to_vec()));
        });
        self
    }

    /// Number of empty running-pod queries before a pod shows up.
    pub fn running_after(self, queries: usize) -> Self {
        self.with(|s| s.running_after = queries);
        self
    }

    /// Number of running-pod queries that fail before the cluster answers.
    pub fn running_errors(self, errors: usize) -> Self {
        self.with(|s| s.running_errors = errors);
        self
    }

    /// Job statuses returned by consecutive lookups; the last one repeats.
    pub fn statuses(self, statuses: Vec<JobStatus>) -> Self {
        self.with(|s| s.statuses = statuses);
        self
    }

    pub fn decoy_job(self, name: &str, status: JobStatus) -> Self {
        self.with(|s| {
            s.decoy_jobs.push(Job {
                metadata: ObjectMeta {
                    name: Some(name.to_string()),
                    uid: Some(format!("{name}-uid")),
                    ..Default::default()
                },
                status: Some(status),
                ..Default::default()
            });
        });
        self
    }

    pub fn failing_job_creation(self) -> Self {
        self.with(|s| s.create_job_error = true);
        self
    }

    pub fn failing_deletes(self) -> Self {
        self.with(|s| s.delete_error = true);
        self
    }

    pub fn failing_services(self) -> Self {
        self.with(|s| s.service_error = true);
        self
    }

    pub fn failing_deployments(self) -> Self {
        self.with(|s| s.deployment_error = true);
        self
    }

    // -- inspection --------------------------------------------------------

    pub fn calls(&self) -> Vec<String> {
        self.with(|s| s.calls.clone())
    }

    pub fn deletes(&self) -> Vec<Delete> {
        self.with(|s| s.deletes.clone())
    }

    pub fn submitted(&self) -> Option<Job> {
        self.with(|s| s.submitted.clone())
    }

    pub fn services(&self) -> Vec<Service> {
        self.with(|s| s.services.clone())
    }

    pub fn deployments(&self) -> Vec<Deployment> {
        self.with(|s| s.deployments.clone())
    }

    pub fn running_queries(&self) -> usize {
        self.with(|s| s.running_queries)
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.with(|s| s.calls.iter().filter(|c| c.starts_with(prefix)).count())
    }
}

fn job_name_label(params: &ListParams) -> Option<&str> {
    params
        .label_selector
        .as_deref()
        .and_then(|labels| labels.strip_prefix("job-name="))
}

#[async_trait]
impl ClusterApi for FakeCluster {
    fn namespace(&self) -> &str {
        NAMESPACE
    }

    async fn list_claims(&self, params: &ListParams) -> Result<Vec<PersistentVolumeClaim>> {
        self.with(|s| {
            let selector = params.label_selector.clone().unwrap_or_default();
            s.calls.push(format!("list_claims:{selector}"));
            if s.claim_error {
                return Err(Error::Cluster("claims unavailable".to_string()));
            }
            Ok(s.claims
                .get(&selector)
                .map(|names| names.iter().map(|n| claim(n)).collect())
                .unwrap_or_default())
        })
    }

    async fn list_pods(&self, params: &ListParams) -> Result<Vec<Pod>> {
        self.with(|s| {
            let selector = params.label_selector.clone().unwrap_or_default();
            s.calls.push(format!("list_pods:{selector}"));

            if let Some(job_name) = job_name_label(params) {
                let submitted = s
                    .submitted
                    .as_ref()
                    .and_then(|job| job.metadata.name.as_deref())
                    == Some(job_name);
                if !submitted {
                    return Ok(Vec::new());
                }

                if params.field_selector.as_deref() == Some("status.phase=Running") {
                    s.running_queries += 1;
                    if s.running_errors > 0 {
                        s.running_errors -= 1;
                        return Err(Error::Cluster("pods unavailable".to_string()));
                    }
                    if s.running_after > 0 {
                        s.running_after -= 1;
                        return Ok(Vec::new());
                    }
                    return Ok(s.job_pods.first().map(|p| vec![named_pod(p)]).unwrap_or_default());
                }
                return Ok(s.job_pods.iter().map(|p| named_pod(p)).collect());
            }

            if s.pod_list_error {
                return Err(Error::Cluster("pods unavailable".to_string()));
            }
            Ok(s.workspace_pods.get(&selector).cloned().unwrap_or_default())
        })
    }

    async fn list_jobs(&self, _params: &ListParams) -> Result<Vec<Job>> {
        // Field selectors are ignored so callers must match the exact Job themselves
        self.with(|s| {
            s.calls.push("list_jobs".to_string());
            let mut jobs = s.decoy_jobs.clone();
            if let Some(mut job) = s.submitted.clone() {
                let index = s.status_queries.min(s.statuses.len().saturating_sub(1));
                job.status = s.statuses.get(index).cloned();
                s.status_queries += 1;
                jobs.push(job);
            }
            Ok(jobs)
        })
    }

    async fn create_job(&self, job: &Job) -> Result<Job> {
        self.with(|s| {
            let name = job.metadata.name.clone().unwrap_or_default();
            s.calls.push(format!("create_job:{name}"));
            if s.create_job_error {
                return Err(Error::Cluster("quota exceeded".to_string()));
            }
            let mut created = job.clone();
            created.metadata.uid = Some(format!("{name}-uid"));
            s.submitted = Some(created.clone());
            Ok(created)
        })
    }

    async fn delete_job(&self, name: &str, params: &DeleteParams) -> Result<()> {
        self.with(|s| {
            s.calls.push(format!("delete_job:{name}"));
            s.deletes.push(Delete {
                name: name.to_string(),
                propagation: format!("{:?}", params.propagation_policy),
                grace_period_seconds: params.grace_period_seconds,
            });
            if s.delete_error {
                return Err(Error::Cluster("delete refused".to_string()));
            }
            Ok(())
        })
    }

    async fn stream_logs(&self, pod_name: &str) -> Result<LogStream> {
        self.with(|s| {
            s.calls.push(format!("stream_logs:{pod_name}"));
            match s.logs.get(pod_name).cloned().flatten() {
                Some(bytes) => Ok(Box::pin(futures::io::Cursor::new(bytes)) as LogStream),
                None => Err(Error::Cluster(format!("no logs for {pod_name}"))),
            }
        })
    }

    async fn create_service(&self, service: &Service) -> Result<Service> {
        self.with(|s| {
            let name = service.metadata.name.clone().unwrap_or_default();
            s.calls.push(format!("create_service:{name}"));
            if s.service_error {
                return Err(Error::Cluster("service refused".to_string()));
            }
            s.services.push(service.clone());
            Ok(service.clone())
        })
    }

    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment> {
        self.with(|s| {
            let name = deployment.metadata.name.clone().unwrap_or_default();
            s.calls.push(format!("create_deployment:{name}"));
            if s.deployment_error {
                return Err(Error::Cluster("deployment refused".to_string()));
            }
            s.deployments.push(deployment.clone());
            Ok(deployment.clone())
        })
    }
}
