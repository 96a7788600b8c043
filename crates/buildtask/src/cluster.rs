//! Cluster access used by the build task runner.
//!
//! The runner only ever lists, creates, deletes and reads logs. [`ClusterApi`]
//! captures exactly those calls so resolution and orchestration can run
//! against [`KubeCluster`] in production and an in-memory cluster in tests.

use crate::error::Result;
use async_trait::async_trait;
use futures::AsyncBufRead;
use k8s_openapi::api::{
    apps::v1::Deployment,
    batch::v1::Job,
    core::v1::{PersistentVolumeClaim, Pod, Service},
};
use kube::api::{Api, DeleteParams, ListParams, LogParams, PostParams};
use kube::Client;
use std::pin::Pin;
use tracing::debug;

/// A follow-mode log stream of a single pod
pub type LogStream = Pin<Box<dyn AsyncBufRead + Send>>;

/// The cluster operations needed to run one build task.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Namespace every call operates in
    fn namespace(&self) -> &str;

    async fn list_claims(&self, params: &ListParams) -> Result<Vec<PersistentVolumeClaim>>;

    async fn list_pods(&self, params: &ListParams) -> Result<Vec<Pod>>;

    async fn list_jobs(&self, params: &ListParams) -> Result<Vec<Job>>;

    /// Submit a Job, returning the object as stored by the cluster
    async fn create_job(&self, job: &Job) -> Result<Job>;

    async fn delete_job(&self, name: &str, params: &DeleteParams) -> Result<()>;

    /// Open a follow-mode log stream for a pod
    async fn stream_logs(&self, pod_name: &str) -> Result<LogStream>;

    async fn create_service(&self, service: &Service) -> Result<Service>;

    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment>;
}

/// [`ClusterApi`] backed by the Kubernetes API server
pub struct KubeCluster {
    namespace: String,
    claims: Api<PersistentVolumeClaim>,
    pods: Api<Pod>,
    jobs: Api<Job>,
    services: Api<Service>,
    deployments: Api<Deployment>,
}

impl KubeCluster {
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        Self {
            claims: Api::namespaced(client.clone(), &namespace),
            pods: Api::namespaced(client.clone(), &namespace),
            jobs: Api::namespaced(client.clone(), &namespace),
            services: Api::namespaced(client.clone(), &namespace),
            deployments: Api::namespaced(client, &namespace),
            namespace,
        }
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn list_claims(&self, params: &ListParams) -> Result<Vec<PersistentVolumeClaim>> {
        debug!(labels = ?params.label_selector, "Listing persistent volume claims");
        Ok(self.claims.list(params).await?.items)
    }

    async fn list_pods(&self, params: &ListParams) -> Result<Vec<Pod>> {
        debug!(labels = ?params.label_selector, fields = ?params.field_selector, "Listing pods");
        Ok(self.pods.list(params).await?.items)
    }

    async fn list_jobs(&self, params: &ListParams) -> Result<Vec<Job>> {
        debug!(fields = ?params.field_selector, "Listing jobs");
        Ok(self.jobs.list(params).await?.items)
    }

    async fn create_job(&self, job: &Job) -> Result<Job> {
        Ok(self.jobs.create(&PostParams::default(), job).await?)
    }

    async fn delete_job(&self, name: &str, params: &DeleteParams) -> Result<()> {
        self.jobs.delete(name, params).await?;
        Ok(())
    }

    async fn stream_logs(&self, pod_name: &str) -> Result<LogStream> {
        let params = LogParams {
            follow: true,
            ..LogParams::default()
        };
        let stream = self.pods.log_stream(pod_name, &params).await?;
        Ok(Box::pin(stream))
    }

    async fn create_service(&self, service: &Service) -> Result<Service> {
        Ok(self.services.create(&PostParams::default(), service).await?)
    }

    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment> {
        Ok(self
            .deployments
            .create(&PostParams::default(), deployment)
            .await?)
    }
}
