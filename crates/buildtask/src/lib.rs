//! Build Task Runner Library.
//!
//! Runs a single build Job in a Kubernetes namespace: discovers the
//! workspace PVC, service account and owner, submits the Job, follows it to
//! completion while streaming its logs, deletes it, and publishes the built
//! application after a successful full build.
//!
//! # Example
//!
//! ```ignore
//! use buildtask::{run_build_task, BuildRequest, BuildTaskConfig, KubeCluster, ResourceNaming};
//!
//! let client = kube::Client::try_default().await?;
//! let cluster = KubeCluster::new(client, "che");
//! let request = BuildRequest {
//!     task_name: "full".into(),
//!     project_name: "demo".into(),
//!     workspace_id: std::env::var("CHE_WORKSPACE_ID").ok(),
//!     job_name: ResourceNaming::job_name("codewind-liberty-build-job"),
//! };
//! let summary = run_build_task(&cluster, &BuildTaskConfig::default(), &request, cancel, &mut sink).await?;
//! ```

pub mod cluster;
pub mod config;
pub mod error;
pub mod job;
pub mod naming;
pub mod orchestrator;
pub mod pipeline;
pub mod publisher;
pub mod resolver;
pub mod tasks;
pub mod ui;
pub mod wait;

// Re-export commonly used types at the crate root
pub use cluster::{ClusterApi, KubeCluster, LogStream};
pub use config::BuildTaskConfig;
pub use error::{Error, Result};
pub use naming::ResourceNaming;
pub use orchestrator::{BuildOrchestrator, BuildReport, JobOutcome, Phase};
pub use pipeline::{run_build_task, BuildRequest, RunSummary};
pub use resolver::{Resolution, ResourceBundle, ResourceResolver};
pub use wait::WaitPolicy;
