//! Build Task Configuration
//!
//! Every setting has a built-in default, so the runner works without a config
//! file. A YAML file (camelCase keys) may override any section; CLI flags and
//! environment variables are applied on top by the binary.

use crate::error::{Error, Result};
use crate::tasks::TaskCatalog;
use crate::wait::WaitPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildTaskConfig {
    /// Build Job shape
    #[serde(default)]
    pub job: JobConfig,

    /// Build task variants
    #[serde(default)]
    pub tasks: TaskCatalog,

    /// Label selectors and fallbacks for resource discovery
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Bounds for the running/terminal waits
    #[serde(default)]
    pub wait: WaitConfig,

    /// Application Service/Deployment published after a full build
    #[serde(default)]
    pub publish: PublishConfig,
}

/// Build Job configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobConfig {
    /// Prefix of the generated Job name
    pub name_prefix: String,

    /// Where the workspace volume is mounted in the build container
    pub mount_path: String,

    /// Name of the workspace volume inside the pod spec
    pub volume_name: String,

    /// Name of the build container
    pub container_name: String,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            name_prefix: "codewind-liberty-build-job".to_string(),
            mount_path: "/data/idp".to_string(),
            volume_name: "idp-volume".to_string(),
            container_name: "maven-build".to_string(),
        }
    }
}

/// Resource discovery configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiscoveryConfig {
    /// Broad selector for the workspace PVC
    pub claim_selector: String,

    /// Label carrying the workspace identifier on workspace resources
    pub workspace_label: String,

    /// Broad selector for the workspace pod
    pub workspace_pod_selector: String,

    /// Claim used when no single PVC matches
    pub default_claim_name: String,

    /// Service account used when no single workspace pod matches
    pub default_service_account: String,

    /// Look up the workspace pod's owner so published resources are garbage collected with it
    pub resolve_owner: bool,

    /// Refuse to run without a workspace identifier
    pub require_workspace_id: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            claim_selector: "app=idp".to_string(),
            workspace_label: "che.workspace_id".to_string(),
            workspace_pod_selector: "che.original_name=che-workspace-pod".to_string(),
            default_claim_name: "claim-che-workspace".to_string(),
            default_service_account: "che-workspace".to_string(),
            resolve_owner: true,
            require_workspace_id: false,
        }
    }
}

impl DiscoveryConfig {
    /// Narrows a broad selector to a single workspace.
    pub fn workspace_selector(&self, base: &str, workspace_id: &str) -> String {
        format!("{base},{}={workspace_id}", self.workspace_label)
    }
}

/// Wait configuration, in serializable units
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WaitConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// `None` waits until the condition is observed or the run is cancelled
    pub timeout_secs: Option<u64>,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
            multiplier: 2.0,
            timeout_secs: Some(3600),
        }
    }
}

impl WaitConfig {
    pub fn policy(&self) -> WaitPolicy {
        WaitPolicy {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            multiplier: self.multiplier,
            timeout: self.timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Application publishing configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PublishConfig {
    /// Runtime image of the application server
    pub image: String,

    /// Container name in the Deployment
    pub container_name: String,

    /// Prefix of the Service/Deployment name; the project name is appended
    pub name_prefix: String,

    /// `chart` label applied to both objects
    pub chart_label: String,

    pub http_port: i32,
    pub https_port: i32,

    /// Where build artifacts are mounted in the application container
    pub mount_path: String,

    /// Sub-path of the workspace volume holding build artifacts (Handlebars, `project_name`)
    pub artifact_sub_path: String,

    /// Run the application container privileged
    pub privileged: bool,

    /// Optional postStart hook command, run through `/bin/sh -c`
    pub post_start_command: Option<String>,

    /// Secret holding optional APM settings exposed as environment variables
    pub apm_secret_name: Option<String>,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            image: "websphere-liberty:19.0.0.3-webProfile7".to_string(),
            container_name: "javamicroprofiletemplate".to_string(),
            name_prefix: "cw-".to_string(),
            chart_label: "javamicroprofiletemplate-1.0.0".to_string(),
            http_port: 9080,
            https_port: 9443,
            mount_path: "/config".to_string(),
            artifact_sub_path: "projects/{{project_name}}/buildartifacts".to_string(),
            privileged: true,
            post_start_command: None,
            apm_secret_name: Some("apm-server-config".to_string()),
        }
    }
}

impl BuildTaskConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        let config: Self = serde_yaml::from_str(&content)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load from `path` when given, otherwise use defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::from_file)
    }

    /// Validate that the configuration can drive a run.
    pub fn validate(&self) -> Result<()> {
        self.tasks.validate()?;

        if self.job.name_prefix.trim().is_empty() {
            return Err(Error::Config("job.namePrefix must not be empty".to_string()));
        }
        if !self.job.mount_path.starts_with('/') {
            return Err(Error::Config(format!(
                "job.mountPath must be absolute, got '{}'",
                self.job.mount_path
            )));
        }
        if self.discovery.default_claim_name.trim().is_empty()
            || self.discovery.default_service_account.trim().is_empty()
        {
            return Err(Error::Config(
                "discovery fallbacks must not be empty".to_string(),
            ));
        }
        if self.wait.multiplier < 1.0 {
            return Err(Error::Config(format!(
                "wait.multiplier must be at least 1.0, got {}",
                self.wait.multiplier
            )));
        }
        if self.wait.max_delay_ms < self.wait.initial_delay_ms {
            return Err(Error::Config(
                "wait.maxDelayMs must not be lower than wait.initialDelayMs".to_string(),
            ));
        }
        if self.publish.http_port == self.publish.https_port {
            return Err(Error::Config(
                "publish ports must be distinct".to_string(),
            ));
        }

        Ok(())
    }
}
