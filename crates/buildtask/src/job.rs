//! Build Job construction.

use crate::config::JobConfig;
use crate::error::Result;
use crate::naming::ResourceNaming;
use crate::resolver::ResourceBundle;
use crate::tasks::{SelectedTask, TemplateContext};
use k8s_openapi::api::batch::v1::Job;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::info;

pub const APP_LABEL: &str = "idc-buildtask";

/// Exactly one pod, no platform retries beyond the Job's single backoff.
const BACKOFF_LIMIT: i32 = 1;
const PARALLELISM: i32 = 1;

/// Build the Job that runs `task` for `project_name`.
///
/// Pure construction: no cluster calls.
pub fn build_job(
    bundle: &ResourceBundle,
    task: &SelectedTask<'_>,
    project_name: &str,
    job_name: &str,
    config: &JobConfig,
) -> Result<Job> {
    let ctx = TemplateContext {
        project_name,
        mount_path: &config.mount_path,
    };
    let command = ctx.render(&task.spec.command)?;
    let sub_path = ctx.render(&task.spec.sub_path)?;

    info!("Creating job {}", job_name);
    info!("Build command: {}", command);

    let mut labels = BTreeMap::new();
    labels.insert("app".to_string(), APP_LABEL.to_string());
    labels.insert("task".to_string(), ResourceNaming::sanitize_label_value(task.name));
    labels.insert(
        "project".to_string(),
        ResourceNaming::sanitize_label_value(project_name),
    );

    let job = json!({
        "apiVersion": "batch/v1",
        "kind": "Job",
        "metadata": {
            "name": job_name,
            "namespace": bundle.namespace,
            "labels": labels
        },
        "spec": {
            "backoffLimit": BACKOFF_LIMIT,
            "parallelism": PARALLELISM,
            "template": {
                "metadata": {
                    "labels": labels
                },
                "spec": {
                    "restartPolicy": "Never",
                    "serviceAccountName": bundle.service_account_name(),
                    "volumes": [{
                        "name": config.volume_name,
                        "persistentVolumeClaim": {
                            "claimName": bundle.storage_claim_name()
                        }
                    }],
                    "containers": [{
                        "name": config.container_name,
                        "image": task.spec.image,
                        "imagePullPolicy": "Always",
                        "command": ["/bin/sh", "-c"],
                        "args": [command],
                        "volumeMounts": [{
                            "name": config.volume_name,
                            "mountPath": config.mount_path,
                            "subPath": sub_path
                        }]
                    }]
                }
            }
        }
    });

    Ok(serde_json::from_value(job)?)
}
