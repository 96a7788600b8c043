//! Application publishing after a successful full build.

use crate::cluster::ClusterApi;
use crate::config::PublishConfig;
use crate::error::{Error, Result};
use crate::naming::ResourceNaming;
use crate::orchestrator::JobOutcome;
use crate::resolver::ResourceBundle;
use crate::tasks::{TaskCatalog, TemplateContext};
use k8s_openapi::api::{apps::v1::Deployment, core::v1::Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::info;

const APM_VARIABLES: [(&str, &str); 5] = [
    ("IBM_APM_SERVER_URL", "ibm_apm_server_url"),
    ("IBM_APM_KEYFILE", "ibm_apm_keyfile"),
    ("IBM_APM_INGRESS_URL", "ibm_apm_ingress_url"),
    ("IBM_APM_KEYFILE_PASSWORD", "ibm_apm_keyfile_password"),
    ("IBM_APM_ACCESS_TOKEN", "ibm_apm_access_token"),
];

/// The long-running application objects
#[derive(Debug, Clone)]
pub struct ServiceBundle {
    pub service: Service,
    pub deployment: Deployment,
}

/// Publication happens only for a successful build of the full task.
pub fn should_publish(outcome: JobOutcome, catalog: &TaskCatalog, requested_task: &str) -> bool {
    outcome.is_success() && catalog.is_full_mode(requested_task)
}

/// Build the Service and Deployment for `project_name`. No cluster calls.
pub fn build_service_bundle(
    bundle: &ResourceBundle,
    project_name: &str,
    config: &PublishConfig,
) -> Result<ServiceBundle> {
    let name = ResourceNaming::application_name(&config.name_prefix, project_name);
    let selector_app = ResourceNaming::application_selector(&name);

    let mut labels = BTreeMap::new();
    labels.insert("chart".to_string(), config.chart_label.clone());
    labels.insert("release".to_string(), name.clone());

    let mut pod_labels = BTreeMap::new();
    pod_labels.insert("app".to_string(), selector_app.clone());
    pod_labels.insert("version".to_string(), "current".to_string());
    pod_labels.insert("release".to_string(), name.clone());

    let owner_references: Vec<Value> = bundle
        .owner_reference
        .iter()
        .map(owner_reference_json)
        .collect();

    let mut service = json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": {
            "name": name,
            "namespace": bundle.namespace,
            "labels": labels
        },
        "spec": {
            "type": "NodePort",
            "ports": [
                { "name": "http", "port": config.http_port },
                { "name": "https", "port": config.https_port }
            ],
            "selector": { "app": selector_app }
        }
    });

    let artifact_sub_path = TemplateContext {
        project_name,
        mount_path: &config.mount_path,
    }
    .render(&config.artifact_sub_path)?;

    let mut container = json!({
        "name": config.container_name,
        "image": config.image,
        "imagePullPolicy": "Always",
        "securityContext": { "privileged": config.privileged },
        "ports": [
            { "name": "http", "containerPort": config.http_port },
            { "name": "https", "containerPort": config.https_port }
        ],
        "env": environment(&name, project_name, config),
        "volumeMounts": [{
            "name": "idp-volume",
            "mountPath": config.mount_path,
            "subPath": artifact_sub_path
        }]
    });

    if let Some(command) = config.post_start_command.as_deref().filter(|c| !c.trim().is_empty()) {
        container["lifecycle"] = json!({
            "postStart": {
                "exec": { "command": ["/bin/sh", "-c", command] }
            }
        });
    }

    let mut deployment = json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {
            "name": name,
            "namespace": bundle.namespace,
            "labels": labels
        },
        "spec": {
            "replicas": 1,
            "selector": { "matchLabels": pod_labels },
            "template": {
                "metadata": { "labels": pod_labels },
                "spec": {
                    "serviceAccountName": bundle.service_account_name(),
                    "volumes": [{
                        "name": "idp-volume",
                        "persistentVolumeClaim": {
                            "claimName": bundle.storage_claim_name()
                        }
                    }],
                    "containers": [container]
                }
            }
        }
    });

    if !owner_references.is_empty() {
        service["metadata"]["ownerReferences"] = json!(owner_references);
        deployment["metadata"]["ownerReferences"] = json!(owner_references);
    }

    Ok(ServiceBundle {
        service: serde_json::from_value(service)?,
        deployment: serde_json::from_value(deployment)?,
    })
}

fn owner_reference_json(owner: &OwnerReference) -> Value {
    json!({
        "apiVersion": owner.api_version,
        "kind": owner.kind,
        "name": owner.name,
        "uid": owner.uid,
        "controller": true,
        "blockOwnerDeletion": true
    })
}

fn environment(application_name: &str, project_name: &str, config: &PublishConfig) -> Vec<Value> {
    let mut env = vec![
        json!({ "name": "PORT", "value": config.http_port.to_string() }),
        json!({ "name": "APPLICATION_NAME", "value": application_name }),
        json!({ "name": "PROJECT_NAME", "value": project_name }),
        json!({ "name": "IN_K8", "value": "true" }),
    ];

    if let Some(secret) = config.apm_secret_name.as_deref() {
        env.extend(APM_VARIABLES.iter().map(|(name, key)| {
            json!({
                "name": name,
                "valueFrom": {
                    "secretKeyRef": { "name": secret, "key": key, "optional": true }
                }
            })
        }));
    }

    env
}

pub struct ServicePublisher<'a, C: ClusterApi + ?Sized> {
    cluster: &'a C,
    config: &'a PublishConfig,
}

impl<'a, C: ClusterApi + ?Sized> ServicePublisher<'a, C> {
    pub fn new(cluster: &'a C, config: &'a PublishConfig) -> Self {
        Self { cluster, config }
    }

    /// Create the Service, then the Deployment that backs it.
    pub async fn publish(&self, bundle: &ResourceBundle, project_name: &str) -> Result<ServiceBundle> {
        let objects = build_service_bundle(bundle, project_name, self.config)?;

        info!("Deploying application...");
        self.cluster
            .create_service(&objects.service)
            .await
            .map_err(|e| Error::Publish {
                kind: "service",
                source: Box::new(e),
            })?;
        info!(
            "Created service {}",
            objects.service.metadata.name.as_deref().unwrap_or_default()
        );

        self.cluster
            .create_deployment(&objects.deployment)
            .await
            .map_err(|e| Error::Publish {
                kind: "deployment",
                source: Box::new(e),
            })?;
        info!(
            "Created deployment {}",
            objects.deployment.metadata.name.as_deref().unwrap_or_default()
        );

        Ok(objects)
    }
}
