//! Resource discovery.
//!
//! Finds the workspace PVC, the service account and the owning workload
//! through label queries. Ambiguous results fall back to broader queries and
//! finally to documented defaults; failed queries are fatal.

use crate::cluster::ClusterApi;
use crate::config::DiscoveryConfig;
use crate::error::{Error, Result};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::ListParams;
use std::fmt;
use tracing::{debug, info, instrument, warn};

/// Which tier of the lookup produced a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Workspace-specific query matched exactly one resource
    Primary,
    /// Broader query matched exactly one resource
    Secondary,
    /// Nothing matched unambiguously; the configured default is used
    Fallback,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Secondary => write!(f, "secondary"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub value: String,
    pub source: Resolution,
}

/// Cluster identifiers a build needs. Built once per run.
#[derive(Debug, Clone)]
pub struct ResourceBundle {
    pub namespace: String,
    pub storage_claim: Resolved,
    pub service_account: Resolved,
    pub owner_reference: Option<OwnerReference>,
}

impl ResourceBundle {
    pub fn storage_claim_name(&self) -> &str {
        &self.storage_claim.value
    }

    pub fn service_account_name(&self) -> &str {
        &self.service_account.value
    }
}

pub struct ResourceResolver<'a, C: ClusterApi + ?Sized> {
    cluster: &'a C,
    config: &'a DiscoveryConfig,
    workspace_id: Option<&'a str>,
}

/// Returns the only element, or `None` for zero or several.
fn exactly_one<T>(mut items: Vec<T>) -> Option<T> {
    if items.len() == 1 {
        items.pop()
    } else {
        None
    }
}

impl<'a, C: ClusterApi + ?Sized> ResourceResolver<'a, C> {
    pub fn new(cluster: &'a C, config: &'a DiscoveryConfig, workspace_id: Option<&'a str>) -> Self {
        let workspace_id = workspace_id.map(str::trim).filter(|id| !id.is_empty());
        Self {
            cluster,
            config,
            workspace_id,
        }
    }

    /// Resolve everything a build needs.
    #[instrument(skip(self), fields(namespace = %self.cluster.namespace()))]
    pub async fn resolve(&self) -> Result<ResourceBundle> {
        match self.workspace_id {
            Some(id) => info!("Workspace ID: {}", id),
            None if self.config.require_workspace_id => {
                return Err(Error::Config(
                    "Workspace ID not set and unable to run the build job".to_string(),
                ));
            }
            None => warn!("Workspace ID not set, using broad selectors and defaults"),
        }

        let storage_claim = self.resolve_storage_claim().await?;
        info!(
            "Persistent Volume Claim: {} ({})",
            storage_claim.value, storage_claim.source
        );

        let service_account = self.resolve_service_account().await?;
        info!(
            "Service Account: {} ({})",
            service_account.value, service_account.source
        );

        let owner_reference = self.resolve_owner_reference().await?;
        match &owner_reference {
            Some(owner) => info!("Owner reference: {} {} ({})", owner.kind, owner.name, owner.uid),
            None => info!("No owner reference, published resources will be unowned"),
        }

        Ok(ResourceBundle {
            namespace: self.cluster.namespace().to_string(),
            storage_claim,
            service_account,
            owner_reference,
        })
    }

    /// Workspace-specific selector first, then the broad one.
    fn tiers(&self, broad: &str) -> Vec<(Resolution, String)> {
        let mut tiers = Vec::with_capacity(2);
        if let Some(id) = self.workspace_id {
            tiers.push((Resolution::Primary, self.config.workspace_selector(broad, id)));
        }
        tiers.push((Resolution::Secondary, broad.to_string()));
        tiers
    }

    pub async fn resolve_storage_claim(&self) -> Result<Resolved> {
        for (source, selector) in self.tiers(&self.config.claim_selector) {
            let claims = self
                .cluster
                .list_claims(&ListParams::default().labels(&selector))
                .await
                .map_err(|e| Error::discovery("persistent volume claims", e))?;
            let count = claims.len();

            if let Some(name) = exactly_one(claims).and_then(|claim| claim.metadata.name) {
                return Ok(Resolved { value: name, source });
            }
            debug!("{} claims matched '{}'", count, selector);
        }

        warn!(
            "Could not find a unique workspace PVC, using default: {}",
            self.config.default_claim_name
        );
        Ok(Resolved {
            value: self.config.default_claim_name.clone(),
            source: Resolution::Fallback,
        })
    }

    pub async fn resolve_service_account(&self) -> Result<Resolved> {
        for (source, selector) in self.tiers(&self.config.workspace_pod_selector) {
            let pods = self
                .cluster
                .list_pods(&ListParams::default().labels(&selector))
                .await
                .map_err(|e| Error::discovery("workspace pod", e))?;
            let count = pods.len();

            let account = exactly_one(pods)
                .and_then(|pod| pod.spec)
                .and_then(|spec| spec.service_account_name)
                .filter(|name| !name.is_empty());
            if let Some(name) = account {
                return Ok(Resolved { value: name, source });
            }
            debug!("{} workspace pods matched '{}'", count, selector);
        }

        warn!(
            "Could not find the workspace service account, using default: {}",
            self.config.default_service_account
        );
        Ok(Resolved {
            value: self.config.default_service_account.clone(),
            source: Resolution::Fallback,
        })
    }

    /// First owner of the workspace pod. Never fabricated.
    pub async fn resolve_owner_reference(&self) -> Result<Option<OwnerReference>> {
        if !self.config.resolve_owner {
            debug!("Owner reference resolution disabled");
            return Ok(None);
        }
        let Some(id) = self.workspace_id else {
            warn!("Cannot resolve owner reference without a workspace ID");
            return Ok(None);
        };

        let selector = self
            .config
            .workspace_selector(&self.config.workspace_pod_selector, id);
        let pods = self
            .cluster
            .list_pods(&ListParams::default().labels(&selector))
            .await
            .map_err(|e| Error::discovery("workspace pod owner", e))?;

        let count = pods.len();
        let Some(pod) = exactly_one(pods) else {
            warn!("Expected one workspace pod for owner lookup, found {}", count);
            return Ok(None);
        };

        let owner = pod
            .metadata
            .owner_references
            .and_then(|owners| owners.into_iter().next());
        if owner.is_none() {
            warn!("Workspace pod has no owner references");
        }
        Ok(owner)
    }
}
