//! Error types for the build task runner.

use std::time::Duration;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that stop a build task run.
///
/// A failed build is not an error: it is reported as
/// [`JobOutcome::Failed`](crate::orchestrator::JobOutcome::Failed).
#[derive(Debug, Error)]
pub enum Error {
    /// A discovery query failed for a reason other than an ambiguous match count
    #[error("Unable to retrieve {resource}: {source}")]
    Discovery {
        resource: &'static str,
        #[source]
        source: Box<Error>,
    },

    /// The build Job could not be created
    #[error("Failed to create job {name}: {source}")]
    Submit {
        name: String,
        #[source]
        source: Box<Error>,
    },

    /// The build Job could not be deleted
    #[error("Failed to delete job {name}: {source}")]
    Delete {
        name: String,
        #[source]
        source: Box<Error>,
    },

    /// The application Service or Deployment could not be created
    #[error("Unable to create application {kind}: {source}")]
    Publish {
        kind: &'static str,
        #[source]
        source: Box<Error>,
    },

    /// A wait for a cluster state transition exceeded its bound
    #[error("Timed out after {elapsed:?} waiting for {what}")]
    WaitTimeout { what: String, elapsed: Duration },

    /// A wait was cancelled before its condition was observed
    #[error("Cancelled while waiting for {0}")]
    Cancelled(String),

    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Error reported by a non-kube cluster implementation
    #[error("Cluster error: {0}")]
    Cluster(String),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Template rendering failed
    #[error("Template error: {0}")]
    Template(#[from] handlebars::RenderError),

    /// JSON (de)serialization of a Kubernetes object failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML configuration could not be parsed
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Writing streamed logs failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn discovery(resource: &'static str, source: Error) -> Self {
        Self::Discovery {
            resource,
            source: Box::new(source),
        }
    }
}
