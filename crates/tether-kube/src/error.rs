//! Error types for tether-kube

use std::time::Duration;
use tether_core::TimeoutClass;
use thiserror::Error;

/// Result type for tether-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Kinds of reconciliation failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileKind {
    /// Install requested over an existing release
    AlreadyInstalled,
    /// Strict uninstall of a release that does not exist
    NotInstalled,
    /// The values override could not be parsed
    InvalidValues,
}

impl ReconcileKind {
    /// Whether the failure is caused by the request rather than the cluster
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::AlreadyInstalled | Self::NotInstalled | Self::InvalidValues
        )
    }
}

/// Errors that can occur during Kubernetes operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// The cluster could not be reached or refused the request
    #[error("unable to communicate with the cluster: {0}")]
    Communication(String),

    /// Release not found
    #[error("release '{name}' not found in namespace '{namespace}'")]
    ReleaseNotFound { name: String, namespace: String },

    /// Release already exists
    #[error("release '{name}' already exists in namespace '{namespace}'")]
    ReleaseAlreadyExists { name: String, namespace: String },

    /// Reconciliation could not bring the release into the desired state
    #[error("{detail}")]
    Reconcile { kind: ReconcileKind, detail: String },

    /// A guarded operation exceeded its configured limit
    #[error("the operation exceeded its {class} limit of {limit:?}; raise {class} in config.yml to allow more time")]
    Timeout { class: TimeoutClass, limit: Duration },

    /// A wait inside an operation ran out of time
    #[error("timed out: {0}")]
    DeadlineExceeded(String),

    /// Error with the action that failed
    #[error("{action}: {source}")]
    Context {
        action: String,
        #[source]
        source: Box<KubeError>,
    },

    /// Storage error
    #[error("storage error: {0}")]
    Storage(String),

    /// A stored release record exists but cannot be decoded
    #[error("release record {key} cannot be read: {reason}")]
    CorruptRecord { key: String, reason: String },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Compression error
    #[error("compression error: {0}")]
    Compression(String),

    /// Template rendering error
    #[error("template error: {0}")]
    Template(String),

    /// Bundle loading error
    #[error("bundle error: {0}")]
    Bundle(String),

    /// Invalid manifest
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A spawned operation panicked or was aborted
    #[error("operation task failed: {0}")]
    Task(String),
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for KubeError {
    fn from(e: serde_yaml::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl From<tether_core::CoreError> for KubeError {
    fn from(e: tether_core::CoreError) -> Self {
        KubeError::Bundle(e.to_string())
    }
}

impl From<minijinja::Error> for KubeError {
    fn from(e: minijinja::Error) -> Self {
        KubeError::Template(e.to_string())
    }
}

impl KubeError {
    pub fn reconcile(kind: ReconcileKind, detail: impl Into<String>) -> Self {
        KubeError::Reconcile {
            kind,
            detail: detail.into(),
        }
    }

    /// Wrap the error with the action that failed
    pub fn context(self, action: impl Into<String>) -> Self {
        KubeError::Context {
            action: action.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, looking through context wrappers
    pub fn root(&self) -> &KubeError {
        match self {
            KubeError::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Check if this is a Kubernetes 404 Not Found error
    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), KubeError::Api(kube::Error::Api(resp)) if resp.code == 404)
    }

    /// Check if this is a conflict error (409)
    pub fn is_conflict(&self) -> bool {
        matches!(self.root(), KubeError::Api(kube::Error::Api(resp)) if resp.code == 409)
    }

    /// Check if the error means the cluster could not be talked to at all
    pub fn is_communication(&self) -> bool {
        match self.root() {
            KubeError::Communication(_) => true,
            KubeError::Api(kube::Error::Api(resp)) => matches!(resp.code, 401 | 403),
            KubeError::Api(_) => true,
            _ => false,
        }
    }

    /// Check if the error is a guard timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self.root(), KubeError::Timeout { .. })
    }

    /// Check if the error reports running out of time in any form
    pub fn is_timeout_shaped(&self) -> bool {
        match self.root() {
            KubeError::Timeout { .. } | KubeError::DeadlineExceeded(_) => true,
            KubeError::Api(kube::Error::Api(resp)) => resp.code == 504,
            KubeError::Api(e) => {
                let msg = e.to_string().to_lowercase();
                msg.contains("timed out") || msg.contains("deadline exceeded")
            }
            _ => false,
        }
    }

    /// Reconciliation kind, if this is a reconciliation error
    pub fn reconcile_kind(&self) -> Option<ReconcileKind> {
        match self.root() {
            KubeError::Reconcile { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}
