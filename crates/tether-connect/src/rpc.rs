//! Traffic manager RPC types and the client trait
//!
//! All intercept operations are scoped to a [`SessionInfo`]. Create and remove
//! report failures in-band as an [`InterceptResult`] rather than as transport
//! errors; see [`crate::translate`] for turning those into messages.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Mechanism used when a spec does not name one
pub const DEFAULT_MECHANISM: &str = "tcp";

/// Local host traffic is sent to when a spec does not name one
pub const DEFAULT_TARGET_HOST: &str = "127.0.0.1";

/// Error codes reported by intercept operations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InterceptErrorCode {
    /// No error
    #[default]
    Unspecified,
    NoPreviewHost,
    NoConnection,
    NoManager,
    ManagerConnecting,
    AlreadyExists,
    NoAcceptableTarget,
    ManagerError,
    AmbiguousMatch,
    FailedToEstablish,
    FailedToRemove,
    NotFound,
}

/// Connected client session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: String,

    /// API server host of the cluster the session belongs to
    #[serde(default)]
    pub cluster_host: Option<String>,
}

impl SessionInfo {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            cluster_host: None,
        }
    }
}

/// Desired intercept
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterceptSpec {
    /// Unique per session
    pub name: String,

    /// Workload whose traffic is intercepted
    pub workload: String,

    pub mechanism: String,
    pub target_host: String,
    pub target_port: u16,
}

impl InterceptSpec {
    /// Intercept of `workload` sent to local `target_port`, named after the workload
    pub fn new(workload: impl Into<String>, target_port: u16) -> Self {
        let workload = workload.into();
        Self {
            name: workload.clone(),
            workload,
            mechanism: DEFAULT_MECHANISM.to_string(),
            target_host: DEFAULT_TARGET_HOST.to_string(),
            target_port,
        }
    }

    /// Use `name` for the intercept; an empty name keeps the workload name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !name.is_empty() {
            self.name = name;
        }
        self
    }
}

/// Outcome of a create or remove call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterceptResult {
    #[serde(default)]
    pub error: InterceptErrorCode,

    /// Payload of the error, its meaning depends on the code
    #[serde(default)]
    pub error_text: String,
}

impl InterceptResult {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn error(code: InterceptErrorCode, text: impl Into<String>) -> Self {
        Self {
            error: code,
            error_text: text.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error == InterceptErrorCode::Unspecified
    }
}

/// An active intercept
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterceptInfo {
    pub spec: InterceptSpec,

    #[serde(default)]
    pub preview_domain: Option<String>,
}

impl InterceptInfo {
    /// Preview URL, with `https://` added when the domain has no scheme
    pub fn preview_url(&self) -> Option<String> {
        let domain = self.preview_domain.as_deref().filter(|d| !d.is_empty())?;
        if domain.starts_with("https://") || domain.starts_with("http://") {
            Some(domain.to_string())
        } else {
            Some(format!("https://{domain}"))
        }
    }
}

/// A workload candidate, as listed in an ambiguous match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub name: String,
    pub hostname: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub name: String,
    pub version: String,
}

/// The traffic manager's RPC surface
#[async_trait]
pub trait ManagerRpc: Send + Sync {
    async fn version(&self) -> Result<VersionInfo>;

    async fn create_intercept(
        &self,
        session: &SessionInfo,
        spec: &InterceptSpec,
    ) -> Result<InterceptResult>;

    async fn remove_intercept(&self, session: &SessionInfo, name: &str) -> Result<InterceptResult>;

    async fn list_intercepts(&self, session: &SessionInfo) -> Result<Vec<InterceptInfo>>;
}
