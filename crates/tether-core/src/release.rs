//! Release model as seen by the locator and reconciler

use semver::Version;
use serde::{Deserialize, Serialize};

/// Values key holding the free-text owner of a release
pub const OWNER_VALUES_KEY: &str = "createdBy";

/// A release of a named component found in the cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    /// Release name
    pub name: String,

    /// Kubernetes namespace
    pub namespace: String,

    /// Current status
    pub status: ReleaseStatus,

    /// Monotonic release revision
    pub version: u32,

    /// Semantic version of the deployed component, if the release carries one
    #[serde(default)]
    pub semantic_version: Option<Version>,

    /// Human readable description of the last action
    #[serde(default)]
    pub description: String,

    /// Who created the release, read from the `createdBy` value
    #[serde(default)]
    pub owner: Option<String>,
}

impl Release {
    /// Owner label, "unknown" when the release does not record one
    pub fn owner_label(&self) -> &str {
        self.owner.as_deref().unwrap_or("unknown")
    }
}

/// Release status
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ReleaseStatus {
    #[default]
    Unknown,
    Deployed,
    Superseded,
    Failed,
    Uninstalling,
    PendingInstall,
    PendingUpgrade,
    PendingRollback,
}

impl ReleaseStatus {
    /// Whether the status is expected to resolve on its own
    pub fn is_transitional(&self) -> bool {
        matches!(
            self,
            Self::PendingInstall | Self::PendingUpgrade | Self::PendingRollback | Self::Uninstalling
        )
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_transitional()
    }
}

impl std::fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Deployed => "deployed",
            Self::Superseded => "superseded",
            Self::Failed => "failed",
            Self::Uninstalling => "uninstalling",
            Self::PendingInstall => "pending-install",
            Self::PendingUpgrade => "pending-upgrade",
            Self::PendingRollback => "pending-rollback",
        };
        write!(f, "{}", s)
    }
}

/// Release information exposed to templates as `release`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseInfo {
    /// Release name
    pub name: String,

    /// Target namespace
    pub namespace: String,

    /// Revision number
    pub revision: u32,

    /// Is this an install operation?
    pub is_install: bool,

    /// Is this an upgrade operation?
    pub is_upgrade: bool,

    /// Service (always "Tether")
    pub service: String,
}

impl ReleaseInfo {
    /// Create release info for a new install
    pub fn for_install(name: &str, namespace: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            revision: 1,
            is_install: true,
            is_upgrade: false,
            service: "Tether".to_string(),
        }
    }

    /// Create release info for an upgrade
    pub fn for_upgrade(name: &str, namespace: &str, revision: u32) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            revision,
            is_install: false,
            is_upgrade: true,
            service: "Tether".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitional_statuses() {
        assert!(ReleaseStatus::PendingInstall.is_transitional());
        assert!(ReleaseStatus::PendingUpgrade.is_transitional());
        assert!(ReleaseStatus::PendingRollback.is_transitional());
        assert!(ReleaseStatus::Uninstalling.is_transitional());

        assert!(ReleaseStatus::Deployed.is_terminal());
        assert!(ReleaseStatus::Failed.is_terminal());
        assert!(ReleaseStatus::Superseded.is_terminal());
        assert!(ReleaseStatus::Unknown.is_terminal());
    }

    #[test]
    fn test_status_serde_is_kebab_case() {
        let json = serde_json::to_string(&ReleaseStatus::PendingUpgrade).unwrap();
        assert_eq!(json, "\"pending-upgrade\"");
        assert_eq!(ReleaseStatus::PendingUpgrade.to_string(), "pending-upgrade");
    }

    #[test]
    fn test_owner_label_defaults_to_unknown() {
        let mut release = Release {
            name: "traffic-manager".to_string(),
            namespace: "ambassador".to_string(),
            status: ReleaseStatus::Deployed,
            version: 1,
            semantic_version: None,
            description: String::new(),
            owner: None,
        };
        assert_eq!(release.owner_label(), "unknown");

        release.owner = Some("alice@example.com".to_string());
        assert_eq!(release.owner_label(), "alice@example.com");
    }
}
