//! Stored release records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tether_core::release::OWNER_VALUES_KEY;
use tether_core::{BundleMetadata, Release, ReleaseStatus, Values};

/// A stored release revision
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRelease {
    /// Release name
    pub name: String,

    /// Kubernetes namespace
    pub namespace: String,

    /// Revision number (1-indexed, increments with each upgrade)
    pub version: u32,

    /// Current status
    pub status: ReleaseStatus,

    /// Description of the last action taken on this revision
    #[serde(default)]
    pub description: String,

    /// Bundle metadata at deploy time
    pub bundle: BundleMetadata,

    /// Effective values
    pub values: Values,

    /// Rendered manifest
    pub manifest: String,

    /// Custom labels for filtering/querying
    #[serde(default)]
    pub labels: HashMap<String, String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredRelease {
    /// Create a new release for installation
    pub fn for_install(
        name: String,
        namespace: String,
        bundle: BundleMetadata,
        values: Values,
        manifest: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            name,
            namespace,
            version: 1,
            status: ReleaseStatus::PendingInstall,
            description: "Initial install underway".to_string(),
            bundle,
            values,
            manifest,
            labels: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Create the next revision for an upgrade
    pub fn for_upgrade(
        previous: &StoredRelease,
        bundle: BundleMetadata,
        values: Values,
        manifest: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            name: previous.name.clone(),
            namespace: previous.namespace.clone(),
            version: previous.version + 1,
            status: ReleaseStatus::PendingUpgrade,
            description: "Upgrade underway".to_string(),
            bundle,
            values,
            manifest,
            labels: previous.labels.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Create the revision that restores `target` after `failed` was rolled back
    ///
    /// The new revision is the latest one and is deployed, so the release
    /// reads as healthy again.
    pub fn for_rollback(target: &StoredRelease, failed: &StoredRelease) -> Self {
        let now = Utc::now();
        Self {
            name: target.name.clone(),
            namespace: target.namespace.clone(),
            version: failed.version + 1,
            status: ReleaseStatus::Deployed,
            description: format!("Rollback to {}", target.version),
            bundle: target.bundle.clone(),
            values: target.values.clone(),
            manifest: target.manifest.clone(),
            labels: target.labels.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Storage key for this release
    pub fn storage_key(&self) -> String {
        format!("sh.tether.release.v1.{}.v{}", self.name, self.version)
    }

    pub fn mark_deployed(&mut self, description: impl Into<String>) {
        self.set_status(ReleaseStatus::Deployed, description);
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.set_status(ReleaseStatus::Failed, reason);
    }

    /// Mark the revision as replaced by a newer one
    pub fn mark_superseded(&mut self) {
        self.set_status(ReleaseStatus::Superseded, "Superseded by a newer revision");
    }

    pub fn mark_uninstalling(&mut self) {
        self.set_status(ReleaseStatus::Uninstalling, "Deletion in progress");
    }

    fn set_status(&mut self, status: ReleaseStatus, description: impl Into<String>) {
        self.status = status;
        self.description = description.into();
        self.updated_at = Utc::now();
    }

    /// The locator's view of this revision
    pub fn to_release(&self) -> Release {
        Release {
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            status: self.status,
            version: self.version,
            semantic_version: Some(self.bundle.component_version()),
            description: self.description.clone(),
            owner: self.values.get_str(OWNER_VALUES_KEY).map(str::to_string),
        }
    }
}
