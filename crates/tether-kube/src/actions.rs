//! Release actions: the write side of the release store
//!
//! `ReleaseActions` is implemented against a live cluster by
//! [`KubeClient`](crate::client::KubeClient) and in memory by
//! [`MockCluster`](crate::mock::MockCluster).

use async_trait::async_trait;
use std::time::Duration;
use tether_core::{LoadedBundle, ReleaseInfo, TemplateContext, Values};

use crate::error::{KubeError, Result};
use crate::release::StoredRelease;
use crate::render::render_bundle;
use crate::storage::StorageDriver;

/// Default wait limit when an action is run without a guard
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Options for install operation
#[derive(Debug, Clone)]
pub struct InstallOptions {
    pub name: String,
    pub namespace: String,

    /// How long to wait for the released workloads to become ready
    pub timeout: Duration,

    /// Remove everything that was created if the install fails
    pub atomic: bool,

    /// Create namespace if it doesn't exist
    pub create_namespace: bool,

    /// Description for this release
    pub description: Option<String>,
}

impl InstallOptions {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            timeout: DEFAULT_TIMEOUT,
            atomic: true,
            create_namespace: true,
            description: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Options for upgrade operation
#[derive(Debug, Clone)]
pub struct UpgradeOptions {
    pub name: String,
    pub namespace: String,
    pub timeout: Duration,

    /// Roll back to the previous revision if the upgrade fails
    pub atomic: bool,

    /// Ignore the values of the previous revision
    pub reset_values: bool,

    /// Merge the new values over the values of the previous revision
    pub reuse_values: bool,

    pub description: Option<String>,
}

impl UpgradeOptions {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            timeout: DEFAULT_TIMEOUT,
            atomic: true,
            reset_values: false,
            reuse_values: false,
            description: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_values_policy(mut self, reset_values: bool, reuse_values: bool) -> Self {
        self.reset_values = reset_values;
        self.reuse_values = reuse_values;
        self
    }
}

/// Options for uninstall operation
#[derive(Debug, Clone)]
pub struct UninstallOptions {
    pub name: String,
    pub namespace: String,
    pub timeout: Duration,
}

impl UninstallOptions {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Mutations of cluster releases
#[async_trait]
pub trait ReleaseActions: Send + Sync {
    /// Install a bundle as a new release
    async fn install(
        &self,
        bundle: &LoadedBundle,
        values: Values,
        options: &InstallOptions,
    ) -> Result<StoredRelease>;

    /// Upgrade an existing release to a new revision
    async fn upgrade(
        &self,
        bundle: &LoadedBundle,
        values: Values,
        options: &UpgradeOptions,
    ) -> Result<StoredRelease>;

    /// Remove a release and its resources
    async fn uninstall(&self, options: &UninstallOptions) -> Result<StoredRelease>;

    /// Take ownership of resources that exist in the cluster but were created
    /// outside of any release. Returns how many resources were adopted.
    async fn import_legacy(
        &self,
        bundle: &LoadedBundle,
        values: &Values,
        name: &str,
        namespace: &str,
    ) -> Result<usize>;
}

/// Values for an install: bundle defaults with the supplied values on top
pub fn install_values(bundle: &LoadedBundle, values: &Values) -> Result<Values> {
    let mut resolved = bundle.default_values()?;
    resolved.merge(values);
    Ok(resolved)
}

/// Values for an upgrade
///
/// - `reset_values`: bundle defaults with the supplied values on top
/// - `reuse_values`: the previous revision's values with the supplied values on top
/// - otherwise: as `reset_values`
pub fn upgrade_values(
    bundle: &LoadedBundle,
    previous: &StoredRelease,
    values: &Values,
    options: &UpgradeOptions,
) -> Result<Values> {
    if options.reuse_values && !options.reset_values {
        let mut resolved = previous.values.clone();
        resolved.merge(values);
        Ok(resolved)
    } else {
        install_values(bundle, values)
    }
}

/// Record an upgrade that failed and was rolled back to `previous`
///
/// `failed` stays in the history as Failed, `previous` becomes Superseded and
/// a new Deployed revision restoring `previous` becomes the latest one.
pub async fn record_rollback(
    storage: &dyn StorageDriver,
    previous: &mut StoredRelease,
    failed: &mut StoredRelease,
    error: &KubeError,
) -> Result<StoredRelease> {
    failed.mark_failed(format!(
        "Upgrade failed and was rolled back to revision {}: {}",
        previous.version, error
    ));
    storage.update(failed).await?;

    let rollback = StoredRelease::for_rollback(previous, failed);
    storage.create(&rollback).await?;

    previous.mark_superseded();
    storage.update(previous).await?;

    Ok(rollback)
}

/// Render the bundle's manifest for a release
pub fn render_release(bundle: &LoadedBundle, values: &Values, info: ReleaseInfo) -> Result<String> {
    let context = TemplateContext::new(values.clone(), info, bundle.metadata());
    render_bundle(bundle, &context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MockStorageDriver;
    use tether_core::{Bundle, BundleMetadata, ReleaseStatus};

    fn bundle_with_defaults(dir: &std::path::Path) -> LoadedBundle {
        std::fs::write(
            dir.join("values.yaml"),
            "image:\n  registry: ghcr.io/tether-dev\n  tag: 2.4.0\nreplicas: 1\n",
        )
        .unwrap();
        LoadedBundle {
            bundle: Bundle {
                api_version: "tether/v1".to_string(),
                metadata: BundleMetadata {
                    name: "traffic-manager".to_string(),
                    version: semver::Version::new(2, 5, 0),
                    app_version: None,
                    description: None,
                },
            },
            root: dir.to_path_buf(),
            templates_dir: dir.join("templates"),
            values_path: dir.join("values.yaml"),
        }
    }

    #[test]
    fn test_install_values_layer_over_bundle_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let bundle = bundle_with_defaults(dir.path());

        let values = install_values(
            &bundle,
            &Values(serde_json::json!({ "image": { "tag": "2.5.0" } })),
        )
        .unwrap();

        assert_eq!(values.get_str("image.registry"), Some("ghcr.io/tether-dev"));
        assert_eq!(values.get_str("image.tag"), Some("2.5.0"));
        assert_eq!(values.get("replicas").unwrap(), 1);
    }

    #[test]
    fn test_upgrade_values_policies() {
        let dir = tempfile::TempDir::new().unwrap();
        let bundle = bundle_with_defaults(dir.path());
        let previous = StoredRelease::for_install(
            "traffic-manager".to_string(),
            "ambassador".to_string(),
            bundle.metadata().clone(),
            Values(serde_json::json!({ "replicas": 3, "logLevel": "debug" })),
            String::new(),
        );
        let new_values = Values(serde_json::json!({ "image": { "tag": "2.5.0" } }));

        let reuse = UpgradeOptions::new("traffic-manager", "ambassador").with_values_policy(false, true);
        let reused = upgrade_values(&bundle, &previous, &new_values, &reuse).unwrap();
        assert_eq!(reused.get("replicas").unwrap(), 3);
        assert_eq!(reused.get_str("logLevel"), Some("debug"));
        assert_eq!(reused.get_str("image.tag"), Some("2.5.0"));

        let reset = UpgradeOptions::new("traffic-manager", "ambassador").with_values_policy(true, false);
        let fresh = upgrade_values(&bundle, &previous, &new_values, &reset).unwrap();
        assert_eq!(fresh.get("replicas").unwrap(), 1);
        assert!(fresh.get("logLevel").is_none());
    }

    #[tokio::test]
    async fn test_record_rollback_leaves_deployed_latest() {
        let dir = tempfile::TempDir::new().unwrap();
        let bundle = bundle_with_defaults(dir.path());
        let mut previous = StoredRelease::for_install(
            "traffic-manager".to_string(),
            "ambassador".to_string(),
            bundle.metadata().clone(),
            Values::new(),
            "kind: Deployment".to_string(),
        );
        previous.mark_deployed("Install complete");
        let mut failed = StoredRelease::for_upgrade(
            &previous,
            bundle.metadata().clone(),
            Values::new(),
            "kind: Broken".to_string(),
        );
        let storage = MockStorageDriver::with_releases(vec![previous.clone(), failed.clone()]);

        let rollback = record_rollback(
            &storage,
            &mut previous,
            &mut failed,
            &KubeError::DeadlineExceeded("waiting for deployments".into()),
        )
        .await
        .unwrap();

        assert_eq!(rollback.version, 3);
        let history = storage.history("ambassador", "traffic-manager").await.unwrap();
        let statuses: Vec<_> = history.iter().map(|r| (r.version, r.status)).collect();
        assert_eq!(
            statuses,
            vec![
                (3, ReleaseStatus::Deployed),
                (2, ReleaseStatus::Failed),
                (1, ReleaseStatus::Superseded),
            ]
        );
        assert!(history[1].description.contains("rolled back to revision 1"));
    }
}
