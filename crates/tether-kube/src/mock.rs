//! In-memory cluster for testing release reconciliation
//!
//! [`MockCluster`] performs release actions against a [`MockStorageDriver`]
//! without applying anything. Failures and delays can be scripted, and every
//! action is counted so tests can assert what was (not) done.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tether_core::{LoadedBundle, ReleaseInfo, Values};

use crate::actions::{
    InstallOptions, ReleaseActions, UninstallOptions, UpgradeOptions, install_values,
    record_rollback, render_release, upgrade_values,
};
use crate::error::{KubeError, Result};
use crate::release::StoredRelease;
use crate::storage::{MockStorageDriver, StorageDriver};

/// Counts of release actions performed
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ActionCounts {
    pub installs: usize,
    pub upgrades: usize,
    pub uninstalls: usize,
    pub imports: usize,
}

#[derive(Default)]
struct Script {
    install_failure: Option<fn() -> KubeError>,
    upgrade_failure: Option<fn() -> KubeError>,
    import_failure: Option<fn() -> KubeError>,
    install_delay: Option<Duration>,
    legacy_resources: usize,
}

/// Release actions backed by in-memory storage
#[derive(Clone, Default)]
pub struct MockCluster {
    storage: MockStorageDriver,
    counts: Arc<Mutex<ActionCounts>>,
    script: Arc<Mutex<Script>>,
}

impl MockCluster {
    pub fn new(storage: MockStorageDriver) -> Self {
        Self {
            storage,
            ..Default::default()
        }
    }

    /// The storage the cluster records releases in
    pub fn storage(&self) -> &MockStorageDriver {
        &self.storage
    }

    pub fn counts(&self) -> ActionCounts {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Make installs fail with the given error
    pub fn fail_installs(&self, error: fn() -> KubeError) {
        self.script().install_failure = Some(error);
    }

    /// Make the next upgrade fail to deploy with the given error
    ///
    /// Atomic upgrades are rolled back the way a live cluster records them.
    pub fn fail_next_upgrade(&self, error: fn() -> KubeError) {
        self.script().upgrade_failure = Some(error);
    }

    /// Make legacy imports fail with the given error
    pub fn fail_imports(&self, error: fn() -> KubeError) {
        self.script().import_failure = Some(error);
    }

    /// Make installs take `delay` before they complete
    pub fn delay_installs(&self, delay: Duration) {
        self.script().install_delay = Some(delay);
    }

    /// Number of resources a legacy import reports as adopted
    pub fn set_legacy_resources(&self, count: usize) {
        self.script().legacy_resources = count;
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn count(&self, op: impl FnOnce(&mut ActionCounts)) {
        op(&mut self.counts.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

#[async_trait]
impl ReleaseActions for MockCluster {
    async fn install(
        &self,
        bundle: &LoadedBundle,
        values: Values,
        options: &InstallOptions,
    ) -> Result<StoredRelease> {
        self.count(|c| c.installs += 1);

        let (failure, delay) = {
            let script = self.script();
            (script.install_failure, script.install_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(failure) = failure {
            return Err(failure());
        }

        if self
            .storage
            .find_latest(&options.namespace, &options.name)
            .await?
            .is_some()
        {
            return Err(KubeError::ReleaseAlreadyExists {
                name: options.name.clone(),
                namespace: options.namespace.clone(),
            });
        }

        let values = install_values(bundle, &values)?;
        let manifest = render_release(
            bundle,
            &values,
            ReleaseInfo::for_install(&options.name, &options.namespace),
        )?;
        let mut release = StoredRelease::for_install(
            options.name.clone(),
            options.namespace.clone(),
            bundle.metadata().clone(),
            values,
            manifest,
        );
        release.mark_deployed("Install complete");
        self.storage.create(&release).await?;

        Ok(release)
    }

    async fn upgrade(
        &self,
        bundle: &LoadedBundle,
        values: Values,
        options: &UpgradeOptions,
    ) -> Result<StoredRelease> {
        self.count(|c| c.upgrades += 1);

        let mut previous = self
            .storage
            .get_latest(&options.namespace, &options.name)
            .await?;
        let values = upgrade_values(bundle, &previous, &values, options)?;
        let manifest = render_release(
            bundle,
            &values,
            ReleaseInfo::for_upgrade(&options.name, &options.namespace, previous.version + 1),
        )?;

        let mut release =
            StoredRelease::for_upgrade(&previous, bundle.metadata().clone(), values, manifest);
        self.storage.create(&release).await?;

        let failure = self.script().upgrade_failure.take();
        if let Some(failure) = failure {
            let e = failure();
            if options.atomic {
                record_rollback(&self.storage, &mut previous, &mut release, &e).await?;
            } else {
                release.mark_failed(e.to_string());
                self.storage.update(&release).await?;
            }
            return Err(e);
        }

        release.mark_deployed("Upgrade complete");
        self.storage.update(&release).await?;

        previous.mark_superseded();
        self.storage.update(&previous).await?;

        Ok(release)
    }

    async fn uninstall(&self, options: &UninstallOptions) -> Result<StoredRelease> {
        self.count(|c| c.uninstalls += 1);

        let mut removed = self
            .storage
            .delete_all(&options.namespace, &options.name)
            .await?;
        removed.sort_by(|a, b| b.version.cmp(&a.version));
        removed
            .into_iter()
            .next()
            .ok_or_else(|| KubeError::ReleaseNotFound {
                name: options.name.clone(),
                namespace: options.namespace.clone(),
            })
    }

    async fn import_legacy(
        &self,
        _bundle: &LoadedBundle,
        _values: &Values,
        _name: &str,
        _namespace: &str,
    ) -> Result<usize> {
        self.count(|c| c.imports += 1);

        let script = self.script();
        match script.import_failure {
            Some(failure) => Err(failure()),
            None => Ok(script.legacy_resources),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::{Bundle, BundleMetadata, ReleaseStatus};

    fn bundle(dir: &std::path::Path) -> LoadedBundle {
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

    #[tokio::test]
    async fn test_install_then_upgrade_supersedes() {
        let dir = tempfile::TempDir::new().unwrap();
        let bundle = bundle(dir.path());
        let cluster = MockCluster::default();

        cluster
            .install(&bundle, Values::new(), &InstallOptions::new("traffic-manager", "ambassador"))
            .await
            .unwrap();
        let upgraded = cluster
            .upgrade(&bundle, Values::new(), &UpgradeOptions::new("traffic-manager", "ambassador"))
            .await
            .unwrap();

        assert_eq!(upgraded.version, 2);
        let history = cluster
            .storage()
            .history("ambassador", "traffic-manager")
            .await
            .unwrap();
        assert_eq!(history[0].status, ReleaseStatus::Deployed);
        assert_eq!(history[1].status, ReleaseStatus::Superseded);
        assert_eq!(
            cluster.counts(),
            ActionCounts {
                installs: 1,
                upgrades: 1,
                ..Default::default()
            }
        );
    }

    #[tokio::test]
    async fn test_install_over_existing_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let bundle = bundle(dir.path());
        let cluster = MockCluster::default();
        let options = InstallOptions::new("traffic-manager", "ambassador");

        cluster.install(&bundle, Values::new(), &options).await.unwrap();
        let err = cluster.install(&bundle, Values::new(), &options).await.unwrap_err();

        assert!(matches!(err, KubeError::ReleaseAlreadyExists { .. }));
        assert_eq!(cluster.storage().release_count(), 1);
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let dir = tempfile::TempDir::new().unwrap();
        let bundle = bundle(dir.path());
        let cluster = MockCluster::default();
        cluster.fail_installs(|| KubeError::DeadlineExceeded("waiting for deployments".into()));
        cluster.fail_imports(|| KubeError::Communication("connection reset".into()));

        let err = cluster
            .install(&bundle, Values::new(), &InstallOptions::new("traffic-manager", "ambassador"))
            .await
            .unwrap_err();
        assert!(err.is_timeout_shaped());

        let err = cluster
            .import_legacy(&bundle, &Values::new(), "traffic-manager", "ambassador")
            .await
            .unwrap_err();
        assert!(err.is_communication());
        assert_eq!(cluster.storage().release_count(), 0);
    }

    #[tokio::test]
    async fn test_uninstall_missing_release() {
        let cluster = MockCluster::default();
        let err = cluster
            .uninstall(&UninstallOptions::new("traffic-manager", "ambassador"))
            .await
            .unwrap_err();
        assert!(matches!(err, KubeError::ReleaseNotFound { .. }));
        assert_eq!(cluster.counts().uninstalls, 1);
    }
}
