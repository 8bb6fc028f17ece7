//! Traffic manager installation
//!
//! The traffic manager ships as two releases that live in the manager's
//! namespace: the manager itself and a companion release with its CRDs.
//! Each is installed from a bundle directory of the same name.

use std::path::PathBuf;
use tether_core::LoadedBundle;

use crate::error::{KubeError, Result};
use crate::reconcile::{Reconciled, Reconciler, ReleaseRequest};

/// Name of the traffic manager release
pub const TRAFFIC_MANAGER_RELEASE: &str = "traffic-manager";

/// Name of the release holding the traffic manager CRDs
pub const CRD_RELEASE: &str = "tether-crds";

pub struct Installer {
    reconciler: Reconciler,
    bundle_dir: PathBuf,
}

impl Installer {
    /// `bundle_dir` holds one bundle directory per release name
    pub fn new(reconciler: Reconciler, bundle_dir: impl Into<PathBuf>) -> Self {
        Self {
            reconciler,
            bundle_dir: bundle_dir.into(),
        }
    }

    /// Install or upgrade the traffic manager, or its CRDs when `request.crds` is set
    pub async fn ensure_traffic_manager(
        &self,
        namespace: &str,
        request: &ReleaseRequest,
    ) -> Result<Reconciled> {
        let (name, action) = if request.crds {
            (CRD_RELEASE, "failed to install traffic manager CRDs")
        } else {
            (TRAFFIC_MANAGER_RELEASE, "failed to install traffic manager")
        };

        let bundle = LoadedBundle::load(self.bundle_dir.join(name))
            .map_err(|e| KubeError::from(e).context("unable to load bundle"))
            .map_err(|e| e.context(action))?;

        self.reconciler
            .ensure(name, namespace, &bundle, request)
            .await
            .map_err(|e| e.context(action))
    }

    /// Uninstall the traffic manager, or its CRDs when `crds` is set
    pub async fn delete_traffic_manager(
        &self,
        namespace: &str,
        strict: bool,
        crds: bool,
    ) -> Result<Reconciled> {
        let name = if crds {
            CRD_RELEASE
        } else {
            TRAFFIC_MANAGER_RELEASE
        };
        self.reconciler.ensure_deleted(name, namespace, strict).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::ReconcileKind;
    use crate::locate::Locator;
    use crate::mock::MockCluster;
    use crate::storage::{MockStorageDriver, StorageDriver};
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tether_core::{ReleaseStatus, Timeouts};

    fn write_bundle(root: &Path, name: &str) {
        let dir = root.join(name);
        std::fs::create_dir_all(dir.join("templates")).unwrap();
        std::fs::write(
            dir.join("Bundle.yaml"),
            format!("apiVersion: tether/v1\nmetadata:\n  name: {name}\n  version: 2.5.0\n  appVersion: 2.5.0\n"),
        )
        .unwrap();
        std::fs::write(dir.join("values.yaml"), "replicas: 1\n").unwrap();
        std::fs::write(
            dir.join("templates").join("configmap.yaml"),
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: {{ release.name }}\n  namespace: {{ release.namespace }}\n",
        )
        .unwrap();
    }

    fn installer(bundle_dir: &Path) -> (Installer, MockCluster) {
        let storage = MockStorageDriver::new();
        let cluster = MockCluster::new(storage.clone());
        let reconciler = Reconciler::new(
            Locator::new(Arc::new(storage), Arc::new(ManualClock::new())),
            Arc::new(cluster.clone()),
            Timeouts::default(),
        );
        (Installer::new(reconciler, bundle_dir), cluster)
    }

    #[tokio::test]
    async fn test_installs_primary_and_crd_releases() {
        let dir = TempDir::new().unwrap();
        write_bundle(dir.path(), TRAFFIC_MANAGER_RELEASE);
        write_bundle(dir.path(), CRD_RELEASE);
        let (installer, cluster) = installer(dir.path());

        installer
            .ensure_traffic_manager("ambassador", &ReleaseRequest::install().for_crds())
            .await
            .unwrap();
        installer
            .ensure_traffic_manager("ambassador", &ReleaseRequest::install())
            .await
            .unwrap();

        let manager = cluster
            .storage()
            .get_latest("ambassador", TRAFFIC_MANAGER_RELEASE)
            .await
            .unwrap();
        assert_eq!(manager.status, ReleaseStatus::Deployed);
        assert!(manager.manifest.contains("name: traffic-manager"));
        assert_eq!(manager.values.get("replicas").unwrap(), 1);

        let crds = cluster.storage().get_latest("ambassador", CRD_RELEASE).await.unwrap();
        assert!(crds.manifest.contains("name: tether-crds"));

        // Only the primary release adopts legacy resources
        assert_eq!(cluster.counts().imports, 1);
    }

    #[tokio::test]
    async fn test_errors_carry_install_context() {
        let dir = TempDir::new().unwrap();
        write_bundle(dir.path(), TRAFFIC_MANAGER_RELEASE);
        let (installer, _) = installer(dir.path());

        installer
            .ensure_traffic_manager("ambassador", &ReleaseRequest::install())
            .await
            .unwrap();
        let err = installer
            .ensure_traffic_manager("ambassador", &ReleaseRequest::install())
            .await
            .unwrap_err();

        assert_eq!(err.reconcile_kind(), Some(ReconcileKind::AlreadyInstalled));
        assert!(err.to_string().starts_with("failed to install traffic manager: "));
    }

    #[tokio::test]
    async fn test_missing_bundle() {
        let dir = TempDir::new().unwrap();
        let (installer, cluster) = installer(dir.path());

        let err = installer
            .ensure_traffic_manager("ambassador", &ReleaseRequest::install().for_crds())
            .await
            .unwrap_err();

        assert!(
            err.to_string()
                .starts_with("failed to install traffic manager CRDs: unable to load bundle: ")
        );
        assert_eq!(cluster.counts().installs, 0);
    }

    #[tokio::test]
    async fn test_delete_traffic_manager() {
        let dir = TempDir::new().unwrap();
        write_bundle(dir.path(), TRAFFIC_MANAGER_RELEASE);
        let (installer, cluster) = installer(dir.path());

        installer
            .ensure_traffic_manager("ambassador", &ReleaseRequest::install())
            .await
            .unwrap();

        let outcome = installer
            .delete_traffic_manager("ambassador", true, false)
            .await
            .unwrap();
        assert_eq!(outcome, Reconciled::Uninstalled);

        let outcome = installer
            .delete_traffic_manager("ambassador", false, true)
            .await
            .unwrap();
        assert_eq!(outcome, Reconciled::AlreadyAbsent);
        assert_eq!(cluster.counts().uninstalls, 1);
    }
}
