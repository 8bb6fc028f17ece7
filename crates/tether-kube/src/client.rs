//! Live cluster implementation of [`ReleaseActions`]
//!
//! Combines the release store, the bundle renderer and the resource manager.
//! Installs and upgrades are atomic: a failed install removes what it
//! created and a failed upgrade re-applies the previous revision.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, Patch, PatchParams};
use tether_core::{LoadedBundle, ReleaseInfo, Values};
use tracing::{debug, info, warn};

use crate::actions::{
    InstallOptions, ReleaseActions, UninstallOptions, UpgradeOptions, install_values,
    record_rollback, render_release, upgrade_values,
};
use crate::error::{KubeError, Result};
use crate::release::StoredRelease;
use crate::resources::{FIELD_MANAGER, ResourceManager};
use crate::storage::StorageDriver;
use crate::wait::wait_for_deployments;

/// High-level Kubernetes client for release operations
pub struct KubeClient<S: StorageDriver> {
    client: kube::Client,
    storage: S,
}

impl<S: StorageDriver> KubeClient<S> {
    /// Create with an existing Kubernetes client
    pub fn new(client: kube::Client, storage: S) -> Self {
        Self { client, storage }
    }

    async fn resource_manager(&self) -> Result<ResourceManager> {
        ResourceManager::new(self.client.clone()).await
    }

    async fn ensure_namespace(&self, namespace: &str) -> Result<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let ns = serde_json::json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": { "name": namespace }
        });
        api.patch(namespace, &PatchParams::apply(FIELD_MANAGER), &Patch::Apply(&ns))
            .await?;
        Ok(())
    }

    /// Apply a manifest and wait for its Deployments
    async fn deploy(&self, namespace: &str, manifest: &str, timeout: std::time::Duration) -> Result<()> {
        let summary = self
            .resource_manager()
            .await?
            .apply_manifest(namespace, manifest)
            .await?
            .into_result()?;
        debug!(namespace, summary = %summary.summary(), "Applied manifest");

        wait_for_deployments(&self.client, namespace, manifest, timeout).await
    }

    /// Re-apply the manifest of an earlier revision
    async fn reapply(&self, release: &StoredRelease) -> Result<()> {
        self.resource_manager()
            .await?
            .apply_manifest(&release.namespace, &release.manifest)
            .await?
            .into_result()?;
        Ok(())
    }

    async fn record_failure(&self, release: &mut StoredRelease, error: &KubeError) -> Result<()> {
        release.mark_failed(error.to_string());
        self.storage.update(release).await
    }
}

#[async_trait]
impl<S: StorageDriver> ReleaseActions for KubeClient<S> {
    async fn install(
        &self,
        bundle: &LoadedBundle,
        values: Values,
        options: &InstallOptions,
    ) -> Result<StoredRelease> {
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

        if options.create_namespace {
            self.ensure_namespace(&options.namespace).await?;
        }

        self.storage.create(&release).await?;

        info!(release = %release.name, namespace = %release.namespace, "Installing");
        if let Err(e) = self
            .deploy(&release.namespace, &release.manifest, options.timeout)
            .await
        {
            self.record_failure(&mut release, &e).await?;

            if options.atomic {
                warn!(release = %release.name, error = %e, "Install failed, removing release");
                if let Err(cleanup) = self
                    .uninstall(&UninstallOptions::new(&release.name, &release.namespace))
                    .await
                {
                    warn!(
                        release = %release.name,
                        namespace = %release.namespace,
                        error = %cleanup,
                        "Unable to remove failed install"
                    );
                }
            }
            return Err(e);
        }

        release.mark_deployed(
            options
                .description
                .clone()
                .unwrap_or_else(|| "Install complete".to_string()),
        );
        self.storage.update(&release).await?;

        Ok(release)
    }

    async fn upgrade(
        &self,
        bundle: &LoadedBundle,
        values: Values,
        options: &UpgradeOptions,
    ) -> Result<StoredRelease> {
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

        info!(
            release = %release.name,
            namespace = %release.namespace,
            from = previous.version,
            to = release.version,
            "Upgrading"
        );
        if let Err(e) = self
            .deploy(&release.namespace, &release.manifest, options.timeout)
            .await
        {
            if !options.atomic {
                self.record_failure(&mut release, &e).await?;
                return Err(e);
            }

            warn!(
                release = %release.name,
                revision = previous.version,
                error = %e,
                "Upgrade failed, rolling back"
            );
            if let Err(rollback) = self.reapply(&previous).await {
                warn!(
                    release = %release.name,
                    revision = previous.version,
                    error = %rollback,
                    "Unable to roll back failed upgrade"
                );
                self.record_failure(&mut release, &e).await?;
                return Err(e);
            }

            let restored =
                record_rollback(&self.storage, &mut previous, &mut release, &e).await?;
            info!(
                release = %restored.name,
                namespace = %restored.namespace,
                revision = restored.version,
                "Rolled back to revision {}",
                previous.version
            );
            return Err(e);
        }

        previous.mark_superseded();
        self.storage.update(&previous).await?;

        release.mark_deployed(
            options
                .description
                .clone()
                .unwrap_or_else(|| "Upgrade complete".to_string()),
        );
        self.storage.update(&release).await?;

        Ok(release)
    }

    async fn uninstall(&self, options: &UninstallOptions) -> Result<StoredRelease> {
        let mut release = self
            .storage
            .get_latest(&options.namespace, &options.name)
            .await?;

        release.mark_uninstalling();
        self.storage.update(&release).await?;

        info!(release = %release.name, namespace = %release.namespace, "Uninstalling");
        let deleted = self
            .resource_manager()
            .await?
            .delete_manifest(&release.namespace, &release.manifest)
            .await
            .and_then(|summary| summary.into_result());

        if let Err(e) = deleted {
            self.record_failure(&mut release, &e).await?;
            return Err(e);
        }

        self.storage
            .delete_all(&options.namespace, &options.name)
            .await?;

        Ok(release)
    }

    async fn import_legacy(
        &self,
        bundle: &LoadedBundle,
        values: &Values,
        name: &str,
        namespace: &str,
    ) -> Result<usize> {
        let values = install_values(bundle, values)?;
        let manifest = render_release(bundle, &values, ReleaseInfo::for_install(name, namespace))?;

        let summary = self
            .resource_manager()
            .await?
            .adopt_manifest(name, namespace, &manifest)
            .await?
            .into_result()?;

        Ok(summary.succeeded.len())
    }
}
