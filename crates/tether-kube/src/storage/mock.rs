//! Mock storage driver for testing
//!
//! This driver stores releases in memory, useful for unit tests
//! without requiring a Kubernetes cluster.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tether_core::ReleaseStatus;

use super::{StorageDriver, storage_key};
use crate::error::{KubeError, Result};
use crate::release::StoredRelease;

type Store = HashMap<String, HashMap<String, HashMap<u32, StoredRelease>>>;

/// In-memory storage driver for testing
#[derive(Clone, Default)]
pub struct MockStorageDriver {
    /// Storage: namespace -> name -> version -> release
    store: Arc<RwLock<Store>>,
    /// Track operation counts for assertions
    operations: Arc<RwLock<OperationCounts>>,
    /// When set, every call fails as if the cluster were unreachable
    unreachable: Arc<RwLock<Option<String>>>,
    /// Storage keys whose records cannot be decoded
    corrupt: Arc<RwLock<Vec<String>>>,
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub gets: usize,
    pub lists: usize,
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
}

impl MockStorageDriver {
    /// Create a new empty mock driver
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with pre-populated releases
    pub fn with_releases(releases: Vec<StoredRelease>) -> Self {
        let driver = Self::new();
        {
            let mut store = driver.store.write().unwrap_or_else(PoisonError::into_inner);
            for release in releases {
                store
                    .entry(release.namespace.clone())
                    .or_default()
                    .entry(release.name.clone())
                    .or_default()
                    .insert(release.version, release);
            }
        }
        driver
    }

    /// Make every subsequent call fail with a communication error
    pub fn set_unreachable(&self, reason: Option<&str>) {
        *self
            .unreachable
            .write()
            .unwrap_or_else(PoisonError::into_inner) = reason.map(str::to_string);
    }

    /// Make the stored record for `name`/`version` undecodable on read
    pub fn corrupt(&self, name: &str, version: u32) {
        self.corrupt
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(storage_key(name, version));
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> OperationCounts {
        self.operations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Reset operation counts
    pub fn reset_counts(&self) {
        *self
            .operations
            .write()
            .unwrap_or_else(PoisonError::into_inner) = OperationCounts::default();
    }

    /// Count total releases
    pub fn release_count(&self) -> usize {
        let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
        store
            .values()
            .flat_map(|ns| ns.values())
            .map(|name| name.len())
            .sum()
    }

    /// Change the status of the latest revision without counting an operation
    ///
    /// Returns false when the release does not exist.
    pub fn set_status(&self, namespace: &str, name: &str, status: ReleaseStatus) -> bool {
        let mut store = self.store.write().unwrap_or_else(PoisonError::into_inner);
        let latest = store
            .get_mut(namespace)
            .and_then(|ns| ns.get_mut(name))
            .and_then(|versions| versions.values_mut().max_by_key(|r| r.version));

        match latest {
            Some(release) => {
                release.status = status;
                true
            }
            None => false,
        }
    }

    fn record(&self, op: impl FnOnce(&mut OperationCounts)) -> Result<()> {
        op(&mut self
            .operations
            .write()
            .unwrap_or_else(PoisonError::into_inner));

        match self
            .unreachable
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            Some(reason) => Err(KubeError::Communication(reason.clone())),
            None => Ok(()),
        }
    }

    fn check_readable(&self, releases: &[&StoredRelease]) -> Result<()> {
        let corrupt = self.corrupt.read().unwrap_or_else(PoisonError::into_inner);
        match releases
            .iter()
            .map(|r| r.storage_key())
            .find(|key| corrupt.contains(key))
        {
            Some(key) => Err(KubeError::CorruptRecord {
                key,
                reason: "invalid record payload".to_string(),
            }),
            None => Ok(()),
        }
    }

    fn not_found(namespace: &str, name: &str) -> KubeError {
        KubeError::ReleaseNotFound {
            name: name.to_string(),
            namespace: namespace.to_string(),
        }
    }
}

#[async_trait]
impl StorageDriver for MockStorageDriver {
    async fn get_latest(&self, namespace: &str, name: &str) -> Result<StoredRelease> {
        self.record(|ops| ops.gets += 1)?;

        let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
        let versions = store
            .get(namespace)
            .and_then(|ns| ns.get(name))
            .ok_or_else(|| Self::not_found(namespace, name))?;
        self.check_readable(&versions.values().collect::<Vec<_>>())?;

        versions
            .values()
            .max_by_key(|r| r.version)
            .cloned()
            .ok_or_else(|| Self::not_found(namespace, name))
    }

    async fn history(&self, namespace: &str, name: &str) -> Result<Vec<StoredRelease>> {
        self.record(|ops| ops.lists += 1)?;

        let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
        let mut releases: Vec<StoredRelease> = store
            .get(namespace)
            .and_then(|ns| ns.get(name))
            .map(|versions| versions.values().cloned().collect())
            .unwrap_or_default();

        if releases.is_empty() {
            return Err(Self::not_found(namespace, name));
        }
        self.check_readable(&releases.iter().collect::<Vec<_>>())?;

        releases.sort_by(|a, b| b.version.cmp(&a.version));
        Ok(releases)
    }

    async fn create(&self, release: &StoredRelease) -> Result<()> {
        self.record(|ops| ops.creates += 1)?;

        let mut store = self.store.write().unwrap_or_else(PoisonError::into_inner);
        let versions = store
            .entry(release.namespace.clone())
            .or_default()
            .entry(release.name.clone())
            .or_default();

        if versions.contains_key(&release.version) {
            return Err(KubeError::ReleaseAlreadyExists {
                name: release.name.clone(),
                namespace: release.namespace.clone(),
            });
        }

        versions.insert(release.version, release.clone());
        Ok(())
    }

    async fn update(&self, release: &StoredRelease) -> Result<()> {
        self.record(|ops| ops.updates += 1)?;

        let mut store = self.store.write().unwrap_or_else(PoisonError::into_inner);
        let versions = store
            .get_mut(&release.namespace)
            .and_then(|ns| ns.get_mut(&release.name))
            .filter(|versions| versions.contains_key(&release.version))
            .ok_or_else(|| Self::not_found(&release.namespace, &release.name))?;

        versions.insert(release.version, release.clone());
        Ok(())
    }

    async fn delete_all(&self, namespace: &str, name: &str) -> Result<Vec<StoredRelease>> {
        self.record(|ops| ops.deletes += 1)?;

        let mut store = self.store.write().unwrap_or_else(PoisonError::into_inner);
        let releases: Vec<StoredRelease> = store
            .get_mut(namespace)
            .and_then(|ns| ns.remove(name))
            .map(|versions| versions.into_values().collect())
            .unwrap_or_default();

        if releases.is_empty() {
            return Err(Self::not_found(namespace, name));
        }

        Ok(releases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::{BundleMetadata, Values};

    fn create_test_release(name: &str, namespace: &str, version: u32) -> StoredRelease {
        let mut release = StoredRelease::for_install(
            name.to_string(),
            namespace.to_string(),
            BundleMetadata {
                name: "traffic-manager".to_string(),
                version: semver::Version::new(2, 5, 0),
                app_version: None,
                description: None,
            },
            Values::new(),
            "apiVersion: v1\nkind: ConfigMap".to_string(),
        );
        release.version = version;
        release.mark_deployed("Install complete");
        release
    }

    #[tokio::test]
    async fn test_mock_create_and_get() {
        let driver = MockStorageDriver::new();

        driver
            .create(&create_test_release("traffic-manager", "ambassador", 1))
            .await
            .unwrap();

        let retrieved = driver.get_latest("ambassador", "traffic-manager").await.unwrap();
        assert_eq!(retrieved.version, 1);

        let counts = driver.operation_counts();
        assert_eq!(counts.creates, 1);
        assert_eq!(counts.gets, 1);
    }

    #[tokio::test]
    async fn test_mock_create_duplicate_fails() {
        let driver = MockStorageDriver::new();
        let release = create_test_release("traffic-manager", "ambassador", 1);
        driver.create(&release).await.unwrap();

        let result = driver.create(&release).await;
        assert!(matches!(result, Err(KubeError::ReleaseAlreadyExists { .. })));
    }

    #[tokio::test]
    async fn test_mock_find_latest() {
        let driver = MockStorageDriver::new();
        assert!(driver.find_latest("ambassador", "traffic-manager").await.unwrap().is_none());

        for version in 1..=3 {
            driver
                .create(&create_test_release("traffic-manager", "ambassador", version))
                .await
                .unwrap();
        }

        let latest = driver.find_latest("ambassador", "traffic-manager").await.unwrap();
        assert_eq!(latest.map(|r| r.version), Some(3));
    }

    #[tokio::test]
    async fn test_mock_history_newest_first() {
        let driver = MockStorageDriver::new();
        for version in 1..=3 {
            driver
                .create(&create_test_release("traffic-manager", "ambassador", version))
                .await
                .unwrap();
        }

        let history = driver.history("ambassador", "traffic-manager").await.unwrap();
        let versions: Vec<u32> = history.iter().map(|r| r.version).collect();
        assert_eq!(versions, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn test_mock_update_requires_existing() {
        let driver = MockStorageDriver::new();
        let mut release = create_test_release("traffic-manager", "ambassador", 1);

        assert!(matches!(
            driver.update(&release).await,
            Err(KubeError::ReleaseNotFound { .. })
        ));

        driver.create(&release).await.unwrap();
        release.manifest = "updated manifest".to_string();
        driver.update(&release).await.unwrap();

        let retrieved = driver.get_latest("ambassador", "traffic-manager").await.unwrap();
        assert_eq!(retrieved.manifest, "updated manifest");
    }

    #[tokio::test]
    async fn test_mock_delete_all() {
        let driver = MockStorageDriver::new();
        for version in 1..=3 {
            driver
                .create(&create_test_release("traffic-manager", "ambassador", version))
                .await
                .unwrap();
        }

        let deleted = driver.delete_all("ambassador", "traffic-manager").await.unwrap();
        assert_eq!(deleted.len(), 3);
        assert_eq!(driver.release_count(), 0);
    }

    #[tokio::test]
    async fn test_mock_unreachable() {
        let driver = MockStorageDriver::with_releases(vec![create_test_release(
            "traffic-manager",
            "ambassador",
            1,
        )]);
        driver.set_unreachable(Some("connection refused"));

        let err = driver.get_latest("ambassador", "traffic-manager").await.unwrap_err();
        assert!(err.is_communication());
        assert_eq!(driver.operation_counts().gets, 1);

        driver.set_unreachable(None);
        assert!(driver.get_latest("ambassador", "traffic-manager").await.is_ok());
    }

    #[tokio::test]
    async fn test_operation_counts_reset() {
        let driver = MockStorageDriver::new();
        driver
            .create(&create_test_release("traffic-manager", "ambassador", 1))
            .await
            .unwrap();
        let _ = driver.history("ambassador", "traffic-manager").await;

        let counts = driver.operation_counts();
        assert_eq!(counts.creates, 1);
        assert_eq!(counts.lists, 1);

        driver.reset_counts();
        assert_eq!(driver.operation_counts(), OperationCounts::default());
    }
}
