//! Kubernetes Secrets storage driver
//!
//! Each revision is stored in its own Secret named after the storage key,
//! labelled so that the history of a release can be listed with a selector.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Client;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use std::collections::BTreeMap;
use tracing::debug;

use super::{
    COMPRESSION_LABEL, MANAGED_BY_LABEL, MANAGED_BY_VALUE, MAX_RESOURCE_SIZE,
    RELEASE_NAME_LABEL, RELEASE_VERSION_LABEL, CompressionMethod, StorageConfig, StorageDriver,
    decode_from_storage, encode_for_storage, storage_key, storage_labels,
};
use crate::error::{KubeError, Result};
use crate::release::StoredRelease;

/// Secret type used for release records
pub const SECRET_TYPE: &str = "tether.io/release.v1";

/// Kubernetes Secrets storage driver
pub struct SecretsDriver {
    client: Client,
    config: StorageConfig,
}

impl SecretsDriver {
    /// Create with an existing client
    pub fn new(client: Client, config: StorageConfig) -> Self {
        Self { client, config }
    }

    fn secrets_api(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn encode(&self, release: &StoredRelease) -> Result<String> {
        let encoded = encode_for_storage(release, &self.config)?;
        if encoded.len() > MAX_RESOURCE_SIZE {
            return Err(KubeError::Storage(format!(
                "release data too large ({} bytes, max {} bytes)",
                encoded.len(),
                MAX_RESOURCE_SIZE
            )));
        }
        Ok(encoded)
    }

    /// Remove the oldest revisions beyond `max_history`
    async fn prune_history(&self, namespace: &str, name: &str) -> Result<()> {
        let max = self.config.max_history as usize;
        if max == 0 {
            return Ok(());
        }

        let api = self.secrets_api(namespace);
        let mut versions: Vec<u32> = api
            .list(&history_selector(name))
            .await?
            .items
            .iter()
            .filter_map(record_version)
            .collect();
        versions.sort_unstable_by(|a, b| b.cmp(a));

        for version in versions.into_iter().skip(max) {
            debug!(release = name, version, "Pruning old revision");
            match api.delete(&storage_key(name, version), &DeleteParams::default()).await {
                Ok(_) => {}
                Err(kube::Error::Api(e)) if e.code == 404 => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StorageDriver for SecretsDriver {
    async fn get_latest(&self, namespace: &str, name: &str) -> Result<StoredRelease> {
        let history = self.history(namespace, name).await?;
        history
            .into_iter()
            .next()
            .ok_or_else(|| KubeError::ReleaseNotFound {
                name: name.to_string(),
                namespace: namespace.to_string(),
            })
    }

    async fn history(&self, namespace: &str, name: &str) -> Result<Vec<StoredRelease>> {
        let secrets = self
            .secrets_api(namespace)
            .list(&history_selector(name))
            .await?;
        let releases = decode_history(&secrets.items, self.config.compression)?;

        if releases.is_empty() {
            return Err(KubeError::ReleaseNotFound {
                name: name.to_string(),
                namespace: namespace.to_string(),
            });
        }

        Ok(releases)
    }

    async fn create(&self, release: &StoredRelease) -> Result<()> {
        let encoded = self.encode(release)?;
        let secret = release_secret(release, &encoded, self.config.compression);

        match self
            .secrets_api(&release.namespace)
            .create(&PostParams::default(), &secret)
            .await
        {
            Ok(_) => {}
            Err(kube::Error::Api(e)) if e.code == 409 => {
                return Err(KubeError::ReleaseAlreadyExists {
                    name: release.name.clone(),
                    namespace: release.namespace.clone(),
                });
            }
            Err(e) => return Err(e.into()),
        }

        self.prune_history(&release.namespace, &release.name).await
    }

    async fn update(&self, release: &StoredRelease) -> Result<()> {
        let encoded = self.encode(release)?;
        let secret = release_secret(release, &encoded, self.config.compression);

        match self
            .secrets_api(&release.namespace)
            .replace(&release.storage_key(), &PostParams::default(), &secret)
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 => Err(KubeError::ReleaseNotFound {
                name: release.name.clone(),
                namespace: release.namespace.clone(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_all(&self, namespace: &str, name: &str) -> Result<Vec<StoredRelease>> {
        let releases = self.history(namespace, name).await?;
        let api = self.secrets_api(namespace);

        for release in &releases {
            match api.delete(&release.storage_key(), &DeleteParams::default()).await {
                Ok(_) => {}
                Err(kube::Error::Api(e)) if e.code == 404 => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(releases)
    }
}

fn history_selector(name: &str) -> ListParams {
    ListParams::default().labels(&format!(
        "{MANAGED_BY_LABEL}={MANAGED_BY_VALUE},{RELEASE_NAME_LABEL}={name}"
    ))
}

fn record_version(secret: &Secret) -> Option<u32> {
    secret
        .metadata
        .labels
        .as_ref()?
        .get(RELEASE_VERSION_LABEL)?
        .parse()
        .ok()
}

fn release_secret(release: &StoredRelease, encoded: &str, compression: CompressionMethod) -> Secret {
    let mut labels = storage_labels(release);
    labels.insert(COMPRESSION_LABEL.to_string(), compression.label().to_string());

    let mut data = BTreeMap::new();
    data.insert(
        "release".to_string(),
        k8s_openapi::ByteString(encoded.as_bytes().to_vec()),
    );

    Secret {
        metadata: ObjectMeta {
            name: Some(release.storage_key()),
            namespace: Some(release.namespace.clone()),
            labels: Some(labels),
            ..Default::default()
        },
        type_: Some(SECRET_TYPE.to_string()),
        data: Some(data),
        ..Default::default()
    }
}

/// Decode one release record.
///
/// Any failure is reported as [`KubeError::CorruptRecord`] so that a record
/// which exists but cannot be read is never mistaken for a missing one.
fn decode_secret(secret: &Secret, default: CompressionMethod) -> Result<StoredRelease> {
    let key = secret.metadata.name.clone().unwrap_or_default();
    let corrupt = |reason: String| KubeError::CorruptRecord {
        key: key.clone(),
        reason,
    };

    let data = secret
        .data
        .as_ref()
        .and_then(|d| d.get("release"))
        .ok_or_else(|| corrupt("missing 'release' data".to_string()))?;

    let encoded =
        std::str::from_utf8(&data.0).map_err(|e| corrupt(format!("invalid UTF-8: {e}")))?;

    let compression = secret
        .metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(COMPRESSION_LABEL))
        .and_then(|c| CompressionMethod::from_label(c))
        .unwrap_or(default);

    decode_from_storage(encoded, compression).map_err(|e| corrupt(e.to_string()))
}

/// Decode every record of a release, newest first
fn decode_history(secrets: &[Secret], default: CompressionMethod) -> Result<Vec<StoredRelease>> {
    let mut releases = secrets
        .iter()
        .map(|secret| decode_secret(secret, default))
        .collect::<Result<Vec<_>>>()?;
    releases.sort_by(|a, b| b.version.cmp(&a.version));
    Ok(releases)
}
