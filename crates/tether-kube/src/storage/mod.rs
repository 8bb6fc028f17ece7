//! Storage drivers for persisting release records
//!
//! - **Secrets**: Store releases in Kubernetes Secrets, one Secret per revision
//! - **Mock**: In-memory storage with operation counters, for tests
//!
//! Records are JSON, compressed (zstd by default) and base64-encoded.

mod mock;
mod secrets;

pub use mock::{MockStorageDriver, OperationCounts};
pub use secrets::SecretsDriver;

use crate::error::{KubeError, Result};
use crate::release::StoredRelease;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Maximum size for a single Kubernetes Secret (1MB - some overhead)
pub const MAX_RESOURCE_SIZE: usize = 1_000_000;

pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VALUE: &str = "tether";
pub const RELEASE_NAME_LABEL: &str = "tether.io/release-name";
pub const RELEASE_VERSION_LABEL: &str = "tether.io/release-version";
pub const RELEASE_NAMESPACE_LABEL: &str = "tether.io/release-namespace";
pub const COMPRESSION_LABEL: &str = "tether.io/compression";

/// Storage key for a release revision
pub fn storage_key(name: &str, version: u32) -> String {
    format!("sh.tether.release.v1.{}.v{}", name, version)
}

/// Storage driver trait for release persistence
///
/// Implementations must be Send + Sync for use across async tasks.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// Get the latest release for a name
    async fn get_latest(&self, namespace: &str, name: &str) -> Result<StoredRelease>;

    /// Get release history (all versions for a name, newest first)
    async fn history(&self, namespace: &str, name: &str) -> Result<Vec<StoredRelease>>;

    /// Create a new release
    async fn create(&self, release: &StoredRelease) -> Result<()>;

    /// Update an existing release
    async fn update(&self, release: &StoredRelease) -> Result<()>;

    /// Delete all versions of a release
    async fn delete_all(&self, namespace: &str, name: &str) -> Result<Vec<StoredRelease>>;

    /// Latest revision, or `None` when there is no release with that name
    async fn find_latest(&self, namespace: &str, name: &str) -> Result<Option<StoredRelease>> {
        match self.get_latest(namespace, name).await {
            Ok(release) => Ok(Some(release)),
            Err(KubeError::ReleaseNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Compression method
    pub compression: CompressionMethod,

    /// Maximum number of revisions to keep per release
    pub max_history: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            compression: CompressionMethod::Zstd { level: 3 },
            max_history: 10,
        }
    }
}

/// Compression method for release data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    /// No compression
    None,

    /// Gzip compression
    Gzip { level: u32 },

    /// Zstd compression
    Zstd { level: i32 },
}

impl Default for CompressionMethod {
    fn default() -> Self {
        Self::Zstd { level: 3 }
    }
}

impl CompressionMethod {
    /// Label value recorded on the Secret
    pub fn label(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip { .. } => "gzip",
            Self::Zstd { .. } => "zstd",
        }
    }

    /// Parse a label value, `None` if unrecognized
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "none" => Some(Self::None),
            "gzip" => Some(Self::Gzip { level: 6 }),
            "zstd" => Some(Self::Zstd { level: 3 }),
            _ => None,
        }
    }
}

/// Compress data using the configured method
#[must_use = "compression result should be used"]
pub fn compress(data: &[u8], method: CompressionMethod) -> Result<Vec<u8>> {
    match method {
        CompressionMethod::None => Ok(data.to_vec()),
        CompressionMethod::Gzip { level } => {
            use std::io::Write;
            let mut encoder =
                flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::new(level));
            encoder
                .write_all(data)
                .map_err(|e| KubeError::Compression(e.to_string()))?;
            encoder
                .finish()
                .map_err(|e| KubeError::Compression(e.to_string()))
        }
        CompressionMethod::Zstd { level } => zstd::encode_all(std::io::Cursor::new(data), level)
            .map_err(|e| KubeError::Compression(e.to_string())),
    }
}

/// Decompress data
#[must_use = "decompression result should be used"]
pub fn decompress(data: &[u8], method: CompressionMethod) -> Result<Vec<u8>> {
    match method {
        CompressionMethod::None => Ok(data.to_vec()),
        CompressionMethod::Gzip { .. } => {
            use std::io::Read;
            let mut decoder = flate2::read::GzDecoder::new(data);
            let mut decompressed = Vec::new();
            decoder
                .read_to_end(&mut decompressed)
                .map_err(|e| KubeError::Compression(e.to_string()))?;
            Ok(decompressed)
        }
        CompressionMethod::Zstd { .. } => zstd::decode_all(std::io::Cursor::new(data))
            .map_err(|e| KubeError::Compression(e.to_string())),
    }
}

/// Encode data for storage (serialize + compress + base64)
#[must_use = "encoded data should be used for storage"]
pub fn encode_for_storage(release: &StoredRelease, config: &StorageConfig) -> Result<String> {
    let json = serde_json::to_vec(release)?;
    let compressed = compress(&json, config.compression)?;
    Ok(base64::Engine::encode(
        &base64::engine::general_purpose::STANDARD,
        &compressed,
    ))
}

/// Decode data from storage (base64 + decompress + deserialize)
#[must_use = "decoded release should be used"]
pub fn decode_from_storage(data: &str, compression: CompressionMethod) -> Result<StoredRelease> {
    let decoded = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, data)
        .map_err(|e| KubeError::Serialization(format!("base64 decode error: {}", e)))?;
    let decompressed = decompress(&decoded, compression)?;
    Ok(serde_json::from_slice(&decompressed)?)
}

/// Labels applied to all storage resources
#[must_use = "labels should be applied to resources"]
pub fn storage_labels(release: &StoredRelease) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string());
    labels.insert(RELEASE_NAME_LABEL.to_string(), release.name.clone());
    labels.insert(RELEASE_VERSION_LABEL.to_string(), release.version.to_string());
    labels.insert(RELEASE_NAMESPACE_LABEL.to_string(), release.namespace.clone());
    labels
}
