//! Session descriptors cached per cluster
//!
//! Stored as `<cache dir>/tether/sessions/<cluster host>.json`, with the host
//! reduced to characters that are safe in a file name.

use std::path::{Path, PathBuf};
use tether_core::{ClientConfig, TimeoutClass};
use tracing::debug;

use crate::error::{ConnectError, Result};
use crate::rpc::{ManagerRpc, SessionInfo, VersionInfo};

/// Check that the traffic manager answers within `timeouts.trafficManagerConnect`
pub async fn verify_manager(rpc: &dyn ManagerRpc, config: &ClientConfig) -> Result<VersionInfo> {
    let limit = config.timeouts.traffic_manager_connect;
    let version = tokio::time::timeout(limit, rpc.version())
        .await
        .map_err(|_| ConnectError::Timeout {
            class: TimeoutClass::TrafficManagerConnect,
            limit,
        })??;
    debug!(manager = %version.name, version = %version.version, "Traffic manager is reachable");
    Ok(version)
}

pub struct SessionCache {
    dir: PathBuf,
}

impl SessionCache {
    /// Cache in the default location
    pub fn open() -> Result<Self> {
        Ok(Self::at(Self::default_dir()?))
    }

    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn default_dir() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir().ok_or_else(|| ConnectError::SessionCache {
            message: "Could not determine cache directory".to_string(),
        })?;
        Ok(cache_dir.join("tether").join("sessions"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the session for `cluster_host`
    pub fn path_for(&self, cluster_host: &str) -> PathBuf {
        self.dir
            .join(format!("{}.json", sanitize_host(cluster_host)))
    }

    /// Load the session for `cluster_host`
    ///
    /// A missing session means the client is not connected.
    pub fn load(&self, cluster_host: &str) -> Result<SessionInfo> {
        let path = self.path_for(cluster_host);
        if !path.exists() {
            return Err(ConnectError::NotConnected);
        }

        let content = std::fs::read_to_string(&path)?;
        serde_json::from_str(&content).map_err(|e| ConnectError::SessionCache {
            message: format!("{}: {}", path.display(), e),
        })
    }

    pub fn save(&self, cluster_host: &str, session: &SessionInfo) -> Result<()> {
        let path = self.path_for(cluster_host);
        std::fs::create_dir_all(&self.dir)?;
        let content = serde_json::to_string_pretty(session)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            let mut options = std::fs::OpenOptions::new();
            options.write(true).create(true).truncate(true).mode(0o600);
            std::io::Write::write_all(&mut options.open(&path)?, content.as_bytes())?;
            Ok(())
        }

        #[cfg(not(unix))]
        {
            std::fs::write(&path, content)?;
            Ok(())
        }
    }

    /// Forget the session for `cluster_host`; returns whether there was one
    pub fn remove(&self, cluster_host: &str) -> Result<bool> {
        let path = self.path_for(cluster_host);
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(path)?;
        Ok(true)
    }
}

/// Reduce a cluster host or URL to a file name
pub fn sanitize_host(host: &str) -> String {
    let host = host
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/');

    host.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
