//! CLI commands

pub mod helm;
pub mod intercept;
pub mod leave;
pub mod list;

use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tether_connect::{HttpManagerClient, InterceptController, SessionCache, verify_manager};
use tether_core::ClientConfig;
use tracing::debug;

use crate::error::{CliError, Result};

/// Default namespace of the traffic manager
pub const DEFAULT_NAMESPACE: &str = "ambassador";

/// Default address of the traffic manager API
pub const DEFAULT_MANAGER_URL: &str = "http://localhost:8081";

/// Options shared by every command
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Configuration file (default: ~/.config/tether/config.yml)
    #[arg(long, global = true, env = "TETHER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Namespace of the traffic manager
    #[arg(short, long, global = true, env = "TETHER_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// Address of the traffic manager API
    #[arg(long, global = true, env = "TETHER_MANAGER_URL", default_value = DEFAULT_MANAGER_URL)]
    pub manager_url: String,

    /// Directory holding the release bundles (default: <data dir>/tether/bundles)
    #[arg(long, global = true, env = "TETHER_BUNDLE_DIR")]
    pub bundle_dir: Option<PathBuf>,

    /// API server host of the cluster (default: from the current kubeconfig context)
    #[arg(long, global = true, env = "TETHER_CLUSTER")]
    pub cluster: Option<String>,

    /// Directory holding session descriptors (default: <cache dir>/tether/sessions)
    #[arg(long, global = true, env = "TETHER_SESSION_DIR")]
    pub session_dir: Option<PathBuf>,
}

impl GlobalArgs {
    pub fn load_config(&self) -> Result<ClientConfig> {
        let config = match &self.config {
            Some(path) => ClientConfig::load_or_default(path)?,
            None => ClientConfig::load()?,
        };
        Ok(config)
    }

    pub fn bundle_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.bundle_dir {
            return Ok(dir.clone());
        }
        let data_dir = dirs::data_dir().ok_or_else(|| {
            CliError::user_with_help(
                "Could not determine data directory",
                "Pass --bundle-dir or set TETHER_BUNDLE_DIR",
            )
        })?;
        Ok(data_dir.join("tether").join("bundles"))
    }

    fn session_cache(&self) -> Result<SessionCache> {
        match &self.session_dir {
            Some(dir) => Ok(SessionCache::at(dir)),
            None => Ok(SessionCache::open()?),
        }
    }

    async fn cluster_host(&self) -> Result<String> {
        if let Some(host) = &self.cluster {
            return Ok(host.clone());
        }
        let config = kube::Config::infer().await.map_err(|e| {
            CliError::user_with_help(
                format!("unable to determine the current cluster: {e}"),
                "Pass --cluster or set TETHER_CLUSTER",
            )
        })?;
        Ok(config.cluster_url.to_string())
    }

    /// Controller for the session of the current cluster
    ///
    /// Fails with "not connected" when no session is cached for the cluster.
    pub async fn intercept_controller(&self, config: &ClientConfig) -> Result<InterceptController> {
        let cluster = self.cluster_host().await?;
        let session = self.session_cache()?.load(&cluster)?;
        debug!(cluster = %cluster, session = %session.session_id, "Loaded session");

        let rpc = Arc::new(HttpManagerClient::new(&self.manager_url)?);
        verify_manager(rpc.as_ref(), config).await?;

        Ok(InterceptController::new(rpc, session, config))
    }
}
