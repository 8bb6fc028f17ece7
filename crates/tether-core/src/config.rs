//! Client configuration
//!
//! Read from `~/.config/tether/config.yml`. Every section is optional and a
//! missing file yields the defaults. The configuration is loaded once and
//! passed around explicitly.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CoreError, Result};

/// Default application protocol strategy for the agent injector
pub const DEFAULT_APP_PROTOCOL_STRATEGY: &str = "http2Probe";

/// Client configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    pub timeouts: Timeouts,
    pub images: Images,
    pub cloud: Cloud,
    pub grpc: Grpc,
    pub intercept: InterceptConfig,
    #[serde(rename = "telepresenceAPI")]
    pub api: ApiConfig,
}

impl ClientConfig {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        Self::load_or_default(&path)
    }

    /// Load configuration from `path`, or the defaults if it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML document; an empty document is the default
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).map_err(|e| CoreError::InvalidConfig {
            message: e.to_string(),
        })
    }

    /// Get default configuration path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| CoreError::InvalidConfig {
            message: "Could not determine config directory".to_string(),
        })?;
        Ok(config_dir.join("tether").join("config.yml"))
    }
}

/// Named timeout classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeoutClass {
    Helm,
    Intercept,
    TrafficManagerConnect,
}

impl TimeoutClass {
    /// Key of the class in the configuration file
    pub fn config_key(&self) -> &'static str {
        match self {
            Self::Helm => "timeouts.helm",
            Self::Intercept => "timeouts.intercept",
            Self::TrafficManagerConnect => "timeouts.trafficManagerConnect",
        }
    }
}

impl std::fmt::Display for TimeoutClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.config_key())
    }
}

/// Timeouts section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Timeouts {
    #[serde(with = "humantime_serde")]
    pub helm: Duration,

    #[serde(with = "humantime_serde")]
    pub intercept: Duration,

    #[serde(with = "humantime_serde")]
    pub traffic_manager_connect: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            helm: Duration::from_secs(30),
            intercept: Duration::from_secs(30),
            traffic_manager_connect: Duration::from_secs(60),
        }
    }
}

impl Timeouts {
    /// Limit configured for a timeout class
    pub fn get(&self, class: TimeoutClass) -> Duration {
        match class {
            TimeoutClass::Helm => self.helm,
            TimeoutClass::Intercept => self.intercept,
            TimeoutClass::TrafficManagerConnect => self.traffic_manager_connect,
        }
    }
}

/// Images section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Images {
    /// Registry of the traffic manager image
    pub registry: String,

    /// Agent image as `name:tag`
    pub agent_image: Option<String>,

    /// Registry the agent injector pulls the agent image from
    pub webhook_registry: Option<String>,
}

impl Default for Images {
    fn default() -> Self {
        Self {
            registry: "ghcr.io/tether-dev".to_string(),
            agent_image: None,
            webhook_registry: None,
        }
    }
}

/// Cloud section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Cloud {
    pub systema_host: String,
    pub systema_port: u16,
}

impl Default for Cloud {
    fn default() -> Self {
        Self {
            systema_host: "app.tether.dev".to_string(),
            systema_port: 443,
        }
    }
}

/// gRPC section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Grpc {
    /// Maximum receive message size as a Kubernetes quantity, e.g. `10Mi`
    pub max_receive_size: Option<String>,
}

/// Intercept section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InterceptConfig {
    pub app_protocol_strategy: String,

    /// How many times a create is retried while the manager is still connecting
    pub connect_retries: u32,
}

impl Default for InterceptConfig {
    fn default() -> Self {
        Self {
            app_protocol_strategy: DEFAULT_APP_PROTOCOL_STRATEGY.to_string(),
            connect_retries: 3,
        }
    }
}

/// API server section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiConfig {
    /// Port of the local API server, 0 when disabled
    pub port: u16,
}
