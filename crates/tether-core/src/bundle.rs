//! Release bundle definition and loading
//!
//! A bundle is the installable unit for a cluster release. On disk it is a
//! directory with a `Bundle.yaml` descriptor, a `values.yaml` of bundle
//! defaults and a `templates/` directory of manifest templates.

use semver::Version;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CoreError, Result};
use crate::values::Values;

/// Supported `apiVersion` of `Bundle.yaml`
pub const BUNDLE_API_VERSION: &str = "tether/v1";

/// Bundle descriptor (`Bundle.yaml`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    /// API version (tether/v1)
    pub api_version: String,

    /// Bundle metadata
    pub metadata: BundleMetadata,
}

/// Bundle metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleMetadata {
    /// Bundle name (required)
    pub name: String,

    /// Bundle version (required, SemVer)
    #[serde(with = "version_serde")]
    pub version: Version,

    /// Version of the component the bundle deploys
    #[serde(default)]
    pub app_version: Option<String>,

    /// Description
    #[serde(default)]
    pub description: Option<String>,
}

impl BundleMetadata {
    /// Semantic version of the deployed component.
    ///
    /// Uses `appVersion` when it parses as SemVer (a leading `v` is ignored),
    /// otherwise the bundle version.
    pub fn component_version(&self) -> Version {
        self.app_version
            .as_deref()
            .and_then(|v| Version::parse(v.trim_start_matches('v')).ok())
            .unwrap_or_else(|| self.version.clone())
    }
}

/// Loaded bundle with resolved paths
#[derive(Debug, Clone)]
pub struct LoadedBundle {
    /// Bundle descriptor
    pub bundle: Bundle,

    /// Root directory of the bundle
    pub root: PathBuf,

    /// Templates directory
    pub templates_dir: PathBuf,

    /// Values file path
    pub values_path: PathBuf,
}

impl LoadedBundle {
    /// Load a bundle from a directory
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let root = path.as_ref().to_path_buf();

        if !root.exists() {
            return Err(CoreError::BundleNotFound {
                path: root.display().to_string(),
            });
        }

        let bundle_file = root.join("Bundle.yaml");
        if !bundle_file.exists() {
            return Err(CoreError::InvalidBundle {
                message: format!("Bundle.yaml not found in {}", root.display()),
            });
        }

        let content = std::fs::read_to_string(&bundle_file)?;
        let bundle: Bundle = serde_yaml::from_str(&content)?;

        if bundle.api_version != BUNDLE_API_VERSION {
            return Err(CoreError::InvalidBundle {
                message: format!(
                    "Unsupported API version: {}. Expected: {}",
                    bundle.api_version, BUNDLE_API_VERSION
                ),
            });
        }

        Ok(Self {
            bundle,
            templates_dir: root.join("templates"),
            values_path: root.join("values.yaml"),
            root,
        })
    }

    /// Bundle metadata
    pub fn metadata(&self) -> &BundleMetadata {
        &self.bundle.metadata
    }

    /// Default values shipped with the bundle (empty if there is no values.yaml)
    pub fn default_values(&self) -> Result<Values> {
        if self.values_path.exists() {
            Values::from_file(&self.values_path)
        } else {
            Ok(Values::new())
        }
    }

    /// Get list of template files, sorted for deterministic rendering
    pub fn template_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        if !self.templates_dir.exists() {
            return Ok(files);
        }

        for entry in walkdir::WalkDir::new(&self.templates_dir)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if path.is_file()
                && let Some(ext) = path.extension()
            {
                let ext = ext.to_string_lossy().to_lowercase();
                if matches!(ext.as_str(), "yaml" | "yml" | "j2" | "jinja2") {
                    files.push(path.to_path_buf());
                }
            }
        }

        files.sort();
        Ok(files)
    }

    /// Read all templates as `(relative name, source)` pairs
    pub fn templates(&self) -> Result<Vec<(String, String)>> {
        self.template_files()?
            .into_iter()
            .map(|path| {
                let name = path
                    .strip_prefix(&self.templates_dir)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .replace('\\', "/");
                let source = std::fs::read_to_string(&path)?;
                Ok((name, source))
            })
            .collect()
    }
}

/// Custom serde for semver::Version
mod version_serde {
    use semver::Version;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(version: &Version, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&version.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Version, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Version::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_bundle(dir: &Path, api_version: &str) {
        fs::write(
            dir.join("Bundle.yaml"),
            format!(
                "apiVersion: {api_version}\nmetadata:\n  name: traffic-manager\n  version: 2.5.0\n  appVersion: v2.5.1\n"
            ),
        )
        .unwrap();
    }

    #[test]
    fn test_bundle_deserialize() {
        let yaml = r#"
apiVersion: tether/v1
metadata:
  name: traffic-manager
  version: 1.0.0
  description: The traffic manager
"#;
        let bundle: Bundle = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(bundle.metadata.name, "traffic-manager");
        assert_eq!(bundle.metadata.version.to_string(), "1.0.0");
        assert!(bundle.metadata.app_version.is_none());
    }

    #[test]
    fn test_component_version_prefers_app_version() {
        let meta = BundleMetadata {
            name: "traffic-manager".to_string(),
            version: Version::new(1, 0, 0),
            app_version: Some("v2.5.1".to_string()),
            description: None,
        };
        assert_eq!(meta.component_version(), Version::new(2, 5, 1));

        let meta = BundleMetadata {
            app_version: Some("latest".to_string()),
            ..meta
        };
        assert_eq!(meta.component_version(), Version::new(1, 0, 0));
    }

    #[test]
    fn test_load_bundle_with_templates() {
        let dir = TempDir::new().unwrap();
        write_bundle(dir.path(), BUNDLE_API_VERSION);
        fs::write(dir.path().join("values.yaml"), "replicas: 1\n").unwrap();
        fs::create_dir(dir.path().join("templates")).unwrap();
        fs::write(dir.path().join("templates/service.yaml"), "kind: Service").unwrap();
        fs::write(dir.path().join("templates/deployment.yaml"), "kind: Deployment").unwrap();
        fs::write(dir.path().join("templates/README.md"), "ignored").unwrap();

        let loaded = LoadedBundle::load(dir.path()).unwrap();
        let templates = loaded.templates().unwrap();

        assert_eq!(loaded.metadata().name, "traffic-manager");
        assert_eq!(templates.len(), 2);
        assert_eq!(templates[0].0, "deployment.yaml");
        assert_eq!(templates[1].0, "service.yaml");
        assert_eq!(loaded.default_values().unwrap().get("replicas").unwrap(), 1);
    }

    #[test]
    fn test_load_bundle_without_values_file() {
        let dir = TempDir::new().unwrap();
        write_bundle(dir.path(), BUNDLE_API_VERSION);

        let loaded = LoadedBundle::load(dir.path()).unwrap();
        assert!(loaded.default_values().unwrap().is_empty());
        assert!(loaded.templates().unwrap().is_empty());
    }

    #[test]
    fn test_load_bundle_wrong_api_version() {
        let dir = TempDir::new().unwrap();
        write_bundle(dir.path(), "helm/v2");

        let err = LoadedBundle::load(dir.path()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidBundle { .. }));
    }

    #[test]
    fn test_load_missing_bundle() {
        let err = LoadedBundle::load("/nonexistent/bundle").unwrap_err();
        assert!(matches!(err, CoreError::BundleNotFound { .. }));
    }
}
