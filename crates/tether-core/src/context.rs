//! Template rendering context

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::bundle::BundleMetadata;
use crate::release::ReleaseInfo;
use crate::values::Values;

/// Context available to all bundle templates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateContext {
    /// Resolved values
    pub values: JsonValue,

    /// Release information
    pub release: ReleaseInfo,

    /// Bundle metadata
    pub bundle: BundleInfo,
}

/// Bundle information for templates
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleInfo {
    pub name: String,
    pub version: String,
    pub app_version: Option<String>,
}

impl From<&BundleMetadata> for BundleInfo {
    fn from(meta: &BundleMetadata) -> Self {
        Self {
            name: meta.name.clone(),
            version: meta.version.to_string(),
            app_version: meta.app_version.clone(),
        }
    }
}

impl TemplateContext {
    pub fn new(values: Values, release: ReleaseInfo, bundle: &BundleMetadata) -> Self {
        Self {
            values: values.into_inner(),
            release,
            bundle: BundleInfo::from(bundle),
        }
    }
}
