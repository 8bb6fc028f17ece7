//! Kubernetes resource operations for applying, deleting and adopting manifests
//!
//! - Server-Side Apply for idempotent resource management
//! - Dynamic resource handling without compile-time type knowledge
//! - Ordering for creation (dependencies first) and deletion (reverse)
//! - Adoption of pre-existing, unmanaged resources into a release

use kube::{
    Client,
    api::{Api, DeleteParams, DynamicObject, Patch, PatchParams},
    core::{GroupVersionKind, TypeMeta},
    discovery::{ApiCapabilities, ApiResource, Discovery, Scope},
};
use tracing::debug;

use crate::error::{KubeError, Result};
use crate::storage::{MANAGED_BY_LABEL, MANAGED_BY_VALUE};

/// Field manager name for Server-Side Apply
pub const FIELD_MANAGER: &str = "tether";

/// Annotation naming the release that owns a resource
pub const RELEASE_NAME_ANNOTATION: &str = "meta.tether.io/release-name";

/// Annotation naming the namespace of the release that owns a resource
pub const RELEASE_NAMESPACE_ANNOTATION: &str = "meta.tether.io/release-namespace";

/// Annotation to keep a resource on uninstall
const RESOURCE_POLICY_ANNOTATION: &str = "tether.io/resource-policy";
const RESOURCE_POLICY_KEEP: &str = "keep";

/// Summary of apply/delete/adopt operations
#[derive(Debug, Clone, Default)]
pub struct OperationSummary {
    /// Successfully processed resources
    pub succeeded: Vec<String>,
    /// Failed resources with errors
    pub failed: Vec<(String, String)>,
    /// Skipped resources (e.g., due to policy)
    pub skipped: Vec<(String, String)>,
}

impl OperationSummary {
    /// Check if all operations succeeded
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Format as human-readable summary
    pub fn summary(&self) -> String {
        let mut parts = Vec::with_capacity(3);
        if !self.succeeded.is_empty() {
            parts.push(format!("{} succeeded", self.succeeded.len()));
        }
        if !self.failed.is_empty() {
            parts.push(format!("{} failed", self.failed.len()));
        }
        if !self.skipped.is_empty() {
            parts.push(format!("{} skipped", self.skipped.len()));
        }
        if parts.is_empty() {
            "No resources processed".to_string()
        } else {
            parts.join(", ")
        }
    }

    /// First failure as an error
    pub fn into_result(self) -> Result<Self> {
        match self.failed.first() {
            None => Ok(self),
            Some((name, err)) => Err(KubeError::InvalidManifest(format!(
                "{} ({}): {}",
                name,
                self.summary(),
                err
            ))),
        }
    }
}

/// Parsed resource ready for Kubernetes operations
#[derive(Debug, Clone)]
struct ParsedResource {
    obj: DynamicObject,
    gvk: GroupVersionKind,
    api_resource: ApiResource,
    capabilities: ApiCapabilities,
}

impl ParsedResource {
    fn display_name(&self) -> String {
        let name = self.obj.metadata.name.as_deref().unwrap_or("unnamed");
        match &self.obj.metadata.namespace {
            Some(ns) => format!("{}/{}/{}", ns, self.gvk.kind, name),
            None => format!("{}/{}", self.gvk.kind, name),
        }
    }

    fn name(&self) -> Result<&str> {
        self.obj
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| KubeError::InvalidManifest("Resource missing metadata.name".to_string()))
    }

    fn has_keep_policy(&self) -> bool {
        self.obj
            .metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(RESOURCE_POLICY_ANNOTATION))
            .map(String::as_str)
            == Some(RESOURCE_POLICY_KEEP)
    }
}

/// Resource manager for applying and deleting Kubernetes resources
pub struct ResourceManager {
    client: Client,
    discovery: Discovery,
}

impl ResourceManager {
    /// Create a new ResourceManager, running API discovery
    pub async fn new(client: Client) -> Result<Self> {
        let discovery = Discovery::new(client.clone())
            .run()
            .await
            .map_err(KubeError::Api)?;

        Ok(Self { client, discovery })
    }

    /// Apply a manifest to the cluster using Server-Side Apply
    pub async fn apply_manifest(&self, namespace: &str, manifest: &str) -> Result<OperationSummary> {
        let mut resources = self.parse_manifest(manifest, namespace)?;
        resources.sort_by_key(|r| apply_rank(&r.gvk.kind));

        let mut summary = OperationSummary::default();
        for resource in &resources {
            let name = resource.display_name();
            match self.apply_single_resource(resource).await {
                Ok(()) => summary.succeeded.push(name),
                Err(e) => summary.failed.push((name, e.to_string())),
            }
        }
        Ok(summary)
    }

    /// Delete resources from a manifest, in reverse creation order
    pub async fn delete_manifest(&self, namespace: &str, manifest: &str) -> Result<OperationSummary> {
        let mut resources = self.parse_manifest(manifest, namespace)?;
        resources.sort_by_key(|r| std::cmp::Reverse(apply_rank(&r.gvk.kind)));

        let mut summary = OperationSummary::default();
        for resource in &resources {
            let name = resource.display_name();

            if resource.has_keep_policy() {
                summary.skipped.push((name, "resource-policy: keep".to_string()));
                continue;
            }

            let params = DeleteParams {
                propagation_policy: Some(kube::api::PropagationPolicy::Background),
                ..Default::default()
            };
            match self.api_for_resource(resource).delete(resource.name()?, &params).await {
                Ok(_) => summary.succeeded.push(name),
                Err(kube::Error::Api(resp)) if resp.code == 404 => {
                    summary.skipped.push((name, "not found".to_string()));
                }
                Err(e) => summary.failed.push((name, e.to_string())),
            }
        }
        Ok(summary)
    }

    /// Mark resources of a manifest that already exist in the cluster as owned
    /// by the given release.
    ///
    /// Resources that do not exist are skipped. Returns the summary of the
    /// resources that were adopted.
    pub async fn adopt_manifest(
        &self,
        release_name: &str,
        namespace: &str,
        manifest: &str,
    ) -> Result<OperationSummary> {
        let resources = self.parse_manifest(manifest, namespace)?;
        let patch = ownership_patch(release_name, namespace);

        let mut summary = OperationSummary::default();
        for resource in &resources {
            let name = resource.display_name();
            let api = self.api_for_resource(resource);
            let resource_name = resource.name()?;

            if api.get_opt(resource_name).await?.is_none() {
                summary.skipped.push((name, "not found".to_string()));
                continue;
            }

            debug!(resource = %name, release = release_name, "Adopting existing resource");
            match api
                .patch(resource_name, &PatchParams::default(), &Patch::Merge(&patch))
                .await
            {
                Ok(_) => summary.succeeded.push(name),
                Err(e) => summary.failed.push((name, e.to_string())),
            }
        }
        Ok(summary)
    }

    fn parse_manifest(&self, manifest: &str, default_namespace: &str) -> Result<Vec<ParsedResource>> {
        split_documents(manifest)?
            .into_iter()
            .map(|obj| self.resolve(obj, default_namespace))
            .collect()
    }

    fn resolve(&self, mut obj: DynamicObject, default_namespace: &str) -> Result<ParsedResource> {
        let type_meta = obj.types.as_ref().ok_or_else(|| {
            KubeError::InvalidManifest("Resource missing apiVersion or kind".to_string())
        })?;

        let gvk = gvk_from_type_meta(type_meta);

        let (api_resource, capabilities) = self.discovery.resolve_gvk(&gvk).ok_or_else(|| {
            KubeError::InvalidManifest(format!(
                "Unknown resource type: {}/{}",
                type_meta.api_version, type_meta.kind
            ))
        })?;

        if capabilities.scope == Scope::Namespaced && obj.metadata.namespace.is_none() {
            obj.metadata.namespace = Some(default_namespace.to_string());
        }

        Ok(ParsedResource {
            obj,
            gvk,
            api_resource,
            capabilities,
        })
    }

    async fn apply_single_resource(&self, resource: &ParsedResource) -> Result<()> {
        let mut params = PatchParams::apply(FIELD_MANAGER);
        params.force = true;

        self.api_for_resource(resource)
            .patch(resource.name()?, &params, &Patch::Apply(&resource.obj))
            .await
            .map_err(|e| {
                KubeError::InvalidManifest(format!(
                    "Failed to apply {}: {}",
                    resource.display_name(),
                    e
                ))
            })?;
        Ok(())
    }

    fn api_for_resource(&self, resource: &ParsedResource) -> Api<DynamicObject> {
        if resource.capabilities.scope == Scope::Namespaced {
            let ns = resource.obj.metadata.namespace.as_deref().unwrap_or("default");
            Api::namespaced_with(self.client.clone(), ns, &resource.api_resource)
        } else {
            Api::all_with(self.client.clone(), &resource.api_resource)
        }
    }
}

/// Split a multi-document manifest into objects, skipping empty and
/// comment-only documents
pub fn split_documents(manifest: &str) -> Result<Vec<DynamicObject>> {
    let mut objects = Vec::new();

    for (index, doc) in manifest.split("\n---").enumerate() {
        let doc = doc.trim().trim_start_matches("---").trim();
        if doc
            .lines()
            .all(|l| l.trim().is_empty() || l.trim().starts_with('#'))
        {
            continue;
        }

        let obj: DynamicObject = serde_yaml::from_str(doc).map_err(|e| {
            KubeError::InvalidManifest(format!("Failed to parse document {}: {}", index, e))
        })?;
        objects.push(obj);
    }

    Ok(objects)
}

/// Merge patch marking a resource as owned by a release
pub fn ownership_patch(release_name: &str, namespace: &str) -> serde_json::Value {
    serde_json::json!({
        "metadata": {
            "labels": { MANAGED_BY_LABEL: MANAGED_BY_VALUE },
            "annotations": {
                RELEASE_NAME_ANNOTATION: release_name,
                RELEASE_NAMESPACE_ANNOTATION: namespace,
            }
        }
    })
}

/// Creation order: definitions and namespaces, then RBAC and config, then
/// workloads, then custom resources
fn apply_rank(kind: &str) -> u8 {
    match kind {
        "CustomResourceDefinition" => 0,
        "Namespace" => 1,
        "ServiceAccount" | "ClusterRole" | "ClusterRoleBinding" | "Role" | "RoleBinding" => 2,
        "ConfigMap" | "Secret" => 3,
        "Service" => 4,
        "Deployment" | "StatefulSet" | "DaemonSet" | "Job" => 5,
        "MutatingWebhookConfiguration" | "ValidatingWebhookConfiguration" => 6,
        _ => 7,
    }
}

/// Convert TypeMeta to GroupVersionKind
///
/// - "apps/v1" -> group="apps", version="v1"
/// - "v1" -> group="", version="v1" (core API)
fn gvk_from_type_meta(tm: &TypeMeta) -> GroupVersionKind {
    let (group, version) = match tm.api_version.rsplit_once('/') {
        Some((g, v)) => (g.to_string(), v.to_string()),
        None => (String::new(), tm.api_version.clone()),
    };

    GroupVersionKind {
        group,
        version,
        kind: tm.kind.clone(),
    }
}
