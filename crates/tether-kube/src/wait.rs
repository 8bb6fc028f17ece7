//! Waiting for released Deployments to become ready

use k8s_openapi::api::apps::v1::Deployment;
use kube::Api;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{KubeError, Result};
use crate::resources::split_documents;

/// Interval between readiness checks
const CHECK_INTERVAL: Duration = Duration::from_secs(2);

/// Readiness of a single Deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentHealth {
    pub name: String,
    pub healthy: bool,
    pub message: Option<String>,
}

impl DeploymentHealth {
    /// Evaluate a Deployment's readiness
    ///
    /// Healthy when every desired replica is updated, ready and available.
    pub fn evaluate(deployment: &Deployment) -> Self {
        let name = deployment.metadata.name.clone().unwrap_or_default();
        let spec = deployment.spec.as_ref();
        let status = deployment.status.as_ref();

        let desired = spec.and_then(|s| s.replicas).unwrap_or(1);
        let ready = status.and_then(|s| s.ready_replicas).unwrap_or(0);
        let updated = status.and_then(|s| s.updated_replicas).unwrap_or(0);
        let available = status.and_then(|s| s.available_replicas).unwrap_or(0);

        let healthy = ready == desired && updated == desired && available == desired;

        let message = (!healthy).then(|| {
            status
                .and_then(|s| s.conditions.as_ref())
                .map(|c| {
                    c.iter()
                        .filter(|cond| cond.status == "False")
                        .filter_map(|cond| {
                            cond.message
                                .as_ref()
                                .map(|m| format!("{}: {}", cond.type_, m))
                        })
                        .collect::<Vec<_>>()
                        .join("; ")
                })
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| {
                    format!(
                        "Waiting: {}/{} ready, {}/{} updated, {}/{} available",
                        ready, desired, updated, desired, available, desired
                    )
                })
        });

        Self {
            name,
            healthy,
            message,
        }
    }
}

/// Names of the Deployments declared in a manifest
pub fn deployment_names(manifest: &str) -> Result<Vec<String>> {
    Ok(split_documents(manifest)?
        .into_iter()
        .filter(|obj| obj.types.as_ref().is_some_and(|t| t.kind == "Deployment"))
        .filter_map(|obj| obj.metadata.name)
        .collect())
}

/// Wait until every Deployment in the manifest is ready, or `timeout` elapses
pub async fn wait_for_deployments(
    client: &kube::Client,
    namespace: &str,
    manifest: &str,
    timeout: Duration,
) -> Result<()> {
    let names = deployment_names(manifest)?;
    if names.is_empty() {
        return Ok(());
    }

    let api: Api<Deployment> = Api::namespaced(client.clone(), namespace);
    let deadline = Instant::now() + timeout;

    loop {
        let mut pending = Vec::new();
        for name in &names {
            let health = match api.get_opt(name).await? {
                Some(deployment) => DeploymentHealth::evaluate(&deployment),
                None => DeploymentHealth {
                    name: name.clone(),
                    healthy: false,
                    message: Some("Deployment not found".to_string()),
                },
            };
            if !health.healthy {
                pending.push(health);
            }
        }

        if pending.is_empty() {
            return Ok(());
        }

        if Instant::now() >= deadline {
            let detail = pending
                .iter()
                .map(|h| format!("{}: {}", h.name, h.message.as_deref().unwrap_or("not ready")))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(KubeError::DeadlineExceeded(format!(
                "waiting for deployments in {}: {}",
                namespace, detail
            )));
        }

        debug!(namespace, pending = pending.len(), "Waiting for deployments");
        tokio::time::sleep(CHECK_INTERVAL).await;
    }
}
