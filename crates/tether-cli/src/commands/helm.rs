//! Helm commands - install, upgrade and uninstall the traffic manager

use console::style;
use std::sync::Arc;
use tether_core::{ClientConfig, Values, parse_set_values};
use tether_kube::{
    CRD_RELEASE, Installer, KubeClient, KubeError, Locator, Reconciled, Reconciler,
    ReleaseRequest, SecretsDriver, StorageConfig, TRAFFIC_MANAGER_RELEASE, TokioClock,
    traffic_manager_values,
};

use super::GlobalArgs;
use crate::error::{CliError, Result};

/// Run the install command
pub async fn install(
    global: &GlobalArgs,
    config: &ClientConfig,
    set_values: &[String],
    values_json: Option<&str>,
    crds: bool,
) -> Result<()> {
    let mut request = ReleaseRequest::install();
    if let Some(json) = values_override(set_values, values_json)? {
        request = request.with_values_json(json);
    }
    if crds {
        request = request.for_crds();
    }

    ensure(global, config, &request).await
}

/// Run the upgrade command
pub async fn upgrade(
    global: &GlobalArgs,
    config: &ClientConfig,
    set_values: &[String],
    values_json: Option<&str>,
    crds: bool,
    reset_values: bool,
    reuse_values: bool,
) -> Result<()> {
    let mut request = ReleaseRequest::upgrade().with_values_policy(reset_values, reuse_values);
    if let Some(json) = values_override(set_values, values_json)? {
        request = request.with_values_json(json);
    }
    if crds {
        request = request.for_crds();
    }

    ensure(global, config, &request).await
}

/// Run the uninstall command
pub async fn uninstall(
    global: &GlobalArgs,
    config: &ClientConfig,
    strict: bool,
    crds: bool,
) -> Result<()> {
    let installer = installer(global, config).await?;
    let outcome = installer
        .delete_traffic_manager(&global.namespace, strict, crds)
        .await?;

    report(release_name(crds), &global.namespace, &outcome);
    Ok(())
}

async fn ensure(global: &GlobalArgs, config: &ClientConfig, request: &ReleaseRequest) -> Result<()> {
    let installer = installer(global, config).await?;
    println!(
        "{} Ensuring {} in namespace {}",
        style("→").blue().bold(),
        style(release_name(request.crds)).cyan(),
        style(&global.namespace).yellow()
    );

    let outcome = installer
        .ensure_traffic_manager(&global.namespace, request)
        .await?;

    report(release_name(request.crds), &global.namespace, &outcome);
    Ok(())
}

/// Installer bound to the cluster of the current kubeconfig context
async fn installer(global: &GlobalArgs, config: &ClientConfig) -> Result<Installer> {
    let bundle_dir = global.bundle_dir()?;
    let client = kube::Client::try_default().await.map_err(KubeError::from)?;

    let locator = Locator::new(
        Arc::new(SecretsDriver::new(client.clone(), StorageConfig::default())),
        Arc::new(TokioClock),
    );
    let actions = Arc::new(KubeClient::new(
        client.clone(),
        SecretsDriver::new(client, StorageConfig::default()),
    ));

    let reconciler = Reconciler::new(locator, actions, config.timeouts.clone())
        .with_defaults(traffic_manager_values(config, env!("CARGO_PKG_VERSION")));

    Ok(Installer::new(reconciler, bundle_dir))
}

/// Merge `--values-json` and `--set` into one JSON override
///
/// Parsed up front so bad input is reported before the cluster is contacted.
fn values_override(set_values: &[String], values_json: Option<&str>) -> Result<Option<Vec<u8>>> {
    if set_values.is_empty() && values_json.is_none() {
        return Ok(None);
    }

    let mut values = match values_json {
        Some(json) => Values::from_json(json).map_err(|e| {
            CliError::user(format!("unable to parse values JSON: {e}"))
        })?,
        None => Values::new(),
    };
    if !set_values.is_empty() {
        values.merge(&parse_set_values(set_values)?);
    }

    let json = serde_json::to_vec(values.inner()).map_err(|e| CliError::other(e.to_string()))?;
    Ok(Some(json))
}

fn release_name(crds: bool) -> &'static str {
    if crds { CRD_RELEASE } else { TRAFFIC_MANAGER_RELEASE }
}

fn report(name: &str, namespace: &str, outcome: &Reconciled) {
    match outcome {
        Reconciled::Installed { version } => println!(
            "{} Installed {} (revision {}) in namespace {}",
            style("✓").green().bold(),
            style(name).cyan(),
            style(version).yellow(),
            style(namespace).yellow()
        ),
        Reconciled::Upgraded { version } => println!(
            "{} Upgraded {} to revision {} in namespace {}",
            style("✓").green().bold(),
            style(name).cyan(),
            style(version).yellow(),
            style(namespace).yellow()
        ),
        Reconciled::Uninstalled => println!(
            "{} Uninstalled {} from namespace {}",
            style("✓").green().bold(),
            style(name).cyan(),
            style(namespace).yellow()
        ),
        Reconciled::AlreadyAbsent => println!(
            "{} {} is not installed in namespace {}",
            style("→").blue().bold(),
            style(name).cyan(),
            style(namespace).yellow()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_overrides() {
        assert!(values_override(&[], None).unwrap().is_none());
    }

    #[test]
    fn test_set_wins_over_values_json() {
        let json = values_override(
            &["image.tag=2.5.1".to_string()],
            Some(r#"{"image": {"tag": "2.5.0", "registry": "ghcr.io/acme"}}"#),
        )
        .unwrap()
        .unwrap();

        let values: serde_json::Value = serde_json::from_slice(&json).unwrap();
        assert_eq!(values["image"]["tag"], "2.5.1");
        assert_eq!(values["image"]["registry"], "ghcr.io/acme");
    }

    #[test]
    fn test_invalid_values_json() {
        let err = values_override(&[], Some("{not json")).unwrap_err();
        assert_eq!(err.exit_code(), crate::exit_codes::USER_ERROR);
        assert!(err.to_string().starts_with("unable to parse values JSON"));
    }
}
