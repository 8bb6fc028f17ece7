//! Convergence of a cluster release to a requested lifecycle state
//!
//! [`Reconciler::ensure`] looks at what is in the cluster and picks the one
//! action that moves it towards the request:
//!
//! | Found                         | Install            | Upgrade  | Uninstall |
//! |-------------------------------|--------------------|----------|-----------|
//! | nothing                       | install            | install  | nothing   |
//! | deployed                      | `AlreadyInstalled` | upgrade  | uninstall |
//! | anything else                 | uninstall, install | uninstall, install | uninstall |
//!
//! Releases in a pending state are given `timeouts.helm` to settle first.
//! Every mutation runs under the [`TimeoutGuard`].

use std::sync::Arc;
use tether_core::{LoadedBundle, Release, ReleaseStatus, TimeoutClass, Timeouts, Values};
use tracing::{error, info};

use crate::actions::{InstallOptions, ReleaseActions, UninstallOptions, UpgradeOptions};
use crate::error::{KubeError, ReconcileKind, Result};
use crate::locate::Locator;
use crate::timeout::TimeoutGuard;

/// Requested lifecycle transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Install,
    Upgrade,
    Uninstall,
}

/// What the caller wants the release to look like
#[derive(Debug, Clone)]
pub struct ReleaseRequest {
    pub kind: RequestKind,

    /// Value overrides as a JSON object
    pub values_json: Option<Vec<u8>>,

    pub reset_values: bool,
    pub reuse_values: bool,

    /// Act on the CRD companion release instead of the primary one
    pub crds: bool,

    /// Fail an uninstall when there is nothing to remove
    pub strict: bool,
}

impl ReleaseRequest {
    pub fn new(kind: RequestKind) -> Self {
        Self {
            kind,
            values_json: None,
            reset_values: false,
            reuse_values: false,
            crds: false,
            strict: false,
        }
    }

    pub fn install() -> Self {
        Self::new(RequestKind::Install)
    }

    pub fn upgrade() -> Self {
        Self::new(RequestKind::Upgrade)
    }

    pub fn uninstall(strict: bool) -> Self {
        Self {
            strict,
            ..Self::new(RequestKind::Uninstall)
        }
    }

    pub fn with_values_json(mut self, json: impl Into<Vec<u8>>) -> Self {
        self.values_json = Some(json.into());
        self
    }

    pub fn with_values_policy(mut self, reset_values: bool, reuse_values: bool) -> Self {
        self.reset_values = reset_values;
        self.reuse_values = reuse_values;
        self
    }

    pub fn for_crds(mut self) -> Self {
        self.crds = true;
        self
    }
}

/// What [`Reconciler::ensure`] did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    Installed { version: u32 },
    Upgraded { version: u32 },
    Uninstalled,
    /// Nothing to uninstall
    AlreadyAbsent,
}

pub struct Reconciler {
    locator: Locator,
    actions: Arc<dyn ReleaseActions>,
    guard: TimeoutGuard,
    timeouts: Timeouts,
    defaults: Values,
}

impl Reconciler {
    pub fn new(locator: Locator, actions: Arc<dyn ReleaseActions>, timeouts: Timeouts) -> Self {
        Self {
            locator,
            actions,
            guard: TimeoutGuard::new(timeouts.clone()),
            timeouts,
            defaults: Values::new(),
        }
    }

    /// Values that request overrides are merged over
    pub fn with_defaults(mut self, defaults: Values) -> Self {
        self.defaults = defaults;
        self
    }

    /// Bring release `name` in `namespace` into the state `request` asks for
    pub async fn ensure(
        &self,
        name: &str,
        namespace: &str,
        bundle: &LoadedBundle,
        request: &ReleaseRequest,
    ) -> Result<Reconciled> {
        if request.kind == RequestKind::Uninstall {
            return self.ensure_deleted(name, namespace, request.strict).await;
        }

        let mut existing = self
            .locator
            .locate_settled(name, namespace, self.timeouts.helm)
            .await
            .map_err(|e| e.context(format!("err detecting {name}")))?;

        if let Some(release) = existing.as_ref()
            && release.status != ReleaseStatus::Deployed
        {
            info!(
                release = name,
                namespace,
                status = %release.status,
                owner = release.owner_label(),
                "Release is not deployed, removing it before installing"
            );
            self.uninstall(name, namespace)
                .await
                .map_err(|e| e.context("failed to clean up leftover release history"))?;
            existing = None;
        }

        let values = self.resolve_values(request)?;

        match existing {
            None => {
                if !request.crds {
                    self.import_legacy(name, namespace, bundle, &values).await;
                }
                self.install(name, namespace, bundle, values).await
            }
            Some(release) if request.kind == RequestKind::Upgrade => {
                self.upgrade(&release, bundle, values, request).await
            }
            Some(release) => {
                let version = release
                    .semantic_version
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| release.version.to_string());
                Err(KubeError::reconcile(
                    ReconcileKind::AlreadyInstalled,
                    format!(
                        "{name} version \"{version}\" is already installed, use 'tether helm upgrade' instead to replace it"
                    ),
                ))
            }
        }
    }

    /// Remove release `name` from `namespace`
    ///
    /// A release that cannot be found, or that cannot be looked up when
    /// `strict` is false, counts as removed.
    pub async fn ensure_deleted(&self, name: &str, namespace: &str, strict: bool) -> Result<Reconciled> {
        let existing = match self.locator.locate(name, namespace).await {
            Ok(existing) => existing,
            Err(e) => {
                let e = e.context(format!(
                    "unable to look for existing release in namespace {namespace}"
                ));
                if strict {
                    return Err(e);
                }
                info!(error = %e, "Assuming it's already gone...");
                return Ok(Reconciled::AlreadyAbsent);
            }
        };

        let Some(release) = existing else {
            let e = KubeError::reconcile(
                ReconcileKind::NotInstalled,
                format!("{name} in namespace {namespace} already deleted"),
            );
            if strict {
                return Err(e);
            }
            info!("{e}");
            return Ok(Reconciled::AlreadyAbsent);
        };

        info!(
            release = name,
            namespace,
            version = release.version,
            owner = release.owner_label(),
            "Uninstalling release"
        );
        self.uninstall(name, namespace).await?;
        Ok(Reconciled::Uninstalled)
    }

    fn resolve_values(&self, request: &ReleaseRequest) -> Result<Values> {
        let overrides = match &request.values_json {
            Some(json) => Values::from_json_bytes(json).map_err(|e| {
                KubeError::reconcile(
                    ReconcileKind::InvalidValues,
                    format!("unable to parse values JSON: {e}"),
                )
            })?,
            None => Values::new(),
        };
        Ok(Values::coalesce(&overrides, self.defaults.clone()))
    }

    async fn import_legacy(&self, name: &str, namespace: &str, bundle: &LoadedBundle, values: &Values) {
        match self
            .actions
            .import_legacy(bundle, values, name, namespace)
            .await
        {
            Ok(0) => {}
            Ok(adopted) => info!(release = name, namespace, adopted, "Adopted legacy resources"),
            Err(e) => error!(
                release = name,
                namespace,
                error = %e,
                "Unable to import existing resources, installing anyway"
            ),
        }
    }

    async fn install(
        &self,
        name: &str,
        namespace: &str,
        bundle: &LoadedBundle,
        values: Values,
    ) -> Result<Reconciled> {
        info!(release = name, namespace, "Installing release");
        let actions = self.actions.clone();
        let bundle = bundle.clone();
        let options = InstallOptions::new(name, namespace);

        let release = self
            .guard
            .run(TimeoutClass::Helm, move |limit| async move {
                actions
                    .install(&bundle, values, &options.with_timeout(limit))
                    .await
            })
            .await?;
        Ok(Reconciled::Installed {
            version: release.version,
        })
    }

    async fn upgrade(
        &self,
        existing: &Release,
        bundle: &LoadedBundle,
        values: Values,
        request: &ReleaseRequest,
    ) -> Result<Reconciled> {
        info!(
            release = %existing.name,
            namespace = %existing.namespace,
            version = existing.version,
            owner = existing.owner_label(),
            "Upgrading release"
        );
        let actions = self.actions.clone();
        let bundle = bundle.clone();
        let options = UpgradeOptions::new(&existing.name, &existing.namespace)
            .with_values_policy(request.reset_values, request.reuse_values);

        let release = self
            .guard
            .run(TimeoutClass::Helm, move |limit| async move {
                actions
                    .upgrade(&bundle, values, &options.with_timeout(limit))
                    .await
            })
            .await?;
        Ok(Reconciled::Upgraded {
            version: release.version,
        })
    }

    async fn uninstall(&self, name: &str, namespace: &str) -> Result<()> {
        let actions = self.actions.clone();
        let options = UninstallOptions::new(name, namespace);

        self.guard
            .run(TimeoutClass::Helm, move |limit| async move {
                actions.uninstall(&options.with_timeout(limit)).await
            })
            .await?;
        Ok(())
    }
}
