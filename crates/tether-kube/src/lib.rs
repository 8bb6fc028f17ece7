//! Tether Kube - cluster release management for the traffic manager
//!
//! This crate provides:
//! - **Storage Drivers**: Persist release records in Kubernetes Secrets, or in memory for tests
//! - **Release Actions**: Install, upgrade, uninstall and legacy adoption against a live cluster
//! - **Locator**: Find the current release, waiting out transitional states
//! - **Reconciler**: Converge a release to an install/upgrade/uninstall request
//! - **Timeout Guard**: Bound long-running cluster operations by configured timeout classes
//! - **Installer**: The traffic manager and CRD releases built on the reconciler

pub mod actions;
pub mod client;
pub mod clock;
pub mod defaults;
pub mod error;
pub mod install;
pub mod locate;
pub mod mock;
pub mod reconcile;
pub mod release;
pub mod render;
pub mod resources;
pub mod storage;
pub mod timeout;
pub mod wait;

pub use actions::{InstallOptions, ReleaseActions, UninstallOptions, UpgradeOptions};
pub use client::KubeClient;
pub use clock::{Clock, ManualClock, TokioClock};
pub use defaults::traffic_manager_values;
pub use error::{KubeError, ReconcileKind, Result};
pub use install::{CRD_RELEASE, Installer, TRAFFIC_MANAGER_RELEASE};
pub use locate::Locator;
pub use mock::{ActionCounts, MockCluster};
pub use reconcile::{Reconciled, Reconciler, ReleaseRequest, RequestKind};
pub use release::StoredRelease;
pub use resources::{OperationSummary, ResourceManager};
pub use storage::{
    CompressionMethod, MockStorageDriver, OperationCounts, SecretsDriver, StorageConfig,
    StorageDriver,
};
pub use timeout::TimeoutGuard;
