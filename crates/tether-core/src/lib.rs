//! Tether Core - shared types for the tether control plane
//!
//! This crate provides the foundational types used throughout tether:
//! - `Values`: Configuration values with deep merge support
//! - `LoadedBundle`: The installable release bundle
//! - `Release`: Release state as found in the cluster
//! - `ClientConfig`: Client configuration and timeout classes

pub mod bundle;
pub mod config;
pub mod context;
pub mod error;
pub mod release;
pub mod values;

pub use bundle::{Bundle, BundleMetadata, LoadedBundle};
pub use config::{ClientConfig, TimeoutClass, Timeouts};
pub use context::TemplateContext;
pub use error::{CoreError, Result};
pub use release::{Release, ReleaseInfo, ReleaseStatus};
pub use values::{Values, parse_set_values};
