//! Scoped remote state
//!
//! A remote resource is ensured, a body runs, and the resource is deactivated
//! again unless the caller retains it. Deactivation only happens when the
//! ensure call actually created the resource, so something that was already
//! there is never removed.

use async_trait::async_trait;
use std::future::Future;
use tracing::{debug, warn};

use crate::error::{ConnectError, Result};

/// Outcome of a successful ensure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// The resource was created by this call
    Created,
    /// The resource already existed
    AlreadySatisfied,
}

/// Remote state that can be ensured and deactivated
#[async_trait]
pub trait EnsuredState: Send + Sync {
    async fn ensure_state(&self) -> Result<EnsureOutcome>;

    async fn deactivate_state(&self) -> Result<()>;
}

/// Ensure `state`, run `body`, then deactivate if this call created the state
/// and `retain` is false
///
/// Deactivation runs whether `body` succeeds or fails. When both fail, the
/// body's error is returned.
pub async fn with_ensured_state<S, T, E, F, Fut>(state: &S, retain: bool, body: F) -> std::result::Result<T, E>
where
    S: EnsuredState + ?Sized,
    E: From<ConnectError>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    let outcome = state.ensure_state().await?;
    let result = body().await;

    if outcome == EnsureOutcome::Created && !retain {
        debug!("Deactivating state created for this call");
        if let Err(e) = state.deactivate_state().await {
            if result.is_ok() {
                return Err(e.into());
            }
            warn!(error = %e, "Deactivation failed after body error");
        }
    }

    result
}
