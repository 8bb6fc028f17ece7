//! Deadline enforcement for long-running cluster operations
//!
//! [`TimeoutGuard::run`] spawns the operation and races it against the limit
//! configured for its [`TimeoutClass`]. When the limit is hit the caller gets
//! a [`KubeError::Timeout`] right away; the spawned task keeps running
//! detached and its result is discarded.

use std::future::Future;
use std::time::Duration;
use tether_core::{TimeoutClass, Timeouts};
use tracing::warn;

use crate::error::{KubeError, Result};

#[derive(Debug, Clone)]
pub struct TimeoutGuard {
    timeouts: Timeouts,
}

impl TimeoutGuard {
    pub fn new(timeouts: Timeouts) -> Self {
        Self { timeouts }
    }

    pub fn limit(&self, class: TimeoutClass) -> Duration {
        self.timeouts.get(class)
    }

    /// Run `op` under the limit of `class`
    ///
    /// `op` receives the limit so it can bound its own waits. Errors from `op`
    /// that report running out of time are reported as a timeout of `class`.
    pub async fn run<T, F, Fut>(&self, class: TimeoutClass, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Duration) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let limit = self.limit(class);
        let handle = tokio::spawn(op(limit));

        match tokio::time::timeout(limit, handle).await {
            Err(_) => {
                warn!(%class, ?limit, "Operation exceeded its time limit");
                Err(KubeError::Timeout { class, limit })
            }
            Ok(Err(join)) => Err(KubeError::Task(join.to_string())),
            Ok(Ok(Err(e))) if e.is_timeout_shaped() => Err(KubeError::Timeout { class, limit }),
            Ok(Ok(result)) => result,
        }
    }
}
