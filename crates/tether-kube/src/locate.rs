//! Release lookup

use std::sync::Arc;
use std::time::Duration;
use tether_core::Release;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::{KubeError, Result};
use crate::storage::StorageDriver;

/// Interval between observations of a release in a transitional state
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Finds the current release for a name in a namespace
#[derive(Clone)]
pub struct Locator {
    storage: Arc<dyn StorageDriver>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
}

impl Locator {
    pub fn new(storage: Arc<dyn StorageDriver>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            clock,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Latest revision of the release, or `None` if there is none
    ///
    /// Any failure to read the release store is a communication error.
    pub async fn locate(&self, name: &str, namespace: &str) -> Result<Option<Release>> {
        match self.storage.find_latest(namespace, name).await {
            Ok(found) => Ok(found.map(|r| r.to_release())),
            Err(e) if e.is_communication() => Err(e),
            Err(e) => Err(KubeError::Communication(e.to_string())),
        }
    }

    /// Like [`locate`](Self::locate), but waits up to `timeout` for a release
    /// in a transitional state to settle
    ///
    /// On timeout the last observation is returned and the release is assumed
    /// to be stuck.
    pub async fn locate_settled(
        &self,
        name: &str,
        namespace: &str,
        timeout: Duration,
    ) -> Result<Option<Release>> {
        let deadline = self.clock.now() + timeout;

        loop {
            let observed = self.locate(name, namespace).await?;
            let status = match &observed {
                Some(release) if release.status.is_transitional() => release.status,
                _ => return Ok(observed),
            };

            if self.clock.now() >= deadline {
                warn!(
                    release = name,
                    namespace,
                    %status,
                    "Release did not leave {} within {:?}, assuming it is stuck",
                    status,
                    timeout
                );
                return Ok(observed);
            }

            debug!(release = name, namespace, %status, "Waiting for release to settle");
            self.clock.sleep(self.poll_interval).await;
        }
    }
}
