//! Intercepts of a connected session

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tether_core::{ClientConfig, TimeoutClass};
use tracing::{debug, info};

use crate::ensured::{EnsureOutcome, EnsuredState};
use crate::error::{ConnectError, Result};
use crate::rpc::{InterceptErrorCode, InterceptInfo, InterceptSpec, ManagerRpc, SessionInfo};
use crate::translate::{intercept_message, result_error};

/// Delay between creates while the manager is still connecting
const CONNECTING_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Creates, removes and lists the intercepts of one session
#[derive(Clone)]
pub struct InterceptController {
    rpc: Arc<dyn ManagerRpc>,
    session: SessionInfo,
    call_timeout: Duration,
    connect_retries: u32,
    retry_delay: Duration,
}

impl InterceptController {
    pub fn new(rpc: Arc<dyn ManagerRpc>, session: SessionInfo, config: &ClientConfig) -> Self {
        Self {
            rpc,
            session,
            call_timeout: config.timeouts.intercept,
            connect_retries: config.intercept.connect_retries,
            retry_delay: CONNECTING_RETRY_DELAY,
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn session(&self) -> &SessionInfo {
        &self.session
    }

    /// Scoped state for one intercept, for use with
    /// [`with_ensured_state`](crate::ensured::with_ensured_state)
    pub fn intercept(&self, spec: InterceptSpec) -> InterceptState<'_> {
        InterceptState {
            controller: self,
            spec,
        }
    }

    /// Create the intercept
    ///
    /// An intercept that already exists under the same name is not an error.
    pub async fn create(&self, spec: &InterceptSpec) -> Result<EnsureOutcome> {
        let mut attempt = 0;
        loop {
            let result = self
                .call(self.rpc.create_intercept(&self.session, spec))
                .await?;

            match result.error {
                InterceptErrorCode::Unspecified => {
                    info!(intercept = %spec.name, workload = %spec.workload, "Intercept created");
                    return Ok(EnsureOutcome::Created);
                }
                InterceptErrorCode::AlreadyExists => {
                    if let Some(message) = intercept_message(result.error, &result.error_text) {
                        info!("{message}");
                    }
                    return Ok(EnsureOutcome::AlreadySatisfied);
                }
                InterceptErrorCode::ManagerConnecting if attempt < self.connect_retries => {
                    attempt += 1;
                    debug!(attempt, "Traffic manager is connecting, retrying");
                    tokio::time::sleep(self.retry_delay).await;
                }
                _ => {
                    return Err(result_error(&result).unwrap_or(ConnectError::Intercept {
                        code: result.error,
                        message: result.error_text,
                    }));
                }
            }
        }
    }

    /// Remove the intercept named `name`
    ///
    /// Removing an intercept that does not exist is an error.
    pub async fn remove(&self, name: &str) -> Result<()> {
        let name = name.trim();
        let result = self
            .call(self.rpc.remove_intercept(&self.session, name))
            .await?;

        match result_error(&result) {
            None => {
                info!(intercept = name, "Intercept removed");
                Ok(())
            }
            Some(e) => Err(e),
        }
    }

    pub async fn list(&self) -> Result<Vec<InterceptInfo>> {
        self.call(self.rpc.list_intercepts(&self.session)).await
    }

    async fn call<T>(&self, rpc: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.call_timeout, rpc)
            .await
            .map_err(|_| ConnectError::Timeout {
                class: TimeoutClass::Intercept,
                limit: self.call_timeout,
            })?
    }
}

/// One intercept of a session as scoped state
pub struct InterceptState<'a> {
    controller: &'a InterceptController,
    spec: InterceptSpec,
}

impl InterceptState<'_> {
    pub fn spec(&self) -> &InterceptSpec {
        &self.spec
    }
}

#[async_trait]
impl EnsuredState for InterceptState<'_> {
    async fn ensure_state(&self) -> Result<EnsureOutcome> {
        self.controller.create(&self.spec).await
    }

    async fn deactivate_state(&self) -> Result<()> {
        self.controller.remove(&self.spec.name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensured::with_ensured_state;
    use crate::mock::MockManager;
    use crate::rpc::InterceptResult;

    fn controller(manager: &MockManager) -> InterceptController {
        InterceptController::new(
            Arc::new(manager.clone()),
            SessionInfo::new("session-1"),
            &ClientConfig::default(),
        )
        .with_retry_delay(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_create_twice() {
        let manager = MockManager::new();
        let controller = controller(&manager);
        let web = controller.intercept(InterceptSpec::new("web", 8080));

        assert_eq!(web.ensure_state().await.unwrap(), EnsureOutcome::Created);
        assert_eq!(web.ensure_state().await.unwrap(), EnsureOutcome::AlreadySatisfied);
        assert_eq!(manager.intercept_names(controller.session()), vec!["web"]);
    }

    #[tokio::test]
    async fn test_remove_unknown_intercept() {
        let manager = MockManager::new();
        let controller = controller(&manager);

        let err = controller
            .intercept(InterceptSpec::new("ghost", 8080))
            .deactivate_state()
            .await
            .unwrap_err();

        assert_eq!(err.intercept_code(), Some(InterceptErrorCode::NotFound));
        assert!(err.to_string().contains("ghost"));
    }

    #[tokio::test]
    async fn test_scoped_intercept_is_removed_exactly_once() {
        let manager = MockManager::new();
        let controller = controller(&manager);
        let web = controller.intercept(InterceptSpec::new("web", 8080));

        let seen = with_ensured_state(&web, false, || async {
            Ok::<_, ConnectError>(manager.intercept_names(controller.session()))
        })
        .await
        .unwrap();

        assert_eq!(seen, vec!["web"]);
        assert!(manager.intercept_names(controller.session()).is_empty());
        assert_eq!(manager.calls().removes, 1);
    }

    #[tokio::test]
    async fn test_existing_intercept_survives_scope() {
        let manager = MockManager::new();
        let controller = controller(&manager);
        let web = controller.intercept(InterceptSpec::new("web", 8080));
        web.ensure_state().await.unwrap();

        with_ensured_state(&web, false, || async { Ok::<_, ConnectError>(()) })
            .await
            .unwrap();

        assert_eq!(manager.intercept_names(controller.session()), vec!["web"]);
        assert_eq!(manager.calls().removes, 0);
    }

    #[tokio::test]
    async fn test_no_connection_is_not_connected() {
        let manager = MockManager::new();
        manager.script_create(InterceptResult::error(InterceptErrorCode::NoConnection, ""));

        let err = controller(&manager)
            .create(&InterceptSpec::new("web", 8080))
            .await
            .unwrap_err();

        assert!(err.is_not_connected());
    }

    #[tokio::test]
    async fn test_other_codes_are_translated() {
        let manager = MockManager::new();
        manager.script_create(InterceptResult::error(
            InterceptErrorCode::NoAcceptableTarget,
            "web",
        ));

        let err = controller(&manager)
            .create(&InterceptSpec::new("web", 8080))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "No interceptable workload matching web found");
    }

    #[tokio::test(start_paused = true)]
    async fn test_manager_connecting_is_retried() {
        let manager = MockManager::new();
        manager.script_create(InterceptResult::error(InterceptErrorCode::ManagerConnecting, ""));
        manager.script_create(InterceptResult::error(InterceptErrorCode::ManagerConnecting, ""));

        let outcome = controller(&manager)
            .create(&InterceptSpec::new("web", 8080))
            .await
            .unwrap();

        assert_eq!(outcome, EnsureOutcome::Created);
        assert_eq!(manager.calls().creates, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manager_connecting_gives_up() {
        let manager = MockManager::new();
        for _ in 0..4 {
            manager.script_create(InterceptResult::error(InterceptErrorCode::ManagerConnecting, ""));
        }

        let err = controller(&manager)
            .create(&InterceptSpec::new("web", 8080))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Connecting to traffic manager...");
        assert_eq!(manager.calls().creates, 4);
    }

    #[tokio::test]
    async fn test_list_and_preview_url() {
        let manager = MockManager::new();
        manager.set_preview_domain(Some("web-abc.preview.tether.dev"));
        let controller = controller(&manager);
        controller.create(&InterceptSpec::new("web", 8080)).await.unwrap();

        let intercepts = controller.list().await.unwrap();

        assert_eq!(intercepts.len(), 1);
        assert_eq!(
            intercepts[0].preview_url().as_deref(),
            Some("https://web-abc.preview.tether.dev")
        );
    }
}
