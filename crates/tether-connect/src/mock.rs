//! In-memory traffic manager for testing
//!
//! Keeps intercepts per session and answers like the real manager: a second
//! create under the same name reports `AlreadyExists`, removing an unknown
//! name reports `NotFound`. Responses can be scripted ahead of time.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{ConnectError, Result};
use crate::rpc::{
    InterceptErrorCode, InterceptInfo, InterceptResult, InterceptSpec, ManagerRpc, SessionInfo,
    VersionInfo,
};

/// Counts of RPC calls for assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CallCounts {
    pub versions: usize,
    pub creates: usize,
    pub removes: usize,
    pub lists: usize,
}

#[derive(Default)]
struct State {
    /// session -> name -> intercept
    intercepts: HashMap<String, BTreeMap<String, InterceptInfo>>,
    scripted_creates: VecDeque<InterceptResult>,
    preview_domain: Option<String>,
    unreachable: bool,
    calls: CallCounts,
}

#[derive(Clone, Default)]
pub struct MockManager {
    state: Arc<Mutex<State>>,
}

impl MockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer the next create with `result` instead of acting on it
    pub fn script_create(&self, result: InterceptResult) {
        self.state().scripted_creates.push_back(result);
    }

    /// Preview domain reported for intercepts created from now on
    pub fn set_preview_domain(&self, domain: Option<&str>) {
        self.state().preview_domain = domain.map(str::to_string);
    }

    /// Make every call fail as if the manager could not be reached
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state().unreachable = unreachable;
    }

    pub fn calls(&self) -> CallCounts {
        self.state().calls.clone()
    }

    /// Names of the intercepts of a session
    pub fn intercept_names(&self, session: &SessionInfo) -> Vec<String> {
        self.state()
            .intercepts
            .get(&session.session_id)
            .map(|intercepts| intercepts.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reachable(&self, count: impl FnOnce(&mut CallCounts)) -> Result<MutexGuard<'_, State>> {
        let mut state = self.state();
        count(&mut state.calls);
        if state.unreachable {
            return Err(ConnectError::Communication {
                message: "connection refused".to_string(),
            });
        }
        Ok(state)
    }
}

#[async_trait]
impl ManagerRpc for MockManager {
    async fn version(&self) -> Result<VersionInfo> {
        self.reachable(|c| c.versions += 1)?;
        Ok(VersionInfo {
            name: "traffic-manager".to_string(),
            version: "2.5.0".to_string(),
        })
    }

    async fn create_intercept(
        &self,
        session: &SessionInfo,
        spec: &InterceptSpec,
    ) -> Result<InterceptResult> {
        let mut state = self.reachable(|c| c.creates += 1)?;
        if let Some(scripted) = state.scripted_creates.pop_front() {
            return Ok(scripted);
        }

        let preview_domain = state.preview_domain.clone();
        let intercepts = state
            .intercepts
            .entry(session.session_id.clone())
            .or_default();
        if intercepts.contains_key(&spec.name) {
            return Ok(InterceptResult::error(
                InterceptErrorCode::AlreadyExists,
                &spec.name,
            ));
        }

        intercepts.insert(
            spec.name.clone(),
            InterceptInfo {
                spec: spec.clone(),
                preview_domain,
            },
        );
        Ok(InterceptResult::ok())
    }

    async fn remove_intercept(&self, session: &SessionInfo, name: &str) -> Result<InterceptResult> {
        let mut state = self.reachable(|c| c.removes += 1)?;
        let removed = state
            .intercepts
            .get_mut(&session.session_id)
            .and_then(|intercepts| intercepts.remove(name));

        Ok(match removed {
            Some(_) => InterceptResult::ok(),
            None => InterceptResult::error(InterceptErrorCode::NotFound, name),
        })
    }

    async fn list_intercepts(&self, session: &SessionInfo) -> Result<Vec<InterceptInfo>> {
        let state = self.reachable(|c| c.lists += 1)?;
        Ok(state
            .intercepts
            .get(&session.session_id)
            .map(|intercepts| intercepts.values().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_intercepts_are_scoped_to_sessions() {
        let manager = MockManager::new();
        let alice = SessionInfo::new("alice");
        let bob = SessionInfo::new("bob");
        let spec = InterceptSpec::new("web", 8080);

        assert!(manager.create_intercept(&alice, &spec).await.unwrap().is_ok());
        assert!(manager.create_intercept(&bob, &spec).await.unwrap().is_ok());

        let again = manager.create_intercept(&alice, &spec).await.unwrap();
        assert_eq!(again.error, InterceptErrorCode::AlreadyExists);
        assert_eq!(again.error_text, "web");

        assert!(manager.remove_intercept(&alice, "web").await.unwrap().is_ok());
        assert_eq!(manager.intercept_names(&bob), vec!["web"]);
        assert!(manager.intercept_names(&alice).is_empty());
    }

    #[tokio::test]
    async fn test_scripted_and_unreachable() {
        let manager = MockManager::new();
        let session = SessionInfo::new("s");
        manager.script_create(InterceptResult::error(InterceptErrorCode::NoManager, ""));

        let result = manager
            .create_intercept(&session, &InterceptSpec::new("web", 8080))
            .await
            .unwrap();
        assert_eq!(result.error, InterceptErrorCode::NoManager);
        assert!(manager.intercept_names(&session).is_empty());

        manager.set_unreachable(true);
        assert!(matches!(
            manager.version().await,
            Err(ConnectError::Communication { .. })
        ));
        assert_eq!(manager.calls().versions, 1);
    }
}
