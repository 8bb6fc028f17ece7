//! HTTP/JSON client for the traffic manager
//!
//! | Call              | Request                                   |
//! |-------------------|-------------------------------------------|
//! | `version`         | `GET /version`                            |
//! | `create_intercept`| `POST /sessions/{id}/intercepts`          |
//! | `remove_intercept`| `DELETE /sessions/{id}/intercepts/{name}` |
//! | `list_intercepts` | `GET /sessions/{id}/intercepts`           |

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

use crate::error::{ConnectError, Result};
use crate::rpc::{InterceptInfo, InterceptResult, InterceptSpec, ManagerRpc, SessionInfo, VersionInfo};

/// Per-request limit of the HTTP client
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpManagerClient {
    client: reqwest::Client,
    base: Url,
}

impl HttpManagerClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base_url).map_err(|e| ConnectError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if base.cannot_be_a_base() {
            return Err(ConnectError::InvalidUrl {
                url: base_url.to_string(),
                reason: "not a base URL".to_string(),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConnectError::Communication {
                message: e.to_string(),
            })?;

        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// URL of `segments` below the base URL, each segment percent-encoded
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ConnectError::InvalidUrl {
                url: self.base.to_string(),
                reason: "not a base URL".to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ConnectError::HttpError {
                status: status.as_u16(),
                message: "Access denied by the traffic manager".to_string(),
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConnectError::HttpError {
                status: status.as_u16(),
                message: body.trim().to_string(),
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl ManagerRpc for HttpManagerClient {
    async fn version(&self) -> Result<VersionInfo> {
        let url = self.url(&["version"])?;
        self.send(self.client.get(url)).await
    }

    async fn create_intercept(
        &self,
        session: &SessionInfo,
        spec: &InterceptSpec,
    ) -> Result<InterceptResult> {
        let url = self.url(&["sessions", &session.session_id, "intercepts"])?;
        self.send(self.client.post(url).json(spec)).await
    }

    async fn remove_intercept(&self, session: &SessionInfo, name: &str) -> Result<InterceptResult> {
        let url = self.url(&["sessions", &session.session_id, "intercepts", name])?;
        self.send(self.client.delete(url)).await
    }

    async fn list_intercepts(&self, session: &SessionInfo) -> Result<Vec<InterceptInfo>> {
        let url = self.url(&["sessions", &session.session_id, "intercepts"])?;
        self.send(self.client.get(url)).await
    }
}
