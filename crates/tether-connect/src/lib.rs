//! Tether Connect - traffic manager sessions and intercepts
//!
//! This crate provides the client side of a connected session:
//!
//! - **RPC**: The [`ManagerRpc`] trait with an HTTP/JSON client and an in-memory fake
//! - **Intercepts**: Create, remove and list the intercepts of a session
//! - **Scoped state**: Ensure a remote resource for the duration of a call
//! - **Translation**: Operator messages for intercept error codes
//! - **Session cache**: Session descriptors persisted per cluster
//!
//! ## Example
//!
//! ```rust,no_run
//! use tether_connect::{
//!     HttpManagerClient, InterceptController, InterceptSpec, SessionCache, with_ensured_state,
//! };
//! use tether_core::ClientConfig;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::load()?;
//! let session = SessionCache::open()?.load("https://10.0.0.1:6443")?;
//! let rpc = Arc::new(HttpManagerClient::new("http://localhost:8081")?);
//!
//! let controller = InterceptController::new(rpc, session, &config);
//! let web = controller.intercept(InterceptSpec::new("web", 8080));
//!
//! // The intercept is removed again when the body returns
//! with_ensured_state(&web, false, || async {
//!     Ok::<_, tether_connect::ConnectError>(())
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

pub mod ensured;
pub mod error;
pub mod http;
pub mod intercept;
pub mod mock;
pub mod rpc;
pub mod session;
pub mod translate;

pub use ensured::{EnsureOutcome, EnsuredState, with_ensured_state};
pub use error::{ConnectError, NOT_CONNECTED_MESSAGE, Result};
pub use http::HttpManagerClient;
pub use intercept::{InterceptController, InterceptState};
pub use mock::{CallCounts, MockManager};
pub use rpc::{
    AgentInfo, InterceptErrorCode, InterceptInfo, InterceptResult, InterceptSpec, ManagerRpc,
    SessionInfo, VersionInfo,
};
pub use session::{SessionCache, sanitize_host, verify_manager};
pub use translate::{intercept_message, result_error};
