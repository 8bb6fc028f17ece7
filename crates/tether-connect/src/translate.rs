//! Operator messages for intercept error codes

use std::fmt::Write as _;

use crate::error::{ConnectError, NOT_CONNECTED_MESSAGE};
use crate::rpc::{AgentInfo, InterceptErrorCode, InterceptResult};

const NO_PREVIEW_HOST_MESSAGE: &str = "Your cluster is not configured for Preview URLs.
(Could not find a Host resource that enables Path-type Preview URLs.)
Please specify one or more header matches using --match.";

/// Message for an intercept error `code` with its `payload`
///
/// Returns `None` for [`InterceptErrorCode::Unspecified`].
pub fn intercept_message(code: InterceptErrorCode, payload: &str) -> Option<String> {
    use InterceptErrorCode::*;

    let message = match code {
        Unspecified => return None,
        NoPreviewHost => NO_PREVIEW_HOST_MESSAGE.to_string(),
        NoConnection => NOT_CONNECTED_MESSAGE.to_string(),
        NoManager => "Intercept unavailable: no traffic manager".to_string(),
        ManagerConnecting => "Connecting to traffic manager...".to_string(),
        AlreadyExists => format!("Intercept with name {payload:?} already exists"),
        NoAcceptableTarget => format!("No interceptable workload matching {payload} found"),
        ManagerError => payload.to_string(),
        AmbiguousMatch => ambiguous_match(payload),
        FailedToEstablish => format!("Failed to establish intercept: {payload}"),
        FailedToRemove => format!("Error while removing intercept: {payload}"),
        NotFound => format!("Intercept named {payload:?} not found"),
    };
    Some(message)
}

fn ambiguous_match(payload: &str) -> String {
    let matches: Vec<AgentInfo> = match serde_json::from_str(payload) {
        Ok(matches) => matches,
        Err(e) => return format!("Unable to unmarshal JSON: {e}"),
    };

    let mut message = String::from("Found more than one possible match:");
    for (idx, agent) in matches.iter().enumerate() {
        let _ = write!(message, "\n{:4}: {} on host {}", idx + 1, agent.name, agent.hostname);
    }
    message
}

/// The error for a failed intercept result, `None` when it succeeded
pub fn result_error(result: &InterceptResult) -> Option<ConnectError> {
    match result.error {
        InterceptErrorCode::Unspecified => None,
        InterceptErrorCode::NoConnection => Some(ConnectError::NotConnected),
        code => intercept_message(code, &result.error_text)
            .map(|message| ConnectError::Intercept { code, message }),
    }
}
