//! CLI error types with exit code handling
//!
//! Library errors are folded into one diagnostic type whose variant decides
//! the exit code.

use miette::Diagnostic;
use tether_connect::ConnectError;
use tether_core::CoreError;
use tether_kube::KubeError;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Invalid input or a request the current state does not allow
    #[error("{message}")]
    #[diagnostic(code(tether::cli::user))]
    User {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("{message}")]
    #[diagnostic(code(tether::cli::not_connected))]
    NotConnected {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("{message}")]
    #[diagnostic(code(tether::cli::timeout))]
    Timeout {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(tether::cli::io))]
    Io { message: String },

    /// Cluster or traffic manager unreachable
    #[error("{message}")]
    #[diagnostic(code(tether::cli::communication))]
    Communication {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// The command run inside an intercept exited with a failure status
    #[error("command exited with status {status}")]
    #[diagnostic(code(tether::cli::command))]
    CommandFailed { status: i32 },

    /// The command run inside an intercept was stopped by Ctrl+C
    #[error("interrupted")]
    #[diagnostic(code(tether::cli::interrupted))]
    Interrupted,

    /// Wrapped error for passthrough (stores the formatted message)
    #[error("{message}")]
    #[diagnostic(code(tether::cli::error))]
    Other { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::User { .. } => exit_codes::USER_ERROR,
            CliError::NotConnected { .. } => exit_codes::NOT_CONNECTED,
            CliError::Timeout { .. } => exit_codes::TIMEOUT,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Communication { .. } => exit_codes::COMMUNICATION_ERROR,
            CliError::CommandFailed { status } => *status,
            CliError::Interrupted => exit_codes::INTERRUPTED,
            CliError::Other { .. } => exit_codes::ERROR,
        }
    }

    /// Create a user error
    pub fn user(message: impl Into<String>) -> Self {
        Self::User {
            message: message.into(),
            help: None,
        }
    }

    /// Create a user error with help text
    pub fn user_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::User {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Io(e) => e.into(),
            CoreError::InvalidConfig { .. } => CliError::user_with_help(
                err.to_string(),
                "Check the configuration file given by --config or TETHER_CONFIG",
            ),
            CoreError::YamlParse(_) | CoreError::JsonParse(_) | CoreError::ValuesMerge { .. } => {
                CliError::user(err.to_string())
            }
            other => CliError::other(other.to_string()),
        }
    }
}

impl From<KubeError> for CliError {
    fn from(err: KubeError) -> Self {
        let message = err.to_string();
        if let Some(kind) = err.reconcile_kind() {
            if kind.is_user_error() {
                return CliError::user(message);
            }
        }
        if err.is_timeout() {
            return CliError::Timeout {
                message,
                help: Some("Raise timeouts.helm in config.yml to allow more time".to_string()),
            };
        }
        if err.is_communication() {
            return CliError::Communication {
                message,
                help: Some("Check that the current kubeconfig context points at a reachable cluster".to_string()),
            };
        }
        match err.root() {
            KubeError::Io(_) => CliError::Io { message },
            _ => CliError::Other { message },
        }
    }
}

impl From<ConnectError> for CliError {
    fn from(err: ConnectError) -> Self {
        let message = err.to_string();
        match err {
            ConnectError::NotConnected => CliError::NotConnected {
                message,
                help: None,
            },
            ConnectError::Timeout { class, .. } => CliError::Timeout {
                message,
                help: Some(format!("Raise {class} in config.yml to allow more time")),
            },
            ConnectError::Communication { .. } | ConnectError::HttpError { .. } => {
                CliError::Communication {
                    message,
                    help: Some(
                        "Check --manager-url or TETHER_MANAGER_URL".to_string(),
                    ),
                }
            }
            ConnectError::InvalidUrl { .. } => CliError::user(message),
            ConnectError::Io(e) => e.into(),
            _ => CliError::Other { message },
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tether_core::TimeoutClass;
    use tether_kube::ReconcileKind;

    #[test]
    fn test_connect_error_exit_codes() {
        assert_eq!(
            CliError::from(ConnectError::NotConnected).exit_code(),
            exit_codes::NOT_CONNECTED
        );
        assert_eq!(
            CliError::from(ConnectError::Communication {
                message: "connection refused".to_string()
            })
            .exit_code(),
            exit_codes::COMMUNICATION_ERROR
        );
        assert_eq!(
            CliError::from(ConnectError::Timeout {
                class: TimeoutClass::Intercept,
                limit: Duration::from_secs(30),
            })
            .exit_code(),
            exit_codes::TIMEOUT
        );
    }

    #[test]
    fn test_reconcile_errors_are_user_errors() {
        let err = KubeError::reconcile(
            ReconcileKind::AlreadyInstalled,
            "traffic-manager version \"2.5.0\" is already installed",
        )
        .context("failed to install traffic manager");

        let cli = CliError::from(err);
        assert_eq!(cli.exit_code(), exit_codes::USER_ERROR);
        assert!(cli.to_string().starts_with("failed to install traffic manager: "));
    }

    #[test]
    fn test_kube_timeout_and_communication() {
        let timeout = KubeError::Timeout {
            class: TimeoutClass::Helm,
            limit: Duration::from_secs(30),
        };
        assert_eq!(CliError::from(timeout).exit_code(), exit_codes::TIMEOUT);

        let unreachable = KubeError::Communication("connection refused".to_string())
            .context("err detecting traffic-manager");
        assert_eq!(
            CliError::from(unreachable).exit_code(),
            exit_codes::COMMUNICATION_ERROR
        );
    }

    #[test]
    fn test_command_status_passthrough() {
        assert_eq!(CliError::CommandFailed { status: 7 }.exit_code(), 7);
        assert_eq!(CliError::Interrupted.exit_code(), exit_codes::INTERRUPTED);
    }
}
