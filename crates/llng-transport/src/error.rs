//! Error types for transport operations.
//!
//! Every failure is returned to the immediate caller. Messages keep exit
//! codes, HTTP status and body, and mode hints for diagnosis, and never carry
//! credentials or auth headers.

use llng_command::CommandError;
use thiserror::Error;

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Maximum number of characters of an HTTP error body kept in an error.
pub const MAX_ERROR_BODY: usize = 512;

/// Errors that can occur while running an operation against an instance.
#[derive(Debug, Error)]
pub enum TransportError {
    /// A CLI process exited unsuccessfully or could not be started.
    #[error("command execution failed: {message}")]
    Execution {
        /// Description of the failure.
        message: String,
        /// Exit code, when the process ran.
        exit_code: Option<i32>,
    },

    /// No pod matched the label selector.
    #[error("no pod found in namespace '{namespace}' matching '{selector}'")]
    PodResolution {
        /// Namespace that was searched.
        namespace: String,
        /// Label selector that was used.
        selector: String,
    },

    /// The management API answered with a non-2xx status.
    #[error("API returned HTTP {status}: {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// The management API could not be reached.
    #[error("API request failed: {message}")]
    Network {
        /// Description of the connection failure.
        message: String,
    },

    /// The operation does not exist on the active transport.
    #[error("{operation} is not supported by the {transport} transport: {hint}")]
    Unsupported {
        /// The logical operation that was requested.
        operation: String,
        /// The transport mode that rejected it.
        transport: String,
        /// Which mode to use instead.
        hint: String,
    },

    /// Instance configuration does not match its mode.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the problem.
        message: String,
    },

    /// The requested instance is not configured.
    #[error("unknown instance '{name}' (known instances: {})", known.join(", "))]
    UnknownInstance {
        /// The requested name.
        name: String,
        /// All configured instance names.
        known: Vec<String>,
    },

    /// Rollback was requested at the first configuration version.
    #[error("cannot roll back: current configuration version is {version}")]
    RollbackBoundary {
        /// The current version number.
        version: u64,
    },

    /// Output from a CLI or the API could not be interpreted.
    #[error("failed to parse {what}: {message}")]
    Parse {
        /// What was being parsed.
        what: String,
        /// Description of the parse error.
        message: String,
    },

    /// The caller passed arguments that cannot form a request.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },

    /// Any other failure, normalized to text.
    #[error("{message}")]
    Other {
        /// Description of the failure.
        message: String,
    },
}

impl TransportError {
    /// Creates an `Execution` error.
    #[must_use]
    pub fn execution(message: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self::Execution {
            message: message.into(),
            exit_code,
        }
    }

    /// Creates a `PodResolution` error.
    #[must_use]
    pub fn pod_resolution(namespace: impl Into<String>, selector: impl Into<String>) -> Self {
        Self::PodResolution {
            namespace: namespace.into(),
            selector: selector.into(),
        }
    }

    /// Creates an `Http` error, truncating the body.
    #[must_use]
    pub fn http(status: u16, body: impl AsRef<str>) -> Self {
        let body = body.as_ref();
        let body = match body.char_indices().nth(MAX_ERROR_BODY) {
            Some((idx, _)) => format!("{}...", &body[..idx]),
            None => body.to_string(),
        };
        Self::Http { status, body }
    }

    /// Creates a `Network` error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates an `Unsupported` error.
    #[must_use]
    pub fn unsupported(
        operation: impl Into<String>,
        transport: impl Into<String>,
        hint: impl Into<String>,
    ) -> Self {
        Self::Unsupported {
            operation: operation.into(),
            transport: transport.into(),
            hint: hint.into(),
        }
    }

    /// Creates a `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates an `UnknownInstance` error.
    #[must_use]
    pub fn unknown_instance(name: impl Into<String>, known: Vec<String>) -> Self {
        Self::UnknownInstance {
            name: name.into(),
            known,
        }
    }

    /// Creates a `RollbackBoundary` error.
    #[must_use]
    pub fn rollback_boundary(version: u64) -> Self {
        Self::RollbackBoundary { version }
    }

    /// Creates a `Parse` error.
    #[must_use]
    pub fn parse(what: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            what: what.into(),
            message: message.into(),
        }
    }

    /// Creates an `InvalidArgument` error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an `Other` error from any displayable failure.
    #[must_use]
    pub fn other(message: impl std::fmt::Display) -> Self {
        Self::Other {
            message: message.to_string(),
        }
    }

    /// Returns `true` if the operation does not exist on this transport.
    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }

    /// Returns `true` if this error points at instance configuration.
    #[must_use]
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. } | Self::UnknownInstance { .. }
        )
    }

    /// Returns the process exit code or HTTP status, when there is one.
    #[must_use]
    pub fn status_code(&self) -> Option<i32> {
        match self {
            Self::Execution { exit_code, .. } => *exit_code,
            Self::Http { status, .. } => Some(i32::from(*status)),
            _ => None,
        }
    }
}

impl From<CommandError> for TransportError {
    fn from(err: CommandError) -> Self {
        match &err {
            CommandError::NonZeroExit { exit_code, .. } => {
                Self::execution(err.to_string(), Some(*exit_code))
            }
            CommandError::Spawn { .. } => Self::execution(err.to_string(), None),
            CommandError::Validation { .. } => Self::invalid_argument(err.to_string()),
        }
    }
}

impl From<String> for TransportError {
    fn from(message: String) -> Self {
        Self::Other { message }
    }
}

impl From<&str> for TransportError {
    fn from(message: &str) -> Self {
        Self::other(message)
    }
}
