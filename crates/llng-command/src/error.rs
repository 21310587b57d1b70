//! Error types for command composition and execution.
//!
//! Standard error output of a child process is never carried in these
//! errors. Callers only learn the program name and the exit code.

use thiserror::Error;

/// Result type alias for command operations.
pub type Result<T> = std::result::Result<T, CommandError>;

/// Errors that can occur while validating or running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// An argument, environment entry or program path was rejected.
    #[error("invalid {field}: {reason}")]
    Validation {
        /// Which part of the command was rejected.
        field: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The process could not be started.
    #[error("failed to spawn '{program}': {message}")]
    Spawn {
        /// The program that was executed.
        program: String,
        /// Description of the spawn failure.
        message: String,
    },

    /// The process ran and exited unsuccessfully.
    #[error("'{program}' exited with code {exit_code}")]
    NonZeroExit {
        /// The program that was executed.
        program: String,
        /// The exit code, or -1 when the process was killed by a signal.
        exit_code: i32,
    },
}

impl CommandError {
    /// Creates a `Validation` error.
    #[must_use]
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `Spawn` error.
    #[must_use]
    pub fn spawn(program: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Spawn {
            program: program.into(),
            message: message.into(),
        }
    }

    /// Creates a `NonZeroExit` error.
    #[must_use]
    pub fn non_zero_exit(program: impl Into<String>, exit_code: i32) -> Self {
        Self::NonZeroExit {
            program: program.into(),
            exit_code,
        }
    }

    /// Returns the exit code when the process ran to completion.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::NonZeroExit { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }

    /// Returns `true` if the command was rejected before anything ran.
    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}
