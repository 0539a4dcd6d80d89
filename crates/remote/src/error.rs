//! Error types for remote execution.

use thiserror::Error;

/// Errors that can occur while running commands on a target.
#[derive(Debug, Error)]
pub enum Error {
    /// The command ran but exited non-zero, and failures were not suppressed.
    #[error("[{host}] command failed with status {status}: {command}\n{stderr}")]
    CommandFailed {
        /// Host the command ran on
        host: String,
        /// The command line as sent to the transport
        command: String,
        /// Exit status (-1 when killed by a signal)
        status: i32,
        /// Captured standard error
        stderr: String,
    },

    /// The transport itself could not be started (missing ssh binary, spawn failure).
    #[error("[{host}] could not spawn command: {message}")]
    Spawn {
        /// Host the command was meant for
        host: String,
        /// What went wrong
        message: String,
    },

    /// Reading or writing a file through the transport failed.
    #[error("[{host}] file operation on {path} failed: {message}")]
    File {
        /// Host the file lives on
        host: String,
        /// Remote path
        path: String,
        /// Details
        message: String,
    },

    /// IO error on the controller side
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error is a plain non-zero exit (as opposed to a transport problem).
    pub fn is_command_failure(&self) -> bool {
        matches!(self, Self::CommandFailed { .. })
    }

    /// Captured stderr, when the error came from a finished command.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::CommandFailed { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}

/// Result type for remote operations.
pub type Result<T> = std::result::Result<T, Error>;
