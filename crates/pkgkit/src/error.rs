//! Error types for package operations.
//!
//! Backend failures are categorized from their stderr so batch reports can
//! tell the operator what went wrong and whether re-running will help.

use crate::backend::BackendKind;
use serde::Serialize;
use thiserror::Error;

/// Categories of package manager failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCategory {
    /// Mirror or network trouble (transient)
    Network,
    /// No such package in the configured repositories
    NotFound,
    /// Missing privileges
    Permission,
    /// Another package manager process holds the database lock
    Locked,
    /// Anything else
    Other,
}

impl ErrorCategory {
    /// Classify backend stderr.
    pub fn from_stderr(stderr: &str) -> Self {
        let s = stderr.to_lowercase();
        let any = |needles: &[&str]| needles.iter().any(|n| s.contains(n));

        if any(&[
            "could not get lock",
            "unable to lock",
            "database is locked",
            "unable to acquire",
            "another process",
        ]) {
            Self::Locked
        } else if any(&[
            "could not resolve",
            "temporary failure",
            "connection refused",
            "timed out",
            "failed to fetch",
            "failed retrieving",
            "curl",
        ]) {
            Self::Network
        } else if any(&[
            "unable to locate package",
            "target not found",
            "no available formula",
            "no packages available",
            "no such",
            "not found",
        ]) {
            Self::NotFound
        } else if any(&[
            "permission denied",
            "are you root",
            "a password is required",
            "operation not permitted",
        ]) {
            Self::Permission
        } else {
            Self::Other
        }
    }

    /// Whether re-running later has a fair chance of succeeding.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network | Self::Locked)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Network connectivity issue",
            Self::NotFound => "Package not found",
            Self::Permission => "Permission denied",
            Self::Locked => "Package database locked",
            Self::Other => "Unexpected error",
        }
    }

    /// Actionable advice for the operator.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Network => "Check the target's connectivity and mirrors, then re-run",
            Self::NotFound => "Verify the package name, or refresh the package lists first",
            Self::Permission => "Make sure the connecting user has passwordless sudo",
            Self::Locked => "Wait for the other package manager run to finish, then re-run",
            Self::Other => "Check the error details for more information",
        }
    }
}

/// Errors from package operations.
#[derive(Debug, Error)]
pub enum Error {
    /// No registered backend can drive this platform.
    #[error("[{host}] no package backend for {platform}")]
    NoBackend {
        /// Target host
        host: String,
        /// Platform description
        platform: String,
    },

    /// None of a language manager's executables is on the target's PATH.
    #[error("[{host}] {backend} is not installed (tried {tried})")]
    MissingTool {
        /// Target host
        host: String,
        /// Requested language manager
        backend: BackendKind,
        /// Executable names looked up, comma-separated
        tried: String,
    },

    /// The backend has no such operation.
    #[error("{backend} cannot {operation}")]
    Unsupported {
        backend: BackendKind,
        operation: &'static str,
    },

    /// A backend command failed.
    #[error("[{host}] {backend} failed for {package}: {}", .category.description())]
    Failed {
        /// Target host
        host: String,
        /// Backend that ran the command
        backend: BackendKind,
        /// Package name, or the operation for refreshes
        package: String,
        /// Classification of the failure
        category: ErrorCategory,
        /// Captured stderr
        stderr: String,
    },

    /// Target detection failed before a backend could be chosen
    #[error(transparent)]
    Platform(#[from] platform::Error),

    /// Transport failure (as opposed to a failing package command)
    #[error(transparent)]
    Remote(#[from] remote::Error),

    /// The search worker pool could not be built
    #[error("failed to create worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

impl Error {
    /// Wrap a remote error for one package. Non-zero exits become
    /// categorized [`Error::Failed`]; transport errors pass through.
    pub fn from_remote(err: remote::Error, backend: BackendKind, package: &str) -> Self {
        match err {
            remote::Error::CommandFailed { host, stderr, .. } => Self::Failed {
                host,
                backend,
                package: package.to_string(),
                category: ErrorCategory::from_stderr(&stderr),
                stderr,
            },
            other => Self::Remote(other),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Failed { category, .. } => *category,
            _ => ErrorCategory::Other,
        }
    }
}

/// Result type for package operations.
pub type Result<T> = std::result::Result<T, Error>;
