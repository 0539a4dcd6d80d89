//! Error types for role loading and dispatch.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A role is deployed without the role it depends on.
    #[error("role {role} has hosts but required role {requires} has none")]
    MissingCompanion {
        /// Role that has hosts
        role: String,
        /// Role it needs
        requires: String,
    },

    /// Reading role definitions failed.
    #[error("failed to read roles from {}: {source}", .path.display())]
    Io {
        /// File or directory being read
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// The worker pool could not be built
    #[error("failed to create worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Result type for fleet operations.
pub type Result<T> = std::result::Result<T, Error>;
