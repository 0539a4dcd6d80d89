//! Error types for service convergence.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while converging a service definition.
#[derive(Debug, Error)]
pub enum Error {
    /// No template exists for this program. An authoring error: re-running
    /// will not help until a template is added.
    #[error("no {kind} template for {program}; tried: {}", .tried.join(", "))]
    TemplateNotFound {
        /// Program the template was for
        program: String,
        /// Template kind (`supervisor`, `upstart`, `launcher`)
        kind: String,
        /// Every candidate, most specific first
        tried: Vec<String>,
    },

    /// A template references a key the render context doesn't have.
    #[error("template {template} uses unknown placeholder {{{{ {key} }}}}")]
    UnknownPlaceholder {
        /// Where the template came from
        template: String,
        /// The missing key
        key: String,
    },

    /// A role, project, variant or environment can't be part of a program name.
    #[error("invalid {component} {value:?} for a program name: {reason}")]
    InvalidName {
        /// Which component
        component: &'static str,
        /// Offending value
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// The naming policy itself is unusable.
    #[error("invalid naming policy: {0}")]
    InvalidPolicy(String),

    /// Neither supervisord nor upstart is present on the target.
    #[error("[{host}] no supported service supervisor found (supervisord, upstart)")]
    NoSupervisor {
        /// Target host
        host: String,
    },

    /// A supervisor verb failed.
    #[error("[{host}] {action} {program} failed: {output}")]
    Supervisor {
        /// Target host
        host: String,
        /// Verb that failed
        action: &'static str,
        /// Program it was applied to
        program: String,
        /// What the supervisor said
        output: String,
    },

    /// A local template could not be read.
    #[error("failed to read template {}: {source}", .path.display())]
    Template {
        /// Template path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Transport failure
    #[error(transparent)]
    Remote(#[from] remote::Error),
}

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, Error>;
