//! Error types for platform detection.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Neither Linux distribution facts nor Darwin/BSD facts could be resolved.
    #[error("cannot determine platform of {host}")]
    Undetectable { host: String },

    /// A detection command answered with something we can't parse.
    #[error("unexpected {what} output from {host}: {output:?}")]
    Malformed {
        host: String,
        what: &'static str,
        output: String,
    },

    /// Extended facts could not be loaded (yet).
    #[error("extended facts unavailable on {host}: {message}")]
    Extended { host: String, message: String },

    #[error(transparent)]
    Remote(#[from] remote::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
