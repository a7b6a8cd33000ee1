//! Server error types.

use std::io;

/// Failures starting or running the HTTP listener.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listen address could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested `host:port`.
        addr: String,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// Any other listener I/O failure.
    #[error("server I/O error: {0}")]
    Io(#[from] io::Error),
}
