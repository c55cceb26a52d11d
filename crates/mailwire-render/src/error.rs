//! Error types for rendering.

use std::io;

use thiserror::Error;

/// Errors that can occur while rendering a message.
#[derive(Debug, Error)]
pub enum Error {
    /// The caller broke a usage contract (advancing past the readable
    /// bytes, starting a render twice, ...).
    #[error("Invalid usage: {0}")]
    InvalidUsage(String),

    /// A streaming byte source failed to open or read.
    #[error("Byte source error: {0}")]
    Source(#[source] io::Error),

    /// I/O error while writing rendered bytes.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Rendering was aborted before completion.
    #[error("Rendering aborted")]
    Aborted,
}

impl Error {
    /// Creates an invalid usage error.
    #[must_use]
    pub fn invalid_usage(message: impl Into<String>) -> Self {
        Self::InvalidUsage(message.into())
    }

    /// Returns true if this error came from a byte source.
    #[must_use]
    pub const fn is_source(&self) -> bool {
        matches!(self, Self::Source(_))
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
