//! Error types for somnia-pe
//!
//! Defines module-specific error types using thiserror for clear error
//! propagation. Failures that originate in suspended operations (narration
//! fetch, device playback, transition timers) are caught at the resumption
//! point and converted into controller state transitions; they never escape
//! as unhandled task errors.

use thiserror::Error;

/// Main error type for somnia-pe
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// Narration synthesis collaborator error or network failure.
    /// Never retried inside the engine; retry policy belongs to the
    /// collaborator boundary.
    #[error("Narration fetch failed: {0}")]
    NarrationFetch(String),

    /// The underlying playback device refused playback (no source set,
    /// decode error, output unavailable)
    #[error("Playback device rejected: {0}")]
    PlaybackDevice(String),

    /// A page transition was requested while one is already in flight.
    /// Results from rapid double-input; callers treat it as a no-op.
    #[error("Page transition already in flight")]
    TransitionBusy,

    /// Requested page index outside the mounted book
    #[error("Page {index} out of range (book has {page_count} pages)")]
    PageOutOfRange { index: usize, page_count: usize },

    /// No reading session is mounted
    #[error("No session mounted")]
    NoSession,

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Invalid request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<somnia_common::Error> for Error {
    fn from(err: somnia_common::Error) -> Self {
        match err {
            somnia_common::Error::Io(e) => Error::Io(e),
            somnia_common::Error::Config(msg) => Error::Config(msg),
            somnia_common::Error::InvalidInput(msg) => Error::BadRequest(msg),
            somnia_common::Error::Internal(msg) => Error::Internal(msg),
        }
    }
}

/// Convenience Result type using somnia-pe Error
pub type Result<T> = std::result::Result<T, Error>;
