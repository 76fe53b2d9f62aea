//! Centralized error handling for proof-pack generation and verification.
//!
//! Every fallible operation in the crate returns [`Result<T>`], whose error
//! type is [`PackError`]. Variants follow the export taxonomy: request
//! problems (`Validation`, `InvalidFormat`, `Unauthorized`, `Forbidden`),
//! upstream data problems (`Query`), and internal pipeline failures
//! (`Canonical`, `Sanitization`, `Pdf`, `Archive`). The HTTP layer maps
//! each variant to a status code and retry contract in
//! [`crate::http::error_response`].
//!
//! ## Context
//!
//! The [`ResultExt`] trait adds `.context()` to any `Result` whose error
//! converts into [`PackError`]:
//!
//! ```no_run
//! use proofpack::error::ResultExt as _;
//! use std::fs;
//!
//! fn load_dataset() -> proofpack::error::Result<String> {
//!     let raw = fs::read_to_string("dataset.json").context("Failed to load dataset")?;
//!     Ok(raw)
//! }
//! ```
//!
//! Context is only attached to I/O-class errors; request and integrity errors
//! keep their variant so the HTTP mapping stays stable.

use std::fmt;

/// Main error type for proof-pack operations.
#[derive(Debug)]
pub enum PackError {
    /// Bad filter or time-range input
    Validation(String),

    /// Malformed identifier or file name
    InvalidFormat(String),

    /// Missing or incomplete caller identity
    Unauthorized(String),

    /// Caller is identified but not allowed to perform the action
    Forbidden(String),

    /// Referenced organization, pack, or run does not exist
    NotFound(String),

    /// Route exists but not for the request method
    MethodNotAllowed(String),

    /// Upstream data fetch failed or returned rows of the wrong shape
    Query(String),

    /// Value could not be canonicalized for hashing
    Canonical(String),

    /// Text still contained forbidden characters after sanitization
    Sanitization(String),

    /// PDF rendering failed
    Pdf(String),

    /// ZIP archive could not be written or read
    Archive(String),

    /// Write attempted against a run that is already final
    RunFinalized(String),

    /// Run status transition not allowed from the current state
    InvalidState(String),

    /// Pack generation exceeded its deadline
    Timeout(String),

    /// I/O errors (ledger files, dataset files)
    Io(std::io::Error),

    /// Configuration errors
    Config(String),

    /// Generic error with context
    Other(String),
}

impl fmt::Display for PackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "Validation error: {msg}"),
            Self::InvalidFormat(msg) => write!(f, "Invalid format: {msg}"),
            Self::Unauthorized(msg) => write!(f, "Unauthorized: {msg}"),
            Self::Forbidden(msg) => write!(f, "Forbidden: {msg}"),
            Self::NotFound(msg) => write!(f, "Not found: {msg}"),
            Self::MethodNotAllowed(msg) => write!(f, "Method not allowed: {msg}"),
            Self::Query(msg) => write!(f, "Query error: {msg}"),
            Self::Canonical(msg) => write!(f, "Canonicalization error: {msg}"),
            Self::Sanitization(msg) => write!(f, "Sanitization error: {msg}"),
            Self::Pdf(msg) => write!(f, "PDF error: {msg}"),
            Self::Archive(msg) => write!(f, "Archive error: {msg}"),
            Self::RunFinalized(msg) => write!(f, "Run is final: {msg}"),
            Self::InvalidState(msg) => write!(f, "Invalid state: {msg}"),
            Self::Timeout(msg) => write!(f, "Timed out: {msg}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Config(msg) => write!(f, "Configuration error: {msg}"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for PackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PackError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<anyhow::Error> for PackError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<serde_json::Error> for PackError {
    fn from(err: serde_json::Error) -> Self {
        Self::Other(format!("JSON error: {err}"))
    }
}

impl From<csv::Error> for PackError {
    fn from(err: csv::Error) -> Self {
        Self::Other(format!("CSV error: {err}"))
    }
}

impl From<zip::result::ZipError> for PackError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::Archive(err.to_string())
    }
}

impl From<lopdf::Error> for PackError {
    fn from(err: lopdf::Error) -> Self {
        Self::Pdf(err.to_string())
    }
}

impl From<tokio::task::JoinError> for PackError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Other(format!("Worker task failed: {err}"))
    }
}

/// Result type alias for proof-pack operations.
pub type Result<T> = std::result::Result<T, PackError>;

/// Extension trait to add context to results.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, msg: impl Into<String>) -> Result<T>;

    /// Add context using a closure (lazy evaluation).
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<PackError>,
{
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| wrap(e.into(), msg.into()))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| wrap(e.into(), f()))
    }
}

fn wrap(err: PackError, msg: String) -> PackError {
    match err {
        // Keep the kind so transient I/O still classifies as retryable.
        PackError::Io(inner) => {
            PackError::Io(std::io::Error::new(inner.kind(), format!("{msg}: {inner}")))
        }
        PackError::Other(inner) => PackError::Other(format!("{msg}: {inner}")),
        PackError::Archive(inner) => PackError::Archive(format!("{msg}: {inner}")),
        PackError::Pdf(inner) => PackError::Pdf(format!("{msg}: {inner}")),
        PackError::Query(inner) => PackError::Query(format!("{msg}: {inner}")),
        other => other,
    }
}
