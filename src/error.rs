//! Error types.
//!
//! [`Error`] is what every handler and middleware layer returns when a request
//! fails. Layers below [`Errors`](crate::middleware::Errors) pass it up the
//! chain untouched; only that layer turns it into a response.
//!
//! [`ServeError`] surfaces infrastructure failures: binding to a port or
//! accepting a connection.

use std::fmt;

use http::StatusCode;
use serde::Serialize;

use crate::middleware::PanicError;

/// A type-erased error carried by [`Error::Untrusted`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Tagged request-chain error. Exactly one variant applies.
///
/// Classification is total: anything that is not deliberately constructed as
/// `Trusted`, `Validation` or `Shutdown` is `Untrusted`, and its text never
/// reaches the client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A message meant for the caller, with the status to answer with.
    #[error("{message}")]
    Trusted { message: String, status: StatusCode },

    /// Anything else: library failures, recovered panics, cancellation.
    #[error("{0}")]
    Untrusted(#[from] BoxError),

    /// Caller input failed business validation. Always safe to disclose.
    #[error("data validation error: {0}")]
    Validation(FieldErrors),

    /// The process is no longer fit to serve and must drain and exit.
    #[error("shutdown requested: {reason}")]
    Shutdown { reason: String },
}

impl Error {
    pub fn trusted(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Trusted { message: message.into(), status }
    }

    pub fn untrusted(err: impl Into<BoxError>) -> Self {
        Self::Untrusted(err.into())
    }

    pub fn validation(fields: FieldErrors) -> Self {
        Self::Validation(fields)
    }

    pub fn shutdown(reason: impl Into<String>) -> Self {
        Self::Shutdown { reason: reason.into() }
    }

    /// `true` for errors that must bring the service down.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::Shutdown { .. })
    }

    /// `true` when this error is a panic recovered by the
    /// [`Panics`](crate::middleware::Panics) layer.
    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Untrusted(inner) if inner.is::<PanicError>())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::untrusted(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::untrusted(e)
    }
}

// ── Field errors ──────────────────────────────────────────────────────────────

/// One field that failed validation.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub error: String,
}

/// The list of field failures carried by [`Error::Validation`].
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(Vec<FieldError>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a failure. Returns `self` for chaining.
    pub fn with(mut self, field: impl Into<String>, error: impl Into<String>) -> Self {
        self.push(field, error);
        self
    }

    pub fn push(&mut self, field: impl Into<String>, error: impl Into<String>) {
        self.0.push(FieldError { field: field.into(), error: error.into() });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    /// `Ok(())` when nothing failed, otherwise the matching [`Error`].
    pub fn into_result(self) -> Result<(), Error> {
        if self.is_empty() { Ok(()) } else { Err(Error::Validation(self)) }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, fe) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", fe.field, fe.error)?;
        }
        Ok(())
    }
}

// ── Wire envelope ─────────────────────────────────────────────────────────────

/// JSON body sent for every failed request: `{"error": "...", "field": "..."}`.
///
/// `field` is only present for validation failures and carries the
/// JSON-encoded field list.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into(), field: None }
    }
}

// ── Infrastructure errors ─────────────────────────────────────────────────────

/// Error returned by [`Server::serve`](crate::Server::serve).
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
