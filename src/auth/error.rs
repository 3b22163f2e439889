use std::time::Duration;

use jsonwebtoken::errors::ErrorKind;

use super::keys::KeyLookupError;

/// Why a token could not be minted or accepted.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("resolving signing key {kid:?}: {source}")]
    KeyResolution {
        kid: String,
        #[source]
        source: KeyLookupError,
    },

    #[error("signing token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),

    #[error("malformed token: {0}")]
    MalformedToken(String),

    #[error("unknown key id {0:?}")]
    UnknownKey(Option<String>),

    #[error("token algorithm {found:?} does not match expected {expected}")]
    AlgorithmMismatch { expected: &'static str, found: String },

    #[error("token signature is invalid")]
    SignatureInvalid,

    #[error("token has expired")]
    Expired,

    #[error("token is not valid yet")]
    NotYetValid,

    #[error("token claims rejected: {0}")]
    InvalidClaims(String),

    #[error("key lookup timed out after {0:?}")]
    KeyLookupTimeout(Duration),

    #[error("key lookup failed: {0}")]
    KeyLookup(#[source] KeyLookupError),
}

impl AuthError {
    /// `true` when the failure is ours rather than the caller's: the key store
    /// misbehaved or signing broke. These must not be reported as `401`.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::KeyResolution { .. } | Self::Signing(_) | Self::KeyLookupTimeout(_) | Self::KeyLookup(_)
        )
    }

    pub(crate) fn from_validation(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::ImmatureSignature => Self::NotYetValid,
            ErrorKind::InvalidSignature => Self::SignatureInvalid,
            ErrorKind::InvalidIssuer
            | ErrorKind::InvalidAudience
            | ErrorKind::InvalidSubject
            | ErrorKind::MissingRequiredClaim(_) => Self::InvalidClaims(err.to_string()),
            _ => Self::MalformedToken(err.to_string()),
        }
    }
}
