//! Authentication errors.

use thiserror::Error;

use browsergrid_core::Error;

/// Credential and API-key validation errors.
///
/// Each rejection carries an explicit reason so callers can distinguish an
/// expired token from a forged one, but all of them map to `Unauthorized`
/// at the control-plane boundary.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Malformed token: {0}")]
    Malformed(String),

    #[error("Bad signature")]
    BadSignature,

    #[error("Token expired")]
    Expired,

    #[error("Token not yet valid")]
    NotYetValid,

    #[error("Missing claim: {0}")]
    MissingClaim(&'static str),

    #[error("Invalid API key: {0}")]
    InvalidApiKey(String),

    #[error("API key has no project assignment")]
    MissingProjectAssignment,

    #[error("Secret store error: {0}")]
    SecretStore(String),

    #[error("Unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

impl From<AuthError> for Error {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::SecretStore(msg) => Error::Upstream(msg),
            other => Error::Unauthorized(other.to_string()),
        }
    }
}
