//! # Browsergrid Auth
//!
//! The security boundary of the control plane.
//!
//! - [`CredentialService`] issues and verifies short-lived, single-session
//!   signed tokens that authorize direct CDP access to a running browser
//!   task, and is the sole assembly point for connect URLs.
//! - [`ApiKeyValidator`] resolves an opaque API key to its authorized
//!   project set.
//!
//! Malformed or expired credentials always fail closed; there are no
//! partial grants.

mod apikey;
mod error;
mod secrets;
mod token;

pub use apikey::{ApiKeyMetadata, ApiKeyRecord, ApiKeyStore, ApiKeyValidator, MemoryApiKeyStore};
pub use error::AuthError;
pub use secrets::{SecretMaterial, SecretProvider, SecretStore, StaticSecretStore};
pub use token::{ConnectClaims, CredentialService, TOKEN_TTL};
