//! Connect-token signing and verification.
//!
//! Tokens are stateless and self-describing: a base64url-encoded JSON
//! claims payload plus a hex-encoded HMAC-SHA256 signature, verified
//! purely by signature and embedded claims. They are never persisted.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use url::Url;

use crate::error::AuthError;
use crate::secrets::SecretProvider;

type HmacSha256 = Hmac<Sha256>;

/// Default token lifetime.
pub const TOKEN_TTL: std::time::Duration = std::time::Duration::from_secs(600);

/// Allowance for clock skew on the not-before check.
const CLOCK_SKEW: std::time::Duration = std::time::Duration::from_secs(30);

/// Claims embedded in a connect token.
///
/// The nonce doubles as the token's unique identifier and replay-scoping
/// value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectClaims {
    pub session_id: String,
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
    #[serde(default)]
    pub issued_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub nonce: Option<String>,
}

impl ConnectClaims {
    /// Minimal claims for a session/project pair.
    pub fn new(session_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            project_id: project_id.into(),
            user_id: None,
            client_ip: None,
            issued_at: None,
            expires_at: None,
            nonce: None,
        }
    }

    fn fill_defaults(&mut self) {
        let now = Utc::now();
        self.issued_at.get_or_insert(now);
        self.expires_at
            .get_or_insert(now + ChronoDuration::from_std(TOKEN_TTL).unwrap_or_default());
        if self.nonce.is_none() {
            let mut bytes = [0u8; 16];
            rand::thread_rng().fill_bytes(&mut bytes);
            self.nonce = Some(hex::encode(bytes));
        }
    }
}

/// Issues and verifies connect tokens, and assembles connect URLs.
pub struct CredentialService {
    secrets: SecretProvider,
    cdp_port: u16,
}

impl CredentialService {
    pub fn new(secrets: SecretProvider, cdp_port: u16) -> Self {
        Self { secrets, cdp_port }
    }

    /// Sign the claims, applying defaults (expiry now + 10 minutes, random
    /// nonce, issued-at now) to any unset field.
    pub async fn sign(&self, mut claims: ConnectClaims) -> Result<String, AuthError> {
        if claims.session_id.is_empty() {
            return Err(AuthError::MissingClaim("session_id"));
        }
        if claims.project_id.is_empty() {
            return Err(AuthError::MissingClaim("project_id"));
        }
        claims.fill_defaults();

        let payload = serde_json::to_vec(&claims)
            .map_err(|e| AuthError::Malformed(e.to_string()))?;
        let encoded = URL_SAFE_NO_PAD.encode(payload);

        let key = self.secrets.signing_key().await?;
        let mut mac = HmacSha256::new_from_slice(&key)
            .map_err(|e| AuthError::SecretStore(e.to_string()))?;
        mac.update(encoded.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        Ok(format!("{encoded}.{signature}"))
    }

    /// Verify a token and return its claims.
    ///
    /// Checks, in order: structure, signature (constant-time), expiry,
    /// not-before, and presence of the session/project claims. Fails
    /// closed with a distinct reason for each.
    pub async fn verify(&self, token: &str) -> Result<ConnectClaims, AuthError> {
        let (encoded, signature_hex) = token
            .split_once('.')
            .ok_or_else(|| AuthError::Malformed("expected payload.signature".to_string()))?;

        let signature = hex::decode(signature_hex)
            .map_err(|_| AuthError::Malformed("signature is not hex".to_string()))?;

        let key = self.secrets.signing_key().await?;
        let mut mac = HmacSha256::new_from_slice(&key)
            .map_err(|e| AuthError::SecretStore(e.to_string()))?;
        mac.update(encoded.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| AuthError::BadSignature)?;

        let payload = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| AuthError::Malformed("payload is not base64url".to_string()))?;
        let claims: ConnectClaims = serde_json::from_slice(&payload)
            .map_err(|e| AuthError::Malformed(e.to_string()))?;

        let now = Utc::now();
        match claims.expires_at {
            Some(expires_at) if expires_at > now => {}
            Some(_) => return Err(AuthError::Expired),
            None => return Err(AuthError::MissingClaim("expires_at")),
        }
        if let Some(issued_at) = claims.issued_at {
            let skew = ChronoDuration::from_std(CLOCK_SKEW).unwrap_or_default();
            if issued_at > now + skew {
                return Err(AuthError::NotYetValid);
            }
        }
        if claims.session_id.is_empty() {
            return Err(AuthError::MissingClaim("session_id"));
        }
        if claims.project_id.is_empty() {
            return Err(AuthError::MissingClaim("project_id"));
        }

        Ok(claims)
    }

    /// Assemble the CDP access URL for a task address and signed token.
    ///
    /// The only place this URL is built; callers must not construct it
    /// manually. Addresses without a port get the configured CDP port.
    pub fn build_connect_url(&self, address: &str, token: &str) -> Result<Url, AuthError> {
        let authority = if address.starts_with('[') {
            // Bracketed IPv6, with or without a port.
            if address
                .rsplit_once(']')
                .is_some_and(|(_, rest)| rest.starts_with(':'))
            {
                address.to_string()
            } else {
                format!("{address}:{}", self.cdp_port)
            }
        } else if address.matches(':').count() > 1 {
            // Bare IPv6 needs brackets before a port can be attached.
            format!("[{address}]:{}", self.cdp_port)
        } else if address.contains(':') {
            address.to_string()
        } else {
            format!("{address}:{}", self.cdp_port)
        };

        let mut url = Url::parse(&format!("ws://{authority}/session"))
            .map_err(|e| AuthError::Malformed(format!("bad task address: {e}")))?;
        url.query_pairs_mut().append_pair("token", token);
        Ok(url)
    }
}
