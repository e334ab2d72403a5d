//! API-key resolution and project authorization.

use std::collections::HashMap;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::AuthError;

type HmacSha256 = Hmac<Sha256>;

/// Expected prefix on every raw API key.
const KEY_PREFIX: &str = "bg_";

/// Persisted API-key record, looked up by keyed hash. The raw key is
/// never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    pub status: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub project_ids: Vec<String>,
}

/// Validated key metadata: the key's authorized project set, normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKeyMetadata {
    pub status: String,
    /// Primary project, always first in `project_ids`.
    pub project_id: String,
    /// Deduplicated (case-insensitively) authorized projects.
    pub project_ids: Vec<String>,
}

/// API-key record lookup.
#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    /// Fetch a record by its keyed key hash.
    async fn lookup(&self, key_hash: &str) -> Result<Option<ApiKeyRecord>, AuthError>;
}

/// In-memory key store for development and tests.
#[derive(Default)]
pub struct MemoryApiKeyStore {
    records: RwLock<HashMap<String, ApiKeyRecord>>,
}

impl MemoryApiKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, key_hash: String, record: ApiKeyRecord) {
        self.records.write().await.insert(key_hash, record);
    }
}

#[async_trait]
impl ApiKeyStore for MemoryApiKeyStore {
    async fn lookup(&self, key_hash: &str) -> Result<Option<ApiKeyRecord>, AuthError> {
        Ok(self.records.read().await.get(key_hash).cloned())
    }
}

/// Resolves raw API keys to authorized project sets.
pub struct ApiKeyValidator {
    store: Box<dyn ApiKeyStore>,
    /// Pepper for the keyed hash; the store only ever sees hashes.
    hash_key: Vec<u8>,
}

impl ApiKeyValidator {
    pub fn new(store: Box<dyn ApiKeyStore>, hash_key: impl Into<Vec<u8>>) -> Self {
        Self {
            store,
            hash_key: hash_key.into(),
        }
    }

    /// Keyed hash of a raw key, as used for store lookups.
    pub fn hash_key(&self, raw_key: &str) -> String {
        // new_from_slice only fails on zero-length output, which Sha256
        // never produces.
        let mut mac = HmacSha256::new_from_slice(&self.hash_key)
            .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"));
        mac.update(raw_key.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Validate a raw API key and return its normalized metadata.
    pub async fn validate(&self, raw_key: &str) -> Result<ApiKeyMetadata, AuthError> {
        if raw_key.is_empty() {
            return Err(AuthError::InvalidApiKey("empty key".to_string()));
        }
        if !raw_key.starts_with(KEY_PREFIX) {
            return Err(AuthError::InvalidApiKey(format!(
                "missing '{KEY_PREFIX}' prefix"
            )));
        }

        let hash = self.hash_key(raw_key);
        let record = self
            .store
            .lookup(&hash)
            .await?
            .ok_or_else(|| AuthError::InvalidApiKey("unknown key".to_string()))?;

        if record.status != "active" {
            debug!(status = %record.status, "rejected non-active API key");
            return Err(AuthError::InvalidApiKey(format!(
                "key status is '{}'",
                record.status
            )));
        }

        let project_ids = normalize_projects(record.project_id.as_deref(), &record.project_ids);
        let Some(primary) = project_ids.first().cloned() else {
            return Err(AuthError::MissingProjectAssignment);
        };

        Ok(ApiKeyMetadata {
            status: record.status,
            project_id: primary,
            project_ids,
        })
    }
}

/// Deduplicate case-insensitively, primary project always first.
fn normalize_projects(primary: Option<&str>, additional: &[String]) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    let mut result = Vec::new();

    let candidates = primary
        .into_iter()
        .map(str::to_string)
        .chain(additional.iter().cloned());

    for candidate in candidates {
        if candidate.is_empty() {
            continue;
        }
        let folded = candidate.to_lowercase();
        if !seen.contains(&folded) {
            seen.push(folded);
            result.push(candidate);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn validator_with(record: ApiKeyRecord) -> (ApiKeyValidator, String) {
        let store = MemoryApiKeyStore::new();
        let validator = ApiKeyValidator::new(Box::new(MemoryApiKeyStore::new()), "pepper");
        let raw = "bg_test_key".to_string();
        store.insert(validator.hash_key(&raw), record).await;
        // Rebuild the validator around the populated store.
        let validator = ApiKeyValidator::new(Box::new(store), "pepper");
        (validator, raw)
    }

    fn active_record(primary: Option<&str>, additional: &[&str]) -> ApiKeyRecord {
        ApiKeyRecord {
            status: "active".to_string(),
            project_id: primary.map(str::to_string),
            project_ids: additional.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_valid_key() {
        let (validator, raw) = validator_with(active_record(Some("p1"), &["p2"])).await;
        let meta = validator.validate(&raw).await.unwrap();
        assert_eq!(meta.project_id, "p1");
        assert_eq!(meta.project_ids, vec!["p1", "p2"]);
    }

    #[tokio::test]
    async fn test_empty_and_unprefixed_keys_rejected() {
        let (validator, _) = validator_with(active_record(Some("p1"), &[])).await;
        assert!(validator.validate("").await.is_err());
        assert!(validator.validate("sk_wrong_prefix").await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_key_rejected() {
        let (validator, _) = validator_with(active_record(Some("p1"), &[])).await;
        let err = validator.validate("bg_other_key").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidApiKey(_)));
    }

    #[tokio::test]
    async fn test_inactive_key_rejected() {
        let mut record = active_record(Some("p1"), &[]);
        record.status = "revoked".to_string();
        let (validator, raw) = validator_with(record).await;
        assert!(validator.validate(&raw).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_project_assignment() {
        let (validator, raw) = validator_with(active_record(None, &[])).await;
        let err = validator.validate(&raw).await.unwrap_err();
        assert!(matches!(err, AuthError::MissingProjectAssignment));
    }

    #[tokio::test]
    async fn test_case_insensitive_dedup_primary_first() {
        let (validator, raw) =
            validator_with(active_record(Some("P1"), &["p1", "p2", "P2", "p3"])).await;
        let meta = validator.validate(&raw).await.unwrap();
        assert_eq!(meta.project_ids, vec!["P1", "p2", "p3"]);
        assert_eq!(meta.project_id, "P1");
    }

    #[test]
    fn test_normalize_skips_empty_entries() {
        let projects = normalize_projects(None, &["".to_string(), "p1".to_string()]);
        assert_eq!(projects, vec!["p1"]);
    }
}
