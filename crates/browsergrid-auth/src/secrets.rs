//! Signing-secret resolution and caching.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use crate::error::AuthError;

/// How long a fetched secret is served from memory before refetching.
/// Bounds the blast radius of a secret rotation without paying a
/// secret-store round-trip per token operation.
const SECRET_CACHE_TTL: Duration = Duration::from_secs(300);

/// Secret material as stored in the secret store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretMaterial {
    /// Signing algorithm name; only "HS256" is accepted.
    pub algorithm: String,
    /// Raw signing key.
    pub signing_key: String,
}

/// External secret store.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch the secret blob identified by `secret_id`.
    async fn get_secret(&self, secret_id: &str) -> Result<SecretMaterial, AuthError>;
}

/// Fixed secret, for local development. Takes priority over any secret
/// store when configured as an operator override.
pub struct StaticSecretStore {
    material: SecretMaterial,
}

impl StaticSecretStore {
    pub fn new(signing_key: impl Into<String>) -> Self {
        Self {
            material: SecretMaterial {
                algorithm: "HS256".to_string(),
                signing_key: signing_key.into(),
            },
        }
    }
}

#[async_trait]
impl SecretStore for StaticSecretStore {
    async fn get_secret(&self, _secret_id: &str) -> Result<SecretMaterial, AuthError> {
        Ok(self.material.clone())
    }
}

struct CachedSecret {
    material: SecretMaterial,
    fetched_at: Instant,
}

/// Resolves the signing secret, caching it with a fixed TTL.
///
/// Concurrent readers share the cache under a read-preferring lock; a miss
/// or expiry triggers exactly one refetch (re-checked under the write
/// lock).
pub struct SecretProvider {
    store: Box<dyn SecretStore>,
    secret_id: String,
    cache: RwLock<Option<CachedSecret>>,
}

impl SecretProvider {
    pub fn new(store: Box<dyn SecretStore>, secret_id: impl Into<String>) -> Self {
        Self {
            store,
            secret_id: secret_id.into(),
            cache: RwLock::new(None),
        }
    }

    /// Current signing key, fetched through the cache.
    pub async fn signing_key(&self) -> Result<Vec<u8>, AuthError> {
        let now = Instant::now();

        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if now.duration_since(cached.fetched_at) < SECRET_CACHE_TTL {
                    return Ok(cached.material.signing_key.clone().into_bytes());
                }
            }
        }

        let mut cache = self.cache.write().await;
        // Another writer may have refreshed while we waited for the lock.
        if let Some(cached) = cache.as_ref() {
            if now.duration_since(cached.fetched_at) < SECRET_CACHE_TTL {
                return Ok(cached.material.signing_key.clone().into_bytes());
            }
        }

        debug!(secret_id = %self.secret_id, "refreshing signing secret");
        let material = self.store.get_secret(&self.secret_id).await?;
        if material.algorithm != "HS256" {
            return Err(AuthError::UnsupportedAlgorithm(material.algorithm));
        }

        let key = material.signing_key.clone().into_bytes();
        *cache = Some(CachedSecret {
            material,
            fetched_at: Instant::now(),
        });
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingStore {
        fetches: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SecretStore for CountingStore {
        async fn get_secret(&self, _secret_id: &str) -> Result<SecretMaterial, AuthError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(SecretMaterial {
                algorithm: "HS256".to_string(),
                signing_key: "k".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_secret_fetched_once_within_ttl() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let provider = SecretProvider::new(
            Box::new(CountingStore {
                fetches: fetches.clone(),
            }),
            "signing-secret",
        );

        for _ in 0..5 {
            provider.signing_key().await.unwrap();
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unsupported_algorithm_rejected() {
        struct BadAlgoStore;

        #[async_trait]
        impl SecretStore for BadAlgoStore {
            async fn get_secret(&self, _secret_id: &str) -> Result<SecretMaterial, AuthError> {
                Ok(SecretMaterial {
                    algorithm: "none".to_string(),
                    signing_key: "k".to_string(),
                })
            }
        }

        let provider = SecretProvider::new(Box::new(BadAlgoStore), "signing-secret");
        let err = provider.signing_key().await.unwrap_err();
        assert!(matches!(err, AuthError::UnsupportedAlgorithm(_)));
    }

    #[tokio::test]
    async fn test_static_store_ignores_secret_id() {
        let store = StaticSecretStore::new("dev-key");
        let material = store.get_secret("whatever").await.unwrap();
        assert_eq!(material.signing_key, "dev-key");
    }
}
