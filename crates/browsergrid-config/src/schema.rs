//! Configuration schema.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub bus: BusConfig,
    pub scheduler: SchedulerConfig,
    pub auth: AuthConfig,
    pub session: SessionConfig,
}

/// Session store backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackendKind {
    Memory,
    File,
}

/// Session store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackendKind,
    /// Table/collection name; the directory path for the file backend.
    pub table: String,
    /// Storage TTL for session records, seconds. 0 disables expiry.
    pub record_ttl_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackendKind::Memory,
            table: "browsergrid-sessions".to_string(),
            record_ttl_secs: 86_400,
        }
    }
}

/// Coordination bus settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// External bus endpoint; empty selects the in-process bus.
    pub endpoint: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
        }
    }
}

/// Task scheduler backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerBackendKind {
    Local,
    Http,
}

/// Task scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub backend: SchedulerBackendKind,
    /// Scheduler API base URL (http backend).
    pub base_url: String,
    pub cluster: String,
    pub task_template: String,
    /// Browser launch command (local backend).
    pub local_command: String,
    pub local_args: Vec<String>,
    pub local_port_start: u16,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            backend: SchedulerBackendKind::Local,
            base_url: String::new(),
            cluster: "browsers".to_string(),
            task_template: "browser-task".to_string(),
            local_command: "chromium".to_string(),
            local_args: vec!["--headless".to_string()],
            local_port_start: 9300,
        }
    }
}

/// Credential settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Secret-store id of the signing secret.
    pub secret_id: String,
    /// Explicit signing-key override for local development. Takes
    /// priority over the secret store when non-empty.
    pub secret_override: String,
    /// Pepper for API-key hashing.
    pub api_key_hash_key: String,
    /// Port clients use for CDP access when the task address has none.
    pub cdp_port: u16,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret_id: "browsergrid/signing-secret".to_string(),
            secret_override: String::new(),
            api_key_hash_key: String::new(),
            cdp_port: 9222,
        }
    }
}

/// Session orchestration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Default budget for wait-until-ready, seconds.
    pub ready_timeout_secs: u64,
    /// Budget for endpoint resolution after task start, seconds.
    pub resolve_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ready_timeout_secs: 60,
            resolve_timeout_secs: 120,
        }
    }
}

impl Config {
    /// Reject configurations that cannot be wired into a working control
    /// plane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.backend == StoreBackendKind::File && self.store.table.is_empty() {
            return Err(ConfigError::Invalid(
                "store.table must be set for the file backend".to_string(),
            ));
        }
        if self.scheduler.backend == SchedulerBackendKind::Http {
            if self.scheduler.base_url.is_empty() {
                return Err(ConfigError::Invalid(
                    "scheduler.base_url must be set for the http backend".to_string(),
                ));
            }
            if self.scheduler.task_template.is_empty() {
                return Err(ConfigError::Invalid(
                    "scheduler.task_template must be set".to_string(),
                ));
            }
        }
        if self.auth.secret_id.is_empty() && self.auth.secret_override.is_empty() {
            return Err(ConfigError::Invalid(
                "auth.secret_id or auth.secret_override must be set".to_string(),
            ));
        }
        if self.session.ready_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "session.ready_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_http_backend_requires_base_url() {
        let mut config = Config::default();
        config.scheduler.backend = SchedulerBackendKind::Http;
        assert!(config.validate().is_err());

        config.scheduler.base_url = "http://scheduler:8443".to_string();
        config.validate().unwrap();
    }

    #[test]
    fn test_secret_source_required() {
        let mut config = Config::default();
        config.auth.secret_id = String::new();
        assert!(config.validate().is_err());

        config.auth.secret_override = "dev-key".to_string();
        config.validate().unwrap();
    }
}
