//! Configuration loader.

use std::fs;
use std::path::Path;

use crate::error::ConfigError;
use crate::schema::Config;

/// Configuration loader with environment variable substitution.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::load_str(&content)
    }

    /// Load configuration from a string.
    pub fn load_str(content: &str) -> Result<Config, ConfigError> {
        let expanded = Self::expand_env_vars(content)?;
        let config: Config = toml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Expand environment variables in the format `${VAR}`.
    fn expand_env_vars(content: &str) -> Result<String, ConfigError> {
        let mut result = content.to_string();
        let re = regex::Regex::new(r"\$\{([^}]+)\}").unwrap();

        for cap in re.captures_iter(content) {
            let var_name = &cap[1];
            let var_value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotSet(var_name.to_string()))?;
            result = result.replace(&cap[0], &var_value);
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchedulerBackendKind;

    #[test]
    fn test_load_empty_config() {
        let config = ConfigLoader::load_str("").unwrap();
        assert_eq!(config.auth.cdp_port, 9222);
        assert_eq!(config.scheduler.backend, SchedulerBackendKind::Local);
    }

    #[test]
    fn test_load_basic_config() {
        let content = r#"
            [scheduler]
            backend = "http"
            base_url = "http://scheduler:8443"
            cluster = "browsers-prod"

            [auth]
            cdp_port = 9333
        "#;
        let config = ConfigLoader::load_str(content).unwrap();
        assert_eq!(config.scheduler.backend, SchedulerBackendKind::Http);
        assert_eq!(config.scheduler.cluster, "browsers-prod");
        assert_eq!(config.auth.cdp_port, 9333);
    }

    #[test]
    fn test_env_expansion() {
        unsafe { std::env::set_var("BROWSERGRID_TEST_CLUSTER", "from-env") };
        let content = r#"
            [scheduler]
            cluster = "${BROWSERGRID_TEST_CLUSTER}"
        "#;
        let config = ConfigLoader::load_str(content).unwrap();
        assert_eq!(config.scheduler.cluster, "from-env");
    }

    #[test]
    fn test_unset_env_var_is_an_error() {
        let content = r#"
            [auth]
            secret_override = "${BROWSERGRID_TEST_UNSET_VAR}"
        "#;
        assert!(matches!(
            ConfigLoader::load_str(content),
            Err(ConfigError::EnvVarNotSet(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        use std::io::Write;
        writeln!(file, "[session]\nready_timeout_secs = 30").unwrap();
        let config = ConfigLoader::load(file.path()).unwrap();
        assert_eq!(config.session.ready_timeout_secs, 30);
    }
}
