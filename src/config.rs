//! Configuration structures and loading logic

use crate::manifest::ManifestLocation;
use crate::models::RegistryPolicy;
use crate::store::validate_key;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServeConfig {
    pub api_port: u16,
    /// Root directory of the filesystem artifact store
    pub store_root: PathBuf,
    pub bucket: String,
    /// Key of the manifest document inside `bucket`
    pub manifest_key: String,
    /// Model served by `/invoke` when the request names none
    pub default_model: String,
    pub refresh_interval_secs: u64,
    pub load_timeout_secs: u64,
    pub fetch_timeout_secs: u64,
    pub load_retry_backoff_secs: u64,
    /// Defaults to the refresh interval
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eviction_grace_secs: Option<u64>,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            store_root: default_store_root(),
            bucket: default_bucket(),
            manifest_key: default_manifest_key(),
            default_model: default_model(),
            refresh_interval_secs: default_refresh_interval(),
            load_timeout_secs: default_load_timeout(),
            fetch_timeout_secs: default_fetch_timeout(),
            load_retry_backoff_secs: default_load_retry_backoff(),
            eviction_grace_secs: None,
        }
    }
}

impl ServeConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content).context("Failed to parse TOML config")?
        } else {
            Self::default()
        };

        // Environment variable overrides
        if let Ok(port) = std::env::var("MODEL_SWAP_API_PORT") {
            config.api_port = port.parse().context("Invalid MODEL_SWAP_API_PORT value")?;
        }
        if let Ok(root) = std::env::var("MODEL_SWAP_STORE_ROOT") {
            config.store_root = PathBuf::from(root);
        }
        if let Ok(bucket) = std::env::var("MODEL_SWAP_BUCKET") {
            config.bucket = bucket;
        }
        if let Ok(key) = std::env::var("MODEL_SWAP_MANIFEST_KEY") {
            config.manifest_key = key;
        }
        if let Ok(interval) = std::env::var("MODEL_SWAP_REFRESH_INTERVAL") {
            config.refresh_interval_secs = interval
                .parse()
                .context("Invalid MODEL_SWAP_REFRESH_INTERVAL value")?;
        }
        if let Ok(timeout) = std::env::var("MODEL_SWAP_LOAD_TIMEOUT") {
            config.load_timeout_secs = timeout
                .parse()
                .context("Invalid MODEL_SWAP_LOAD_TIMEOUT value")?;
        }

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.api_port < 1024 {
            anyhow::bail!("API port must be >= 1024 (got {})", self.api_port);
        }

        if self.refresh_interval_secs == 0 {
            anyhow::bail!("refresh_interval_secs must be greater than 0");
        }
        if self.load_timeout_secs == 0 {
            anyhow::bail!("load_timeout_secs must be greater than 0");
        }
        if self.fetch_timeout_secs == 0 {
            anyhow::bail!("fetch_timeout_secs must be greater than 0");
        }

        validate_key(&self.bucket)
            .with_context(|| format!("Invalid bucket name '{}'", self.bucket))?;
        if self.bucket.contains('/') {
            anyhow::bail!("Bucket name '{}' cannot contain '/'", self.bucket);
        }
        validate_key(&self.manifest_key)
            .with_context(|| format!("Invalid manifest key '{}'", self.manifest_key))?;

        if self.default_model.is_empty() {
            anyhow::bail!("default_model cannot be empty");
        }

        Ok(())
    }

    pub fn manifest_location(&self) -> ManifestLocation {
        ManifestLocation::new(&self.bucket, &self.manifest_key)
    }

    /// Registry timing policy derived from this configuration
    pub fn registry_policy(&self) -> RegistryPolicy {
        let refresh_interval = Duration::from_secs(self.refresh_interval_secs);
        RegistryPolicy {
            refresh_interval,
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
            load_timeout: Duration::from_secs(self.load_timeout_secs),
            load_retry_backoff: Duration::from_secs(self.load_retry_backoff_secs),
            eviction_grace: self
                .eviction_grace_secs
                .map(Duration::from_secs)
                .unwrap_or(refresh_interval),
        }
    }
}

// Default functions
fn default_api_port() -> u16 {
    8080
}
fn default_store_root() -> PathBuf {
    PathBuf::from("./artifacts")
}
fn default_bucket() -> String {
    "models".to_string()
}
fn default_manifest_key() -> String {
    "manifests/model_list.json".to_string()
}
fn default_model() -> String {
    "iris_model".to_string()
}
fn default_refresh_interval() -> u64 {
    60
}
fn default_load_timeout() -> u64 {
    30
}
fn default_fetch_timeout() -> u64 {
    10
}
fn default_load_retry_backoff() -> u64 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config() {
        let config = ServeConfig::default();
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.refresh_interval_secs, 60);
        assert_eq!(config.default_model, "iris_model");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_port_validation() {
        let config = ServeConfig {
            api_port: 500,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_intervals_rejected() {
        let config = ServeConfig {
            refresh_interval_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ServeConfig {
            load_timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_key_validation() {
        let config = ServeConfig {
            manifest_key: "../outside.json".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ServeConfig {
            bucket: "a/b".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_registry_policy_grace_defaults_to_interval() {
        let config = ServeConfig {
            refresh_interval_secs: 30,
            ..Default::default()
        };
        assert_eq!(config.registry_policy().eviction_grace, Duration::from_secs(30));

        let config = ServeConfig {
            eviction_grace_secs: Some(300),
            ..Default::default()
        };
        assert_eq!(config.registry_policy().eviction_grace, Duration::from_secs(300));
    }

    #[test]
    fn test_partial_toml() {
        let config: ServeConfig = toml::from_str(
            r#"
            refresh_interval_secs = 5
            bucket = "pycon"
            "#,
        )
        .unwrap();
        assert_eq!(config.refresh_interval_secs, 5);
        assert_eq!(config.bucket, "pycon");
        assert_eq!(config.load_timeout_secs, 30);
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        unsafe {
            std::env::set_var("MODEL_SWAP_REFRESH_INTERVAL", "15");
            std::env::set_var("MODEL_SWAP_BUCKET", "staging");
        }
        let config = ServeConfig::load(None).unwrap();
        unsafe {
            std::env::remove_var("MODEL_SWAP_REFRESH_INTERVAL");
            std::env::remove_var("MODEL_SWAP_BUCKET");
        }

        assert_eq!(config.refresh_interval_secs, 15);
        assert_eq!(config.bucket, "staging");
    }

    #[test]
    #[serial]
    fn test_invalid_env_override() {
        unsafe {
            std::env::set_var("MODEL_SWAP_LOAD_TIMEOUT", "soon");
        }
        let result = ServeConfig::load(None);
        unsafe {
            std::env::remove_var("MODEL_SWAP_LOAD_TIMEOUT");
        }

        assert!(result.is_err());
    }
}
