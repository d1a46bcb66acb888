//! Service configuration.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use reportgate_gateway::{millis_serde, GatewayConfig, RetryConfig};
use reportgate_store::{default_data_dir, ReportStoreConfig, DEFAULT_BUSY_TIMEOUT};
use reportgate_types::{
    DEFAULT_CACHE_TTL, DEFAULT_GATEWAY_TIMEOUT, DEFAULT_STORE_TIMEOUT, REPORT_RETENTION_DAYS,
};

use crate::error::{OpsError, OpsResult};

/// Expand environment variables in a string.
/// Supports `${VAR_NAME}` syntax; unset variables are left as written.
fn expand_env_vars(input: &str) -> String {
    let Ok(re) = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}") else {
        return input.to_string();
    };
    re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    })
    .to_string()
}

/// Configuration loaded from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportGateConfig {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Deadlines for external calls.
    pub timeouts: TimeoutConfig,
    /// Lookup cache configuration.
    pub cache: CacheConfig,
    /// Report entitlement configuration.
    pub reports: ReportsConfig,
    /// Verification retry policy.
    pub retry: RetryConfig,
    /// Payment provider selection and credentials.
    pub gateway: GatewayConfig,
}

impl ReportGateConfig {
    /// Load configuration from a file.
    /// Environment variables in `${VAR}` format are expanded in provider credentials.
    pub fn load(path: &Path) -> OpsResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| OpsError::config(format!("Failed to read {}: {}", path.display(), e)))?;
        let mut config: Self = toml::from_str(&contents)
            .map_err(|e| OpsError::config(format!("Failed to parse {}: {}", path.display(), e)))?;

        let paystack = &mut config.gateway.paystack;
        paystack.secret_key = expand_env_vars(&paystack.secret_key);

        let nomba = &mut config.gateway.nomba;
        nomba.account_id = expand_env_vars(&nomba.account_id);
        nomba.client_id = expand_env_vars(&nomba.client_id);
        nomba.client_secret = expand_env_vars(&nomba.client_secret);

        Ok(config)
    }

    /// Load configuration from the default location.
    pub fn load_default() -> OpsResult<Self> {
        Self::load(&default_config_path())
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> OpsResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| OpsError::config(format!("Failed to create {}: {}", parent.display(), e)))?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| OpsError::config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)
            .map_err(|e| OpsError::config(format!("Failed to write {}: {}", path.display(), e)))?;
        Ok(())
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> OpsResult<()> {
        if self.timeouts.gateway.is_zero() || self.timeouts.store.is_zero() {
            return Err(OpsError::config("timeouts must be greater than zero"));
        }
        if self.cache.ttl.is_zero() {
            return Err(OpsError::config("cache ttl must be greater than zero"));
        }
        self.gateway
            .validate()
            .map_err(|e| OpsError::config(e.to_string()))
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for all data.
    pub base_dir: PathBuf,
    /// Path to the SQLite database (default: base_dir/reportgate.db).
    pub database: Option<PathBuf>,
    /// How long SQLite waits on a locked database, in milliseconds.
    #[serde(with = "millis_serde")]
    pub busy_timeout: Duration,
}

impl StorageConfig {
    /// Store settings for [`reportgate_store::ReportStore::open`].
    pub fn store_config(&self) -> ReportStoreConfig {
        let config = ReportStoreConfig::new(&self.base_dir).with_busy_timeout(self.busy_timeout);
        match &self.database {
            Some(path) => config.with_database_path(path),
            None => config,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: default_data_dir(),
            database: None,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }
}

/// Deadlines, in milliseconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Per payment provider call.
    #[serde(with = "millis_serde")]
    pub gateway: Duration,
    /// Per store call.
    #[serde(with = "millis_serde")]
    pub store: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            gateway: DEFAULT_GATEWAY_TIMEOUT,
            store: DEFAULT_STORE_TIMEOUT,
        }
    }
}

/// Where cached lookups live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    /// Process memory; lost on restart.
    Memory,
    /// The store's SQLite database.
    #[default]
    Sqlite,
}

/// Lookup cache configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Backend for cached entries.
    pub backend: CacheBackendKind,
    /// Entry lifetime, in milliseconds.
    #[serde(with = "millis_serde")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::default(),
            ttl: DEFAULT_CACHE_TTL,
        }
    }
}

/// Report entitlement configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportsConfig {
    /// Days a granted report stays accessible.
    pub retention_days: u64,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            retention_days: REPORT_RETENTION_DAYS,
        }
    }
}

/// Get the default config file path.
pub fn default_config_path() -> PathBuf {
    default_data_dir().join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use reportgate_gateway::ProviderKind;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = ReportGateConfig::default();
        assert_eq!(config.timeouts.gateway, Duration::from_secs(10));
        assert_eq!(config.timeouts.store, Duration::from_secs(5));
        assert_eq!(config.cache.ttl, Duration::from_secs(6 * 3600));
        assert_eq!(config.reports.retention_days, 30);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.gateway.provider, ProviderKind::Paystack);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let config = ReportGateConfig::load(&temp.path().join("absent.toml")).unwrap();
        assert_eq!(config.reports.retention_days, 30);
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");

        let mut config = ReportGateConfig::default();
        config.storage.base_dir = temp.path().to_path_buf();
        config.cache.backend = CacheBackendKind::Memory;
        config.reports.retention_days = 7;
        config.save(&path).unwrap();

        let loaded = ReportGateConfig::load(&path).unwrap();
        assert_eq!(loaded.storage.base_dir, temp.path());
        assert_eq!(loaded.cache.backend, CacheBackendKind::Memory);
        assert_eq!(loaded.reports.retention_days, 7);
        assert_eq!(loaded.timeouts.gateway, Duration::from_secs(10));
    }

    #[test]
    fn test_partial_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[timeouts]
gateway = 2500

[gateway]
provider = "nomba"

[gateway.nomba]
account_id = "acc"
client_id = "cid"
client_secret = "${REPORTGATE_TEST_NOMBA_SECRET}"
"#,
        )
        .unwrap();
        std::env::set_var("REPORTGATE_TEST_NOMBA_SECRET", "s3cret");

        let config = ReportGateConfig::load(&path).unwrap();
        assert_eq!(config.timeouts.gateway, Duration::from_millis(2500));
        assert_eq!(config.timeouts.store, Duration::from_secs(5));
        assert_eq!(config.gateway.provider, ProviderKind::Nomba);
        assert_eq!(config.gateway.nomba.client_secret, "s3cret");
        assert!(config.validate().is_ok());

        std::env::remove_var("REPORTGATE_TEST_NOMBA_SECRET");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[timeouts\ngateway = ").unwrap();

        assert!(matches!(
            ReportGateConfig::load(&path),
            Err(OpsError::Config(_))
        ));
    }

    #[test]
    fn test_validate_requires_credentials() {
        let config = ReportGateConfig::default();
        assert!(matches!(config.validate(), Err(OpsError::Config(_))));

        let mut config = ReportGateConfig::default();
        config.gateway.paystack.secret_key = "sk_test_x".into();
        assert!(config.validate().is_ok());

        config.timeouts.store = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_store_config() {
        let mut storage = StorageConfig {
            base_dir: PathBuf::from("/data"),
            database: None,
            busy_timeout: Duration::from_secs(1),
        };
        assert_eq!(
            storage.store_config().database_path(),
            PathBuf::from("/data/reportgate.db")
        );

        storage.database = Some(PathBuf::from("/elsewhere/x.db"));
        assert_eq!(
            storage.store_config().database_path(),
            PathBuf::from("/elsewhere/x.db")
        );
    }

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("REPORTGATE_TEST_KEY", "sk_live_abc");

        assert_eq!(expand_env_vars("${REPORTGATE_TEST_KEY}"), "sk_live_abc");
        assert_eq!(
            expand_env_vars("${REPORTGATE_UNSET_12345}"),
            "${REPORTGATE_UNSET_12345}"
        );
        assert_eq!(expand_env_vars("plain"), "plain");

        std::env::remove_var("REPORTGATE_TEST_KEY");
    }
}
