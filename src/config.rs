//! Configuration management for CMS Fetcher
//!
//! A TOML file with `[api]`, `[retry]`, `[ingest]`, `[output]`, `[storage]`
//! and `[logging]` sections. Every section and every key is optional; missing
//! values take the built-in defaults. Credentials are never read from this
//! file, only from the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::app::{ClientConfig, CoordinatorConfig, RetryPolicy, StorageConfig};
use crate::constants::{api, catalog, files, http, limits, storage, workers};
use crate::errors::{ConfigError, Result};

const CONFIG_DIR_NAME: &str = "cms-fetcher";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Unified application configuration for TOML serialization
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Upstream service settings
    pub api: ApiConfigToml,
    /// Throttling and fault retry settings
    pub retry: RetryConfigToml,
    /// Device selection and file processing
    pub ingest: IngestConfigToml,
    /// Parquet destinations
    pub output: OutputConfigToml,
    /// Object storage
    pub storage: StorageConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// TOML-friendly client configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfigToml {
    /// Base URL of the CMS data service
    pub base_url: String,
    /// Client-side request ceiling (requests per second)
    pub rate_limit_rps: u32,
    /// Request timeout in seconds
    pub request_timeout_secs: u64,
    /// Connect timeout in seconds
    pub connect_timeout_secs: u64,
    /// TCP keep-alive in seconds (0 = disabled)
    pub tcp_keepalive_secs: u64,
    /// Connection pool idle timeout in seconds (0 = no timeout)
    pub pool_idle_timeout_secs: u64,
    /// Maximum idle connections per host
    pub pool_max_per_host: usize,
    /// Skip TLS certificate verification
    pub danger_accept_invalid_certs: bool,
}

impl Default for ApiConfigToml {
    fn default() -> Self {
        Self {
            base_url: api::DEFAULT_BASE_URL.to_string(),
            rate_limit_rps: limits::DEFAULT_RATE_LIMIT_RPS,
            request_timeout_secs: http::DEFAULT_TIMEOUT.as_secs(),
            connect_timeout_secs: http::CONNECT_TIMEOUT.as_secs(),
            tcp_keepalive_secs: 30,
            pool_idle_timeout_secs: http::POOL_IDLE_TIMEOUT.as_secs(),
            pool_max_per_host: http::POOL_MAX_PER_HOST,
            danger_accept_invalid_certs: false,
        }
    }
}

/// TOML-friendly retry policy
///
/// `max_attempts = 0` and `deadline_secs = 0` lift the respective cap.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfigToml {
    pub max_attempts: u32,
    pub deadline_secs: u64,
    /// Wait for a 429 without a usable Retry-After header
    pub default_retry_after_secs: u64,
    /// Fixed wait after 503/504
    pub unavailable_delay_secs: u64,
    /// Retries granted to connection-level faults
    pub network_retries: u32,
    /// Base of the exponential backoff for connection-level faults
    pub network_base_delay_ms: u64,
}

impl Default for RetryConfigToml {
    fn default() -> Self {
        Self {
            max_attempts: limits::DEFAULT_MAX_ATTEMPTS,
            deadline_secs: limits::DEFAULT_DEADLINE_SECS,
            default_retry_after_secs: limits::DEFAULT_RETRY_AFTER_SECS,
            unavailable_delay_secs: limits::UNAVAILABLE_DELAY_SECS,
            network_retries: limits::NETWORK_RETRIES,
            network_base_delay_ms: limits::RETRY_BASE_DELAY_MS,
        }
    }
}

/// TOML-friendly ingestion settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngestConfigToml {
    /// Device ids to ingest (empty = all)
    pub allowed_device_ids: Vec<String>,
    /// Files processed concurrently (1 = sequential)
    pub concurrency: usize,
    /// Raw file format requested from the service
    pub file_format: String,
    /// Dash segments stripped from device names when grouping
    pub name_prefix_segments: usize,
    /// Raw-file archive directory (unset = no archive)
    pub raw_dir: Option<PathBuf>,
}

impl Default for IngestConfigToml {
    fn default() -> Self {
        Self {
            allowed_device_ids: Vec::new(),
            concurrency: workers::DEFAULT_CONCURRENCY,
            file_format: files::DEFAULT_FILE_FORMAT.to_string(),
            name_prefix_segments: catalog::NAME_PREFIX_SEGMENTS,
            raw_dir: None,
        }
    }
}

/// TOML-friendly output settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfigToml {
    /// Combined Parquet artifact
    pub output_path: PathBuf,
    /// Per-turbine Parquet directory (empty = disabled)
    pub processed_dir: PathBuf,
}

impl Default for OutputConfigToml {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from(files::DEFAULT_OUTPUT_PATH),
            processed_dir: PathBuf::from(files::DEFAULT_PROCESSED_DIR),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level when neither RUST_LOG nor a verbosity flag is given
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Resolved output destinations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSettings {
    pub output_path: PathBuf,
    pub processed_dir: Option<PathBuf>,
}

/// Runtime configuration derived from [`AppConfig`]
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub client: ClientConfig,
    pub coordinator: CoordinatorConfig,
    pub output: OutputSettings,
    pub storage: StorageConfig,
}

fn invalid(field: &str, value: impl ToString, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

impl AppConfig {
    /// Convert TOML-friendly configuration to runtime configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for values the runtime cannot use
    pub fn to_runtime_config(&self) -> std::result::Result<RuntimeConfig, ConfigError> {
        let runtime = RuntimeConfig {
            client: self.api.to_runtime_config(&self.retry),
            coordinator: self.ingest.to_runtime_config(),
            output: self.output.to_runtime_config(),
            storage: self.storage.clone(),
        };
        self.validate()?;
        Ok(runtime)
    }

    fn validate(&self) -> std::result::Result<(), ConfigError> {
        Url::parse(&self.api.base_url).map_err(|e| {
            invalid("api.base_url", &self.api.base_url, e.to_string())
        })?;

        if self.api.rate_limit_rps == 0 {
            return Err(invalid("api.rate_limit_rps", 0, "Must be at least 1"));
        }

        if self.retry.network_retries > limits::MAX_NETWORK_RETRIES {
            return Err(invalid(
                "retry.network_retries",
                self.retry.network_retries,
                format!("Must be at most {}", limits::MAX_NETWORK_RETRIES),
            ));
        }

        self.ingest
            .to_runtime_config()
            .validate()
            .map_err(|reason| invalid("ingest", self.ingest.concurrency, reason))?;

        if self.output.output_path.as_os_str().is_empty() {
            return Err(invalid("output.output_path", "", "Must not be empty"));
        }

        Ok(())
    }

    /// Load configuration from `config_file_override` or the first file
    /// found in the standard locations, falling back to defaults
    pub async fn load(config_file_override: Option<&Path>) -> Result<Self> {
        Ok(Self::load_with_source(config_file_override).await?.0)
    }

    /// Like [`AppConfig::load`], also returning the file that was read
    pub async fn load_with_source(
        config_file_override: Option<&Path>,
    ) -> Result<(Self, Option<PathBuf>)> {
        let path = match config_file_override {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound {
                        path: path.to_path_buf(),
                    }
                    .into());
                }
                Some(path.to_path_buf())
            }
            None => Self::find_config_file(),
        };

        match path {
            Some(path) => {
                let config = Self::load_from_file(&path).await?;
                Ok((config, Some(path)))
            }
            None => {
                debug!("No config file found, using defaults");
                Ok((Self::default(), None))
            }
        }
    }

    /// Standard locations, most specific first
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from("./cms-fetcher.toml"),
            PathBuf::from("./config.toml"),
        ];
        if let Some(path) = Self::default_config_path() {
            paths.push(path);
        }
        #[cfg(unix)]
        paths.push(PathBuf::from("/etc").join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME));
        paths
    }

    /// Find configuration file in standard locations
    pub fn find_config_file() -> Option<PathBuf> {
        let found = Self::search_paths().into_iter().find(|path| path.exists());
        if let Some(path) = &found {
            debug!("Found config file: {}", path.display());
        }
        found
    }

    /// Default config file path for the current user
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load configuration from a TOML file
    pub async fn load_from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        let config: AppConfig = toml::from_str(&content).map_err(|e| {
            tracing::error!("Failed to parse config file {}: {}", path.display(), e);
            ConfigError::InvalidFormat(e)
        })?;

        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Write the commented default configuration to `path`
    ///
    /// Refuses to replace an existing file unless `force` is set.
    pub async fn write_default(path: &Path, force: bool) -> Result<()> {
        if path.exists() && !force {
            return Err(invalid(
                "path",
                path.display(),
                "File exists; pass --force to overwrite",
            )
            .into());
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ConfigError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        tokio::fs::write(path, Self::generate_default_config_content())
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(())
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| crate::errors::AppError::generic(format!("Cannot render config: {}", e)))
    }

    /// Generate default configuration content with helpful comments
    pub fn generate_default_config_content() -> String {
        format!(
            r#"# CMS Fetcher Configuration
#
# Credentials are read from the environment (or a .env file), never from here:
#   CMS_API_KEY               pre-encoded Basic credential
#   CMS_USERNAME/CMS_PASSWORD encoded at startup

[api]
base_url = "{base_url}"
rate_limit_rps = {rps}
request_timeout_secs = {request_timeout}
connect_timeout_secs = {connect_timeout}
tcp_keepalive_secs = 30
pool_idle_timeout_secs = {pool_idle}
pool_max_per_host = {pool_max}
# The portal has been served with self-signed certificates
danger_accept_invalid_certs = false

[retry]
# 0 lifts the cap
max_attempts = {max_attempts}
deadline_secs = {deadline}
default_retry_after_secs = {retry_after}
unavailable_delay_secs = {unavailable}
network_retries = {network_retries}
network_base_delay_ms = {network_base}

[ingest]
# Empty list = every device in the catalog
allowed_device_ids = []
# 1 = strictly sequential
concurrency = {concurrency}
file_format = "{format}"
name_prefix_segments = {prefix}
# raw_dir = "raw"  # Uncomment to archive fetched raw files

[output]
output_path = "{output_path}"
# Empty string disables per-turbine files
processed_dir = "{processed_dir}"

[storage]
# bucket = "my-bucket"
key = "{key}"
region = "{region}"
# endpoint_url = "http://localhost:9000"

[logging]
level = "info"  # error, warn, info, debug, trace
"#,
            base_url = api::DEFAULT_BASE_URL,
            rps = limits::DEFAULT_RATE_LIMIT_RPS,
            request_timeout = http::DEFAULT_TIMEOUT.as_secs(),
            connect_timeout = http::CONNECT_TIMEOUT.as_secs(),
            pool_idle = http::POOL_IDLE_TIMEOUT.as_secs(),
            pool_max = http::POOL_MAX_PER_HOST,
            max_attempts = limits::DEFAULT_MAX_ATTEMPTS,
            deadline = limits::DEFAULT_DEADLINE_SECS,
            retry_after = limits::DEFAULT_RETRY_AFTER_SECS,
            unavailable = limits::UNAVAILABLE_DELAY_SECS,
            network_retries = limits::NETWORK_RETRIES,
            network_base = limits::RETRY_BASE_DELAY_MS,
            concurrency = workers::DEFAULT_CONCURRENCY,
            format = files::DEFAULT_FILE_FORMAT,
            prefix = catalog::NAME_PREFIX_SEGMENTS,
            output_path = files::DEFAULT_OUTPUT_PATH,
            processed_dir = files::DEFAULT_PROCESSED_DIR,
            key = storage::DEFAULT_KEY,
            region = storage::DEFAULT_REGION,
        )
    }
}

fn nonzero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl ApiConfigToml {
    /// Convert to runtime ClientConfig
    pub fn to_runtime_config(&self, retry: &RetryConfigToml) -> ClientConfig {
        ClientConfig {
            base_url: self.base_url.clone(),
            tcp_keepalive: nonzero_secs(self.tcp_keepalive_secs),
            pool_idle_timeout: nonzero_secs(self.pool_idle_timeout_secs),
            pool_max_per_host: self.pool_max_per_host,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            rate_limit_rps: self.rate_limit_rps,
            danger_accept_invalid_certs: self.danger_accept_invalid_certs,
            retry_policy: retry.to_runtime_config(),
        }
    }
}

impl RetryConfigToml {
    /// Convert to runtime RetryPolicy
    pub fn to_runtime_config(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: (self.max_attempts > 0).then_some(self.max_attempts),
            deadline: nonzero_secs(self.deadline_secs),
            default_retry_after: Duration::from_secs(self.default_retry_after_secs),
            unavailable_delay: Duration::from_secs(self.unavailable_delay_secs),
            network_retries: self.network_retries,
            network_base_delay: Duration::from_millis(self.network_base_delay_ms),
        }
    }
}

impl IngestConfigToml {
    /// Convert to runtime CoordinatorConfig
    pub fn to_runtime_config(&self) -> CoordinatorConfig {
        let allowed: Vec<String> = self
            .allowed_device_ids
            .iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();

        CoordinatorConfig {
            allowed_device_ids: (!allowed.is_empty()).then_some(allowed),
            concurrency: self.concurrency,
            file_format: self.file_format.clone(),
            name_prefix_segments: self.name_prefix_segments,
            raw_dir: self.raw_dir.clone(),
        }
    }
}

impl OutputConfigToml {
    /// Convert to resolved output destinations
    pub fn to_runtime_config(&self) -> OutputSettings {
        OutputSettings {
            output_path: self.output_path.clone(),
            processed_dir: (!self.processed_dir.as_os_str().is_empty())
                .then(|| self.processed_dir.clone()),
        }
    }
}
