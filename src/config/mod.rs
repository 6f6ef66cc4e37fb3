use crate::error::{Result, ThrottleError};
use crate::rate_limit::service::DEFAULT_KEY_PREFIX;
use crate::rate_limit::types::{Algorithm, RateLimitSpec};
use ::config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Prefix for environment overrides, e.g. `THROTTLE__SERVER__PORT=9000`
pub const ENV_PREFIX: &str = "THROTTLE";

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub redis: RedisConfig,
    /// Policy applied to requests that omit `limit`/`window_seconds`/`algorithm`
    pub defaults: DefaultsConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
}

/// Which state store backs the limiters
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local; correct only while a single instance runs
    Memory,
    #[default]
    Redis,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,
    /// Namespace for every key written
    pub key_prefix: String,
    /// Upper bound on a single store call
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    pub algorithm: Algorithm,
    pub limit: u64,
    pub window_seconds: f64,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive; `RUST_LOG` wins when set
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            timeout_ms: 500,
        }
    }
}

impl RedisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::TokenBucket,
            limit: 100,
            window_seconds: 60.0,
        }
    }
}

impl DefaultsConfig {
    /// Build a spec, filling each missing field from these defaults
    pub fn spec_for(
        &self,
        identifier: impl Into<String>,
        algorithm: Option<Algorithm>,
        limit: Option<u64>,
        window_seconds: Option<f64>,
    ) -> RateLimitSpec {
        RateLimitSpec::new(
            identifier,
            algorithm.unwrap_or(self.algorithm),
            limit.unwrap_or(self.limit),
            window_seconds.unwrap_or(self.window_seconds),
        )
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "throttle=info,tower_http=info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl ThrottleConfig {
    /// Load configuration from an optional YAML file, then `THROTTLE__*`
    /// environment overrides on top
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ThrottleError::Config(format!("Failed to load config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| ThrottleError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            return Err(ThrottleError::Config(
                "server.host cannot be empty".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ThrottleError::Config("server.port must be > 0".to_string()));
        }

        if self.store.backend == StoreBackend::Redis {
            if !self.redis.url.starts_with("redis://") && !self.redis.url.starts_with("rediss://") {
                return Err(ThrottleError::Config(format!(
                    "redis.url must start with redis:// or rediss://, got '{}'",
                    self.redis.url
                )));
            }
            if self.redis.timeout_ms == 0 {
                return Err(ThrottleError::Config(
                    "redis.timeout_ms must be > 0".to_string(),
                ));
            }
        }

        if self.redis.key_prefix.is_empty() {
            return Err(ThrottleError::Config(
                "redis.key_prefix cannot be empty".to_string(),
            ));
        }

        // The defaults must themselves form a valid policy
        self.defaults
            .spec_for("defaults", None, None, None)
            .validate()
            .map_err(|e| ThrottleError::Config(format!("Invalid defaults: {}", e)))?;

        Ok(())
    }
}
