//! Configuration loading.
//!
//! Sources are layered with the `config` crate, later sources overriding earlier:
//!
//! 1. Bundled defaults (`courier.toml`, compiled in)
//! 2. `~/.config/courier/courier.toml`
//! 3. `./courier.toml`
//! 4. `COURIER_` environment variables, nested keys joined by `__`
//!    (`COURIER_RETRY__MAX_RETRIES=5`, `COURIER_TOKEN=123:ABC`)
//!
//! A `.env` file in the working directory is read before the environment layer.

use config::{Config, Environment, File, FileFormat};
use courier_error::{ConfigError, CourierResult};
use courier_rate_limit::RateLimitConfig;
use courier_resilience::{BreakerConfig, RetryPolicy};
use courier_security::SecretToken;
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

const DEFAULT_CONFIG: &str = include_str!("../../../courier.toml");

/// Output format for log lines.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, multi-line
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters)]
pub struct LoggingConfig {
    /// Line format
    #[serde(default)]
    format: LogFormat,

    /// `EnvFilter` directives; `RUST_LOG` takes precedence when set
    #[serde(default = "default_filter")]
    filter: String,
}

fn default_filter() -> String {
    "info,courier=debug".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: default_filter(),
        }
    }
}

impl LoggingConfig {
    /// Create logging settings.
    pub fn new(format: LogFormat, filter: impl Into<String>) -> Self {
        Self {
            format,
            filter: filter.into(),
        }
    }
}

/// Every tunable of the dispatch core.
#[derive(Debug, Clone, Default, Deserialize, Getters)]
pub struct CourierConfig {
    /// Global and per-key admission limits
    #[serde(default)]
    rate_limit: RateLimitConfig,

    /// Breaker around the remote API
    #[serde(default)]
    circuit_breaker: BreakerConfig,

    /// Retry budget and backoff
    #[serde(default)]
    retry: RetryPolicy,

    /// Logging setup
    #[serde(default)]
    logging: LoggingConfig,

    /// Bot credential, scrubbed from every error
    #[serde(default)]
    token: SecretToken,
}

impl CourierConfig {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a source cannot be parsed or the merged
    /// result fails [`validate`](Self::validate).
    pub fn load() -> CourierResult<Self> {
        debug!("Loading configuration: env > current dir > home dir > bundled defaults");

        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "Loaded .env");
        }

        let mut builder =
            Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".config/courier/courier.toml");
            builder = builder.add_source(File::from(home_config).required(false));
        }

        builder = builder
            .add_source(File::with_name("courier").required(false))
            .add_source(
                Environment::with_prefix("COURIER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        Self::finish(builder.build())
    }

    /// Load bundled defaults overridden by a single file.
    ///
    /// Keys missing from the file keep their default values.
    pub fn from_file(path: impl AsRef<Path>) -> CourierResult<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading configuration from file");

        let built = Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
            .add_source(File::from(path).format(FileFormat::Toml))
            .build();
        Self::finish(built)
    }

    /// Bundled defaults only.
    pub fn bundled() -> CourierResult<Self> {
        Self::finish(
            Config::builder()
                .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
                .build(),
        )
    }

    fn finish(built: Result<Config, config::ConfigError>) -> CourierResult<Self> {
        let config: Self = built
            .map_err(|e| ConfigError::new(format!("Failed to build configuration: {}", e)))?
            .try_deserialize()
            .map_err(|e| ConfigError::new(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rate_limit.validate()?;
        self.circuit_breaker.validate()?;
        self.retry.validate()?;
        Ok(())
    }

    /// Replace the credential.
    pub fn with_token(mut self, token: SecretToken) -> Self {
        self.token = token;
        self
    }
}
