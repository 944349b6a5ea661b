//! Limiter configuration.
//!
//! Settings are layered, later sources overriding earlier ones:
//! 1. Bundled defaults (`tollgate.toml` shipped with the library)
//! 2. `~/.config/tollgate/tollgate.toml`
//! 3. `./tollgate.toml`
//! 4. `TOLLGATE_*` environment variables (e.g. `TOLLGATE_TOKENS_PER_MINUTE=90000`)

use crate::BucketSpec;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tollgate_error::{ConfigError, TollgateError, TollgateResult};
use tracing::{debug, instrument};

/// Rates, retry policy, and timeout for one remote endpoint.
///
/// Durations are expressed in seconds so they read naturally in TOML.
///
/// # Example
///
/// ```toml
/// requests_per_second = 2.0
/// tokens_per_minute = 90_000
/// max_retries = 5
/// base_delay = 0.5
/// max_delay = 20.0
/// timeout = 30.0
/// jitter = true
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LimiterConfig {
    /// Sustained request rate, also the request burst size
    pub requests_per_second: f64,
    /// Token budget per minute, also the token burst size
    pub tokens_per_minute: u64,
    /// Retries after the first attempt when the remote reports a rate limit
    pub max_retries: u32,
    /// Backoff before the first retry, in seconds
    pub base_delay: f64,
    /// Upper bound on any backoff, in seconds
    pub max_delay: f64,
    /// Per-call timeout for async calls, in seconds
    pub timeout: f64,
    /// Lengthen each backoff by a random fraction of up to a quarter
    pub jitter: bool,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 1.0,
            tokens_per_minute: 500_000,
            max_retries: 3,
            base_delay: 1.0,
            max_delay: 32.0,
            timeout: 60.0,
            jitter: false,
        }
    }
}

impl LimiterConfig {
    /// Load configuration from a specific file path.
    ///
    /// Fields missing from the file keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or fails validation.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<std::path::Path>) -> TollgateResult<Self> {
        debug!("Loading limiter configuration from file");

        let config: Self = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .map_err(|e| {
                TollgateError::from(ConfigError::new(format!(
                    "Failed to read configuration from {}: {}",
                    path.as_ref().display(),
                    e
                )))
            })?
            .try_deserialize()
            .map_err(|e| {
                TollgateError::from(ConfigError::new(format!(
                    "Failed to parse configuration: {}",
                    e
                )))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from every layered source.
    ///
    /// User files are optional and silently skipped when absent.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use tollgate_rate_limit::LimiterConfig;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = LimiterConfig::load()?;
    /// println!("{} tokens/min", config.tokens_per_minute);
    /// # Ok(())
    /// # }
    /// ```
    #[instrument]
    pub fn load() -> TollgateResult<Self> {
        debug!("Loading limiter configuration: env > current dir > home dir > bundled defaults");

        const DEFAULT_CONFIG: &str = include_str!("../../../tollgate.toml");

        let mut builder =
            Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".config/tollgate/tollgate.toml");
            builder = builder.add_source(File::from(home_config).required(false));
        }

        builder = builder
            .add_source(File::with_name("tollgate").required(false))
            .add_source(Environment::with_prefix("TOLLGATE").try_parsing(true));

        let config: Self = builder
            .build()
            .map_err(|e| {
                TollgateError::from(ConfigError::new(format!(
                    "Failed to build configuration: {}",
                    e
                )))
            })?
            .try_deserialize()
            .map_err(|e| {
                TollgateError::from(ConfigError::new(format!(
                    "Failed to parse configuration: {}",
                    e
                )))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Check every value a limiter or retry policy will be built from.
    ///
    /// # Errors
    ///
    /// Rejects non-positive or non-finite rates and delays, a zero token budget,
    /// and a `max_delay` shorter than `base_delay`.
    pub fn validate(&self) -> TollgateResult<()> {
        positive("requests_per_second", self.requests_per_second)?;
        if self.tokens_per_minute == 0 {
            return Err(ConfigError::new("tokens_per_minute must be positive").into());
        }
        positive("base_delay", self.base_delay)?;
        positive("max_delay", self.max_delay)?;
        positive("timeout", self.timeout)?;
        if self.max_delay < self.base_delay {
            return Err(ConfigError::new(format!(
                "max_delay ({}) must not be shorter than base_delay ({})",
                self.max_delay, self.base_delay
            ))
            .into());
        }
        Ok(())
    }

    /// Request bucket: capacity and refill both equal to `requests_per_second`.
    pub fn request_bucket(&self) -> BucketSpec {
        BucketSpec::per_second(self.requests_per_second)
    }

    /// Token bucket: capacity `tokens_per_minute`, refilling over one minute.
    pub fn token_bucket(&self) -> BucketSpec {
        BucketSpec::per_minute(self.tokens_per_minute)
    }

    /// Backoff before the first retry.
    pub fn base_delay(&self) -> Result<Duration, ConfigError> {
        seconds("base_delay", self.base_delay)
    }

    /// Upper bound on any backoff.
    pub fn max_delay(&self) -> Result<Duration, ConfigError> {
        seconds("max_delay", self.max_delay)
    }

    /// Per-call timeout.
    pub fn timeout(&self) -> Result<Duration, ConfigError> {
        seconds("timeout", self.timeout)
    }
}

#[track_caller]
fn positive(name: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::new(format!(
            "{} must be a positive number, got {}",
            name, value
        )))
    }
}

#[track_caller]
fn seconds(name: &str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value)
        .map_err(|e| ConfigError::new(format!("{} is not a valid duration: {}", name, e)))
}
