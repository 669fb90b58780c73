//! Transport configuration.
//!
//! A [`TransportConfig`] can be built in code, from an option map, from a
//! `beanstalk://` DSN, or loaded from a file layered with `BEANSTALK_*`
//! environment variables.

use crate::error::ConfigurationError;
use crate::job::TubeName;
use crate::providers::DEFAULT_PORT;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use url::Url;

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Default reservation and connection timeout in seconds
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 10;

/// Largest timeout accepted, the range of beanstalkd's `reserve-with-timeout`
pub const MAX_TIMEOUT_SECONDS: u64 = u32::MAX as u64;

/// Environment variable prefix read by [`TransportConfig::load`]
pub const ENV_PREFIX: &str = "BEANSTALK";

const DSN_SCHEMES: [&str; 2] = ["beanstalk", "beanstalkd"];

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

/// Connection and tube settings of one transport instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Queue server host name or address
    pub host: String,

    /// Queue server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Reservation and connection timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Tube used for both reserving and sending
    #[serde(default)]
    pub tube: TubeName,
}

impl TransportConfig {
    /// Create configuration for a host with every other setting defaulted
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT_SECONDS,
            tube: TubeName::default(),
        }
    }

    /// Set port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set timeout in seconds
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = seconds;
        self
    }

    /// Set tube
    pub fn with_tube(mut self, tube: TubeName) -> Self {
        self.tube = tube;
        self
    }

    /// Timeout as a duration, capped at [`MAX_TIMEOUT_SECONDS`]
    pub fn timeout_duration(&self) -> Duration {
        Duration::seconds(i64::from(
            u32::try_from(self.timeout).unwrap_or(u32::MAX),
        ))
    }

    /// Build from an option map with keys `host`, `port`, `timeout`, `tube`
    ///
    /// Unknown keys are ignored.
    pub fn from_options(options: &HashMap<String, String>) -> Result<Self, ConfigurationError> {
        let host = options
            .get("host")
            .filter(|host| !host.is_empty())
            .ok_or_else(|| ConfigurationError::Missing {
                key: "host".to_string(),
            })?;

        let mut config = Self::new(host.clone());
        if let Some(port) = options.get("port") {
            config.port = parse_option("port", port)?;
        }
        if let Some(timeout) = options.get("timeout") {
            config.timeout = parse_option("timeout", timeout)?;
        }
        if let Some(tube) = options.get("tube") {
            config.tube = TubeName::new(tube.clone())?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Build from a DSN such as `beanstalk://localhost:11300?tube=jobs&timeout=5`
    pub fn from_dsn(dsn: &str) -> Result<Self, ConfigurationError> {
        let url = Url::parse(dsn).map_err(|e| ConfigurationError::Parsing {
            message: format!("invalid DSN '{}': {}", dsn, e),
        })?;

        if !DSN_SCHEMES.contains(&url.scheme()) {
            return Err(ConfigurationError::Invalid {
                message: format!(
                    "unsupported DSN scheme '{}', expected one of {:?}",
                    url.scheme(),
                    DSN_SCHEMES
                ),
            });
        }

        let mut options: HashMap<String, String> = url
            .query_pairs()
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        if let Some(host) = url.host_str() {
            options.insert("host".to_string(), host.to_string());
        }
        if let Some(port) = url.port() {
            options.insert("port".to_string(), port.to_string());
        }

        Self::from_options(&options)
    }

    /// Load from an optional file, overridden by `BEANSTALK_*` environment variables
    ///
    /// The file format follows the extension (`.toml`, `.yaml`, `.json`).
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        Self::load_with_overrides(path, &HashMap::new())
    }

    /// Same as [`TransportConfig::load`], with explicit values applied last
    ///
    /// Override keys are the field names (`host`, `port`, `timeout`, `tube`).
    pub fn load_with_overrides(
        path: Option<&Path>,
        overrides: &HashMap<String, String>,
    ) -> Result<Self, ConfigurationError> {
        Self::load_layered(path, ENV_PREFIX, overrides)
    }

    fn load_layered(
        path: Option<&Path>,
        env_prefix: &str,
        overrides: &HashMap<String, String>,
    ) -> Result<Self, ConfigurationError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(config::Environment::with_prefix(env_prefix));

        for (key, value) in overrides {
            builder = builder
                .set_override(key.as_str(), value.as_str())
                .map_err(|e| ConfigurationError::Parsing {
                    message: e.to_string(),
                })?;
        }

        let settings = builder.build().map_err(|e| ConfigurationError::Parsing {
            message: e.to_string(),
        })?;

        let config: Self = settings
            .try_deserialize()
            .map_err(|e| ConfigurationError::Parsing {
                message: e.to_string(),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Check the settings are usable before connecting
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.host.trim().is_empty() {
            return Err(ConfigurationError::Missing {
                key: "host".to_string(),
            });
        }

        if self.port == 0 {
            return Err(ConfigurationError::Invalid {
                message: "port must be between 1 and 65535".to_string(),
            });
        }

        if self.timeout > MAX_TIMEOUT_SECONDS {
            return Err(ConfigurationError::Invalid {
                message: format!("timeout must be at most {} seconds", MAX_TIMEOUT_SECONDS),
            });
        }

        Ok(())
    }
}

fn parse_option<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigurationError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigurationError::Invalid {
            message: format!("option '{}' has invalid value '{}': {}", key, value, e),
        })
}
